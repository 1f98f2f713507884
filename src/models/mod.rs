// src/models/mod.rs

//! Domain models for the watcher application.

mod change;
mod config;
mod record;
mod snapshot;

// Re-export all public types
pub use change::{ChangeEvent, ChangeType, NotificationRecord};
pub use config::{
    Alphabet, CaptchaConfig, Config, LabelConfig, PollerConfig, SourceConfig, StorageConfig,
};
pub use record::{CaseDetails, CourtSessionRecord};
pub use snapshot::ScheduleSnapshot;
