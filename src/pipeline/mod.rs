//! Schedule pipeline: parse → detect → dedup → notify, driven by the
//! polling worker.

pub mod dedup;
pub mod detect;
pub mod notify;
pub mod parser;
pub mod poll;

pub use dedup::DedupFilter;
pub use detect::ChangeDetector;
pub use notify::NotificationComposer;
pub use parser::{LabelPatterns, ScheduleParser};
pub use poll::{PollSummary, PollingWorker};
