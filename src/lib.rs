// src/lib.rs

//! causewatch library
//!
//! Polls a public court cause-list page, diffs it against the previous
//! snapshot, and raises deduplicated notifications. A second subsystem
//! retrieves captcha-gated judgment/order documents by solving the image
//! challenge with OCR and retrying with fresh sessions on rejection.

pub mod captcha;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod storage;
pub mod utils;
