// src/error.rs

//! Unified error handling for the watcher application.

use std::fmt;

use thiserror::Error;

/// Result type alias for watcher operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Image decoding/encoding failed
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// CSS selector parsing failed
    #[error("Invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Malformed caller input, rejected before any network call
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Upstream fetch failed (network error or non-2xx status)
    #[error("Fetch error for {context}: {message}")]
    Fetch { context: String, message: String },

    /// Upstream signalled rate limiting (HTTP 429)
    #[error("Rate limited by upstream{}", retry_after_secs.map(|s| format!(" (retry after {s}s)")).unwrap_or_default())]
    RateLimited { retry_after_secs: Option<u64> },

    /// Captcha attempt budget exhausted
    #[error("Captcha rejected after {attempts} attempt(s) for document {document_id}")]
    CaptchaRejected { document_id: String, attempts: u32 },

    /// Session id unknown or used past its TTL
    #[error("Session {session_id} expired or unknown; open a new challenge")]
    SessionExpired { session_id: String },

    /// OCR engine failure
    #[error("OCR error: {0}")]
    Ocr(String),

    /// Browser automation failure
    #[error("Browser error: {0}")]
    Browser(String),
}

impl AppError {
    /// Create a selector parsing error.
    pub fn selector(selector: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Selector {
            selector: selector.into(),
            message: message.to_string(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create an invalid-input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Create a fetch error with context.
    pub fn fetch(context: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Fetch {
            context: context.into(),
            message: message.to_string(),
        }
    }

    /// Create an OCR error.
    pub fn ocr(message: impl fmt::Display) -> Self {
        Self::Ocr(message.to_string())
    }

    /// Create a browser automation error.
    pub fn browser(message: impl fmt::Display) -> Self {
        Self::Browser(message.to_string())
    }

    /// Whether the error is a routine captcha rejection (retried, not surfaced
    /// until the attempt budget runs out).
    pub fn is_captcha_rejection(&self) -> bool {
        matches!(self, Self::CaptchaRejected { .. })
    }
}
