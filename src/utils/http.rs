// src/utils/http.rs

//! HTTP client utilities.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Response, StatusCode, cookie::Jar};

use crate::error::{AppError, Result};
use crate::models::SourceConfig;

/// Create a configured asynchronous HTTP client.
pub fn create_client(config: &SourceConfig) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .user_agent(&config.user_agent)
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;
    Ok(client)
}

/// Create a client bound to its own cookie jar.
///
/// Used for captcha sessions: every retrieval attempt owns a fresh jar,
/// never shared across attempts.
pub fn create_session_client(
    config: &SourceConfig,
    jar: Arc<Jar>,
) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .user_agent(&config.user_agent)
        .timeout(Duration::from_secs(config.timeout_secs))
        .cookie_provider(jar)
        .build()?;
    Ok(client)
}

/// Map a non-success HTTP status to the error taxonomy.
///
/// 429 is surfaced distinctly so callers can back off longer than the
/// default retry schedule.
pub fn check_status(context: &str, response: Response) -> Result<Response> {
    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after_secs = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());
        return Err(AppError::RateLimited { retry_after_secs });
    }
    if !status.is_success() {
        return Err(AppError::fetch(context, format!("HTTP status {status}")));
    }
    Ok(response)
}
