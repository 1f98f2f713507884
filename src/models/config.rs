//! Application configuration structures.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Upstream cause-list source settings
    #[serde(default)]
    pub source: SourceConfig,

    /// Polling cadence and deduplication settings
    #[serde(default)]
    pub poller: PollerConfig,

    /// Label vocabulary for field extraction
    #[serde(default)]
    pub labels: LabelConfig,

    /// Captcha-gated document retrieval settings
    #[serde(default)]
    pub captcha: CaptchaConfig,

    /// Snapshot store settings
    #[serde(default)]
    pub storage: StorageConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.source.schedule_url.trim().is_empty() {
            return Err(AppError::validation("source.schedule_url is empty"));
        }
        if self.source.user_agent.trim().is_empty() {
            return Err(AppError::validation("source.user_agent is empty"));
        }
        if self.source.timeout_secs == 0 {
            return Err(AppError::validation("source.timeout_secs must be > 0"));
        }
        if self.source.fetch_retries == 0 {
            return Err(AppError::validation("source.fetch_retries must be > 0"));
        }
        if self.poller.interval_secs == 0 {
            return Err(AppError::validation("poller.interval_secs must be > 0"));
        }
        if self.poller.dedup_bucket_secs == 0 {
            return Err(AppError::validation(
                "poller.dedup_bucket_secs must be > 0",
            ));
        }
        self.labels.validate()?;
        self.captcha.validate()?;
        Ok(())
    }
}

/// Upstream schedule source settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Fixed URL of the cause-list page
    #[serde(default = "defaults::schedule_url")]
    pub schedule_url: String,

    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Fetch attempts per poll before giving up
    #[serde(default = "defaults::fetch_retries")]
    pub fetch_retries: u32,

    /// Initial backoff between fetch attempts, doubled per attempt
    #[serde(default = "defaults::retry_backoff")]
    pub retry_backoff_ms: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            schedule_url: defaults::schedule_url(),
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            fetch_retries: defaults::fetch_retries(),
            retry_backoff_ms: defaults::retry_backoff(),
        }
    }
}

/// Polling cadence and deduplication settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollerConfig {
    /// Seconds between polls
    #[serde(default = "defaults::poll_interval")]
    pub interval_secs: u64,

    /// Width of the deduplication time bucket in seconds
    #[serde(default = "defaults::dedup_bucket")]
    pub dedup_bucket_secs: u64,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval_secs: defaults::poll_interval(),
            dedup_bucket_secs: defaults::dedup_bucket(),
        }
    }
}

/// Label vocabulary for anchored field extraction.
///
/// The upstream markup carries no structural markers beyond these label
/// strings, so they are carried as versioned configuration rather than
/// inline logic. The "NOT in session" marker is the only session-status
/// signal in the source and must match its casing verbatim; if the upstream
/// ever rewords it, `is_in_session` silently misclassifies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelConfig {
    /// Verbatim marker string printed for courts that are not sitting
    #[serde(default = "defaults::not_in_session_marker")]
    pub not_in_session_marker: String,

    /// Pattern capturing the case number after the "Case Details" anchor
    #[serde(default = "defaults::case_number_pattern")]
    pub case_number_pattern: String,

    /// Pattern locating the title label
    #[serde(default = "defaults::title_label_pattern")]
    pub title_label_pattern: String,

    /// Pattern locating the petitioner-counsel label
    #[serde(default = "defaults::petitioner_label_pattern")]
    pub petitioner_label_pattern: String,

    /// Pattern locating the respondent-counsel label
    #[serde(default = "defaults::respondent_label_pattern")]
    pub respondent_label_pattern: String,
}

impl LabelConfig {
    fn validate(&self) -> Result<()> {
        if self.not_in_session_marker.trim().is_empty() {
            return Err(AppError::validation("labels.not_in_session_marker is empty"));
        }
        for (name, pattern) in [
            ("labels.case_number_pattern", &self.case_number_pattern),
            ("labels.title_label_pattern", &self.title_label_pattern),
            (
                "labels.petitioner_label_pattern",
                &self.petitioner_label_pattern,
            ),
            (
                "labels.respondent_label_pattern",
                &self.respondent_label_pattern,
            ),
        ] {
            regex::Regex::new(pattern)
                .map_err(|e| AppError::validation(format!("{name} is not a valid regex: {e}")))?;
        }
        Ok(())
    }
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            not_in_session_marker: defaults::not_in_session_marker(),
            case_number_pattern: defaults::case_number_pattern(),
            title_label_pattern: defaults::title_label_pattern(),
            petitioner_label_pattern: defaults::petitioner_label_pattern(),
            respondent_label_pattern: defaults::respondent_label_pattern(),
        }
    }
}

/// Allowed captcha alphabet.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Alphabet {
    Digits,
    Alphanumeric,
}

impl Alphabet {
    /// Whether a character belongs to the alphabet.
    pub fn contains(&self, c: char) -> bool {
        match self {
            Alphabet::Digits => c.is_ascii_digit(),
            Alphabet::Alphanumeric => c.is_ascii_alphanumeric(),
        }
    }

    /// Character whitelist as passed to the OCR engine.
    pub fn whitelist(&self) -> &'static str {
        match self {
            Alphabet::Digits => "0123456789",
            Alphabet::Alphanumeric => {
                "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz"
            }
        }
    }
}

/// Captcha-gated document retrieval settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptchaConfig {
    /// Endpoint serving the challenge image for the current session
    #[serde(default = "defaults::challenge_url")]
    pub challenge_url: String,

    /// Endpoint accepting the solved code and returning the document
    #[serde(default = "defaults::submit_url")]
    pub submit_url: String,

    /// Document page template for the browser strategy ({id} placeholder)
    #[serde(default = "defaults::document_page_url")]
    pub document_page_url: String,

    /// WebDriver endpoint for the browser strategy
    #[serde(default = "defaults::webdriver_url")]
    pub webdriver_url: String,

    /// CSS selector for the captcha image element on the rendered page
    #[serde(default = "defaults::captcha_image_selector")]
    pub captcha_image_selector: String,

    /// CSS selector for the code input on the rendered page
    #[serde(default = "defaults::captcha_input_selector")]
    pub captcha_input_selector: String,

    /// CSS selector for the submit control on the rendered page
    #[serde(default = "defaults::captcha_submit_selector")]
    pub captcha_submit_selector: String,

    /// Expected code length
    #[serde(default = "defaults::expected_length")]
    pub expected_length: usize,

    /// Allowed code alphabet
    #[serde(default = "defaults::alphabet")]
    pub alphabet: Alphabet,

    /// Retrieval attempts before surfacing `CaptchaRejected`
    #[serde(default = "defaults::max_attempts")]
    pub max_attempts: u32,

    /// Backoff between retrieval attempts
    #[serde(default = "defaults::attempt_backoff")]
    pub attempt_backoff_ms: u64,

    /// Session time-to-live in seconds
    #[serde(default = "defaults::session_ttl")]
    pub session_ttl_secs: u64,

    /// Upper bound on page navigation for the browser strategy
    #[serde(default = "defaults::navigation_timeout")]
    pub navigation_timeout_secs: u64,

    /// OCR engine command
    #[serde(default = "defaults::tesseract_cmd")]
    pub tesseract_cmd: String,

    /// Page-segmentation modes to try per image variant
    #[serde(default = "defaults::psm_modes")]
    pub psm_modes: Vec<u8>,

    /// Binarization thresholds for preprocessing variants
    #[serde(default = "defaults::binarize_thresholds")]
    pub binarize_thresholds: Vec<u8>,

    /// Whether to add 2x nearest-neighbor upscaled variants
    #[serde(default = "defaults::upscale")]
    pub upscale: bool,
}

impl CaptchaConfig {
    fn validate(&self) -> Result<()> {
        if self.challenge_url.trim().is_empty() {
            return Err(AppError::validation("captcha.challenge_url is empty"));
        }
        if self.submit_url.trim().is_empty() {
            return Err(AppError::validation("captcha.submit_url is empty"));
        }
        if self.expected_length == 0 {
            return Err(AppError::validation("captcha.expected_length must be > 0"));
        }
        if self.max_attempts == 0 {
            return Err(AppError::validation("captcha.max_attempts must be > 0"));
        }
        if self.session_ttl_secs == 0 {
            return Err(AppError::validation("captcha.session_ttl_secs must be > 0"));
        }
        if self.navigation_timeout_secs == 0 {
            return Err(AppError::validation(
                "captcha.navigation_timeout_secs must be > 0",
            ));
        }
        if self.psm_modes.is_empty() {
            return Err(AppError::validation("captcha.psm_modes is empty"));
        }
        if self.binarize_thresholds.is_empty() {
            return Err(AppError::validation("captcha.binarize_thresholds is empty"));
        }
        Ok(())
    }
}

impl Default for CaptchaConfig {
    fn default() -> Self {
        Self {
            challenge_url: defaults::challenge_url(),
            submit_url: defaults::submit_url(),
            document_page_url: defaults::document_page_url(),
            webdriver_url: defaults::webdriver_url(),
            captcha_image_selector: defaults::captcha_image_selector(),
            captcha_input_selector: defaults::captcha_input_selector(),
            captcha_submit_selector: defaults::captcha_submit_selector(),
            expected_length: defaults::expected_length(),
            alphabet: defaults::alphabet(),
            max_attempts: defaults::max_attempts(),
            attempt_backoff_ms: defaults::attempt_backoff(),
            session_ttl_secs: defaults::session_ttl(),
            navigation_timeout_secs: defaults::navigation_timeout(),
            tesseract_cmd: defaults::tesseract_cmd(),
            psm_modes: defaults::psm_modes(),
            binarize_thresholds: defaults::binarize_thresholds(),
            upscale: defaults::upscale(),
        }
    }
}

/// Snapshot store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory for the JSON-file store
    #[serde(default = "defaults::storage_root")]
    pub root_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root_dir: defaults::storage_root(),
        }
    }
}

/// Default values for configuration fields.
mod defaults {
    use super::Alphabet;

    pub fn schedule_url() -> String {
        "https://courts.example.org/courtview/display.php".to_string()
    }

    pub fn user_agent() -> String {
        format!("causewatch/{}", env!("CARGO_PKG_VERSION"))
    }

    pub fn timeout() -> u64 {
        20
    }

    pub fn fetch_retries() -> u32 {
        3
    }

    pub fn retry_backoff() -> u64 {
        1000
    }

    pub fn poll_interval() -> u64 {
        60
    }

    pub fn dedup_bucket() -> u64 {
        60
    }

    pub fn not_in_session_marker() -> String {
        "NOT IN SESSION".to_string()
    }

    pub fn case_number_pattern() -> String {
        r"Case\s+Details\s*[-–]\s*([A-Za-z0-9/]+)".to_string()
    }

    pub fn title_label_pattern() -> String {
        r"Title\s*:".to_string()
    }

    pub fn petitioner_label_pattern() -> String {
        r"Petitioner'?s?\s+Counsel(?:\(s\))?\s*:?".to_string()
    }

    pub fn respondent_label_pattern() -> String {
        r"Respondent'?s?\s+Counsel(?:\(s\))?\s*:?".to_string()
    }

    pub fn challenge_url() -> String {
        "https://courts.example.org/orders/securimage_show.php".to_string()
    }

    pub fn submit_url() -> String {
        "https://courts.example.org/orders/download.php".to_string()
    }

    pub fn document_page_url() -> String {
        "https://courts.example.org/orders/view.php?id={id}".to_string()
    }

    pub fn webdriver_url() -> String {
        "http://localhost:4444".to_string()
    }

    pub fn captcha_image_selector() -> String {
        "img#captcha_image".to_string()
    }

    pub fn captcha_input_selector() -> String {
        "input[name=captcha_code]".to_string()
    }

    pub fn captcha_submit_selector() -> String {
        "input[type=submit]".to_string()
    }

    pub fn expected_length() -> usize {
        6
    }

    pub fn alphabet() -> Alphabet {
        Alphabet::Digits
    }

    pub fn max_attempts() -> u32 {
        4
    }

    pub fn attempt_backoff() -> u64 {
        500
    }

    pub fn session_ttl() -> u64 {
        300
    }

    pub fn navigation_timeout() -> u64 {
        30
    }

    pub fn tesseract_cmd() -> String {
        "tesseract".to_string()
    }

    pub fn psm_modes() -> Vec<u8> {
        vec![7, 8, 13]
    }

    pub fn binarize_thresholds() -> Vec<u8> {
        vec![100, 140, 180]
    }

    pub fn upscale() -> bool {
        true
    }

    pub fn storage_root() -> String {
        "storage".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_marker() {
        let mut config = Config::default();
        config.labels.not_in_session_marker = "  ".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_pattern() {
        let mut config = Config::default();
        config.labels.case_number_pattern = "(unclosed".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_attempts() {
        let mut config = Config::default();
        config.captcha.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let toml_src = r#"
            [poller]
            interval_secs = 30
        "#;
        let config: Config = toml::from_str(toml_src).unwrap();
        assert_eq!(config.poller.interval_secs, 30);
        assert_eq!(config.poller.dedup_bucket_secs, 60);
        assert_eq!(config.captcha.expected_length, 6);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_alphabet_contains() {
        assert!(Alphabet::Digits.contains('7'));
        assert!(!Alphabet::Digits.contains('a'));
        assert!(Alphabet::Alphanumeric.contains('a'));
        assert!(!Alphabet::Alphanumeric.contains('-'));
    }
}
