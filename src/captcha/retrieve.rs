// src/captcha/retrieve.rs

//! Captcha-automated document retrieval.
//!
//! Per-attempt state machine: open session → fetch challenge → solve →
//! submit → accepted or rejected. A rejection discards the session and its
//! cookie jar entirely; the next attempt starts from a fresh session with a
//! fresh challenge. Only the budget-exhausted failure surfaces to the
//! caller.

use std::sync::Arc;
use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;

use crate::error::{AppError, Result};
use crate::models::{CaptchaConfig, SourceConfig};
use crate::utils::http;

use super::session::CaptchaSession;
use super::solver::CaptchaSolver;

/// Retrieved document payload.
#[derive(Debug, Clone)]
pub struct Document {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// Transport seam for one retrieval strategy.
///
/// Implementations do not judge acceptance; they return whatever the
/// upstream produced and the retriever applies the signature check.
#[async_trait]
pub trait RetrievalStrategy: Send + Sync {
    /// Open a fresh session (own cookie jar) for a document.
    async fn open_session(&self, document_id: &str, ttl: Duration) -> Result<CaptchaSession>;

    /// Fetch the current challenge image for the session.
    async fn fetch_challenge(&self, session: &CaptchaSession) -> Result<Vec<u8>>;

    /// Submit a candidate code and return the upstream response body.
    async fn submit(&self, session: &CaptchaSession, code: &str) -> Result<Document>;

    /// Release any strategy-side state held for a session that will never
    /// reach `submit`. The default holds no such state.
    async fn discard(&self, _session: &CaptchaSession) {}
}

/// Acceptance check: binary content type and the PDF magic bytes.
///
/// An HTML body or a missing signature is a rejection even on HTTP 200.
pub fn looks_like_document(document: &Document) -> bool {
    !document.content_type.to_ascii_lowercase().contains("text/html")
        && document.bytes.starts_with(b"%PDF")
}

/// Reject malformed document ids before any network call.
pub fn validate_document_id(document_id: &str) -> Result<()> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9][A-Za-z0-9/_-]{0,63}$").expect("document id pattern is valid")
    });
    if pattern.is_match(document_id) {
        Ok(())
    } else {
        Err(AppError::invalid_input(format!(
            "malformed document id: {document_id:?}"
        )))
    }
}

/// Cookie-backed HTTP retrieval strategy.
///
/// The upstream validates the code against a purely cookie-backed session,
/// so a stateless fetch with the session's jar suffices.
pub struct CookieStrategy {
    source: SourceConfig,
    captcha: CaptchaConfig,
}

impl CookieStrategy {
    pub fn new(source: SourceConfig, captcha: CaptchaConfig) -> Self {
        Self { source, captcha }
    }
}

#[async_trait]
impl RetrievalStrategy for CookieStrategy {
    async fn open_session(&self, document_id: &str, ttl: Duration) -> Result<CaptchaSession> {
        CaptchaSession::open(document_id, &self.source, ttl)
    }

    async fn fetch_challenge(&self, session: &CaptchaSession) -> Result<Vec<u8>> {
        let response = session
            .client()
            .get(&self.captcha.challenge_url)
            .send()
            .await?;
        let response = http::check_status(&self.captcha.challenge_url, response)?;
        Ok(response.bytes().await?.to_vec())
    }

    async fn submit(&self, session: &CaptchaSession, code: &str) -> Result<Document> {
        let response = session
            .client()
            .post(&self.captcha.submit_url)
            .form(&[
                ("document_id", session.document_id()),
                ("captcha_code", code),
            ])
            .send()
            .await?;
        let response = http::check_status(&self.captcha.submit_url, response)?;

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = response.bytes().await?.to_vec();
        Ok(Document {
            bytes,
            content_type,
        })
    }
}

/// Orchestrator for the retry-until-accepted download loop.
pub struct DocumentRetriever {
    strategy: Arc<dyn RetrievalStrategy>,
    solver: CaptchaSolver,
    config: CaptchaConfig,
}

impl DocumentRetriever {
    pub fn new(
        strategy: Arc<dyn RetrievalStrategy>,
        solver: CaptchaSolver,
        config: CaptchaConfig,
    ) -> Self {
        Self {
            strategy,
            solver,
            config,
        }
    }

    /// Retrieve a document, solving the captcha automatically.
    ///
    /// Retries with a fresh session per attempt; intermediate rejections are
    /// swallowed. Rate-limit signals surface immediately so callers can back
    /// off longer.
    pub async fn retrieve(&self, document_id: &str) -> Result<Document> {
        validate_document_id(document_id)?;

        let attempts = self.config.max_attempts.max(1);
        let backoff = Duration::from_millis(self.config.attempt_backoff_ms);

        let mut last_error: Option<AppError> = None;
        for attempt in 1..=attempts {
            match self.attempt(document_id).await {
                Ok(document) => {
                    log::info!(
                        "document {document_id} retrieved on attempt {attempt}/{attempts}"
                    );
                    return Ok(document);
                }
                Err(error @ AppError::RateLimited { .. }) => return Err(error),
                Err(error) => {
                    log::debug!(
                        "retrieval attempt {attempt}/{attempts} for {document_id} failed: {error}"
                    );
                    last_error = Some(error);
                    if attempt < attempts {
                        tokio::time::sleep(backoff).await;
                    }
                }
            }
        }

        // Exhaustion by infrastructure failure (OCR down, challenge endpoint
        // unreachable) is not a rejection; report what actually went wrong.
        match last_error {
            Some(error) if !error.is_captcha_rejection() => Err(error),
            _ => Err(AppError::CaptchaRejected {
                document_id: document_id.to_string(),
                attempts,
            }),
        }
    }

    /// Retrieve with a caller-supplied code (manual fallback); one attempt,
    /// no OCR.
    pub async fn retrieve_with_code(&self, document_id: &str, code: &str) -> Result<Document> {
        validate_document_id(document_id)?;

        let session = self.open_session(document_id).await?;
        // Challenge must be fetched so the upstream binds one to the session
        // cookie before it will validate a code.
        self.strategy.fetch_challenge(&session).await?;
        let document = self.strategy.submit(&session, code).await?;
        if looks_like_document(&document) {
            Ok(document)
        } else {
            Err(AppError::CaptchaRejected {
                document_id: document_id.to_string(),
                attempts: 1,
            })
        }
    }

    /// One pass of the per-attempt state machine.
    async fn attempt(&self, document_id: &str) -> Result<Document> {
        let session = self.open_session(document_id).await?;
        let challenge = self.strategy.fetch_challenge(&session).await?;

        let candidates = self.solver.solve(&challenge).await;
        // Prefer a candidate at the expected length; a padded low-confidence
        // guess qualifies only when nothing full-length was read directly.
        let candidate = match candidates
            .iter()
            .find(|c| c.text.len() == self.config.expected_length)
            .or_else(|| candidates.first())
        {
            Some(candidate) => candidate,
            None => {
                // Nothing to submit; the session will never reach the
                // strategy again, so release its state now.
                self.strategy.discard(&session).await;
                return Err(AppError::ocr("no plausible captcha candidate"));
            }
        };

        let document = self.strategy.submit(&session, &candidate.text).await?;
        if looks_like_document(&document) {
            Ok(document)
        } else {
            Err(AppError::CaptchaRejected {
                document_id: document_id.to_string(),
                attempts: 1,
            })
        }
    }

    async fn open_session(&self, document_id: &str) -> Result<CaptchaSession> {
        let ttl = Duration::from_secs(self.config.session_ttl_secs);
        self.strategy.open_session(document_id, ttl).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::captcha::ocr::OcrEngine;
    use crate::captcha::session::ChallengeBroker;
    use image::{DynamicImage, GrayImage};
    use std::io::Cursor;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FixedOcr(String);

    #[async_trait]
    impl OcrEngine for FixedOcr {
        async fn recognize(&self, _png: &[u8], _whitelist: &str, _psm: u8) -> Result<String> {
            Ok(self.0.clone())
        }
    }

    fn challenge_png() -> Vec<u8> {
        let mut bytes = Vec::new();
        DynamicImage::ImageLuma8(GrayImage::new(16, 8))
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        bytes
    }

    /// Stub upstream: rejects the first `accept_after` submissions with an
    /// HTML body, then serves the PDF.
    struct StubStrategy {
        accept_after: u32,
        submissions: AtomicU32,
        discards: AtomicU32,
        session_ids: Mutex<Vec<String>>,
    }

    impl StubStrategy {
        fn accepting_on(attempt: u32) -> Arc<Self> {
            Arc::new(Self {
                accept_after: attempt - 1,
                submissions: AtomicU32::new(0),
                discards: AtomicU32::new(0),
                session_ids: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl RetrievalStrategy for StubStrategy {
        async fn open_session(&self, document_id: &str, ttl: Duration) -> Result<CaptchaSession> {
            let session = CaptchaSession::open(document_id, &SourceConfig::default(), ttl)?;
            self.session_ids.lock().unwrap().push(session.id().to_string());
            Ok(session)
        }

        async fn fetch_challenge(&self, _session: &CaptchaSession) -> Result<Vec<u8>> {
            Ok(challenge_png())
        }

        async fn submit(&self, _session: &CaptchaSession, _code: &str) -> Result<Document> {
            let n = self.submissions.fetch_add(1, Ordering::SeqCst);
            if n < self.accept_after {
                Ok(Document {
                    bytes: b"<html>wrong code</html>".to_vec(),
                    content_type: "text/html; charset=utf-8".to_string(),
                })
            } else {
                Ok(Document {
                    bytes: b"%PDF-1.4 stub order".to_vec(),
                    content_type: "application/pdf".to_string(),
                })
            }
        }

        async fn discard(&self, _session: &CaptchaSession) {
            self.discards.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Stub upstream whose challenge endpoint is unreachable.
    struct DownStrategy;

    #[async_trait]
    impl RetrievalStrategy for DownStrategy {
        async fn open_session(&self, document_id: &str, ttl: Duration) -> Result<CaptchaSession> {
            CaptchaSession::open(document_id, &SourceConfig::default(), ttl)
        }

        async fn fetch_challenge(&self, _session: &CaptchaSession) -> Result<Vec<u8>> {
            Err(AppError::fetch("challenge", "connection refused"))
        }

        async fn submit(&self, _session: &CaptchaSession, _code: &str) -> Result<Document> {
            Err(AppError::fetch("submit", "connection refused"))
        }
    }

    fn retriever(strategy: Arc<StubStrategy>) -> DocumentRetriever {
        let config = CaptchaConfig::default();
        let solver = CaptchaSolver::new(Arc::new(FixedOcr("482915".into())), config.clone());
        DocumentRetriever::new(strategy, solver, config)
    }

    #[tokio::test]
    async fn test_retries_until_accepted_with_fresh_sessions() {
        // Upstream rejects twice, accepts the third submission; exactly
        // three distinct sessions must have been opened.
        let strategy = StubStrategy::accepting_on(3);
        let retriever = retriever(Arc::clone(&strategy));

        let document = retriever.retrieve("ORDER/42/2024").await.unwrap();
        assert!(document.bytes.starts_with(b"%PDF"));
        assert_eq!(document.content_type, "application/pdf");

        let ids = strategy.session_ids.lock().unwrap();
        assert_eq!(ids.len(), 3);
        let mut unique = ids.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), 3, "cookie jars must not be reused");
    }

    #[tokio::test]
    async fn test_budget_exhaustion_surfaces_rejection() {
        let strategy = StubStrategy::accepting_on(100);
        let retriever = retriever(strategy);

        let error = retriever.retrieve("ORDER/42/2024").await.unwrap_err();
        match error {
            AppError::CaptchaRejected { attempts, .. } => assert_eq!(attempts, 4),
            other => panic!("expected CaptchaRejected, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_unreadable_challenge_discards_sessions_and_reports_ocr() {
        // The engine reads nothing from any variant, so no attempt ever
        // submits; every opened session must be handed back to the strategy
        // and the surfaced error is the OCR failure, not a rejection.
        let strategy = StubStrategy::accepting_on(1);
        let config = CaptchaConfig::default();
        let solver = CaptchaSolver::new(Arc::new(FixedOcr(String::new())), config.clone());
        let retriever = DocumentRetriever::new(strategy.clone(), solver, config);

        let error = retriever.retrieve("ORDER/42/2024").await.unwrap_err();
        assert!(matches!(error, AppError::Ocr(_)));
        assert_eq!(strategy.submissions.load(Ordering::SeqCst), 0);
        assert_eq!(strategy.discards.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_challenge_outage_surfaces_fetch_error() {
        let config = CaptchaConfig::default();
        let solver = CaptchaSolver::new(Arc::new(FixedOcr("482915".into())), config.clone());
        let retriever = DocumentRetriever::new(Arc::new(DownStrategy), solver, config);

        let error = retriever.retrieve("ORDER/42/2024").await.unwrap_err();
        assert!(matches!(error, AppError::Fetch { .. }));
    }

    #[tokio::test]
    async fn test_invalid_document_id_rejected_before_network() {
        let strategy = StubStrategy::accepting_on(1);
        let retriever = retriever(Arc::clone(&strategy));

        let error = retriever.retrieve("../../etc/passwd").await.unwrap_err();
        assert!(matches!(error, AppError::InvalidInput(_)));
        assert!(strategy.session_ids.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_manual_code_path() {
        let strategy = StubStrategy::accepting_on(1);
        let retriever = retriever(strategy);

        let document = retriever
            .retrieve_with_code("ORDER/42/2024", "482915")
            .await
            .unwrap();
        assert!(document.bytes.starts_with(b"%PDF"));
    }

    #[tokio::test]
    async fn test_challenge_broker_roundtrip() {
        let strategy = StubStrategy::accepting_on(1);
        let broker = ChallengeBroker::new(strategy, Duration::from_secs(300));

        let (session_id, image) = broker.open("ORDER/42/2024").await.unwrap();
        assert!(!image.is_empty());

        let document = broker.submit(&session_id, "482915").await.unwrap();
        assert!(document.bytes.starts_with(b"%PDF"));

        // The session was consumed by the submit.
        let error = broker.submit(&session_id, "482915").await.unwrap_err();
        assert!(matches!(error, AppError::SessionExpired { .. }));
    }

    #[tokio::test]
    async fn test_challenge_broker_expired_session() {
        let strategy = StubStrategy::accepting_on(1);
        let broker = ChallengeBroker::new(strategy.clone(), Duration::ZERO);

        let (session_id, _) = broker.open("ORDER/42/2024").await.unwrap();
        let error = broker.submit(&session_id, "482915").await.unwrap_err();
        assert!(matches!(error, AppError::SessionExpired { .. }));

        // The strategy was told to release the expired session's state.
        assert_eq!(strategy.discards.load(Ordering::SeqCst), 1);
        assert_eq!(strategy.submissions.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_challenge_broker_sweeps_expired_on_open() {
        let strategy = StubStrategy::accepting_on(1);
        let broker = ChallengeBroker::new(strategy.clone(), Duration::ZERO);

        broker.open("ORDER/1/2024").await.unwrap();
        broker.open("ORDER/2/2024").await.unwrap();

        // The first session aged out and was handed back on the next open.
        assert_eq!(strategy.discards.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_looks_like_document() {
        let pdf = Document {
            bytes: b"%PDF-1.7".to_vec(),
            content_type: "application/pdf".to_string(),
        };
        assert!(looks_like_document(&pdf));

        let html = Document {
            bytes: b"%PDF-1.7".to_vec(),
            content_type: "text/html".to_string(),
        };
        assert!(!looks_like_document(&html));

        let unsigned = Document {
            bytes: b"PK\x03\x04".to_vec(),
            content_type: "application/pdf".to_string(),
        };
        assert!(!looks_like_document(&unsigned));
    }

    #[test]
    fn test_validate_document_id() {
        assert!(validate_document_id("WRIT/123/2024").is_ok());
        assert!(validate_document_id("order_42-a").is_ok());
        assert!(validate_document_id("").is_err());
        assert!(validate_document_id("/leading").is_err());
        assert!(validate_document_id("has space").is_err());
        assert!(validate_document_id(&"x".repeat(100)).is_err());
    }
}
