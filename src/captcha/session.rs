// src/captcha/session.rs

//! Captcha session and the manual-fallback challenge broker.
//!
//! A session is ephemeral state for exactly one retrieval attempt: an opaque
//! id, the target document id, and an owned cookie jar. Sessions are never
//! shared across attempts; a rejection discards the jar entirely because the
//! upstream invalidates it along with the challenge.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use reqwest::cookie::Jar;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use crate::error::{AppError, Result};
use crate::models::SourceConfig;
use crate::utils::http;

use super::retrieve::{Document, RetrievalStrategy, looks_like_document};

/// Monotonic discriminator mixed into session ids.
static SESSION_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Ephemeral state for one document-retrieval attempt.
pub struct CaptchaSession {
    id: String,
    document_id: String,
    client: reqwest::Client,
    created_at: Instant,
    ttl: Duration,
}

impl CaptchaSession {
    /// Open a fresh session with its own cookie jar.
    pub fn open(document_id: &str, source: &SourceConfig, ttl: Duration) -> Result<Self> {
        let jar = Arc::new(Jar::default());
        let client = http::create_session_client(source, Arc::clone(&jar))?;
        Ok(Self {
            id: Self::derive_id(document_id),
            document_id: document_id.to_string(),
            client,
            created_at: Instant::now(),
            ttl,
        })
    }

    /// Opaque session id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Target document id.
    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    /// HTTP client carrying this session's cookie jar.
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Whether the session has outlived its TTL.
    pub fn is_expired(&self) -> bool {
        self.created_at.elapsed() >= self.ttl
    }

    fn derive_id(document_id: &str) -> String {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let counter = SESSION_COUNTER.fetch_add(1, Ordering::Relaxed);

        let mut hasher = Sha256::new();
        hasher.update(document_id.as_bytes());
        hasher.update(nanos.to_be_bytes());
        hasher.update(counter.to_be_bytes());
        hex::encode(&hasher.finalize()[..12])
    }
}

/// Manual-fallback surface: open a challenge, show the image to a human,
/// submit their code.
///
/// Sessions are held until submitted or expired; a submit consumes the
/// session either way (no reuse after rejection).
pub struct ChallengeBroker {
    strategy: Arc<dyn RetrievalStrategy>,
    sessions: Mutex<HashMap<String, CaptchaSession>>,
    ttl: Duration,
}

impl ChallengeBroker {
    pub fn new(strategy: Arc<dyn RetrievalStrategy>, ttl: Duration) -> Self {
        Self {
            strategy,
            sessions: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Open a session for a document and fetch its challenge image.
    ///
    /// Returns the opaque session id and the image bytes.
    pub async fn open(&self, document_id: &str) -> Result<(String, Vec<u8>)> {
        let session = self.strategy.open_session(document_id, self.ttl).await?;
        let image = self.strategy.fetch_challenge(&session).await?;
        let id = session.id().to_string();

        // Sweep expired sessions out, then hand them back to the strategy
        // so it can release whatever it holds for them.
        let expired = {
            let mut sessions = self.sessions.lock().await;
            let stale: Vec<String> = sessions
                .iter()
                .filter(|(_, s)| s.is_expired())
                .map(|(id, _)| id.clone())
                .collect();
            let expired: Vec<CaptchaSession> = stale
                .into_iter()
                .filter_map(|id| sessions.remove(&id))
                .collect();
            sessions.insert(id.clone(), session);
            expired
        };
        for session in &expired {
            self.strategy.discard(session).await;
        }
        Ok((id, image))
    }

    /// Submit a caller-supplied code for an open session.
    ///
    /// The session is consumed regardless of outcome.
    pub async fn submit(&self, session_id: &str, code: &str) -> Result<Document> {
        let session = {
            let mut sessions = self.sessions.lock().await;
            sessions.remove(session_id)
        };
        let Some(session) = session else {
            return Err(AppError::SessionExpired {
                session_id: session_id.to_string(),
            });
        };
        if session.is_expired() {
            self.strategy.discard(&session).await;
            return Err(AppError::SessionExpired {
                session_id: session_id.to_string(),
            });
        }

        let document = self.strategy.submit(&session, code).await?;
        if looks_like_document(&document) {
            Ok(document)
        } else {
            Err(AppError::CaptchaRejected {
                document_id: session.document_id().to_string(),
                attempts: 1,
            })
        }
    }
}
