// src/captcha/browser.rs

//! Browser-automated retrieval strategy.
//!
//! Some upstream endpoints only validate the captcha inside a rendered page
//! context, so a WebDriver session loads the document page, screenshots the
//! captcha element, submits the code in-page, and the binary is then fetched
//! with the browser's cookies. Navigation carries an explicit upper bound so
//! a hung page cannot block its owning retrieval indefinitely.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use fantoccini::{ClientBuilder, Locator};
use reqwest::cookie::Jar;
use tokio::sync::Mutex;

use crate::error::{AppError, Result};
use crate::models::{CaptchaConfig, SourceConfig};
use crate::utils::http;

use super::retrieve::{Document, RetrievalStrategy};
use super::session::CaptchaSession;

/// Pause after the in-page submit for the upstream to validate the code.
const SUBMIT_SETTLE_MS: u64 = 1000;

/// A rendered page awaiting its code submission.
struct PageHandle {
    browser: fantoccini::Client,
    opened_at: Instant,
}

/// Retrieval strategy driving a WebDriver-controlled browser.
pub struct BrowserStrategy {
    source: SourceConfig,
    captcha: CaptchaConfig,
    // One rendered page per open session, keyed by session id. Every entry
    // is closed exactly once: on submit, on discard, or when it outlives the
    // session TTL during the sweep in fetch_challenge.
    pages: Mutex<HashMap<String, PageHandle>>,
}

impl BrowserStrategy {
    pub fn new(source: SourceConfig, captcha: CaptchaConfig) -> Self {
        Self {
            source,
            captcha,
            pages: Mutex::new(HashMap::new()),
        }
    }

    fn page_url(&self, document_id: &str) -> String {
        self.captcha.document_page_url.replace("{id}", document_id)
    }

    /// In-page phase of the submit: type the code, click, settle, export
    /// the cookies. Does not close the browser; the caller owns teardown.
    async fn enter_code(
        &self,
        browser: &fantoccini::Client,
        code: &str,
    ) -> Result<Vec<fantoccini::cookies::Cookie<'static>>> {
        let input = self
            .with_timeout(
                "locate code input",
                browser.find(Locator::Css(&self.captcha.captcha_input_selector)),
            )
            .await?;
        self.with_timeout("enter code", input.send_keys(code)).await?;

        let submit = self
            .with_timeout(
                "locate submit control",
                browser.find(Locator::Css(&self.captcha.captcha_submit_selector)),
            )
            .await?;
        self.with_timeout("click submit", submit.click()).await?;
        tokio::time::sleep(Duration::from_millis(SUBMIT_SETTLE_MS)).await;

        // Export the page's cookies for the out-of-band binary fetch; the
        // WebDriver protocol cannot hand back a download body.
        self.with_timeout("export cookies", browser.get_all_cookies())
            .await
    }

    async fn with_timeout<T>(
        &self,
        context: &str,
        fut: impl Future<Output = std::result::Result<T, fantoccini::error::CmdError>>,
    ) -> Result<T> {
        let bound = Duration::from_secs(self.captcha.navigation_timeout_secs);
        match tokio::time::timeout(bound, fut).await {
            Ok(result) => result.map_err(|e| AppError::browser(format!("{context}: {e}"))),
            Err(_) => Err(AppError::browser(format!(
                "{context} timed out after {}s",
                bound.as_secs()
            ))),
        }
    }
}

#[async_trait]
impl RetrievalStrategy for BrowserStrategy {
    async fn open_session(&self, document_id: &str, ttl: Duration) -> Result<CaptchaSession> {
        CaptchaSession::open(document_id, &self.source, ttl)
    }

    async fn fetch_challenge(&self, session: &CaptchaSession) -> Result<Vec<u8>> {
        let browser = ClientBuilder::native()
            .connect(&self.captcha.webdriver_url)
            .await
            .map_err(|e| AppError::browser(format!("webdriver connect: {e}")))?;

        let url = self.page_url(session.document_id());
        self.with_timeout("page navigation", browser.goto(&url)).await?;

        let element = self
            .with_timeout(
                "locate captcha image",
                browser.find(Locator::Css(&self.captcha.captcha_image_selector)),
            )
            .await?;
        let image = self
            .with_timeout("captcha screenshot", element.screenshot())
            .await?;

        let mut pages = self.pages.lock().await;
        let ttl = Duration::from_secs(self.captcha.session_ttl_secs);
        let stale: Vec<String> = pages
            .iter()
            .filter(|(_, page)| page.opened_at.elapsed() >= ttl)
            .map(|(id, _)| id.clone())
            .collect();
        for id in stale {
            if let Some(page) = pages.remove(&id) {
                let _ = page.browser.close().await;
            }
        }
        pages.insert(
            session.id().to_string(),
            PageHandle {
                browser,
                opened_at: Instant::now(),
            },
        );
        Ok(image)
    }

    async fn submit(&self, session: &CaptchaSession, code: &str) -> Result<Document> {
        let page = self
            .pages
            .lock()
            .await
            .remove(session.id())
            .ok_or_else(|| AppError::SessionExpired {
                session_id: session.id().to_string(),
            })?;

        // The browser is closed on every path out of the in-page phase.
        let cookies = match self.enter_code(&page.browser, code).await {
            Ok(cookies) => {
                let _ = page.browser.close().await;
                cookies
            }
            Err(error) => {
                let _ = page.browser.close().await;
                return Err(error);
            }
        };

        let submit_url: reqwest::Url = self
            .captcha
            .submit_url
            .parse()
            .map_err(|e| AppError::config(format!("captcha.submit_url: {e}")))?;
        let jar = Arc::new(Jar::default());
        for cookie in &cookies {
            jar.add_cookie_str(&format!("{}={}", cookie.name(), cookie.value()), &submit_url);
        }

        let client = http::create_session_client(&self.source, jar)?;
        let response = client
            .get(submit_url)
            .query(&[("document_id", session.document_id())])
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

    async fn discard(&self, session: &CaptchaSession) {
        if let Some(page) = self.pages.lock().await.remove(session.id()) {
            let _ = page.browser.close().await;
        }
    }
}
