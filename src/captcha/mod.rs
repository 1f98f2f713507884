//! Captcha-automated document retrieval.
//!
//! Session/cookie management, OCR candidate generation and scoring, and the
//! retry-until-accepted download loop. Retrieval runs on demand, not on a
//! timer, and may overlap with the polling worker; every invocation owns its
//! session and cookie jar, so no locking is shared with the pipeline.

#[cfg(feature = "browser")]
pub mod browser;
pub mod ocr;
pub mod retrieve;
pub mod session;
pub mod solver;

#[cfg(feature = "browser")]
pub use browser::BrowserStrategy;
pub use ocr::{OcrEngine, TesseractCli};
pub use retrieve::{
    CookieStrategy, Document, DocumentRetriever, RetrievalStrategy, validate_document_id,
};
pub use session::{CaptchaSession, ChallengeBroker};
pub use solver::{Candidate, CaptchaSolver};
