// src/captcha/ocr.rs

//! OCR engine seam.
//!
//! The solver only needs "image bytes in, raw text out" under a character
//! whitelist and a page-segmentation mode; the engine behind that contract
//! is swappable. The default engine drives the `tesseract` CLI over
//! stdin/stdout.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::error::{AppError, Result};

/// Trait for OCR engines.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Recognize text in a PNG image, constrained to `whitelist`, using the
    /// given page-segmentation mode.
    async fn recognize(&self, image_png: &[u8], whitelist: &str, psm: u8) -> Result<String>;
}

/// Engine shelling out to the `tesseract` command-line binary.
pub struct TesseractCli {
    command: String,
}

impl TesseractCli {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

#[async_trait]
impl OcrEngine for TesseractCli {
    async fn recognize(&self, image_png: &[u8], whitelist: &str, psm: u8) -> Result<String> {
        let mut child = Command::new(&self.command)
            .arg("stdin")
            .arg("stdout")
            .arg("--psm")
            .arg(psm.to_string())
            .arg("-c")
            .arg(format!("tessedit_char_whitelist={whitelist}"))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| AppError::ocr(format!("failed to spawn {}: {e}", self.command)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| AppError::ocr("tesseract stdin unavailable"))?;
        stdin.write_all(image_png).await?;
        drop(stdin);

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            return Err(AppError::ocr(format!(
                "{} exited with {}",
                self.command, output.status
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}
