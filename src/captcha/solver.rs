// src/captcha/solver.rs

//! Captcha solving: preprocessing variants, OCR fan-out, candidate scoring.
//!
//! The same challenge image is rendered into several deterministic
//! preprocessing variants (grayscale, contrast stretch, binarization at a
//! few thresholds, optional nearest-neighbor upscale), each run through the
//! OCR engine under the configured page-segmentation modes. Raw reads are
//! reduced to the allowed alphabet, tallied, and ranked by agreement across
//! variants and closeness to the expected code length.

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;

use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, ImageFormat, Luma};

use crate::models::CaptchaConfig;

use super::ocr::OcrEngine;

/// One OCR-derived guess at the captcha text, ranked but unverified until
/// submission succeeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Guessed code, reduced to the allowed alphabet
    pub text: String,
    /// How many variant/config runs produced this exact read
    pub agreement: usize,
    /// True for heuristic guesses (zero-padded under-length reads)
    pub low_confidence: bool,
}

/// Solver producing ranked candidates for a challenge image.
pub struct CaptchaSolver {
    ocr: Arc<dyn OcrEngine>,
    config: CaptchaConfig,
}

impl CaptchaSolver {
    pub fn new(ocr: Arc<dyn OcrEngine>, config: CaptchaConfig) -> Self {
        Self { ocr, config }
    }

    /// Solve a challenge image.
    ///
    /// Never fails: an undecodable image or an all-rejecting engine yields
    /// an empty list.
    pub async fn solve(&self, image_bytes: &[u8]) -> Vec<Candidate> {
        let Ok(decoded) = image::load_from_memory(image_bytes) else {
            log::debug!("captcha image could not be decoded");
            return Vec::new();
        };

        let whitelist = self.config.alphabet.whitelist();
        let mut tally: HashMap<String, usize> = HashMap::new();

        for (label, png) in self.variants(&decoded) {
            for &psm in &self.config.psm_modes {
                match self.ocr.recognize(&png, whitelist, psm).await {
                    Ok(raw) => {
                        let cleaned = self.sanitize(&raw);
                        if !cleaned.is_empty() {
                            *tally.entry(cleaned).or_insert(0) += 1;
                        }
                    }
                    Err(error) => {
                        log::debug!("ocr failed on variant {label} (psm {psm}): {error}");
                    }
                }
            }
        }

        self.rank(tally)
    }

    /// Deterministic preprocessing variants of the challenge image.
    fn variants(&self, image: &DynamicImage) -> Vec<(String, Vec<u8>)> {
        let gray = image.to_luma8();
        let stretched = contrast_stretch(&gray);

        let mut images: Vec<(String, GrayImage)> = vec![
            ("gray".to_string(), gray.clone()),
            ("contrast".to_string(), stretched.clone()),
        ];
        for &threshold in &self.config.binarize_thresholds {
            images.push((format!("thr{threshold}"), binarize(&stretched, threshold)));
        }

        if self.config.upscale {
            let upscaled: Vec<(String, GrayImage)> = images
                .iter()
                .map(|(label, img)| (format!("{label}-2x"), upscale_2x(img)))
                .collect();
            images.extend(upscaled);
        }

        images
            .into_iter()
            .filter_map(|(label, img)| encode_png(img).map(|png| (label, png)))
            .collect()
    }

    /// Reduce a raw OCR read to the allowed alphabet.
    fn sanitize(&self, raw: &str) -> String {
        raw.chars()
            .filter(|c| self.config.alphabet.contains(*c))
            .collect()
    }

    /// Rank tallied reads; append the zero-padded heuristic guess last.
    fn rank(&self, tally: HashMap<String, usize>) -> Vec<Candidate> {
        let expected = self.config.expected_length;

        let mut candidates: Vec<Candidate> = tally
            .into_iter()
            .map(|(text, agreement)| Candidate {
                text,
                agreement,
                low_confidence: false,
            })
            .collect();

        candidates.sort_by(|a, b| {
            b.agreement
                .cmp(&a.agreement)
                .then_with(|| length_distance(&a.text, expected).cmp(&length_distance(&b.text, expected)))
                .then_with(|| a.text.cmp(&b.text))
        });

        // Last-resort heuristic: when the unique best read is shorter than
        // the fixed expected length, offer a zero-padded guess as one more
        // candidate to try. It is a guess, not a verified read, and is
        // flagged as such.
        if expected > 0 {
            let unique_best = match candidates.as_slice() {
                [only] => Some(only),
                [best, second, ..] if best.agreement > second.agreement => Some(best),
                _ => None,
            };
            if let Some(best) = unique_best {
                if best.text.len() < expected {
                    let padded = format!("{:0>width$}", best.text, width = expected);
                    if !candidates.iter().any(|c| c.text == padded) {
                        let agreement = best.agreement;
                        candidates.push(Candidate {
                            text: padded,
                            agreement,
                            low_confidence: true,
                        });
                    }
                }
            }
        }

        candidates
    }
}

fn length_distance(text: &str, expected: usize) -> usize {
    text.len().abs_diff(expected)
}

/// Linear contrast stretch over the full 0-255 range.
fn contrast_stretch(image: &GrayImage) -> GrayImage {
    let (min, max) = image
        .pixels()
        .fold((u8::MAX, u8::MIN), |(lo, hi), Luma([p])| {
            (lo.min(*p), hi.max(*p))
        });
    if max <= min {
        return image.clone();
    }
    let range = (max - min) as u16;
    let mut out = image.clone();
    for Luma([p]) in out.pixels_mut() {
        *p = (((*p - min) as u16 * 255) / range) as u8;
    }
    out
}

/// Hard threshold to pure black and white.
fn binarize(image: &GrayImage, threshold: u8) -> GrayImage {
    let mut out = image.clone();
    for Luma([p]) in out.pixels_mut() {
        *p = if *p > threshold { 255 } else { 0 };
    }
    out
}

/// 2x nearest-neighbor upscale to aid stroke recognition.
fn upscale_2x(image: &GrayImage) -> GrayImage {
    image::imageops::resize(
        image,
        image.width() * 2,
        image.height() * 2,
        FilterType::Nearest,
    )
}

fn encode_png(image: GrayImage) -> Option<Vec<u8>> {
    let mut bytes = Vec::new();
    DynamicImage::ImageLuma8(image)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .ok()?;
    Some(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Engine replaying a fixed cycle of reads.
    struct FakeOcr {
        responses: Vec<String>,
        cursor: Mutex<usize>,
    }

    impl FakeOcr {
        fn cycling(responses: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                responses: responses.iter().map(|s| s.to_string()).collect(),
                cursor: Mutex::new(0),
            })
        }
    }

    #[async_trait]
    impl OcrEngine for FakeOcr {
        async fn recognize(&self, _png: &[u8], _whitelist: &str, _psm: u8) -> Result<String> {
            let mut cursor = self.cursor.lock().unwrap();
            let response = self.responses[*cursor % self.responses.len()].clone();
            *cursor += 1;
            Ok(response)
        }
    }

    fn sample_png() -> Vec<u8> {
        let img = GrayImage::from_fn(24, 12, |x, _| Luma([if x % 3 == 0 { 20 } else { 230 }]));
        encode_png(img).unwrap()
    }

    fn solver(ocr: Arc<dyn OcrEngine>) -> CaptchaSolver {
        CaptchaSolver::new(ocr, CaptchaConfig::default())
    }

    #[tokio::test]
    async fn test_top_candidate_is_ground_truth() {
        // The correct read and two corrupted reads agree equally often; the
        // correct one wins on closeness to the expected length.
        let ocr = FakeOcr::cycling(&["482915", "4829I5", "48Z915"]);
        let candidates = solver(ocr).solve(&sample_png()).await;

        assert!(!candidates.is_empty());
        assert_eq!(candidates[0].text, "482915");
        assert!(!candidates[0].low_confidence);
    }

    #[tokio::test]
    async fn test_agreement_outranks_length() {
        let ocr = FakeOcr::cycling(&["77123", "77123", "77123", "123456"]);
        let candidates = solver(ocr).solve(&sample_png()).await;
        assert_eq!(candidates[0].text, "77123");
        assert_eq!(candidates[1].text, "123456");
        assert!(candidates[0].agreement > candidates[1].agreement);
    }

    #[tokio::test]
    async fn test_undecodable_image_yields_empty() {
        let ocr = FakeOcr::cycling(&["482915"]);
        let candidates = solver(ocr).solve(b"definitely not an image").await;
        assert!(candidates.is_empty());
    }

    #[tokio::test]
    async fn test_all_junk_reads_yield_empty() {
        // Non-alphabet characters sanitize away to nothing.
        let ocr = FakeOcr::cycling(&["....", "??", ""]);
        let candidates = solver(ocr).solve(&sample_png()).await;
        assert!(candidates.is_empty());
    }

    #[tokio::test]
    async fn test_unique_short_best_gets_padded_guess() {
        let ocr = FakeOcr::cycling(&["4829"]);
        let candidates = solver(ocr).solve(&sample_png()).await;

        assert_eq!(candidates[0].text, "4829");
        assert!(!candidates[0].low_confidence);

        let padded = candidates.last().unwrap();
        assert_eq!(padded.text, "004829");
        assert!(padded.low_confidence);
    }

    #[tokio::test]
    async fn test_no_padding_on_tied_candidates() {
        let ocr = FakeOcr::cycling(&["4829", "9999"]);
        let candidates = solver(ocr).solve(&sample_png()).await;
        assert!(candidates.iter().all(|c| !c.low_confidence));
    }

    #[test]
    fn test_contrast_stretch_expands_range() {
        let img = GrayImage::from_fn(4, 1, |x, _| Luma([100 + (x as u8) * 10]));
        let stretched = contrast_stretch(&img);
        assert_eq!(stretched.get_pixel(0, 0).0[0], 0);
        assert_eq!(stretched.get_pixel(3, 0).0[0], 255);
    }

    #[test]
    fn test_binarize_is_two_valued() {
        let img = GrayImage::from_fn(8, 1, |x, _| Luma([(x as u8) * 30]));
        let bin = binarize(&img, 128);
        assert!(bin.pixels().all(|Luma([p])| *p == 0 || *p == 255));
    }

    #[test]
    fn test_upscale_doubles_dimensions() {
        let img = GrayImage::new(10, 6);
        let up = upscale_2x(&img);
        assert_eq!((up.width(), up.height()), (20, 12));
    }
}
