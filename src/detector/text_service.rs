//! Text recognition for direction overlays and the success banner
//!
//! Reads the overlay text region with Tesseract and maps the recognized
//! phrase onto labels {4, 5, 6}. Direction overlays ("pull left/right")
//! only ever appear as text, so this reader is their sole source; the
//! success banner can come from here or from the classifier.

use std::collections::HashMap;

use image::GrayImage;
use rusty_tesseract::{Args, Image as TessImage};

use super::{Label, TextReader};
use crate::config::OcrConfig;

/// Confidence reported when a phrase matches. Tesseract does not expose a
/// cheap per-phrase confidence, and a keyword hit on a short overlay line
/// is reliable in practice.
const MATCHED_TEXT_CONFIDENCE: f32 = 0.8;

/// Tesseract-backed implementation of [`TextReader`]
pub struct TextStateReader {
    language: String,
    crop: (f32, f32, f32, f32),
    phrases: Vec<(Label, Vec<String>)>,
}

impl TextStateReader {
    pub fn new(config: &OcrConfig) -> Self {
        Self {
            language: config.language.clone(),
            crop: (config.crop_x, config.crop_y, config.crop_w, config.crop_h),
            phrases: vec![
                (Label::PullRight, config.pull_right_texts.clone()),
                (Label::PullLeft, config.pull_left_texts.clone()),
                (Label::Success, config.success_texts.clone()),
            ],
        }
    }

    /// Crop the configured overlay region out of the frame
    fn crop_overlay(&self, frame: &GrayImage) -> Option<GrayImage> {
        let (w, h) = (frame.width(), frame.height());
        let (fx, fy, fw, fh) = self.crop;

        let crop_x = (w as f32 * fx) as u32;
        let crop_y = (h as f32 * fy) as u32;
        let crop_w = (w as f32 * fw) as u32;
        let crop_h = (h as f32 * fh) as u32;

        if crop_w == 0 || crop_h == 0 || crop_x + crop_w > w || crop_y + crop_h > h {
            tracing::debug!("[TEXT] Crop region out of bounds for {}x{} frame", w, h);
            return None;
        }

        Some(image::imageops::crop_imm(frame, crop_x, crop_y, crop_w, crop_h).to_image())
    }

    /// Run Tesseract over the cropped region
    fn recognize(&self, crop: GrayImage) -> Option<String> {
        let dynamic_img = image::DynamicImage::ImageLuma8(crop);

        let tess_image = match TessImage::from_dynamic_image(&dynamic_img) {
            Ok(img) => img,
            Err(e) => {
                tracing::debug!("[TEXT] Failed to create Tesseract image: {:?}", e);
                return None;
            }
        };

        let args = Args {
            lang: self.language.clone(),
            config_variables: HashMap::new(),
            dpi: Some(150),
            psm: Some(7), // single line mode, overlays are one line
            oem: Some(3),
        };

        match rusty_tesseract::image_to_string(&tess_image, &args) {
            Ok(text) => {
                let text = text.trim().to_string();
                if text.is_empty() {
                    None
                } else {
                    Some(text)
                }
            }
            Err(e) => {
                tracing::debug!("[TEXT] OCR failed: {:?}", e);
                None
            }
        }
    }

    /// Map recognized text onto a label via the phrase lists.
    /// First label whose phrase occurs in the text wins.
    fn match_phrase(&self, text: &str) -> Option<Label> {
        for (label, phrases) in &self.phrases {
            if phrases.iter().any(|p| !p.is_empty() && text.contains(p.as_str())) {
                return Some(*label);
            }
        }
        None
    }
}

impl TextReader for TextStateReader {
    fn read(&self, frame: &GrayImage) -> Option<(Label, f32)> {
        let crop = self.crop_overlay(frame)?;
        let text = self.recognize(crop)?;

        let label = self.match_phrase(&text)?;
        tracing::debug!("[TEXT] '{}' -> {}", text, label);
        Some((label, MATCHED_TEXT_CONFIDENCE))
    }
}
