//! Template-matching state classifier
//!
//! Classifies a frame into one of the screen-state labels {0, 1, 2, 3, 6}
//! by matching per-label template images with OpenCV. Template files live
//! in the configured templates folder and are named `<label_id>_<name>.png`,
//! e.g. `1_fish_hooked.png`. Several templates per label are allowed.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use image::GrayImage;
use opencv::{
    core::{min_max_loc, no_array, Mat, MatTraitConst},
    imgcodecs, imgproc,
    prelude::*,
};

use super::{Label, StateModel};

/// Labels the classifier is trained on; {4, 5} belong to the text reader
const CLASSIFIER_LABELS: [Label; 5] = [
    Label::Waiting,
    Label::Hooked,
    Label::PullingNormal,
    Label::PullingHalfway,
    Label::Success,
];

struct LabelTemplate {
    label: Label,
    name: String,
    mat: Mat,
}

/// Template-matching implementation of [`StateModel`]
pub struct TemplateStateModel {
    templates: Vec<LabelTemplate>,
}

impl TemplateStateModel {
    /// Load all templates from `templates_dir`. Fails when the folder is
    /// missing or contains no usable template, so a broken install is
    /// caught at start rather than mid-round.
    pub fn load(templates_dir: &Path) -> Result<Self> {
        let entries = fs::read_dir(templates_dir)
            .with_context(|| format!("template folder not readable: {:?}", templates_dir))?;

        let mut templates = Vec::new();

        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().map(|e| e != "png").unwrap_or(true) {
                continue;
            }

            let Some(label) = label_from_file_name(&path) else {
                tracing::debug!("[MODEL] Skipping unrecognized template {:?}", path);
                continue;
            };

            let Some(path_str) = path.to_str() else {
                tracing::warn!("[MODEL] Skipping non-UTF8 template path {:?}", path);
                continue;
            };

            match imgcodecs::imread(path_str, imgcodecs::IMREAD_GRAYSCALE) {
                Ok(mat) if !mat.empty() => {
                    let name = path
                        .file_stem()
                        .and_then(|n| n.to_str())
                        .unwrap_or("unknown")
                        .to_string();
                    tracing::debug!("[MODEL] Loaded template '{}' for {}", name, label);
                    templates.push(LabelTemplate { label, name, mat });
                }
                Ok(_) => tracing::warn!("[MODEL] Empty template {:?}", path),
                Err(e) => tracing::warn!("[MODEL] Failed to read {:?}: {}", path, e),
            }
        }

        if templates.is_empty() {
            anyhow::bail!("no state templates found in {:?}", templates_dir);
        }

        tracing::info!("[MODEL] {} state templates loaded", templates.len());
        Ok(Self { templates })
    }

    /// Reshape a grayscale frame into an owned single-channel Mat. Goes
    /// through a flat pixel slice, so no unsafe raw-buffer handoff.
    fn frame_to_mat(img: &GrayImage) -> opencv::Result<Mat> {
        let rows = img.height() as i32;
        let flat = Mat::from_slice(img.as_raw())?;
        flat.reshape(1, rows)?.try_clone()
    }

    /// Best normalized match score of one template against a frame
    fn match_score(frame: &Mat, template: &Mat) -> Option<f32> {
        if template.cols() >= frame.cols() || template.rows() >= frame.rows() {
            return None;
        }

        let mut result = Mat::default();
        imgproc::match_template(
            frame,
            template,
            &mut result,
            imgproc::TM_CCOEFF_NORMED,
            &no_array(),
        )
        .ok()?;

        let mut max_val = 0.0;
        min_max_loc(&result, None, Some(&mut max_val), None, None, &no_array()).ok()?;

        Some(max_val as f32)
    }
}

impl StateModel for TemplateStateModel {
    fn classify(&self, frame: &GrayImage) -> Option<(Label, f32)> {
        let frame_mat = match Self::frame_to_mat(frame) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!("[MODEL] Frame conversion failed: {:?}", e);
                return None;
            }
        };

        let mut best: Option<(Label, f32, &str)> = None;

        for template in &self.templates {
            if let Some(score) = Self::match_score(&frame_mat, &template.mat) {
                if best.map(|(_, s, _)| score > s).unwrap_or(true) {
                    best = Some((template.label, score, &template.name));
                }
            }
        }

        let (label, score, name) = best?;
        tracing::trace!(
            "[MODEL] Best match '{}' -> {} score={:.3}",
            name,
            label,
            score
        );
        Some((label, score))
    }
}

/// Parse `<label_id>_<name>.png` into a classifier label
fn label_from_file_name(path: &Path) -> Option<Label> {
    let stem = path.file_stem()?.to_str()?;
    let id: u8 = stem.split('_').next()?.parse().ok()?;
    let label = Label::from_id(id)?;
    CLASSIFIER_LABELS.contains(&label).then_some(label)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn test_label_from_file_name() {
        assert_eq!(
            label_from_file_name(Path::new("templates/1_fish_hooked.png")),
            Some(Label::Hooked)
        );
        assert_eq!(
            label_from_file_name(Path::new("templates/6_success.png")),
            Some(Label::Success)
        );
        // Text-only labels are not classifier templates
        assert_eq!(label_from_file_name(Path::new("4_pull_right.png")), None);
        assert_eq!(label_from_file_name(Path::new("notes.png")), None);
    }

    #[test]
    fn test_frame_to_mat_shape() {
        let mut img = GrayImage::new(10, 10);
        for y in 0..10 {
            for x in 0..10 {
                img.put_pixel(x, y, Luma([((x + y) * 12 % 256) as u8]));
            }
        }

        let mat = TemplateStateModel::frame_to_mat(&img).unwrap();
        assert_eq!(mat.cols(), 10);
        assert_eq!(mat.rows(), 10);
    }

    #[test]
    fn test_match_score_exact_patch() {
        // A unique 5x5 pattern at (5,5) in a flat 20x20 frame
        let mut img = GrayImage::new(20, 20);
        for y in 0..20 {
            for x in 0..20 {
                img.put_pixel(x, y, Luma([128u8]));
            }
        }
        for dy in 0..5 {
            for dx in 0..5 {
                img.put_pixel(5 + dx, 5 + dy, Luma([(dx * 50 + dy * 40) as u8]));
            }
        }

        let patch = image::imageops::crop_imm(&img, 5, 5, 5, 5).to_image();

        let frame_mat = TemplateStateModel::frame_to_mat(&img).unwrap();
        let patch_mat = TemplateStateModel::frame_to_mat(&patch).unwrap();

        let score = TemplateStateModel::match_score(&frame_mat, &patch_mat).unwrap();
        assert!(score > 0.99, "score {} should be > 0.99", score);
    }

    #[test]
    fn test_oversized_template_skipped() {
        let small = GrayImage::new(4, 4);
        let large = GrayImage::new(16, 16);
        let small_mat = TemplateStateModel::frame_to_mat(&small).unwrap();
        let large_mat = TemplateStateModel::frame_to_mat(&large).unwrap();
        assert!(TemplateStateModel::match_score(&small_mat, &large_mat).is_none());
    }
}
