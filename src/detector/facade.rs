//! Detector facade
//!
//! The controller never talks to the classifier or the text reader
//! directly; it polls through this facade with an allow-list of labels.
//! The classifier goes first because its labels {0,1,2,3,6} change faster
//! and dominate timing; direction overlays {4,5} tolerate the extra
//! latency. Any cross-modality tie-breaking lives here and nowhere else.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::{FrameSource, Label, Observation, Source, StateModel, TextReader};
use crate::config::AutofishConfig;

struct PollClocks {
    last_model: Option<Instant>,
    last_text: Option<Instant>,
}

/// Multiplexes the classifier and the text reader behind one call
pub struct DetectorFacade {
    frames: Box<dyn FrameSource>,
    model: Box<dyn StateModel>,
    text: Box<dyn TextReader>,
    model_threshold: f32,
    text_threshold: f32,
    model_interval: Duration,
    text_interval: Duration,
    clocks: Mutex<PollClocks>,
    /// Observations whose label was not in the caller's allow-list.
    /// Diagnostic only; these never reach the controller.
    refused: AtomicU64,
}

impl DetectorFacade {
    pub fn new(
        config: &AutofishConfig,
        frames: Box<dyn FrameSource>,
        model: Box<dyn StateModel>,
        text: Box<dyn TextReader>,
    ) -> Self {
        Self {
            frames,
            model,
            text,
            model_threshold: config.model.confidence_threshold,
            text_threshold: config.ocr.confidence_threshold,
            model_interval: Duration::from_secs_f64(config.model.detection_interval),
            text_interval: Duration::from_secs_f64(config.ocr.detection_interval),
            clocks: Mutex::new(PollClocks {
                last_model: None,
                last_text: None,
            }),
            refused: AtomicU64::new(0),
        }
    }

    /// Poll for the first valid observation whose label is in `allowed`.
    ///
    /// The classifier is consulted first, then the text reader, each
    /// rate-limited by its own configured interval and gated by its own
    /// confidence threshold. Never blocks longer than `deadline`.
    pub fn detect_any(&self, allowed: &[Label], deadline: Duration) -> Option<Observation> {
        let started = Instant::now();

        let (poll_model, poll_text) = {
            let clocks = self.clocks.lock();
            (
                due(clocks.last_model, self.model_interval),
                due(clocks.last_text, self.text_interval),
            )
        };

        if !poll_model && !poll_text {
            return None;
        }

        let frame = match self.frames.grab() {
            Ok(f) => f,
            Err(e) => {
                tracing::warn!("[DETECT] Frame grab failed: {}", e);
                return None;
            }
        };

        if poll_model {
            self.clocks.lock().last_model = Some(Instant::now());

            if let Some((label, confidence)) = self.model.classify(&frame) {
                if confidence >= self.model_threshold {
                    if allowed.contains(&label) {
                        return Some(Observation {
                            label,
                            confidence,
                            source: Source::Classifier,
                        });
                    }
                    self.note_refused(label, Source::Classifier);
                }
            }
        }

        if started.elapsed() >= deadline {
            return None;
        }

        if poll_text {
            self.clocks.lock().last_text = Some(Instant::now());

            if let Some((label, confidence)) = self.text.read(&frame) {
                if confidence >= self.text_threshold {
                    if allowed.contains(&label) {
                        return Some(Observation {
                            label,
                            confidence,
                            source: Source::Text,
                        });
                    }
                    self.note_refused(label, Source::Text);
                }
            }
        }

        None
    }

    /// Check for the persistence (or disappearance) of one label
    pub fn detect_specific(&self, label: Label, deadline: Duration) -> Option<Observation> {
        self.detect_any(&[label], deadline)
    }

    /// How many valid observations were dropped by the allow-list so far
    pub fn refused_count(&self) -> u64 {
        self.refused.load(Ordering::Relaxed)
    }

    fn note_refused(&self, label: Label, source: Source) {
        let n = self.refused.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::debug!(
            "[DETECT] Refused out-of-phase label {} from {:?} (total {})",
            label,
            source,
            n
        );
    }
}

/// A source is due when it has never been polled or its interval elapsed
fn due(last: Option<Instant>, interval: Duration) -> bool {
    last.map(|t| t.elapsed() >= interval).unwrap_or(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use image::GrayImage;
    use parking_lot::Mutex as PlMutex;

    struct BlankFrames;

    impl FrameSource for BlankFrames {
        fn grab(&self) -> Result<GrayImage> {
            Ok(GrayImage::new(8, 8))
        }
    }

    struct FixedModel(PlMutex<Vec<Option<(Label, f32)>>>);

    impl StateModel for FixedModel {
        fn classify(&self, _frame: &GrayImage) -> Option<(Label, f32)> {
            self.0.lock().pop().flatten()
        }
    }

    struct FixedText(Option<(Label, f32)>);

    impl TextReader for FixedText {
        fn read(&self, _frame: &GrayImage) -> Option<(Label, f32)> {
            self.0
        }
    }

    fn facade(
        model: Vec<Option<(Label, f32)>>,
        text: Option<(Label, f32)>,
    ) -> DetectorFacade {
        let mut config = AutofishConfig::default();
        // No rate limiting in unit tests
        config.model.detection_interval = 0.0;
        config.ocr.detection_interval = 0.0;
        DetectorFacade::new(
            &config,
            Box::new(BlankFrames),
            Box::new(FixedModel(PlMutex::new(model))),
            Box::new(FixedText(text)),
        )
    }

    const DEADLINE: Duration = Duration::from_millis(500);

    #[test]
    fn test_classifier_preferred_over_text() {
        let f = facade(
            vec![Some((Label::PullingNormal, 0.9))],
            Some((Label::PullRight, 0.9)),
        );
        let obs = f
            .detect_any(
                &[Label::PullingNormal, Label::PullRight],
                DEADLINE,
            )
            .unwrap();
        assert_eq!(obs.label, Label::PullingNormal);
        assert_eq!(obs.source, Source::Classifier);
    }

    #[test]
    fn test_text_used_when_classifier_silent() {
        let f = facade(vec![None], Some((Label::PullLeft, 0.9)));
        let obs = f.detect_any(&[Label::PullLeft], DEADLINE).unwrap();
        assert_eq!(obs.label, Label::PullLeft);
        assert_eq!(obs.source, Source::Text);
    }

    #[test]
    fn test_confidence_thresholds() {
        // Below the 0.5 classifier default: dropped, text consulted
        let f = facade(
            vec![Some((Label::Hooked, 0.3))],
            Some((Label::Success, 0.9)),
        );
        let obs = f
            .detect_any(&[Label::Hooked, Label::Success], DEADLINE)
            .unwrap();
        assert_eq!(obs.label, Label::Success);

        // Below the 0.6 text default: nothing
        let f = facade(vec![None], Some((Label::Success, 0.4)));
        assert!(f.detect_any(&[Label::Success], DEADLINE).is_none());
    }

    #[test]
    fn test_allow_list_refusal_counted() {
        let f = facade(vec![Some((Label::Success, 0.9))], None);
        assert!(f.detect_any(&[Label::Waiting], DEADLINE).is_none());
        assert_eq!(f.refused_count(), 1);
    }

    #[test]
    fn test_detect_specific() {
        let f = facade(vec![Some((Label::Success, 0.9))], None);
        let obs = f.detect_specific(Label::Success, DEADLINE).unwrap();
        assert_eq!(obs.label, Label::Success);
    }

    #[test]
    fn test_rate_limit_skips_source() {
        let mut config = AutofishConfig::default();
        config.model.detection_interval = 60.0;
        config.ocr.detection_interval = 60.0;
        let f = DetectorFacade::new(
            &config,
            Box::new(BlankFrames),
            Box::new(FixedModel(PlMutex::new(vec![
                Some((Label::Waiting, 0.9)),
                Some((Label::Waiting, 0.9)),
            ]))),
            Box::new(FixedText(None)),
        );

        // First call polls, second is inside the interval
        assert!(f.detect_any(&[Label::Waiting], DEADLINE).is_some());
        assert!(f.detect_any(&[Label::Waiting], DEADLINE).is_none());
    }
}
