//! Perception: state classification, text recognition, and the facade
//! the controller polls through

pub mod facade;
pub mod template_model;
pub mod text_service;

use image::GrayImage;
use serde::Serialize;

pub use facade::DetectorFacade;
pub use template_model::TemplateStateModel;
pub use text_service::TextStateReader;

/// A perception label: the game state a detector claims to see.
/// The discriminants match the label ids used by the template set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Label {
    /// Bait in the water, nothing on the hook yet
    Waiting = 0,
    /// Fish on the hook, reeling not started
    Hooked = 1,
    /// Reeling, stamina below half
    PullingNormal = 2,
    /// Reeling, stamina at or above half
    PullingHalfway = 3,
    /// Overlay text says pull right
    PullRight = 4,
    /// Overlay text says pull left
    PullLeft = 5,
    /// Catch succeeded
    Success = 6,
}

impl Label {
    /// Numeric id as used in template file names and logs
    pub fn id(&self) -> u8 {
        *self as u8
    }

    /// Map a numeric id back to a label
    pub fn from_id(id: u8) -> Option<Label> {
        match id {
            0 => Some(Label::Waiting),
            1 => Some(Label::Hooked),
            2 => Some(Label::PullingNormal),
            3 => Some(Label::PullingHalfway),
            4 => Some(Label::PullRight),
            5 => Some(Label::PullLeft),
            6 => Some(Label::Success),
            _ => None,
        }
    }

    /// Human-readable name for logs
    pub fn name(&self) -> &'static str {
        match self {
            Label::Waiting => "waiting-for-bite",
            Label::Hooked => "fish-hooked",
            Label::PullingNormal => "pulling-normal",
            Label::PullingHalfway => "pulling-halfway",
            Label::PullRight => "pull-right",
            Label::PullLeft => "pull-left",
            Label::Success => "catch-succeeded",
        }
    }
}

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.name(), self.id())
    }
}

/// Which detector produced an observation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Source {
    Classifier,
    Text,
}

/// One accepted perception result
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub label: Label,
    pub confidence: f32,
    pub source: Source,
}

/// Frame supplier. Implementations must be safe to call from the thread
/// that owns them; the production impl holds no OS handle so it is
/// thread-local by construction.
pub trait FrameSource: Send + Sync {
    fn grab(&self) -> anyhow::Result<GrayImage>;
}

/// Image classifier over a frame. Returns the best label among
/// {0, 1, 2, 3, 6} with its raw confidence, or None.
pub trait StateModel: Send + Sync {
    fn classify(&self, frame: &GrayImage) -> Option<(Label, f32)>;
}

/// Text recognizer over a frame. Returns one of {4, 5, 6} with a
/// normalized confidence, or None.
pub trait TextReader: Send + Sync {
    fn read(&self, frame: &GrayImage) -> Option<(Label, f32)>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_id_round_trip() {
        for id in 0..=6u8 {
            let label = Label::from_id(id).unwrap();
            assert_eq!(label.id(), id);
        }
        assert!(Label::from_id(7).is_none());
    }

    #[test]
    fn test_label_display() {
        assert_eq!(format!("{}", Label::Success), "catch-succeeded(6)");
    }
}
