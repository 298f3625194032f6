//! Fishing phases, the allowed-label table, and the published status

use std::time::Instant;

use serde::Serialize;

use crate::detector::Label;

/// The controller's logical position in one fishing round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Phase {
    Stopped,
    WaitingInitial,
    WaitingHook,
    FishHooked,
    PullingNormal,
    PullingHalfway,
    Success,
    Casting,
    Error,
}

impl Phase {
    /// Labels the controller accepts as transition triggers in this phase.
    ///
    /// This table is the single source of truth: an observation whose
    /// label is not listed here never mutates the phase, which is the
    /// guard against stale labels re-entering a prior action.
    pub fn allowed_labels(self) -> &'static [Label] {
        match self {
            Phase::Stopped | Phase::Casting => &[],
            Phase::WaitingInitial | Phase::WaitingHook => &[Label::Waiting, Label::Hooked],
            Phase::FishHooked => &[Label::Hooked, Label::PullingNormal, Label::PullingHalfway],
            Phase::PullingNormal | Phase::PullingHalfway => &[
                Label::PullingNormal,
                Label::PullingHalfway,
                Label::PullRight,
                Label::PullLeft,
                Label::Success,
            ],
            Phase::Success => &[Label::Success],
            Phase::Error => &[
                Label::Waiting,
                Label::Hooked,
                Label::PullingNormal,
                Label::PullingHalfway,
                Label::PullRight,
                Label::PullLeft,
                Label::Success,
            ],
        }
    }

    /// Whether this phase is perception-driven. Only these phases may
    /// carry a detected label on the published status; pairing an action
    /// phase with a stale label is exactly the UI bug this rules out.
    pub fn shows_detected_label(self) -> bool {
        matches!(
            self,
            Phase::WaitingInitial
                | Phase::WaitingHook
                | Phase::FishHooked
                | Phase::PullingNormal
                | Phase::PullingHalfway
                | Phase::Success
        )
    }

    /// Human-readable description for status displays
    pub fn description(self) -> &'static str {
        match self {
            Phase::Stopped => "Stopped",
            Phase::WaitingInitial => "Waiting for initial state...",
            Phase::WaitingHook => "Waiting for a bite...",
            Phase::FishHooked => "Fish hooked! Reeling in...",
            Phase::PullingNormal => "Pulling the line...",
            Phase::PullingHalfway => "Pulling, stamina past half",
            Phase::Success => "Catch succeeded!",
            Phase::Casting => "Casting the rod...",
            Phase::Error => "Error",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Status record published to observers
#[derive(Debug, Clone)]
pub struct Status {
    pub phase: Phase,
    pub last_detected_label: Option<Label>,
    pub last_confidence: Option<f32>,
    pub round_count: u64,
    pub last_error: Option<String>,
    pub updated_at: Instant,
}

impl Status {
    pub fn new() -> Self {
        Self {
            phase: Phase::Stopped,
            last_detected_label: None,
            last_confidence: None,
            round_count: 0,
            last_error: None,
            updated_at: Instant::now(),
        }
    }

    /// Status as a JSON string for UI observers
    pub fn to_json(&self) -> String {
        serde_json::json!({
            "phase": format!("{:?}", self.phase),
            "description": self.phase.description(),
            "detected_label": self.last_detected_label.map(|l| l.id()),
            "confidence": self.last_confidence,
            "round_count": self.round_count,
            "last_error": self.last_error,
        })
        .to_string()
    }
}

impl Default for Status {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowed_labels_table() {
        assert!(Phase::Stopped.allowed_labels().is_empty());
        assert!(Phase::Casting.allowed_labels().is_empty());
        assert_eq!(
            Phase::WaitingInitial.allowed_labels(),
            &[Label::Waiting, Label::Hooked]
        );
        assert_eq!(
            Phase::FishHooked.allowed_labels(),
            &[Label::Hooked, Label::PullingNormal, Label::PullingHalfway]
        );
        assert_eq!(Phase::Success.allowed_labels(), &[Label::Success]);
        assert_eq!(Phase::PullingNormal.allowed_labels().len(), 5);
        assert_eq!(Phase::Error.allowed_labels().len(), 7);
    }

    #[test]
    fn test_label_display_discipline() {
        for phase in [Phase::Stopped, Phase::Casting, Phase::Error] {
            assert!(!phase.shows_detected_label());
        }
        for phase in [
            Phase::WaitingInitial,
            Phase::WaitingHook,
            Phase::FishHooked,
            Phase::PullingNormal,
            Phase::PullingHalfway,
            Phase::Success,
        ] {
            assert!(phase.shows_detected_label());
        }
    }

    #[test]
    fn test_status_json() {
        let mut status = Status::new();
        status.phase = Phase::WaitingHook;
        status.last_detected_label = Some(Label::Waiting);
        status.round_count = 3;

        let json: serde_json::Value = serde_json::from_str(&status.to_json()).unwrap();
        assert_eq!(json["phase"], "WaitingHook");
        assert_eq!(json["detected_label"], 0);
        assert_eq!(json["round_count"], 3);
    }
}
