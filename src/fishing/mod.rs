//! The fishing control subsystem: phase protocol, controller, and the
//! status broadcast

pub mod controller;
pub mod phase;
pub mod status_channel;

use thiserror::Error;

pub use controller::FishingController;
pub use phase::{Phase, Status};
pub use status_channel::{StatusChannel, SubscriptionHandle};

/// Failures the control thread converts into the ERROR phase.
///
/// Observations refused by the allowed-label table are not errors; they
/// are counted by the detector facade for diagnostics and dropped.
#[derive(Debug, Error)]
pub enum ControlError {
    /// No allowed label appeared within the phase deadline. In
    /// FISH_HOOKED this is routed to the retry branch instead.
    #[error("timeout waiting for initial state")]
    PerceptionTimeout,
    /// An actuator call failed; the message is what the status shows
    #[error("{0}")]
    ActuatorFault(String),
    /// Perception or input could not be brought up
    #[error("{0}")]
    InitFault(String),
}
