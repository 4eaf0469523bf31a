use std::sync::Arc;

use crate::surface::ResultImage;

/// Lifecycle of the single generation slot.
///
/// `Idle -> InFlight -> {Succeeded, Failed}`; the next `generate()` or a reset
/// leaves the terminal states. Nothing moves out of `InFlight` except the
/// request that put it there.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum GenerationState {
    #[default]
    Idle,
    InFlight,
    Succeeded(Arc<ResultImage>),
    Failed(String),
}

impl GenerationState {
    pub fn is_in_flight(&self) -> bool {
        matches!(self, GenerationState::InFlight)
    }
}

/// State of the generate button.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerControl {
    pub enabled: bool,
    /// The loading indicator replaces the button label while a request runs.
    pub loading: bool,
}

impl TriggerControl {
    pub fn evaluate(prompt: &str, generation: &GenerationState) -> Self {
        let in_flight = generation.is_in_flight();
        Self {
            enabled: !prompt.trim().is_empty() && !in_flight,
            loading: in_flight,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerateOutcome {
    /// Another request was already in flight; nothing happened.
    Ignored,
    /// Local validation failed; no request was sent.
    Rejected(String),
    Succeeded(Arc<ResultImage>),
    Failed(String),
    /// The session was reset while the request ran; its outcome was dropped.
    Discarded,
}
