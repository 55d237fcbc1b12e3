//! Local input actions.
//!
//! Each gesture becomes an [`InputAction`] applied to the registry from its
//! own short-lived task, so a slow guard never blocks whatever produced the
//! gesture. The registry rejects actions while `user_can_play` is false, so
//! input landing between sessions is a no-op.

use crate::registry::Registry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputAction {
    RotateClockwise,
    RotateCounterClockwise,
    Thrust,
}

impl InputAction {
    /// Maps a shell keystroke to an action.
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "d" => Some(Self::RotateClockwise),
            "a" => Some(Self::RotateCounterClockwise),
            "w" => Some(Self::Thrust),
            _ => None,
        }
    }
}

/// Applies one action to the local pod.
pub async fn apply(registry: &Registry, action: InputAction) {
    match action {
        InputAction::RotateClockwise => registry.rotate_clockwise().await,
        InputAction::RotateCounterClockwise => registry.rotate_counter_clockwise().await,
        InputAction::Thrust => registry.thrust().await,
    }
}
