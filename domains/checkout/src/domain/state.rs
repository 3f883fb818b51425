//! State machine for cart line preparation
//!
//! Line states: Unprepared → Preparing → Prepared | PreparedWithDegradedImage;
//! Preparing → Unprepared (abort). Prepared states may re-enter Preparing
//! when checkout preparation runs again.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during state transitions
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StateError {
    #[error("Invalid transition: cannot transition from {from} via {event}")]
    InvalidTransition { from: String, event: String },
}

/// Preparation state of one cart line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineState {
    Unprepared,
    Preparing,
    Prepared,
    PreparedWithDegradedImage,
}

impl LineState {
    /// Whether the line finished preparation, degraded or not
    pub fn is_prepared(&self) -> bool {
        matches!(self, Self::Prepared | Self::PreparedWithDegradedImage)
    }

    /// Get all valid next states from current state
    pub fn valid_transitions(&self) -> &'static [LineState] {
        match self {
            Self::Unprepared => &[Self::Preparing],
            Self::Preparing => &[
                Self::Prepared,
                Self::PreparedWithDegradedImage,
                Self::Unprepared,
            ],
            Self::Prepared | Self::PreparedWithDegradedImage => &[Self::Preparing],
        }
    }
}

impl std::fmt::Display for LineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unprepared => write!(f, "unprepared"),
            Self::Preparing => write!(f, "preparing"),
            Self::Prepared => write!(f, "prepared"),
            Self::PreparedWithDegradedImage => write!(f, "prepared_with_degraded_image"),
        }
    }
}

/// Events that trigger line state transitions
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LineEvent {
    /// Preparation started
    Begin,
    /// Every image is durable and the attributes were written
    Complete,
    /// Attributes were written but at least one image kept its original reference
    CompleteDegraded,
    /// Preparation gave up before writing
    Abort,
}

impl std::fmt::Display for LineEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Begin => write!(f, "begin"),
            Self::Complete => write!(f, "complete"),
            Self::CompleteDegraded => write!(f, "complete_degraded"),
            Self::Abort => write!(f, "abort"),
        }
    }
}

/// Cart line state machine
pub struct LineStateMachine;

impl LineStateMachine {
    /// Attempt a state transition
    pub fn transition(current: LineState, event: LineEvent) -> Result<LineState, StateError> {
        let next = match (current, event) {
            (LineState::Unprepared, LineEvent::Begin) => LineState::Preparing,
            (LineState::Prepared, LineEvent::Begin) => LineState::Preparing,
            (LineState::PreparedWithDegradedImage, LineEvent::Begin) => LineState::Preparing,
            (LineState::Preparing, LineEvent::Complete) => LineState::Prepared,
            (LineState::Preparing, LineEvent::CompleteDegraded) => {
                LineState::PreparedWithDegradedImage
            }
            (LineState::Preparing, LineEvent::Abort) => LineState::Unprepared,
            _ => {
                return Err(StateError::InvalidTransition {
                    from: current.to_string(),
                    event: event.to_string(),
                });
            }
        };

        Ok(next)
    }

    /// Check if a transition is valid without performing it
    pub fn can_transition(current: LineState, event: &LineEvent) -> bool {
        Self::transition(current, *event).is_ok()
    }
}
