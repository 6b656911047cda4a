//! Rate control error types
//!
//! The real-time path never returns errors; these cover the UI-side plumbing
//! (parameter store lookups, command queue hand-off).

use thiserror::Error;

use crate::control::ControlKey;

/// Errors from the non-real-time side of the rate core
#[derive(Error, Debug)]
pub enum RateError {
    /// No control registered under this key
    #[error("Unknown control {0}")]
    UnknownControl(ControlKey),

    /// Deck index outside 0..NUM_DECKS
    #[error("Invalid deck index {index} (have {count} decks)")]
    InvalidDeck { index: usize, count: usize },

    /// The deck's command queue was full and the command was dropped
    #[error("Command queue full for {group}")]
    QueueFull { group: String },
}

/// Result type for rate core operations
pub type RateResult<T> = Result<T, RateError>;
