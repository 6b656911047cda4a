//! Tempo sync between decks
//!
//! - [`EngineSync`]: process-wide registry of sync roles, the current master
//!   and every deck's published tempo/phase.
//! - [`SyncCoordinator`]: per-deck follower logic that turns the master's
//!   tempo and phase into a corrective rate offset.

mod coordinator;
mod registry;

pub use coordinator::{
    SyncCoordinator, MAX_PHASE_CORRECTION, PHASE_CORRECTION_GAIN, SYNC_RATE_SMOOTHING,
    TRACK_POSITION_MASTER_HANDOFF,
};
pub use registry::EngineSync;

/// Sync role of a deck
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum SyncMode {
    /// Free running
    #[default]
    None = 0,
    /// Follows the master's tempo and phase
    Follower = 1,
    /// Tempo/phase reference for the followers
    Master = 2,
}

impl SyncMode {
    #[inline]
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Follower,
            2 => Self::Master,
            _ => Self::None,
        }
    }

    /// Mode from a `sync_mode` control value (rounded, unknown values = None)
    pub fn from_value(value: f64) -> Self {
        if value.is_finite() && value >= 0.0 {
            Self::from_u8(value.round().min(u8::MAX as f64) as u8)
        } else {
            Self::None
        }
    }

    #[inline]
    pub fn as_value(self) -> f64 {
        self as u8 as f64
    }
}
