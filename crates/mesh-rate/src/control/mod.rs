//! Parameter store: named, observable scalar controls
//!
//! Controls are keyed by `(group, item)`. Groups scope a deck's controls
//! (`[Channel1]` ... `[Channel4]`); item names are listed in [`items`].

mod object;
mod store;

pub use object::{ControlKey, ControlObject, Listener};
pub use store::ControlStore;

/// Item names of the controls owned or read by the rate core
pub mod items {
    // Pitch slider and its scaling
    pub const RATE: &str = "rate";
    pub const RATE_DIR: &str = "rate_dir";
    pub const RATE_RANGE: &str = "rateRange";
    /// Output: last rate handed to the resampler
    pub const RATE_ENGINE: &str = "rateEngine";
    /// Output: search speed while fwd/back is held
    pub const RATE_SEARCH: &str = "rateSearch";

    // Pitch bend buttons
    pub const RATE_TEMP_DOWN: &str = "rate_temp_down";
    pub const RATE_TEMP_DOWN_SMALL: &str = "rate_temp_down_small";
    pub const RATE_TEMP_UP: &str = "rate_temp_up";
    pub const RATE_TEMP_UP_SMALL: &str = "rate_temp_up_small";
    pub const RATE_PERM_DOWN: &str = "rate_perm_down";
    pub const RATE_PERM_DOWN_SMALL: &str = "rate_perm_down_small";
    pub const RATE_PERM_UP: &str = "rate_perm_up";
    pub const RATE_PERM_UP_SMALL: &str = "rate_perm_up_small";

    // Transport
    pub const PLAY: &str = "play";
    pub const FWD: &str = "fwd";
    pub const BACK: &str = "back";
    pub const REVERSE: &str = "reverse";

    // Jog / scratch
    pub const WHEEL: &str = "wheel";
    pub const JOG: &str = "jog";
    pub const SCRATCH2: &str = "scratch2";
    pub const SCRATCH2_ENABLE: &str = "scratch2_enable";
    pub const SCRATCH_POSITION_ENABLE: &str = "scratch_position_enable";
    pub const SCRATCH_POSITION: &str = "scratch_position";

    // Vinyl control
    pub const VINYL_ENABLED: &str = "vinylcontrol_enabled";
    pub const VINYL_SCRATCHING: &str = "vinylcontrol_scratching";

    // Beat info and sync
    pub const FILE_BPM: &str = "file_bpm";
    pub const BEAT_DISTANCE: &str = "beat_distance";
    pub const SYNC_MODE: &str = "sync_mode";
    pub const SYNC_MASTER: &str = "sync_master";
    pub const SYNC_ENABLED: &str = "sync_enabled";
}
