//! Rate control configuration
//!
//! - [`RateSettings`]: the process-wide tunables (step sizes, ramp mode,
//!   ramp sensitivity)
//! - [`SettingsHolder`]: canonical owner that broadcasts snapshots to decks
//! - YAML loading/saving
//!
//! # Usage
//!
//! ```ignore
//! use mesh_rate::config::{default_settings_path, load_settings, SettingsHolder};
//!
//! let holder = SettingsHolder::new(load_settings(&default_settings_path()));
//! holder.update(|s| s.set_ramp_sensitivity(400));
//! ```

mod holder;
mod io;
mod settings;

pub use holder::SettingsHolder;
pub use io::{default_settings_path, load_settings, save_settings};
pub use settings::{
    RampMode, RampbackMode, RateSettings, RATE_SENSITIVITY_MAX, RATE_SENSITIVITY_MIN,
};
