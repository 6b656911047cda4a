//! Rate tunables shared by all decks
//!
//! Step sizes are percentages of normal speed (4.0 = 4%). Values coming from
//! the UI or a config file are clamped by [`RateSettings::clamped`] rather
//! than rejected.

use serde::{Deserialize, Serialize};

/// Lowest accepted ramp sensitivity (fastest linear ramp)
pub const RATE_SENSITIVITY_MIN: i32 = 100;
/// Highest accepted ramp sensitivity (slowest linear ramp)
pub const RATE_SENSITIVITY_MAX: i32 = 2500;

/// Largest step any pitch button may apply, in percent
const MAX_STEP_PERCENT: f64 = 100.0;

/// How the temporary pitch bend is applied while a button is held
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RampMode {
    /// Pitch jumps by a fixed step while held
    #[default]
    Step,
    /// Pitch moves progressively while held
    Linear,
}

/// How the temporary pitch bend returns to normal after release
///
/// Only `None` is implemented. `Speed` and `Period` are accepted so configs
/// written for them keep loading, and behave exactly like `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RampbackMode {
    /// Return to normal all at once
    #[default]
    None,
    /// Move back at a constant speed (not implemented)
    Speed,
    /// Move back within a fixed period (not implemented)
    Period,
}

impl RampbackMode {
    pub fn is_implemented(&self) -> bool {
        matches!(self, Self::None)
    }
}

/// Process-wide rate tunables
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateSettings {
    /// Pitch bend while a temp button is held (percent)
    pub temp: f64,
    /// Pitch bend while a small temp button is held (percent)
    pub temp_small: f64,
    /// Slider change per perm button press (percent)
    pub perm: f64,
    /// Slider change per small perm button press (percent)
    pub perm_small: f64,
    /// Step or linear pitch bend
    pub ramp_mode: RampMode,
    /// Linear ramp sensitivity; higher is slower
    pub ramp_sensitivity: i32,
    /// Release behaviour of the pitch bend
    pub rampback_mode: RampbackMode,
}

impl Default for RateSettings {
    fn default() -> Self {
        Self {
            temp: 4.0,
            temp_small: 2.0,
            perm: 0.5,
            perm_small: 0.05,
            ramp_mode: RampMode::Step,
            ramp_sensitivity: 250,
            rampback_mode: RampbackMode::None,
        }
    }
}

fn clamp_step(value: f64, fallback: f64) -> f64 {
    if value.is_finite() {
        value.abs().min(MAX_STEP_PERCENT)
    } else {
        fallback
    }
}

impl RateSettings {
    /// Copy with every field forced into its valid range
    pub fn clamped(self) -> Self {
        let defaults = Self::default();
        Self {
            temp: clamp_step(self.temp, defaults.temp),
            temp_small: clamp_step(self.temp_small, defaults.temp_small),
            perm: clamp_step(self.perm, defaults.perm),
            perm_small: clamp_step(self.perm_small, defaults.perm_small),
            ramp_mode: self.ramp_mode,
            ramp_sensitivity: self
                .ramp_sensitivity
                .clamp(RATE_SENSITIVITY_MIN, RATE_SENSITIVITY_MAX),
            rampback_mode: self.rampback_mode,
        }
    }

    pub fn set_temp(&mut self, percent: f64) {
        self.temp = clamp_step(percent, self.temp);
    }

    pub fn set_temp_small(&mut self, percent: f64) {
        self.temp_small = clamp_step(percent, self.temp_small);
    }

    pub fn set_perm(&mut self, percent: f64) {
        self.perm = clamp_step(percent, self.perm);
    }

    pub fn set_perm_small(&mut self, percent: f64) {
        self.perm_small = clamp_step(percent, self.perm_small);
    }

    pub fn set_ramp_mode(&mut self, mode: RampMode) {
        self.ramp_mode = mode;
    }

    /// Set the linear ramp sensitivity, clamped to [100, 2500]
    pub fn set_ramp_sensitivity(&mut self, sensitivity: i32) {
        self.ramp_sensitivity = sensitivity.clamp(RATE_SENSITIVITY_MIN, RATE_SENSITIVITY_MAX);
    }

    pub fn set_rampback_mode(&mut self, mode: RampbackMode) {
        if !mode.is_implemented() {
            log::warn!(
                "set_rampback_mode: {:?} is not implemented, pitch bend will snap back",
                mode
            );
        }
        self.rampback_mode = mode;
    }
}
