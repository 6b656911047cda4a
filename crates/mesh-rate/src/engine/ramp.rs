//! Pitch bend (temporary rate) ramping
//!
//! Holding a temp rate button bends the pitch; releasing it returns to the
//! slider rate. Two modes:
//!
//! - **Step**: the offset jumps to `±temp%` (or `±temp_small%`) on press and
//!   back to zero on release.
//! - **Linear**: the offset grows by a fixed increment per callback until it
//!   reaches the same magnitude. The increment is
//!   `buffer_seconds / (sensitivity / 100)`, so the time to reach the target
//!   is proportional to the sensitivity.
//!
//! Directions combine like a bitmask (DOWN=1, UP=2, BOTH=3). Holding both
//! buttons cancels out to zero.
//!
//! The offset math lives in free functions ([`ramp_offset`],
//! [`perm_change`]); [`RateRamp`] only tracks which buttons are down and how
//! many callbacks have passed since that changed.

use crate::config::{RampMode, RateSettings, RATE_SENSITIVITY_MAX, RATE_SENSITIVITY_MIN};

/// Resolution of the normal linear ramp
pub const RATE_TEMP_STEP: i32 = 500;
/// Resolution of the small linear ramp (ten times finer)
pub const RATE_TEMP_STEP_SMALL: i32 = RATE_TEMP_STEP * 10;

/// Which pitch bend buttons are held
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum RampDirection {
    #[default]
    None = 0,
    Down = 1,
    Up = 2,
    Both = 3,
}

impl RampDirection {
    #[inline]
    pub fn bits(self) -> u8 {
        self as u8
    }

    #[inline]
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            1 => Self::Down,
            2 => Self::Up,
            3 => Self::Both,
            _ => Self::None,
        }
    }

    /// This direction with `other` also held
    #[inline]
    pub fn with(self, other: Self) -> Self {
        Self::from_bits(self.bits() | other.bits())
    }

    /// This direction with `other` released
    #[inline]
    pub fn without(self, other: Self) -> Self {
        Self::from_bits(self.bits() & !other.bits())
    }

    /// +1 for up, -1 for down, 0 for none/both
    #[inline]
    pub fn sign(self) -> f64 {
        match self {
            Self::Up => 1.0,
            Self::Down => -1.0,
            Self::None | Self::Both => 0.0,
        }
    }
}

/// Per-callback increment of a linear ramp, in rate units
pub fn linear_increment(buffer_seconds: f64, sensitivity: i32, small: bool) -> f64 {
    let sensitivity = sensitivity.clamp(RATE_SENSITIVITY_MIN, RATE_SENSITIVITY_MAX) as f64;
    let increment = buffer_seconds.max(0.0) / (sensitivity / 100.0);
    if small {
        increment * RATE_TEMP_STEP as f64 / RATE_TEMP_STEP_SMALL as f64
    } else {
        increment
    }
}

/// Temporary rate offset after `callbacks` callbacks in `direction`
///
/// Returned as a signed fraction of normal speed (0.04 = 4% faster).
pub fn ramp_offset(
    direction: RampDirection,
    small: bool,
    callbacks: u32,
    buffer_seconds: f64,
    sensitivity: i32,
    settings: &RateSettings,
) -> f64 {
    let sign = direction.sign();
    if sign == 0.0 {
        return 0.0;
    }
    let magnitude = (if small { settings.temp_small } else { settings.temp }) / 100.0;

    match settings.ramp_mode {
        RampMode::Step => sign * magnitude,
        RampMode::Linear => {
            let ramped = linear_increment(buffer_seconds, sensitivity, small) * callbacks as f64;
            sign * ramped.min(magnitude)
        }
    }
}

/// New slider position after one perm button press
///
/// The slider is scaled by `rate_dir * rate_range`, so the step is divided by
/// both to move the effective rate by exactly `perm%`. A zero range leaves
/// the slider untouched.
pub fn perm_change(
    slider: f64,
    direction: RampDirection,
    small: bool,
    rate_dir: f64,
    rate_range: f64,
    settings: &RateSettings,
) -> f64 {
    let sign = direction.sign();
    if sign == 0.0 || rate_range.is_nan() || rate_range <= 0.0 || rate_dir == 0.0 {
        return slider;
    }
    let step = if small { settings.perm_small } else { settings.perm };
    (slider + sign * rate_dir.signum() * step / (100.0 * rate_range)).clamp(-1.0, 1.0)
}

/// Pitch bend state for one deck
#[derive(Debug, Clone)]
pub struct RateRamp {
    /// Buttons currently held
    pressed: RampDirection,
    /// Whether the held down button is the small one
    small_down: bool,
    /// Whether the held up button is the small one
    small_up: bool,
    /// Callbacks since `pressed` last changed
    callbacks: u32,
    /// True between the first press and the final release
    temp_started: bool,
    /// Current offset
    offset: f64,
    /// Buffer length of the last callback, for linear ramps
    buffer_seconds: f64,
    settings: RateSettings,
    /// Per-deck sensitivity overriding the shared default
    sensitivity_override: Option<i32>,
}

impl RateRamp {
    pub fn new(settings: RateSettings) -> Self {
        Self {
            pressed: RampDirection::None,
            small_down: false,
            small_up: false,
            callbacks: 0,
            temp_started: false,
            offset: 0.0,
            buffer_seconds: 0.0,
            settings,
            sensitivity_override: None,
        }
    }

    pub fn direction(&self) -> RampDirection {
        self.pressed
    }

    pub fn is_started(&self) -> bool {
        self.temp_started
    }

    /// Current temporary offset (signed fraction of normal speed)
    #[inline]
    pub fn temp_offset(&self) -> f64 {
        self.offset
    }

    pub fn settings(&self) -> &RateSettings {
        &self.settings
    }

    pub fn apply_settings(&mut self, settings: RateSettings) {
        self.settings = settings;
    }

    pub fn sensitivity(&self) -> i32 {
        self.sensitivity_override
            .unwrap_or(self.settings.ramp_sensitivity)
            .clamp(RATE_SENSITIVITY_MIN, RATE_SENSITIVITY_MAX)
    }

    /// Override the shared sensitivity for this deck (None restores it)
    pub fn set_sensitivity_override(&mut self, sensitivity: Option<i32>) {
        self.sensitivity_override =
            sensitivity.map(|s| s.clamp(RATE_SENSITIVITY_MIN, RATE_SENSITIVITY_MAX));
    }

    /// Step size of the direction being bent
    fn small(&self) -> bool {
        match self.pressed {
            RampDirection::Down => self.small_down,
            RampDirection::Up => self.small_up,
            RampDirection::None | RampDirection::Both => false,
        }
    }

    fn recompute(&mut self) {
        self.offset = ramp_offset(
            self.pressed,
            self.small(),
            self.callbacks,
            self.buffer_seconds,
            self.sensitivity(),
            &self.settings,
        );
    }

    /// A temp button went down
    pub fn begin_temp_change(&mut self, direction: RampDirection, small: bool) {
        self.pressed = self.pressed.with(direction);
        match direction {
            RampDirection::Down => self.small_down = small,
            RampDirection::Up => self.small_up = small,
            RampDirection::Both => {
                self.small_down = small;
                self.small_up = small;
            }
            RampDirection::None => {}
        }
        self.callbacks = 0;
        self.temp_started = self.pressed != RampDirection::None;
        self.recompute();
    }

    /// A temp button came up
    ///
    /// Releasing one of two held buttons restarts the remaining direction
    /// with its own step size.
    pub fn end_temp_change(&mut self, direction: RampDirection) {
        self.pressed = self.pressed.without(direction);
        self.callbacks = 0;
        if self.pressed == RampDirection::None {
            // Only snap-back is implemented, whatever the rampback mode says
            self.temp_started = false;
            self.offset = 0.0;
        } else {
            self.recompute();
        }
    }

    /// Advance one callback
    pub fn process(&mut self, buffer_seconds: f64) {
        self.buffer_seconds = buffer_seconds;
        if self.pressed != RampDirection::None {
            self.callbacks = self.callbacks.saturating_add(1);
            self.recompute();
        }
    }

    /// Drop any in-flight bend (seek, track change)
    ///
    /// Buttons still held start over from zero on the next callback.
    pub fn reset(&mut self) {
        self.callbacks = 0;
        self.offset = 0.0;
        self.temp_started = self.pressed != RampDirection::None;
    }
}
