//! Jog and scratch input translation
//!
//! Turns controller input into rate contributions:
//!
//! - **Jog**: accumulated jog ticks, low-passed, scaled into a small nudge
//!   while playing or a scrub speed while paused.
//! - **Wheel**: a linear additive rate, no spring-back.
//! - **Scratch session**: while scratch mode is on, the device rate and wheel
//!   movement drive playback directly, unfiltered, like a hand on a record.
//!   Slider, pitch bend and sync are ignored.
//! - **Position scratch**: an absolute target position (e.g. dragging the
//!   waveform) tracked by a smoothing filter; the rate is the velocity of the
//!   smoothed position.
//!
//! Inputs that are NaN/infinite are ignored and magnitudes are clamped to
//! [`MAX_SCRATCH_RATE`], so a glitching device never produces a non-finite
//! rate.

/// Jog low-pass coefficient (exponential moving average)
/// Lower = smoother but more latent, Higher = more responsive but jittery
const JOG_SMOOTHING: f64 = 0.3;

/// Jog nudge strength during playback
const JOG_SENSITIVITY: f64 = 0.1;

/// Extra jog gain while paused (scrubbing)
const JOG_PAUSED_GAIN: f64 = 18.0;

/// Wheel strength
const WHEEL_SENSITIVITY: f64 = 0.4;

/// Extra wheel gain while paused inside a scratch session
const WHEEL_PAUSED_GAIN: f64 = 40.0;

/// Position smoothing towards the scratch target
const POSITION_SMOOTHING: f64 = 0.3;

/// Velocity smoothing of the position scratch rate
const VELOCITY_SMOOTHING: f64 = 0.3;

/// Largest rate magnitude any scratch/jog input may produce
pub const MAX_SCRATCH_RATE: f64 = 32.0;

/// Callbacks without target movement after which the position scratch
/// controller lands exactly on its target
pub const POSITION_SCRATCH_SETTLE_CALLBACKS: u32 = 16;

/// Replace a non-finite sample with `fallback`, clamp the rest
#[inline]
pub fn sanitize_rate(value: f64, fallback: f64) -> f64 {
    if value.is_finite() {
        value.clamp(-MAX_SCRATCH_RATE, MAX_SCRATCH_RATE)
    } else {
        fallback
    }
}

/// First-order low-pass for jog ticks
#[derive(Debug, Clone, Default)]
pub struct JogFilter {
    value: f64,
}

impl JogFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(&mut self, input: f64) -> f64 {
        self.value += (sanitize_rate(input, 0.0) - self.value) * JOG_SMOOTHING;
        self.value
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn reset(&mut self) {
        self.value = 0.0;
    }
}

/// Absolute position scratching
///
/// The reported position follows the target with an exponential filter so
/// irregular UI/controller updates don't step audibly; the rate is the
/// smoothed velocity of that position.
#[derive(Debug, Clone)]
pub struct PositionScratchController {
    /// Target position from the controller (samples)
    target: f64,
    /// Smoothed position
    position: f64,
    /// Smoothed velocity (1.0 = normal speed)
    velocity: f64,
    /// Target of the previous callback, to detect a resting hand
    last_target: f64,
    /// Callbacks the target hasn't moved
    still_callbacks: u32,
}

impl PositionScratchController {
    /// Start tracking at the current playback position
    pub fn new(position: f64) -> Self {
        Self {
            target: position,
            position,
            velocity: 0.0,
            last_target: position,
            still_callbacks: 0,
        }
    }

    /// New target position (non-finite targets are ignored)
    pub fn move_to(&mut self, target: f64) {
        if target.is_finite() {
            self.target = target;
        }
    }

    /// Advance one callback and return the rate
    pub fn process(&mut self, buffer_samples: usize) -> f64 {
        if self.target == self.last_target {
            self.still_callbacks = self.still_callbacks.saturating_add(1);
        } else {
            self.still_callbacks = 0;
            self.last_target = self.target;
        }

        let previous = self.position;
        self.position += (self.target - self.position) * POSITION_SMOOTHING;
        if (self.target - self.position).abs() < 1.0
            || self.still_callbacks >= POSITION_SCRATCH_SETTLE_CALLBACKS
        {
            self.position = self.target;
        }

        let raw_velocity = (self.position - previous) / buffer_samples.max(1) as f64;
        self.velocity += (raw_velocity - self.velocity) * VELOCITY_SMOOTHING;
        if self.position == self.target && self.still_callbacks >= POSITION_SCRATCH_SETTLE_CALLBACKS
        {
            self.velocity = 0.0;
        }
        self.velocity = sanitize_rate(self.velocity, 0.0);
        self.velocity
    }

    /// Smoothed position to report to the deck
    pub fn position(&self) -> f64 {
        self.position
    }

    pub fn target(&self) -> f64 {
        self.target
    }

    pub fn rate(&self) -> f64 {
        self.velocity
    }
}

/// Where a scratch session gets its input from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScratchSource {
    /// Scratch controls (`scratch2`, `wheel`, position scratch)
    Controls,
    /// Vinyl control timecode
    Vinyl,
}

/// State of one scratch gesture, from toggle-on to toggle-off
#[derive(Debug, Clone)]
pub struct ScratchSession {
    source: ScratchSource,
    /// Last plausible device rate
    device_rate: f64,
    /// Raw wheel movement of the current callback
    wheel: f64,
    /// Total wheel movement since the session opened
    accumulated_wheel: f64,
    /// Absolute position scratching, if active
    position: Option<PositionScratchController>,
}

impl ScratchSession {
    pub fn new(source: ScratchSource) -> Self {
        Self {
            source,
            device_rate: 0.0,
            wheel: 0.0,
            accumulated_wheel: 0.0,
            position: None,
        }
    }

    pub fn source(&self) -> ScratchSource {
        self.source
    }

    pub fn accumulated_wheel(&self) -> f64 {
        self.accumulated_wheel
    }

    pub fn position_controller(&self) -> Option<&PositionScratchController> {
        self.position.as_ref()
    }

    /// Switch absolute position scratching on at `current_position`, or off
    pub fn set_position_scratch(&mut self, enabled: bool, current_position: f64) {
        self.position = enabled.then(|| PositionScratchController::new(current_position));
    }

    pub fn move_to(&mut self, target: f64) {
        if let Some(controller) = self.position.as_mut() {
            controller.move_to(target);
        }
    }

    /// Feed one callback worth of input
    pub fn process(&mut self, device_rate: f64, wheel: f64, buffer_samples: usize) {
        self.device_rate = sanitize_rate(device_rate, self.device_rate);
        self.wheel = sanitize_rate(wheel, 0.0);
        self.accumulated_wheel += self.wheel;
        if let Some(controller) = self.position.as_mut() {
            controller.process(buffer_samples);
        }
    }

    /// Rate while this session is open
    pub fn rate(&self, paused: bool) -> f64 {
        if let Some(controller) = &self.position {
            return controller.rate();
        }
        let wheel_gain = if paused { WHEEL_PAUSED_GAIN } else { 1.0 };
        sanitize_rate(
            self.device_rate + self.wheel * WHEEL_SENSITIVITY * wheel_gain,
            0.0,
        )
    }
}

/// Jog/wheel/scratch translator for one deck
#[derive(Debug, Clone, Default)]
pub struct ScratchTranslator {
    jog: JogFilter,
    wheel: f64,
    session: Option<ScratchSession>,
}

impl ScratchTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session(&self) -> Option<&ScratchSession> {
        self.session.as_ref()
    }

    pub fn session_mut(&mut self) -> Option<&mut ScratchSession> {
        self.session.as_mut()
    }

    pub fn is_scratching(&self) -> bool {
        self.session.is_some()
    }

    /// Open a fresh session (replaces any open one)
    pub fn open_session(&mut self, source: ScratchSource) {
        self.session = Some(ScratchSession::new(source));
    }

    pub fn close_session(&mut self) {
        self.session = None;
    }

    /// Feed one callback worth of input
    ///
    /// `jog_delta` is the jog accumulator taken for this callback.
    pub fn process(&mut self, jog_delta: f64, wheel: f64, device_rate: f64, buffer_samples: usize) {
        self.jog.filter(jog_delta);
        self.wheel = sanitize_rate(wheel, 0.0);
        if let Some(session) = self.session.as_mut() {
            session.process(device_rate, wheel, buffer_samples);
        }
    }

    /// Jog contribution: a nudge while playing, a scrub speed while paused
    pub fn jog_factor(&self, paused: bool) -> f64 {
        let gain = if paused { JOG_PAUSED_GAIN } else { 1.0 };
        sanitize_rate(self.jog.value() * JOG_SENSITIVITY * gain, 0.0)
    }

    /// Wheel contribution outside a scratch session
    pub fn wheel_factor(&self) -> f64 {
        self.wheel * WHEEL_SENSITIVITY
    }

    /// Session rate, or None when not scratching
    pub fn scratch_rate(&self, paused: bool) -> Option<f64> {
        self.session.as_ref().map(|s| s.rate(paused))
    }

    /// Forget filter history (seek, track change)
    pub fn reset(&mut self) {
        self.jog.reset();
        self.wheel = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_rate() {
        assert_eq!(sanitize_rate(f64::NAN, 1.5), 1.5);
        assert_eq!(sanitize_rate(f64::INFINITY, 0.0), 0.0);
        assert_eq!(sanitize_rate(1e9, 0.0), MAX_SCRATCH_RATE);
        assert_eq!(sanitize_rate(-1e9, 0.0), -MAX_SCRATCH_RATE);
        assert_eq!(sanitize_rate(0.75, 0.0), 0.75);
    }

    #[test]
    fn test_jog_filter_smooths_and_decays() {
        let mut filter = JogFilter::new();
        let first = filter.filter(1.0);
        assert!(first > 0.0 && first < 1.0);
        for _ in 0..50 {
            filter.filter(1.0);
        }
        assert!((filter.value() - 1.0).abs() < 1e-3);
        for _ in 0..50 {
            filter.filter(0.0);
        }
        assert!(filter.value().abs() < 1e-3);
    }

    #[test]
    fn test_jog_factor_scrubs_harder_when_paused() {
        let mut t = ScratchTranslator::new();
        t.process(1.0, 0.0, 0.0, 256);
        let playing = t.jog_factor(false);
        let paused = t.jog_factor(true);
        assert!(playing > 0.0);
        assert!((paused / playing - JOG_PAUSED_GAIN).abs() < 1e-9);
    }

    #[test]
    fn test_session_uses_raw_device_rate() {
        let mut t = ScratchTranslator::new();
        t.open_session(ScratchSource::Controls);
        t.process(0.0, 0.0, -2.5, 256);
        assert_eq!(t.scratch_rate(false), Some(-2.5));
        t.close_session();
        assert_eq!(t.scratch_rate(false), None);
    }

    #[test]
    fn test_session_ignores_implausible_samples() {
        let mut session = ScratchSession::new(ScratchSource::Controls);
        session.process(1.25, 0.0, 256);
        session.process(f64::NAN, f64::NAN, 256);
        assert_eq!(session.rate(false), 1.25);
        session.process(1e12, 0.0, 256);
        assert_eq!(session.rate(false), MAX_SCRATCH_RATE);
        assert!(session.rate(true).is_finite());
    }

    #[test]
    fn test_session_accumulates_wheel() {
        let mut session = ScratchSession::new(ScratchSource::Controls);
        session.process(0.0, 0.5, 256);
        session.process(0.0, 0.25, 256);
        assert_eq!(session.accumulated_wheel(), 0.75);
        assert!((session.rate(false) - 0.25 * WHEEL_SENSITIVITY).abs() < 1e-12);
    }

    #[test]
    fn test_position_scratch_converges_in_bounded_callbacks() {
        let mut controller = PositionScratchController::new(1000.0);
        controller.move_to(1256.0);

        let first = controller.process(256);
        assert!(first > 0.0);

        for _ in 0..POSITION_SCRATCH_SETTLE_CALLBACKS + 1 {
            controller.process(256);
        }
        assert_eq!(controller.position(), 1256.0);
        assert_eq!(controller.rate(), 0.0);
    }

    #[test]
    fn test_position_scratch_follows_moving_target() {
        let mut controller = PositionScratchController::new(0.0);
        // Hand moving at normal speed
        for i in 1..=40 {
            controller.move_to(i as f64 * 256.0);
            controller.process(256);
        }
        assert!((controller.rate() - 1.0).abs() < 0.05, "rate {}", controller.rate());
        assert!(controller.position() <= controller.target());
    }

    #[test]
    fn test_session_position_mode_drives_rate() {
        let mut session = ScratchSession::new(ScratchSource::Controls);
        session.set_position_scratch(true, 500.0);
        session.move_to(1500.0);
        session.process(3.0, 0.0, 256);
        let rate = session.rate(false);
        assert!(rate > 0.0 && rate != 3.0);

        session.set_position_scratch(false, 0.0);
        assert_eq!(session.rate(false), 3.0);
    }
}
