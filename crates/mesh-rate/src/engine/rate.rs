//! Rate control: the per-deck playback speed
//!
//! Owns the pitch bend ramp, the jog/scratch translator and the sync
//! coordinator, and combines them with the pitch slider into the single
//! rate handed to the resampler each callback.
//!
//! Split in two so the rate can be asked for more than once per callback:
//!
//! - [`RateControl::process`] advances all internal state by one buffer and
//!   publishes the beat distance.
//! - [`RateControl::calculate_rate`] is a pure query of that state.
//!
//! Precedence inside `calculate_rate`:
//!
//! 1. An open scratch session drives the rate alone (`is_scratching`).
//! 2. Paused decks only move by jog/wheel scrubbing.
//! 3. Otherwise `1 + slider*range*dir + temp`, plus the sync offset when
//!    following, plus wheel and jog; `reverse` flips the sign.
//!
//! The rate range only scales the slider. The final rate is never clamped
//! to it, so sync can take a deck past its slider bounds.
//!
//! Pitch bend buttons and scratch toggles are levels, not events: they are
//! read from their controls at every callback and compared with what the
//! last callback saw, so a release can never be lost in a full queue.

use std::sync::Arc;

use super::bpm::BpmControl;
use super::ramp::{perm_change, RampDirection, RateRamp};
use super::scratch::{ScratchSource, ScratchTranslator};
use super::sync::{EngineSync, SyncCoordinator, SyncMode, TRACK_POSITION_MASTER_HANDOFF};
use super::vinyl::VinylControl;
use super::EngineControl;
use crate::config::RateSettings;
use crate::control::{items, ControlObject, ControlStore};
use crate::types::{ChannelGroup, DeckId, TrackInfo, SAMPLE_RATE};

/// Buffers of audio skipped per buffer while fwd/back is held
pub const SEARCH_SPEED: f64 = 4.0;

/// Default slider range (±8%)
pub const DEFAULT_RATE_RANGE: f64 = 0.08;

/// Smallest usable slider range
pub const MIN_RATE_RANGE: f64 = 0.01;

/// Temp buttons: (item, direction, small)
const TEMP_BUTTONS: [(&str, RampDirection, bool); 4] = [
    (items::RATE_TEMP_DOWN, RampDirection::Down, false),
    (items::RATE_TEMP_DOWN_SMALL, RampDirection::Down, true),
    (items::RATE_TEMP_UP, RampDirection::Up, false),
    (items::RATE_TEMP_UP_SMALL, RampDirection::Up, true),
];

/// Slider range as used for scaling: never below [`MIN_RATE_RANGE`], the
/// default when unset or not a number
#[inline]
pub fn effective_rate_range(range: f64) -> f64 {
    if range.is_finite() {
        range.max(MIN_RATE_RANGE)
    } else {
        DEFAULT_RATE_RANGE
    }
}

/// Slider position after one perm button press, read from the controls
pub fn perm_step(
    slider: &ControlObject,
    rate_dir: &ControlObject,
    rate_range: &ControlObject,
    direction: RampDirection,
    small: bool,
    settings: &RateSettings,
) -> f64 {
    let dir = if rate_dir.get() < 0.0 { -1.0 } else { 1.0 };
    perm_change(
        slider.get(),
        direction,
        small,
        dir,
        effective_rate_range(rate_range.get()),
        settings,
    )
}

/// Result of [`RateControl::calculate_rate`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateOutput {
    /// Playback speed multiplier (1.0 = normal, negative = backwards)
    pub rate: f64,
    /// Raw speed change: the resampler must not apply key lock
    pub is_scratching: bool,
}

/// Playback rate of one deck
pub struct RateControl {
    deck: DeckId,
    group: ChannelGroup,

    // Inputs
    slider: Arc<ControlObject>,
    rate_dir: Arc<ControlObject>,
    rate_range: Arc<ControlObject>,
    reverse: Arc<ControlObject>,
    fwd: Arc<ControlObject>,
    back: Arc<ControlObject>,
    wheel: Arc<ControlObject>,
    jog: Arc<ControlObject>,
    scratch: Arc<ControlObject>,
    scratch_enable: Arc<ControlObject>,
    position_scratch_enable: Arc<ControlObject>,
    position_scratch_target: Arc<ControlObject>,
    temp_buttons: [Arc<ControlObject>; 4],

    // Outputs
    rate_engine: Arc<ControlObject>,
    rate_search: Arc<ControlObject>,
    beat_distance: Arc<ControlObject>,

    ramp: RateRamp,
    translator: ScratchTranslator,
    sync: SyncCoordinator,
    bpm: Option<Arc<BpmControl>>,
    vinyl: Option<Arc<VinylControl>>,

    /// Temp buttons held at the last callback, one bit per `TEMP_BUTTONS` entry
    temp_held: u8,
    sample_rate: u32,
    /// Playhead at the last callback
    position: f64,
    total_samples: f64,
}

impl RateControl {
    /// Create the rate control for `deck`, registering its controls
    pub fn new(
        deck: DeckId,
        store: &ControlStore,
        settings: RateSettings,
        sync: Arc<EngineSync>,
    ) -> Self {
        let group = deck.group();
        let g = group.as_str();
        Self {
            deck,
            slider: store.create(g, items::RATE, 0.0),
            rate_dir: store.create(g, items::RATE_DIR, 1.0),
            rate_range: store.create(g, items::RATE_RANGE, DEFAULT_RATE_RANGE),
            reverse: store.create(g, items::REVERSE, 0.0),
            fwd: store.create(g, items::FWD, 0.0),
            back: store.create(g, items::BACK, 0.0),
            wheel: store.create(g, items::WHEEL, 0.0),
            jog: store.create(g, items::JOG, 0.0),
            scratch: store.create(g, items::SCRATCH2, 0.0),
            scratch_enable: store.create(g, items::SCRATCH2_ENABLE, 0.0),
            position_scratch_enable: store.create(g, items::SCRATCH_POSITION_ENABLE, 0.0),
            position_scratch_target: store.create(g, items::SCRATCH_POSITION, 0.0),
            temp_buttons: TEMP_BUTTONS.map(|(item, _, _)| store.create(g, item, 0.0)),
            rate_engine: store.create(g, items::RATE_ENGINE, 0.0),
            rate_search: store.create(g, items::RATE_SEARCH, 0.0),
            beat_distance: store.create(g, items::BEAT_DISTANCE, 0.0),
            ramp: RateRamp::new(settings),
            translator: ScratchTranslator::new(),
            sync: SyncCoordinator::new(deck, sync),
            bpm: None,
            vinyl: None,
            temp_held: 0,
            sample_rate: SAMPLE_RATE,
            position: 0.0,
            total_samples: 0.0,
            group,
        }
    }

    pub fn deck(&self) -> DeckId {
        self.deck
    }

    pub fn group(&self) -> &ChannelGroup {
        &self.group
    }

    pub fn set_bpm_control(&mut self, bpm: Arc<BpmControl>) {
        self.bpm = Some(bpm);
    }

    pub fn set_vinyl_control(&mut self, vinyl: Option<Arc<VinylControl>>) {
        self.vinyl = vinyl;
    }

    /// Published beat distance, for marks/cue rendering and sync
    pub fn beat_distance_control(&self) -> Arc<ControlObject> {
        self.beat_distance.clone()
    }

    pub fn file_bpm(&self) -> Option<f64> {
        self.bpm.as_ref().and_then(|b| b.file_bpm())
    }

    // ─────────────────────────────────────────────────────────────
    // Sync role
    // ─────────────────────────────────────────────────────────────

    /// Sync role this deck adopted at the last callback
    pub fn mode(&self) -> SyncMode {
        self.sync.mode()
    }

    /// Ask the registry for a new role (not from the audio callback)
    ///
    /// Takes effect at the next callback.
    pub fn set_mode(&self, mode: SyncMode) {
        self.sync.registry().request_mode(self.deck, mode);
    }

    // ─────────────────────────────────────────────────────────────
    // Slider and pitch bend
    // ─────────────────────────────────────────────────────────────

    /// Slider range, never below [`MIN_RATE_RANGE`]
    pub fn rate_range(&self) -> f64 {
        effective_rate_range(self.rate_range.get())
    }

    pub fn set_rate_range(&self, range: f64) {
        self.rate_range.publish(effective_rate_range(range));
    }

    /// +1 or -1 (slider orientation)
    pub fn rate_dir(&self) -> f64 {
        if self.rate_dir.get() < 0.0 {
            -1.0
        } else {
            1.0
        }
    }

    /// Slider contribution: `slider * range * dir`
    #[inline]
    pub fn raw_rate(&self) -> f64 {
        self.slider.get() * self.rate_range() * self.rate_dir()
    }

    /// Current pitch bend offset
    #[inline]
    pub fn temp_rate(&self) -> f64 {
        self.ramp.temp_offset()
    }

    pub fn settings(&self) -> &RateSettings {
        self.ramp.settings()
    }

    pub fn apply_settings(&mut self, settings: RateSettings) {
        self.ramp.apply_settings(settings);
    }

    pub fn set_ramp_sensitivity_override(&mut self, sensitivity: Option<i32>) {
        self.ramp.set_sensitivity_override(sensitivity);
    }

    pub fn begin_temp_change(&mut self, direction: RampDirection, small: bool) {
        self.ramp.begin_temp_change(direction, small);
    }

    pub fn end_temp_change(&mut self, direction: RampDirection) {
        self.ramp.end_temp_change(direction);
    }

    /// Move the slider by one perm step; persists in the `rate` control
    pub fn apply_perm_change(&self, direction: RampDirection, small: bool) {
        let slider = perm_step(
            &self.slider,
            &self.rate_dir,
            &self.rate_range,
            direction,
            small,
            self.ramp.settings(),
        );
        self.slider.publish(slider);
    }

    /// Turn temp button level changes into begin/end calls
    fn poll_temp_buttons(&mut self) {
        for (index, (_, direction, small)) in TEMP_BUTTONS.into_iter().enumerate() {
            let bit = 1u8 << index;
            let held = self.temp_buttons[index].get() > 0.0;
            let was_held = self.temp_held & bit != 0;
            if held == was_held {
                continue;
            }
            if held {
                self.temp_held |= bit;
                self.ramp.begin_temp_change(direction, small);
            } else {
                self.temp_held &= !bit;
                // The other button of the same direction may still be down
                let sibling = TEMP_BUTTONS
                    .iter()
                    .enumerate()
                    .find(|(i, (_, d, _))| *i != index && *d == direction)
                    .map(|(i, (_, _, s))| (i, *s));
                match sibling {
                    Some((i, sibling_small)) if self.temp_held & (1 << i) != 0 => {
                        self.ramp.begin_temp_change(direction, sibling_small);
                    }
                    _ => self.ramp.end_temp_change(direction),
                }
            }
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Scratch
    // ─────────────────────────────────────────────────────────────

    /// Set `scratch2_enable` and open/close the session right away
    pub fn set_scratch_enabled(&mut self, enabled: bool) {
        self.scratch_enable.publish(if enabled { 1.0 } else { 0.0 });
        self.update_session();
    }

    /// Set `scratch_position_enable` and apply it to an open session
    pub fn set_position_scratch(&mut self, enabled: bool) {
        self.position_scratch_enable
            .publish(if enabled { 1.0 } else { 0.0 });
        self.update_position_scratch();
    }

    /// Set the absolute scratch target, in samples
    pub fn move_position_scratch(&mut self, target: f64) {
        if target.is_finite() {
            self.position_scratch_target.publish(target);
        }
        self.update_position_scratch();
    }

    /// Start/stop position scratching and hand it the latest target
    fn update_position_scratch(&mut self) {
        let wanted = self.position_scratch_enable.get() > 0.0;
        let target = self.position_scratch_target.get();
        let position = self.position;
        let Some(session) = self.translator.session_mut() else {
            return;
        };
        if session.source() != ScratchSource::Controls {
            return;
        }
        if session.position_controller().is_some() != wanted {
            session.set_position_scratch(wanted, position);
            // A stale target from an earlier gesture must not yank the deck
            if wanted {
                self.position_scratch_target.publish(position);
            }
            return;
        }
        session.move_to(target);
    }

    pub fn is_scratching(&self) -> bool {
        self.translator.is_scratching()
    }

    /// Smoothed playhead of an active position scratch
    pub fn scratch_position(&self) -> Option<f64> {
        self.translator
            .session()
            .and_then(|s| s.position_controller())
            .map(|c| c.position())
    }

    fn vinyl_active(&self) -> bool {
        self.vinyl.as_ref().is_some_and(|v| v.is_enabled())
    }

    /// Open/close/swap the scratch session to match the current inputs
    fn update_session(&mut self) {
        let vinyl_scratching = self
            .vinyl
            .as_ref()
            .is_some_and(|v| v.is_enabled() && v.is_scratching());
        let wanted = if self.scratch_enable.get() > 0.0 {
            Some(ScratchSource::Controls)
        } else if vinyl_scratching {
            Some(ScratchSource::Vinyl)
        } else {
            None
        };

        let current = self.translator.session().map(|s| s.source());
        if wanted == current {
            return;
        }
        match wanted {
            Some(source) => {
                self.translator.open_session(source);
                self.update_position_scratch();
            }
            None => self.translator.close_session(),
        }
    }

    fn device_rate(&self) -> f64 {
        match self.translator.session().map(|s| s.source()) {
            Some(ScratchSource::Vinyl) => self.vinyl.as_ref().map_or(0.0, |v| v.rate()),
            _ => self.scratch.get(),
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Callback
    // ─────────────────────────────────────────────────────────────

    /// Advance one buffer
    ///
    /// `rate` is the rate used for the previous buffer. Returns a position
    /// to jump to while fast-forward/back is held.
    pub fn process(
        &mut self,
        rate: f64,
        current_sample: f64,
        total_samples: f64,
        buffer_samples: usize,
    ) -> Option<f64> {
        self.position = current_sample;
        self.total_samples = total_samples;
        let buffer_seconds = buffer_samples as f64 / self.sample_rate.max(1) as f64;

        self.poll_temp_buttons();
        self.update_session();
        self.update_position_scratch();
        self.ramp.process(buffer_seconds);
        let device_rate = self.device_rate();
        self.translator
            .process(self.jog.take(), self.wheel.get(), device_rate, buffer_samples);

        let beat_distance = self
            .bpm
            .as_ref()
            .and_then(|b| b.beat_distance(current_sample));
        if let Some(distance) = beat_distance {
            self.beat_distance.publish(distance);
        }

        let tempo_rate = 1.0 + self.raw_rate();
        self.sync.process(
            self.file_bpm(),
            tempo_rate,
            tempo_rate + self.temp_rate(),
            beat_distance,
        );
        self.check_track_position(current_sample, total_samples);
        self.rate_engine.publish(rate);

        let search = match (self.fwd.is_set(), self.back.is_set()) {
            (true, false) => SEARCH_SPEED,
            (false, true) => -SEARCH_SPEED,
            _ => 0.0,
        };
        self.rate_search.publish(search);
        if search == 0.0 {
            return None;
        }
        // A jump must not carry a bend across it
        self.ramp.reset();
        let target = current_sample + search * buffer_samples as f64;
        Some(target.clamp(0.0, total_samples.max(0.0)))
    }

    /// A master close to the end of its track hands master off
    ///
    /// Returns true if this deck gave up master.
    pub fn check_track_position(&mut self, current_sample: f64, total_samples: f64) -> bool {
        if self.sync.mode() != SyncMode::Master || total_samples.is_nan() || total_samples <= 0.0 {
            return false;
        }
        if current_sample / total_samples < TRACK_POSITION_MASTER_HANDOFF {
            return false;
        }
        self.sync.registry().release_master(self.deck)
    }

    /// Rate for the current buffer (no side effects)
    pub fn calculate_rate(&self, base_rate: f64, paused: bool, _samples_per_buffer: usize) -> RateOutput {
        if let Some(scratch) = self.translator.scratch_rate(paused) {
            return RateOutput {
                rate: finite_or_zero(scratch * base_rate),
                is_scratching: true,
            };
        }

        let mut rate = if paused {
            self.translator.jog_factor(true) + self.translator.wheel_factor()
        } else {
            let mut rate = if self.vinyl_active() {
                self.vinyl.as_ref().map_or(1.0, |v| v.rate())
            } else {
                let mut tempo = 1.0 + self.raw_rate();
                if self.sync.mode() == SyncMode::Follower {
                    tempo += self.sync.offset();
                }
                tempo
            };
            rate += self.temp_rate();
            rate += self.translator.wheel_factor();
            rate += self.translator.jog_factor(false);
            rate
        };

        if self.reverse.is_set() {
            rate = -rate;
        }
        RateOutput {
            rate: finite_or_zero(rate * base_rate),
            is_scratching: false,
        }
    }

    /// The playhead jumped to `fraction` of the track
    pub fn notify_seek(&mut self, fraction: f64) {
        self.ramp.reset();
        self.translator.reset();
        if fraction.is_finite() {
            self.position = fraction.clamp(0.0, 1.0) * self.total_samples;
        }
        if self.translator.session().is_some_and(|s| s.position_controller().is_some()) {
            let position = self.position;
            if let Some(session) = self.translator.session_mut() {
                session.set_position_scratch(true, position);
            }
            self.position_scratch_target.publish(position);
        }
    }

    pub fn track_loaded(&mut self, track: &TrackInfo) {
        self.sample_rate = track.sample_rate.max(1);
        self.total_samples = track.total_samples as f64;
        self.position = 0.0;
        self.reset_for_track();
    }

    pub fn track_unloaded(&mut self) {
        self.sample_rate = SAMPLE_RATE;
        self.total_samples = 0.0;
        self.position = 0.0;
        self.reset_for_track();
    }

    /// Per-track state goes with the track. A scratch toggle still held
    /// reopens a fresh session at the next callback.
    fn reset_for_track(&mut self) {
        self.ramp.reset();
        self.translator.reset();
        self.translator.close_session();
        self.sync.reset();
        self.beat_distance.publish(0.0);
    }
}

impl EngineControl for RateControl {
    fn name(&self) -> &'static str {
        "rate"
    }

    fn process(
        &mut self,
        rate: f64,
        current_sample: f64,
        total_samples: f64,
        buffer_samples: usize,
    ) -> Option<f64> {
        RateControl::process(self, rate, current_sample, total_samples, buffer_samples)
    }

    fn notify_seek(&mut self, fraction: f64) {
        RateControl::notify_seek(self, fraction);
    }

    fn track_loaded(&mut self, track: &TrackInfo) {
        RateControl::track_loaded(self, track);
    }

    fn track_unloaded(&mut self) {
        RateControl::track_unloaded(self);
    }
}

#[inline]
fn finite_or_zero(rate: f64) -> f64 {
    if rate.is_finite() {
        rate
    } else {
        0.0
    }
}
