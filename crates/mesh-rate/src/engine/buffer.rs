//! Per-deck callback host
//!
//! [`EngineBuffer`] lives on the audio thread. Each callback it:
//!
//! 1. Applies queued commands (bounded by `MAX_COMMANDS_PER_CALLBACK`)
//! 2. Runs every registered [`EngineControl`] in registration order, then
//!    the rate control
//! 3. Asks the rate control for the rate and advances the playhead, unless
//!    a control jumped it (fwd/back search moves by the jump alone)
//!
//! UI code watches the deck through [`PlaybackAtomics`] without locking.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use super::command::{EngineCommand, MAX_COMMANDS_PER_CALLBACK};
use super::rate::{RateControl, RateOutput};
use super::EngineControl;
use crate::control::{items, ControlObject, ControlStore};
use crate::types::{ChannelGroup, TrackInfo, SAMPLE_RATE};

/// Lock-free playback state for UI reads
///
/// The audio thread stores after every callback; all loads use `Relaxed`
/// since only visibility matters.
pub struct PlaybackAtomics {
    /// Playhead in track samples, f64 bits
    position: AtomicU64,
    /// Last rate handed to the resampler, f64 bits
    rate: AtomicU64,
    playing: AtomicBool,
    scratching: AtomicBool,
}

impl PlaybackAtomics {
    pub fn new() -> Self {
        Self {
            position: AtomicU64::new(0.0f64.to_bits()),
            rate: AtomicU64::new(0.0f64.to_bits()),
            playing: AtomicBool::new(false),
            scratching: AtomicBool::new(false),
        }
    }

    #[inline]
    pub fn position(&self) -> f64 {
        f64::from_bits(self.position.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn rate(&self) -> f64 {
        f64::from_bits(self.rate.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn is_scratching(&self) -> bool {
        self.scratching.load(Ordering::Relaxed)
    }
}

impl Default for PlaybackAtomics {
    fn default() -> Self {
        Self::new()
    }
}

/// Audio-thread side of one deck
pub struct EngineBuffer {
    group: ChannelGroup,
    commands: rtrb::Consumer<EngineCommand>,
    controls: Vec<Box<dyn EngineControl>>,
    rate: RateControl,
    play: Arc<ControlObject>,
    atomics: Arc<PlaybackAtomics>,

    track: Option<TrackInfo>,
    playing: bool,
    position: f64,
    /// Rate used for the previous buffer
    last_rate: f64,
    /// Track sample rate over output sample rate
    base_rate: f64,
    output_sample_rate: u32,
}

impl EngineBuffer {
    pub fn new(
        rate: RateControl,
        commands: rtrb::Consumer<EngineCommand>,
        store: &ControlStore,
    ) -> Self {
        let group = rate.group().clone();
        Self {
            play: store.create(group.as_str(), items::PLAY, 0.0),
            group,
            commands,
            controls: Vec::new(),
            rate,
            atomics: Arc::new(PlaybackAtomics::new()),
            track: None,
            playing: false,
            position: 0.0,
            last_rate: 0.0,
            base_rate: 1.0,
            output_sample_rate: SAMPLE_RATE,
        }
    }

    /// Register a control; controls run in registration order, before the
    /// rate control
    pub fn add_control(&mut self, control: Box<dyn EngineControl>) {
        self.controls.push(control);
    }

    pub fn set_output_sample_rate(&mut self, sample_rate: u32) {
        self.output_sample_rate = sample_rate.max(1);
        self.update_base_rate();
    }

    pub fn group(&self) -> &ChannelGroup {
        &self.group
    }

    pub fn atomics(&self) -> Arc<PlaybackAtomics> {
        self.atomics.clone()
    }

    pub fn rate_control(&self) -> &RateControl {
        &self.rate
    }

    pub fn rate_control_mut(&mut self) -> &mut RateControl {
        &mut self.rate
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn has_track(&self) -> bool {
        self.track.is_some()
    }

    fn total_samples(&self) -> f64 {
        self.track.map_or(0.0, |t| t.total_samples as f64)
    }

    fn update_base_rate(&mut self) {
        self.base_rate = match self.track {
            Some(track) => track.sample_rate.max(1) as f64 / self.output_sample_rate as f64,
            None => 1.0,
        };
    }

    fn set_playing(&mut self, playing: bool) {
        self.playing = playing;
        self.play.publish(if playing { 1.0 } else { 0.0 });
    }

    /// Apply pending commands from the control thread
    fn process_commands(&mut self) {
        for _ in 0..MAX_COMMANDS_PER_CALLBACK {
            let Ok(cmd) = self.commands.pop() else {
                break;
            };
            match cmd {
                EngineCommand::LoadTrack(track) => {
                    self.track = Some(track);
                    self.position = 0.0;
                    self.set_playing(false);
                    self.update_base_rate();
                    for control in &mut self.controls {
                        control.track_loaded(&track);
                    }
                    self.rate.track_loaded(&track);
                }
                EngineCommand::UnloadTrack => {
                    self.track = None;
                    self.position = 0.0;
                    self.set_playing(false);
                    self.update_base_rate();
                    for control in &mut self.controls {
                        control.track_unloaded();
                    }
                    self.rate.track_unloaded();
                }
                EngineCommand::Play => {
                    if self.track.is_some() {
                        self.set_playing(true);
                    }
                }
                EngineCommand::Pause => self.set_playing(false),
                EngineCommand::Seek { fraction } => self.seek(fraction),
                EngineCommand::ApplySettings(settings) => self.rate.apply_settings(settings),
            }
        }
    }

    fn seek(&mut self, fraction: f64) {
        if !fraction.is_finite() || self.track.is_none() {
            return;
        }
        let fraction = fraction.clamp(0.0, 1.0);
        self.position = fraction * self.total_samples();
        for control in &mut self.controls {
            control.notify_seek(fraction);
        }
        self.rate.notify_seek(fraction);
    }

    /// Relocate after a control asked for a jump
    fn jump_to(&mut self, position: f64) {
        let total = self.total_samples();
        if total <= 0.0 || !position.is_finite() {
            return;
        }
        self.seek(position / total);
    }

    /// Run one callback of `buffer_samples` output frames
    pub fn process(&mut self, buffer_samples: usize) -> RateOutput {
        self.process_commands();

        let total = self.total_samples();
        let mut jump = None;
        for control in &mut self.controls {
            if let Some(target) = control.process(self.last_rate, self.position, total, buffer_samples) {
                jump = Some(target);
            }
        }
        if let Some(target) = self.rate.process(self.last_rate, self.position, total, buffer_samples) {
            jump = Some(target);
        }
        let jumped = jump.is_some();
        if let Some(target) = jump {
            self.jump_to(target);
        }

        let output = if self.track.is_some() {
            self.rate.calculate_rate(self.base_rate, !self.playing, buffer_samples)
        } else {
            RateOutput {
                rate: 0.0,
                is_scratching: false,
            }
        };

        if !jumped {
            self.position = match self.rate.scratch_position() {
                Some(position) => position,
                None => self.position + output.rate * buffer_samples as f64,
            };
        }
        self.position = self.position.clamp(0.0, total.max(0.0));
        if self.playing && total > 0.0 && self.position >= total && output.rate > 0.0 {
            self.set_playing(false);
        }
        self.last_rate = output.rate;

        self.atomics
            .position
            .store(self.position.to_bits(), Ordering::Relaxed);
        self.atomics.rate.store(output.rate.to_bits(), Ordering::Relaxed);
        self.atomics.playing.store(self.playing, Ordering::Relaxed);
        self.atomics
            .scratching
            .store(output.is_scratching, Ordering::Relaxed);
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RateSettings;
    use crate::engine::bpm::BpmControl;
    use crate::engine::command::command_channel;
    use crate::engine::rate::SEARCH_SPEED;
    use crate::engine::sync::EngineSync;
    use crate::types::DeckId;

    fn deck() -> (ControlStore, rtrb::Producer<EngineCommand>, EngineBuffer) {
        let store = ControlStore::new();
        let sync = Arc::new(EngineSync::new(&store));
        let mut rate = RateControl::new(DeckId(0), &store, RateSettings::default(), sync);
        let bpm = Arc::new(BpmControl::new(rate.group(), &store));
        rate.set_bpm_control(bpm.clone());
        let (tx, rx) = command_channel();
        let mut buffer = EngineBuffer::new(rate, rx, &store);
        buffer.add_control(Box::new(bpm));
        (store, tx, buffer)
    }

    fn track() -> TrackInfo {
        TrackInfo::new(120.0, 0.0, 48000 * 60, 48000)
    }

    #[test]
    fn test_empty_deck_is_silent() {
        let (_store, _tx, mut buffer) = deck();
        let out = buffer.process(256);
        assert_eq!(out.rate, 0.0);
        assert_eq!(buffer.position(), 0.0);
    }

    #[test]
    fn test_playback_advances_position() {
        let (store, mut tx, mut buffer) = deck();
        tx.push(EngineCommand::LoadTrack(track())).unwrap();
        tx.push(EngineCommand::Play).unwrap();

        let out = buffer.process(256);
        assert_eq!(out.rate, 1.0);
        assert_eq!(buffer.position(), 256.0);
        assert_eq!(buffer.atomics().position(), 256.0);
        assert!(buffer.atomics().is_playing());
        assert_eq!(store.value("[Channel1]", items::PLAY).unwrap(), 1.0);
        assert_eq!(store.value("[Channel1]", items::FILE_BPM).unwrap(), 120.0);
    }

    #[test]
    fn test_paused_deck_holds_position() {
        let (_store, mut tx, mut buffer) = deck();
        tx.push(EngineCommand::LoadTrack(track())).unwrap();
        buffer.process(256);
        buffer.process(256);
        assert_eq!(buffer.position(), 0.0);
    }

    #[test]
    fn test_seek_resets_bend() {
        let (store, mut tx, mut buffer) = deck();
        tx.push(EngineCommand::LoadTrack(track())).unwrap();
        tx.push(EngineCommand::Play).unwrap();
        store.set_value("[Channel1]", items::RATE_TEMP_UP, 1.0).unwrap();
        buffer.process(256);
        assert!(buffer.rate_control().temp_rate() > 0.0);

        tx.push(EngineCommand::Seek { fraction: 0.5 }).unwrap();
        buffer.process(256);
        // Step bend is still held, so it re-applies after the reset
        assert!(buffer.position() >= 48000.0 * 30.0);
    }

    #[test]
    fn test_search_moves_by_jump_only() {
        let (store, mut tx, mut buffer) = deck();
        tx.push(EngineCommand::LoadTrack(track())).unwrap();
        tx.push(EngineCommand::Play).unwrap();
        buffer.process(256);
        assert_eq!(buffer.position(), 256.0);

        store.set_value("[Channel1]", items::FWD, 1.0).unwrap();
        buffer.process(256);
        let searched = 256.0 + SEARCH_SPEED * 256.0;
        assert!((buffer.position() - searched).abs() < 1e-6, "at {}", buffer.position());

        store.set_value("[Channel1]", items::FWD, 0.0).unwrap();
        buffer.process(256);
        assert!((buffer.position() - (searched + 256.0)).abs() < 1e-6);
    }

    #[test]
    fn test_commands_per_callback_are_bounded() {
        let (_store, mut tx, mut buffer) = deck();
        for _ in 0..MAX_COMMANDS_PER_CALLBACK + 10 {
            tx.push(EngineCommand::Pause).unwrap();
        }
        buffer.process(256);
        assert_eq!(tx.slots(), crate::engine::COMMAND_QUEUE_CAPACITY - 10);
        buffer.process(256);
        assert_eq!(tx.slots(), crate::engine::COMMAND_QUEUE_CAPACITY);
    }

    #[test]
    fn test_base_rate_from_track_sample_rate() {
        let (_store, mut tx, mut buffer) = deck();
        tx.push(EngineCommand::LoadTrack(TrackInfo::new(120.0, 0.0, 44100 * 60, 44100)))
            .unwrap();
        tx.push(EngineCommand::Play).unwrap();
        let out = buffer.process(480);
        assert!((out.rate - 44100.0 / 48000.0).abs() < 1e-12);
    }

    #[test]
    fn test_unload_stops_playback() {
        let (store, mut tx, mut buffer) = deck();
        tx.push(EngineCommand::LoadTrack(track())).unwrap();
        tx.push(EngineCommand::Play).unwrap();
        buffer.process(256);
        tx.push(EngineCommand::UnloadTrack).unwrap();
        buffer.process(256);
        assert!(!buffer.is_playing());
        assert!(!buffer.has_track());
        assert_eq!(store.value("[Channel1]", items::FILE_BPM).unwrap(), 0.0);
    }
}
