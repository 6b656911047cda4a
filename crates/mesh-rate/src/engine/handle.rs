//! Control-thread side of a deck
//!
//! [`DeckHandle::create`] builds a deck's [`EngineBuffer`] (handed to the
//! audio thread) and subscribes to the deck controls that act as edges:
//!
//! - perm buttons → slider moves (applied here, the slider is a control)
//! - sync controls → registry role requests
//!
//! Temp buttons and scratch toggles need no wiring: the engine reads them
//! as levels every callback. Track and transport calls go through the
//! command queue and report a full queue to the caller.
//!
//! Listeners run on whichever thread writes the control, never on the audio
//! thread.

use std::sync::Arc;

use super::bpm::BpmControl;
use super::buffer::{EngineBuffer, PlaybackAtomics};
use super::command::{command_channel, CommandSender, EngineCommand};
use super::ramp::RampDirection;
use super::rate::{perm_step, RateControl, DEFAULT_RATE_RANGE};
use super::sync::{EngineSync, SyncMode};
use super::vinyl::VinylControl;
use crate::config::SettingsHolder;
use crate::control::{items, ControlStore};
use crate::error::RateResult;
use crate::types::{ChannelGroup, DeckId, TrackInfo};

/// Perm buttons: (item, direction, small)
const PERM_BUTTONS: [(&str, RampDirection, bool); 4] = [
    (items::RATE_PERM_DOWN, RampDirection::Down, false),
    (items::RATE_PERM_DOWN_SMALL, RampDirection::Down, true),
    (items::RATE_PERM_UP, RampDirection::Up, false),
    (items::RATE_PERM_UP_SMALL, RampDirection::Up, true),
];

/// Control-thread handle to one deck
pub struct DeckHandle {
    deck: DeckId,
    group: ChannelGroup,
    store: Arc<ControlStore>,
    sender: Arc<CommandSender>,
    sync: Arc<EngineSync>,
    atomics: Arc<PlaybackAtomics>,
    bpm: Arc<BpmControl>,
    vinyl: Option<Arc<VinylControl>>,
}

impl DeckHandle {
    /// Build a deck and wire its controls
    ///
    /// Returns the handle for the control thread and the engine buffer to
    /// move onto the audio thread. `with_vinyl` attaches a vinyl control
    /// input.
    pub fn create(
        deck: DeckId,
        store: Arc<ControlStore>,
        sync: Arc<EngineSync>,
        settings: Arc<SettingsHolder>,
        with_vinyl: bool,
    ) -> RateResult<(Self, EngineBuffer)> {
        let group = deck.group();
        let (producer, consumer) = command_channel();
        let sender = Arc::new(CommandSender::new(group.as_str(), producer));

        let mut rate = RateControl::new(deck, &store, settings.snapshot(), sync.clone());
        let bpm = Arc::new(BpmControl::new(&group, &store));
        rate.set_bpm_control(bpm.clone());
        let vinyl = with_vinyl.then(|| Arc::new(VinylControl::new(&group, &store)));
        rate.set_vinyl_control(vinyl.clone());

        let mut buffer = EngineBuffer::new(rate, consumer, &store);
        buffer.add_control(Box::new(bpm.clone()));

        let handle = Self {
            deck,
            group,
            atomics: buffer.atomics(),
            store,
            sender,
            sync,
            bpm,
            vinyl,
        };
        handle.subscribe_perm_buttons(settings.clone())?;
        handle.subscribe_sync()?;
        settings.attach(handle.sender.clone());

        log::info!(
            "DeckHandle: {} ready (vinyl {})",
            handle.group,
            if handle.vinyl.is_some() { "on" } else { "off" }
        );
        Ok((handle, buffer))
    }

    fn subscribe_perm_buttons(&self, settings: Arc<SettingsHolder>) -> RateResult<()> {
        let g = self.group.as_str();
        let slider = self.store.create(g, items::RATE, 0.0);
        let rate_dir = self.store.create(g, items::RATE_DIR, 1.0);
        let rate_range = self.store.create(g, items::RATE_RANGE, DEFAULT_RATE_RANGE);
        for (item, direction, small) in PERM_BUTTONS {
            self.store.create(g, item, 0.0);
            let slider = slider.clone();
            let rate_dir = rate_dir.clone();
            let rate_range = rate_range.clone();
            let settings = settings.clone();
            self.store.subscribe(g, item, move |value| {
                if value > 0.0 {
                    let settings = settings.snapshot();
                    let next =
                        perm_step(&slider, &rate_dir, &rate_range, direction, small, &settings);
                    slider.set(next);
                }
            })?;
        }
        Ok(())
    }

    fn subscribe_sync(&self) -> RateResult<()> {
        let g = self.group.as_str();
        let deck = self.deck;

        let sync = self.sync.clone();
        self.store.subscribe(g, items::SYNC_MODE, move |value| {
            sync.request_mode(deck, SyncMode::from_value(value));
        })?;

        let sync = self.sync.clone();
        self.store.subscribe(g, items::SYNC_MASTER, move |value| {
            if value > 0.0 {
                sync.request_master(deck);
            } else if sync.master() == Some(deck) {
                sync.request_mode(deck, SyncMode::Follower);
            }
        })?;

        let sync = self.sync.clone();
        self.store.subscribe(g, items::SYNC_ENABLED, move |value| {
            if value <= 0.0 {
                sync.request_mode(deck, SyncMode::None);
            } else if sync.mode(deck) == SyncMode::None {
                sync.request_mode(deck, SyncMode::Follower);
            }
        })?;
        Ok(())
    }

    pub fn deck(&self) -> DeckId {
        self.deck
    }

    pub fn group(&self) -> &ChannelGroup {
        &self.group
    }

    pub fn sender(&self) -> Arc<CommandSender> {
        self.sender.clone()
    }

    pub fn atomics(&self) -> Arc<PlaybackAtomics> {
        self.atomics.clone()
    }

    pub fn bpm(&self) -> &Arc<BpmControl> {
        &self.bpm
    }

    pub fn vinyl(&self) -> Option<&Arc<VinylControl>> {
        self.vinyl.as_ref()
    }

    /// Write one of this deck's controls (listeners fire on this thread)
    pub fn set_control(&self, item: &str, value: f64) -> RateResult<()> {
        self.store.set_value(self.group.as_str(), item, value)
    }

    pub fn control(&self, item: &str) -> RateResult<f64> {
        self.store.value(self.group.as_str(), item)
    }

    /// Add jog ticks; consumed by the next callback
    pub fn nudge_jog(&self, delta: f64) {
        if delta.is_finite() {
            self.store.create(self.group.as_str(), items::JOG, 0.0).add(delta);
        }
    }

    pub fn mode(&self) -> SyncMode {
        self.sync.mode(self.deck)
    }

    pub fn set_mode(&self, mode: SyncMode) {
        self.sync.request_mode(self.deck, mode);
    }

    pub fn load_track(&self, track: TrackInfo) -> RateResult<()> {
        self.sender.send(EngineCommand::LoadTrack(track))
    }

    pub fn unload_track(&self) -> RateResult<()> {
        self.sender.send(EngineCommand::UnloadTrack)
    }

    pub fn play(&self) -> RateResult<()> {
        self.sender.send(EngineCommand::Play)
    }

    pub fn pause(&self) -> RateResult<()> {
        self.sender.send(EngineCommand::Pause)
    }

    /// Jump to `fraction` (0.0-1.0) of the track
    pub fn seek(&self, fraction: f64) -> RateResult<()> {
        self.sender.send(EngineCommand::Seek { fraction })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RampMode;

    struct Rig {
        store: Arc<ControlStore>,
        sync: Arc<EngineSync>,
        settings: Arc<SettingsHolder>,
    }

    fn rig() -> Rig {
        let store = Arc::new(ControlStore::new());
        let sync = Arc::new(EngineSync::new(&store));
        Rig {
            store,
            sync,
            settings: Arc::new(SettingsHolder::default()),
        }
    }

    fn deck(rig: &Rig, index: usize) -> (DeckHandle, EngineBuffer) {
        DeckHandle::create(
            DeckId(index),
            rig.store.clone(),
            rig.sync.clone(),
            rig.settings.clone(),
            false,
        )
        .unwrap()
    }

    fn track(bpm: f64) -> TrackInfo {
        TrackInfo::new(bpm, 0.0, 48000 * 300, 48000)
    }

    #[test]
    fn test_temp_button_bends_and_releases() {
        let rig = rig();
        let (handle, mut buffer) = deck(&rig, 0);
        handle.load_track(track(128.0)).unwrap();
        handle.play().unwrap();

        handle.set_control(items::RATE_TEMP_DOWN_SMALL, 1.0).unwrap();
        let out = buffer.process(256);
        assert!((out.rate - 0.98).abs() < 1e-12);

        handle.set_control(items::RATE_TEMP_DOWN_SMALL, 0.0).unwrap();
        assert_eq!(buffer.process(256).rate, 1.0);
    }

    #[test]
    fn test_perm_button_moves_slider() {
        let rig = rig();
        let (handle, mut buffer) = deck(&rig, 0);
        handle.load_track(track(128.0)).unwrap();
        handle.play().unwrap();

        handle.set_control(items::RATE_PERM_UP, 1.0).unwrap();
        handle.set_control(items::RATE_PERM_UP, 0.0).unwrap();
        assert!(handle.control(items::RATE).unwrap() > 0.0);
        let out = buffer.process(256);
        assert!((out.rate - 1.005).abs() < 1e-12);
        assert!((buffer.process(256).rate - 1.005).abs() < 1e-12);
    }

    #[test]
    fn test_settings_change_reaches_deck() {
        let rig = rig();
        let (handle, mut buffer) = deck(&rig, 0);
        handle.load_track(track(128.0)).unwrap();
        handle.play().unwrap();

        rig.settings.update(|s| s.set_ramp_mode(RampMode::Linear));
        handle.set_control(items::RATE_TEMP_UP, 1.0).unwrap();
        buffer.process(256);
        let first = buffer.rate_control().temp_rate();
        buffer.process(256);
        assert_eq!(buffer.rate_control().settings().ramp_mode, RampMode::Linear);
        assert!(buffer.rate_control().temp_rate() > first);
    }

    #[test]
    fn test_scratch_toggle_through_controls() {
        let rig = rig();
        let (handle, mut buffer) = deck(&rig, 0);
        handle.load_track(track(128.0)).unwrap();
        handle.set_control(items::SCRATCH2, 0.5).unwrap();
        handle.set_control(items::SCRATCH2_ENABLE, 1.0).unwrap();

        let out = buffer.process(256);
        assert!(out.is_scratching);
        assert_eq!(out.rate, 0.5);
        assert!(handle.atomics().is_scratching());

        handle.set_control(items::SCRATCH2_ENABLE, 0.0).unwrap();
        assert!(!buffer.process(256).is_scratching);
    }

    #[test]
    fn test_sync_controls_drive_registry() {
        let rig = rig();
        let (first, mut first_buffer) = deck(&rig, 0);
        let (second, mut second_buffer) = deck(&rig, 1);
        first.load_track(track(128.0)).unwrap();
        second.load_track(track(130.0)).unwrap();
        first.play().unwrap();
        second.play().unwrap();

        first.set_control(items::SYNC_MASTER, 1.0).unwrap();
        second.set_control(items::SYNC_ENABLED, 1.0).unwrap();
        assert_eq!(first.mode(), SyncMode::Master);
        assert_eq!(second.mode(), SyncMode::Follower);

        let mut rate = 0.0;
        for _ in 0..300 {
            first_buffer.process(256);
            rate = second_buffer.process(256).rate;
        }
        assert!((130.0 * rate - 128.0).abs() < 0.2, "effective bpm {}", 130.0 * rate);

        second.set_control(items::SYNC_MASTER, 1.0).unwrap();
        assert_eq!(first.mode(), SyncMode::Follower);
        assert_eq!(rig.sync.master(), Some(DeckId(1)));
        assert_eq!(first.control(items::SYNC_MASTER).unwrap(), 0.0);
    }

    #[test]
    fn test_perm_button_with_unset_range_uses_default() {
        let rig = rig();
        let (handle, _buffer) = deck(&rig, 0);
        handle.set_control(items::RATE_RANGE, f64::NAN).unwrap();
        handle.set_control(items::RATE_PERM_UP, 1.0).unwrap();
        let expected = rig.settings.snapshot().perm / (100.0 * DEFAULT_RATE_RANGE);
        assert!((handle.control(items::RATE).unwrap() - expected).abs() < 1e-12);
    }

    #[test]
    fn test_releases_survive_full_queue() {
        let rig = rig();
        let (handle, mut buffer) = deck(&rig, 0);
        handle.load_track(track(128.0)).unwrap();
        handle.play().unwrap();
        buffer.process(256);

        handle.set_control(items::RATE_TEMP_UP, 1.0).unwrap();
        assert!((buffer.process(256).rate - 1.04).abs() < 1e-12);

        while handle.play().is_ok() {}
        assert_eq!(handle.sender().slots(), 0);
        handle.set_control(items::RATE_TEMP_UP, 0.0).unwrap();
        assert_eq!(buffer.process(256).rate, 1.0);

        handle.set_control(items::SCRATCH2, 0.5).unwrap();
        handle.set_control(items::SCRATCH2_ENABLE, 1.0).unwrap();
        assert!(buffer.process(256).is_scratching);
        handle.set_control(items::SCRATCH2_ENABLE, 0.0).unwrap();
        assert!(!buffer.process(256).is_scratching);
    }

    #[test]
    fn test_follower_tempo_survives_master_handoff() {
        let rig = rig();
        let (master, mut master_buffer) = deck(&rig, 0);
        let (follower, mut follower_buffer) = deck(&rig, 1);
        // Ten seconds: the master reaches the handoff point after ~1840 callbacks
        master.load_track(TrackInfo::new(128.0, 0.0, 48000 * 10, 48000)).unwrap();
        follower.load_track(track(130.0)).unwrap();
        master.play().unwrap();
        follower.play().unwrap();
        master.set_control(items::SYNC_MASTER, 1.0).unwrap();
        follower.set_control(items::SYNC_ENABLED, 1.0).unwrap();

        let mut previous = 0.0;
        let mut handed_off = false;
        for callback in 0..2000 {
            master_buffer.process(256);
            let rate = follower_buffer.process(256).rate;
            handed_off |= rig.sync.master().is_none();
            if callback > 400 {
                assert!(
                    (rate - previous).abs() < 0.005,
                    "callback {}: follower rate {} -> {}",
                    callback,
                    previous,
                    rate
                );
            }
            previous = rate;
        }
        assert!(handed_off);
        assert_eq!(master.mode(), SyncMode::Follower);
        assert_eq!(master.control(items::SYNC_MASTER).unwrap(), 0.0);
        assert!((130.0 * previous - 128.0).abs() < 0.2, "effective bpm {}", 130.0 * previous);
    }

    #[test]
    fn test_jog_nudge_reaches_engine() {
        let rig = rig();
        let (handle, mut buffer) = deck(&rig, 2);
        handle.load_track(track(128.0)).unwrap();
        handle.play().unwrap();
        handle.nudge_jog(1.0);
        assert!(buffer.process(256).rate > 1.0);
        assert_eq!(handle.control(items::JOG).unwrap(), 0.0);
    }
}
