//! Per-deck sync follower logic
//!
//! Every callback the coordinator adopts the role the registry holds for its
//! deck. As a follower it converges its tempo ratio toward
//! `master_bpm / file_bpm` and nudges the beat phase toward the master's.
//! The result is an offset on top of the deck's own tempo rate
//! (`1 + slider`), so the slider keeps its meaning when sync is switched off.
//!
//! Without a live master the registry's internal clock stands in for the
//! master tempo, so a handoff leaves the ratio where it was. Phase
//! correction pauses until a new master publishes its beat distance.

use std::sync::Arc;

use super::{EngineSync, SyncMode};
use crate::types::DeckId;

/// Fraction of the remaining tempo difference closed per callback
pub const SYNC_RATE_SMOOTHING: f64 = 0.2;

/// Rate nudge per beat of phase error
pub const PHASE_CORRECTION_GAIN: f64 = 0.05;

/// Largest phase nudge, as a rate fraction
pub const MAX_PHASE_CORRECTION: f64 = 0.01;

/// Beat (and track) position fraction past which phase correction pauses
/// and a master near the end of its track hands off
pub const TRACK_POSITION_MASTER_HANDOFF: f64 = 0.98;

/// Sync state of one deck
pub struct SyncCoordinator {
    deck: DeckId,
    registry: Arc<EngineSync>,
    /// Role adopted at the last callback
    mode: SyncMode,
    /// Tempo ratio the follower is converging with
    synced_ratio: Option<f64>,
    /// File BPM seen at the last callback
    own_bpm: Option<f64>,
    /// Master BPM seen at the last callback
    master_bpm: Option<f64>,
    phase_correction: f64,
    offset: f64,
}

impl SyncCoordinator {
    pub fn new(deck: DeckId, registry: Arc<EngineSync>) -> Self {
        Self {
            deck,
            registry,
            mode: SyncMode::None,
            synced_ratio: None,
            own_bpm: None,
            master_bpm: None,
            phase_correction: 0.0,
            offset: 0.0,
        }
    }

    pub fn registry(&self) -> &Arc<EngineSync> {
        &self.registry
    }

    /// Role adopted at the last callback
    #[inline]
    pub fn mode(&self) -> SyncMode {
        self.mode
    }

    /// Corrective offset to add to the deck's tempo rate (0 unless following)
    #[inline]
    pub fn offset(&self) -> f64 {
        self.offset
    }

    pub fn phase_correction(&self) -> f64 {
        self.phase_correction
    }

    pub fn master_bpm(&self) -> Option<f64> {
        self.master_bpm
    }

    /// Advance one callback
    ///
    /// - `own_bpm`: file BPM of this deck
    /// - `tempo_rate`: this deck's rate without sync (`1 + slider`)
    /// - `effective_rate`: the rate this deck plays at, for publishing
    /// - `beat_distance`: this deck's beat distance
    pub fn process(
        &mut self,
        own_bpm: Option<f64>,
        tempo_rate: f64,
        effective_rate: f64,
        beat_distance: Option<f64>,
    ) {
        self.mode = self.registry.mode(self.deck);
        self.registry.mirror(self.deck);
        let master_bpm = self.registry.master_bpm();

        let publish_rate = match self.mode {
            SyncMode::Follower => self.follow(own_bpm, master_bpm, tempo_rate, beat_distance),
            SyncMode::Master | SyncMode::None => {
                self.clear_offset();
                effective_rate
            }
        };

        self.registry.publish(
            self.deck,
            own_bpm.map(|bpm| bpm * publish_rate),
            beat_distance,
        );
        self.own_bpm = own_bpm;
        self.master_bpm = master_bpm;
    }

    /// Follower step; returns the tempo rate to publish
    fn follow(
        &mut self,
        own_bpm: Option<f64>,
        master_bpm: Option<f64>,
        tempo_rate: f64,
        beat_distance: Option<f64>,
    ) -> f64 {
        let is_master_self = self.registry.master() == Some(self.deck);
        let (Some(own), Some(master)) = (own_bpm, master_bpm) else {
            self.clear_offset();
            return tempo_rate;
        };
        if is_master_self {
            self.clear_offset();
            return tempo_rate;
        }

        let target = master / own;
        let ratio = match self.synced_ratio {
            // New track analysis: no continuity with the old ratio
            Some(_) if self.own_bpm != Some(own) => target,
            Some(ratio) => ratio + (target - ratio) * SYNC_RATE_SMOOTHING,
            None => tempo_rate + (target - tempo_rate) * SYNC_RATE_SMOOTHING,
        };
        self.synced_ratio = Some(ratio);

        self.phase_correction = match (beat_distance, self.registry.master_beat_distance()) {
            (Some(own_distance), Some(master_distance))
                if own_distance < TRACK_POSITION_MASTER_HANDOFF
                    && master_distance < TRACK_POSITION_MASTER_HANDOFF =>
            {
                let error = wrap_phase(master_distance - own_distance);
                (error * PHASE_CORRECTION_GAIN).clamp(-MAX_PHASE_CORRECTION, MAX_PHASE_CORRECTION)
            }
            _ => 0.0,
        };

        self.offset = ratio - tempo_rate + self.phase_correction;
        ratio
    }

    fn clear_offset(&mut self) {
        self.synced_ratio = None;
        self.phase_correction = 0.0;
        self.offset = 0.0;
    }

    /// Forget per-track memory (track load/unload)
    pub fn reset(&mut self) {
        self.clear_offset();
        self.own_bpm = None;
        self.master_bpm = None;
    }
}

/// Wrap a beat phase difference into [-0.5, 0.5]
#[inline]
fn wrap_phase(difference: f64) -> f64 {
    difference - difference.round()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::ControlStore;

    fn setup() -> (Arc<EngineSync>, SyncCoordinator) {
        let store = ControlStore::new();
        let registry = Arc::new(EngineSync::new(&store));
        registry.request_master(DeckId(0));
        registry.request_mode(DeckId(1), SyncMode::Follower);
        let coordinator = SyncCoordinator::new(DeckId(1), registry.clone());
        (registry, coordinator)
    }

    #[test]
    fn test_wrap_phase() {
        assert_eq!(wrap_phase(0.25), 0.25);
        assert_eq!(wrap_phase(0.75), -0.25);
        assert_eq!(wrap_phase(-0.75), 0.25);
    }

    #[test]
    fn test_follower_converges_to_master_bpm() {
        let (registry, mut sync) = setup();
        for _ in 0..200 {
            registry.publish(DeckId(0), Some(128.0), None);
            sync.process(Some(130.0), 1.0, 1.0, None);
        }
        assert_eq!(sync.mode(), SyncMode::Follower);
        let rate = 1.0 + sync.offset();
        assert!((130.0 * rate - 128.0).abs() < 1e-6, "effective bpm {}", 130.0 * rate);
    }

    #[test]
    fn test_convergence_is_gradual() {
        let (registry, mut sync) = setup();
        registry.publish(DeckId(0), Some(128.0), None);
        sync.process(Some(130.0), 1.0, 1.0, None);
        let first = sync.offset();
        let full = 128.0 / 130.0 - 1.0;
        assert!(first < 0.0 && first > full);
    }

    #[test]
    fn test_offset_accounts_for_slider() {
        let (registry, mut sync) = setup();
        for _ in 0..200 {
            registry.publish(DeckId(0), Some(128.0), None);
            sync.process(Some(128.0), 1.04, 1.04, None);
        }
        assert!((1.04 + sync.offset() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_phase_correction_and_handoff_suppression() {
        let (registry, mut sync) = setup();
        registry.publish(DeckId(0), Some(128.0), Some(0.3));
        sync.process(Some(128.0), 1.0, 1.0, Some(0.2));
        assert!(sync.phase_correction() > 0.0);
        assert!(sync.phase_correction() <= MAX_PHASE_CORRECTION);

        registry.publish(DeckId(0), Some(128.0), Some(0.5));
        sync.process(Some(128.0), 1.0, 1.0, Some(0.99));
        assert_eq!(sync.phase_correction(), 0.0);

        registry.publish(DeckId(0), Some(128.0), Some(0.985));
        sync.process(Some(128.0), 1.0, 1.0, Some(0.5));
        assert_eq!(sync.phase_correction(), 0.0);
    }

    #[test]
    fn test_missing_bpm_means_no_offset() {
        let (registry, mut sync) = setup();
        registry.publish(DeckId(0), None, None);
        sync.process(Some(130.0), 1.0, 1.0, Some(0.4));
        assert_eq!(sync.offset(), 0.0);

        registry.publish(DeckId(0), Some(128.0), Some(0.1));
        sync.process(None, 1.0, 1.0, Some(0.4));
        assert_eq!(sync.offset(), 0.0);
    }

    #[test]
    fn test_master_release_keeps_ratio() {
        let (registry, mut sync) = setup();
        for _ in 0..200 {
            registry.publish(DeckId(0), Some(128.0), None);
            sync.process(Some(130.0), 1.0, 1.0, None);
        }
        let before = sync.offset();
        assert!(registry.release_master(DeckId(0)));
        for _ in 0..50 {
            sync.process(Some(130.0), 1.0, 1.0, None);
            assert!((sync.offset() - before).abs() < 1e-9);
        }
        assert_eq!(sync.mode(), SyncMode::Follower);
    }

    #[test]
    fn test_mirrors_role_released_elsewhere() {
        let store = ControlStore::new();
        let registry = Arc::new(EngineSync::new(&store));
        registry.request_master(DeckId(0));
        let mut sync = SyncCoordinator::new(DeckId(0), registry.clone());
        sync.process(Some(128.0), 1.0, 1.0, None);
        assert_eq!(store.value("[Channel1]", crate::control::items::SYNC_MASTER).unwrap(), 1.0);

        assert!(registry.release_master(DeckId(0)));
        sync.process(Some(128.0), 1.0, 1.0, None);
        assert_eq!(sync.mode(), SyncMode::Follower);
        assert_eq!(store.value("[Channel1]", crate::control::items::SYNC_MASTER).unwrap(), 0.0);
    }

    #[test]
    fn test_own_bpm_change_snaps_ratio() {
        let (registry, mut sync) = setup();
        registry.publish(DeckId(0), Some(128.0), None);
        sync.process(Some(130.0), 1.0, 1.0, None);
        registry.publish(DeckId(0), Some(128.0), None);
        sync.process(Some(64.0), 1.0, 1.0, None);
        assert!((1.0 + sync.offset() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_non_follower_has_no_offset() {
        let (registry, mut sync) = setup();
        registry.publish(DeckId(0), Some(128.0), None);
        sync.process(Some(130.0), 1.0, 1.0, None);
        assert!(sync.offset() != 0.0);

        registry.request_mode(DeckId(1), SyncMode::None);
        sync.process(Some(130.0), 1.0, 1.0, None);
        assert_eq!(sync.mode(), SyncMode::None);
        assert_eq!(sync.offset(), 0.0);
    }

    #[test]
    fn test_publishes_effective_bpm() {
        let store = ControlStore::new();
        let registry = Arc::new(EngineSync::new(&store));
        registry.request_master(DeckId(2));
        let mut master = SyncCoordinator::new(DeckId(2), registry.clone());
        master.process(Some(120.0), 1.0, 1.05, Some(0.5));
        assert_eq!(master.mode(), SyncMode::Master);
        assert!((registry.master_bpm().unwrap() - 126.0).abs() < 1e-9);
        assert_eq!(registry.master_beat_distance(), Some(0.5));
    }
}
