//! Process-wide sync registry
//!
//! One slot per deck holding whether sync is on for it, its effective BPM and
//! its beat distance, plus the index of the current master. The master index
//! is the only source of the MASTER role: a deck is master exactly when the
//! index points at it, so there is never more than one. Slots store NONE or
//! FOLLOWER only.
//!
//! Role requests come from the control thread. The audio thread only reads
//! slots, publishes its own tempo/phase, and may give up master with
//! [`EngineSync::release_master`] (a single CAS on the index).
//!
//! The last BPM the master published is kept as an internal clock. When the
//! master hands off, unloads or leaves sync, followers keep tracking that
//! tempo until another deck claims master.
//!
//! Each deck's `sync_mode`/`sync_master`/`sync_enabled` controls mirror its
//! role. They are written with `publish` (no listeners), so a deck handle
//! subscribed to them isn't re-triggered by the registry's own updates.

use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;

use super::SyncMode;
use crate::control::{items, ControlObject, ControlStore};
use crate::types::{DeckId, NUM_DECKS};

/// No deck is master
const NO_MASTER: usize = usize::MAX;

struct SyncSlot {
    /// NONE or FOLLOWER; MASTER comes from the registry's master index
    mode: AtomicU8,
    /// Effective BPM (file BPM × tempo), f64 bits, 0 = unknown
    bpm: AtomicU64,
    /// Beat distance, f64 bits, negative = unknown
    beat_distance: AtomicU64,
    mode_control: Arc<ControlObject>,
    master_control: Arc<ControlObject>,
    enabled_control: Arc<ControlObject>,
}

impl SyncSlot {
    fn new(deck: DeckId, store: &ControlStore) -> Self {
        let group = deck.group();
        Self {
            mode: AtomicU8::new(SyncMode::None as u8),
            bpm: AtomicU64::new(0.0f64.to_bits()),
            beat_distance: AtomicU64::new((-1.0f64).to_bits()),
            mode_control: store.create(group.as_str(), items::SYNC_MODE, 0.0),
            master_control: store.create(group.as_str(), items::SYNC_MASTER, 0.0),
            enabled_control: store.create(group.as_str(), items::SYNC_ENABLED, 0.0),
        }
    }

    fn stored_mode(&self) -> SyncMode {
        match SyncMode::from_u8(self.mode.load(Ordering::Acquire)) {
            SyncMode::None => SyncMode::None,
            SyncMode::Follower | SyncMode::Master => SyncMode::Follower,
        }
    }

    fn store_mode(&self, mode: SyncMode) {
        self.mode.store(mode as u8, Ordering::Release);
    }

    fn mirror(&self, mode: SyncMode) {
        self.mode_control.publish(mode.as_value());
        self.master_control
            .publish(if mode == SyncMode::Master { 1.0 } else { 0.0 });
        self.enabled_control
            .publish(if mode == SyncMode::None { 0.0 } else { 1.0 });
    }

    fn bpm(&self) -> Option<f64> {
        valid_bpm(f64::from_bits(self.bpm.load(Ordering::Relaxed)))
    }

    fn beat_distance(&self) -> Option<f64> {
        let distance = f64::from_bits(self.beat_distance.load(Ordering::Relaxed));
        (distance >= 0.0).then_some(distance)
    }
}

#[inline]
fn valid_bpm(bpm: f64) -> Option<f64> {
    (bpm.is_finite() && bpm > 0.0).then_some(bpm)
}

/// Sync role registry shared by all decks
pub struct EngineSync {
    slots: [SyncSlot; NUM_DECKS],
    master: AtomicUsize,
    /// Last BPM published by a master, f64 bits, 0 = none yet
    clock_bpm: AtomicU64,
}

impl EngineSync {
    /// Create the registry and its per-deck controls
    pub fn new(store: &ControlStore) -> Self {
        Self {
            slots: std::array::from_fn(|i| SyncSlot::new(DeckId(i), store)),
            master: AtomicUsize::new(NO_MASTER),
            clock_bpm: AtomicU64::new(0.0f64.to_bits()),
        }
    }

    fn slot(&self, deck: DeckId) -> Option<&SyncSlot> {
        self.slots.get(deck.0)
    }

    /// Current role of a deck (lock-free)
    #[inline]
    pub fn mode(&self, deck: DeckId) -> SyncMode {
        match self.slot(deck) {
            Some(_) if self.master.load(Ordering::Acquire) == deck.0 => SyncMode::Master,
            Some(slot) => slot.stored_mode(),
            None => SyncMode::default(),
        }
    }

    /// Current master, if any (lock-free)
    pub fn master(&self) -> Option<DeckId> {
        match self.master.load(Ordering::Acquire) {
            NO_MASTER => None,
            index => Some(DeckId(index)),
        }
    }

    /// Tempo followers track: the master's effective BPM, or the internal
    /// clock when there is no master or it stopped publishing one
    pub fn master_bpm(&self) -> Option<f64> {
        self.master()
            .and_then(|deck| self.slot(deck))
            .and_then(SyncSlot::bpm)
            .or_else(|| self.clock_bpm())
    }

    /// Last BPM a master published
    pub fn clock_bpm(&self) -> Option<f64> {
        valid_bpm(f64::from_bits(self.clock_bpm.load(Ordering::Relaxed)))
    }

    /// Beat distance of the master (none without a live master)
    pub fn master_beat_distance(&self) -> Option<f64> {
        self.slot(self.master()?)?.beat_distance()
    }

    /// Effective BPM a deck last published
    pub fn deck_bpm(&self, deck: DeckId) -> Option<f64> {
        self.slot(deck)?.bpm()
    }

    /// Publish a deck's tempo and phase (audio thread, every callback)
    #[inline]
    pub fn publish(&self, deck: DeckId, bpm: Option<f64>, beat_distance: Option<f64>) {
        if let Some(slot) = self.slot(deck) {
            slot.bpm
                .store(bpm.unwrap_or(0.0).to_bits(), Ordering::Relaxed);
            slot.beat_distance
                .store(beat_distance.unwrap_or(-1.0).to_bits(), Ordering::Relaxed);
            if let Some(bpm) = bpm.and_then(valid_bpm) {
                if self.master.load(Ordering::Acquire) == deck.0 {
                    self.clock_bpm.store(bpm.to_bits(), Ordering::Relaxed);
                }
            }
        }
    }

    /// Write a deck's role into its controls (RT-safe)
    pub fn mirror(&self, deck: DeckId) {
        if let Some(slot) = self.slot(deck) {
            slot.mirror(self.mode(deck));
        }
    }

    /// Change a deck's role (control thread)
    pub fn request_mode(&self, deck: DeckId, mode: SyncMode) {
        let Some(slot) = self.slot(deck) else {
            log::warn!("request_mode: no sync slot for deck {}", deck.0);
            return;
        };
        match mode {
            SyncMode::Master => self.request_master(deck),
            SyncMode::Follower | SyncMode::None => {
                let previous = self.mode(deck);
                slot.store_mode(mode);
                let _ = self.master.compare_exchange(
                    deck.0,
                    NO_MASTER,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                );
                if previous != mode {
                    log::info!("Sync: deck {} -> {:?}", deck.display_number(), mode);
                }
                self.mirror(deck);
            }
        }
    }

    /// Make a deck master, demoting the previous master to follower
    pub fn request_master(&self, deck: DeckId) {
        let Some(slot) = self.slot(deck) else {
            log::warn!("request_master: no sync slot for deck {}", deck.0);
            return;
        };
        // Stored before the swap: once the index moves away again (another
        // claim or a handoff) the deck is left following
        slot.store_mode(SyncMode::Follower);
        let previous = self.master.swap(deck.0, Ordering::AcqRel);
        if previous != deck.0 {
            if self.slots.get(previous).is_some() {
                self.mirror(DeckId(previous));
                log::info!(
                    "Sync: deck {} hands master to deck {}",
                    previous + 1,
                    deck.display_number()
                );
            } else {
                log::info!("Sync: deck {} is master", deck.display_number());
            }
        }
        self.mirror(deck);
    }

    /// Give up master if `deck` still holds it (audio thread safe)
    ///
    /// The deck's slot already holds FOLLOWER, so it keeps following the
    /// internal clock. Its controls are re-mirrored by its coordinator on
    /// the next callback. Returns false if another deck claimed master in
    /// the meantime.
    pub fn release_master(&self, deck: DeckId) -> bool {
        self.master
            .compare_exchange(deck.0, NO_MASTER, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> (ControlStore, EngineSync) {
        let store = ControlStore::new();
        let sync = EngineSync::new(&store);
        (store, sync)
    }

    #[test]
    fn test_single_master() {
        let (_store, sync) = registry();
        sync.request_master(DeckId(0));
        sync.request_master(DeckId(2));

        assert_eq!(sync.master(), Some(DeckId(2)));
        assert_eq!(sync.mode(DeckId(2)), SyncMode::Master);
        assert_eq!(sync.mode(DeckId(0)), SyncMode::Follower);
        let masters = (0..NUM_DECKS)
            .filter(|&i| sync.mode(DeckId(i)) == SyncMode::Master)
            .count();
        assert_eq!(masters, 1);
    }

    #[test]
    fn test_mode_controls_mirror_role() {
        let (store, sync) = registry();
        sync.request_mode(DeckId(1), SyncMode::Master);
        assert_eq!(store.value("[Channel2]", items::SYNC_MODE).unwrap(), 2.0);
        assert_eq!(store.value("[Channel2]", items::SYNC_MASTER).unwrap(), 1.0);
        assert_eq!(store.value("[Channel2]", items::SYNC_ENABLED).unwrap(), 1.0);

        sync.request_mode(DeckId(1), SyncMode::None);
        assert_eq!(sync.master(), None);
        assert_eq!(store.value("[Channel2]", items::SYNC_MODE).unwrap(), 0.0);
        assert_eq!(store.value("[Channel2]", items::SYNC_ENABLED).unwrap(), 0.0);
    }

    #[test]
    fn test_master_values() {
        let (_store, sync) = registry();
        assert_eq!(sync.master_bpm(), None);

        sync.request_master(DeckId(0));
        sync.publish(DeckId(0), Some(128.0), Some(0.25));
        sync.publish(DeckId(1), Some(130.0), Some(0.5));
        assert_eq!(sync.master_bpm(), Some(128.0));
        assert_eq!(sync.master_beat_distance(), Some(0.25));

        // The master stops publishing: its last tempo stays as the clock
        sync.publish(DeckId(0), None, None);
        assert_eq!(sync.master_bpm(), Some(128.0));
        assert_eq!(sync.master_beat_distance(), None);
    }

    #[test]
    fn test_only_master_sets_clock() {
        let (_store, sync) = registry();
        sync.publish(DeckId(1), Some(130.0), None);
        assert_eq!(sync.clock_bpm(), None);
        assert_eq!(sync.master_bpm(), None);

        sync.request_master(DeckId(0));
        sync.publish(DeckId(0), Some(128.0), Some(0.5));
        assert!(sync.release_master(DeckId(0)));
        assert_eq!(sync.master(), None);
        assert_eq!(sync.master_bpm(), Some(128.0));
        assert_eq!(sync.master_beat_distance(), None);

        sync.request_master(DeckId(2));
        sync.publish(DeckId(2), Some(124.0), None);
        assert_eq!(sync.master_bpm(), Some(124.0));
    }

    #[test]
    fn test_release_master_only_by_holder() {
        let (_store, sync) = registry();
        sync.request_master(DeckId(0));
        assert!(!sync.release_master(DeckId(1)));
        assert!(sync.release_master(DeckId(0)));
        assert_eq!(sync.master(), None);
        assert_eq!(sync.mode(DeckId(0)), SyncMode::Follower);
    }

    #[test]
    fn test_role_follows_master_index() {
        let (store, sync) = registry();
        sync.request_master(DeckId(1));
        assert!(sync.release_master(DeckId(1)));
        // A claim right after a handoff ends with one consistent master
        sync.request_master(DeckId(1));
        assert_eq!(sync.master(), Some(DeckId(1)));
        assert_eq!(sync.mode(DeckId(1)), SyncMode::Master);
        assert_eq!(store.value("[Channel2]", items::SYNC_MASTER).unwrap(), 1.0);

        // Released on the audio thread: controls catch up on the next mirror
        assert!(sync.release_master(DeckId(1)));
        assert_eq!(sync.mode(DeckId(1)), SyncMode::Follower);
        sync.mirror(DeckId(1));
        assert_eq!(store.value("[Channel2]", items::SYNC_MASTER).unwrap(), 0.0);
        assert_eq!(store.value("[Channel2]", items::SYNC_MODE).unwrap(), 1.0);

        let masters = (0..NUM_DECKS)
            .filter(|&i| sync.mode(DeckId(i)) == SyncMode::Master)
            .count();
        assert_eq!(masters, 0);
    }

    #[test]
    fn test_leaving_sync_drops_master() {
        let (_store, sync) = registry();
        sync.request_master(DeckId(0));
        sync.request_mode(DeckId(0), SyncMode::None);
        assert_eq!(sync.master(), None);
        assert_eq!(sync.mode(DeckId(0)), SyncMode::None);
    }

    #[test]
    fn test_follower_request_releases_master() {
        let (_store, sync) = registry();
        sync.request_master(DeckId(3));
        sync.request_mode(DeckId(3), SyncMode::Follower);
        assert_eq!(sync.master(), None);
        assert_eq!(sync.mode(DeckId(3)), SyncMode::Follower);
    }
}
