//! Per-deck tempo information: file BPM and beat grid anchor
//!
//! Written when a track loads (or when analysis finishes later), read by
//! the rate control every callback. Shared as `Arc<BpmControl>`; all fields
//! are atomics so either side can touch it without locking.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use super::EngineControl;
use crate::control::{items, ControlObject, ControlStore};
use crate::types::{samples_per_beat, ChannelGroup, TrackInfo, SAMPLE_RATE};

/// File BPM and beat grid of the loaded track
pub struct BpmControl {
    /// `file_bpm` control (0.0 = unknown)
    file_bpm: Arc<ControlObject>,
    /// First beat of the grid, f64 bits
    first_beat: AtomicU64,
    /// Native sample rate of the loaded track
    sample_rate: AtomicU32,
}

impl BpmControl {
    pub fn new(group: &ChannelGroup, store: &ControlStore) -> Self {
        Self {
            file_bpm: store.create(group.as_str(), items::FILE_BPM, 0.0),
            first_beat: AtomicU64::new(0.0f64.to_bits()),
            sample_rate: AtomicU32::new(SAMPLE_RATE),
        }
    }

    /// Detected BPM of the loaded track, if there is a usable one
    #[inline]
    pub fn file_bpm(&self) -> Option<f64> {
        let bpm = self.file_bpm.get();
        (bpm.is_finite() && bpm > 0.0).then_some(bpm)
    }

    /// Analysis produced a (new) BPM for the loaded track
    pub fn set_file_bpm(&self, bpm: f64) {
        self.file_bpm.publish(bpm);
    }

    #[inline]
    pub fn first_beat(&self) -> f64 {
        f64::from_bits(self.first_beat.load(Ordering::Relaxed))
    }

    pub fn set_first_beat(&self, sample: f64) {
        if sample.is_finite() {
            self.first_beat.store(sample.to_bits(), Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.load(Ordering::Relaxed)
    }

    pub fn samples_per_beat(&self) -> Option<f64> {
        samples_per_beat(self.file_bpm()?, self.sample_rate())
    }

    /// Fraction of the current beat at `position`, in [0, 1)
    ///
    /// None without a usable BPM.
    pub fn beat_distance(&self, position: f64) -> Option<f64> {
        let spb = self.samples_per_beat()?;
        let distance = ((position - self.first_beat()) / spb).rem_euclid(1.0);
        // rem_euclid can round up to exactly 1.0 for tiny negative inputs
        Some(if distance >= 1.0 { 0.0 } else { distance })
    }

    pub fn set_track(&self, track: &TrackInfo) {
        self.sample_rate.store(track.sample_rate.max(1), Ordering::Relaxed);
        self.set_first_beat(track.first_beat_sample);
        self.set_file_bpm(track.bpm);
    }

    pub fn clear(&self) {
        self.file_bpm.publish(0.0);
        self.first_beat.store(0.0f64.to_bits(), Ordering::Relaxed);
        self.sample_rate.store(SAMPLE_RATE, Ordering::Relaxed);
    }
}

impl EngineControl for Arc<BpmControl> {
    fn name(&self) -> &'static str {
        "bpm"
    }

    fn track_loaded(&mut self, track: &TrackInfo) {
        self.set_track(track);
    }

    fn track_unloaded(&mut self) {
        self.clear();
    }
}
