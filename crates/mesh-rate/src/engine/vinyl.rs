//! Vinyl control input
//!
//! Decks without timecode hardware simply don't attach one
//! (`Option<Arc<VinylControl>>` in the rate control). The timecode decoder
//! writes the measured rate; the flags live in the parameter store so
//! mappings and the UI can read them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::control::{items, ControlObject, ControlStore};
use crate::engine::scratch::sanitize_rate;
use crate::types::ChannelGroup;

/// Timecode-driven rate source for one deck
pub struct VinylControl {
    enabled: Arc<ControlObject>,
    scratching: Arc<ControlObject>,
    /// Rate measured from the timecode, f64 bits
    rate: AtomicU64,
}

impl VinylControl {
    pub fn new(group: &ChannelGroup, store: &ControlStore) -> Self {
        Self {
            enabled: store.create(group.as_str(), items::VINYL_ENABLED, 0.0),
            scratching: store.create(group.as_str(), items::VINYL_SCRATCHING, 0.0),
            rate: AtomicU64::new(1.0f64.to_bits()),
        }
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled.is_set()
    }

    #[inline]
    pub fn is_scratching(&self) -> bool {
        self.scratching.is_set()
    }

    /// Last measured rate (1.0 = record spinning at normal speed)
    #[inline]
    pub fn rate(&self) -> f64 {
        f64::from_bits(self.rate.load(Ordering::Relaxed))
    }

    /// Decoder update; implausible readings keep the previous rate
    pub fn set_rate(&self, rate: f64) {
        let rate = sanitize_rate(rate, self.rate());
        self.rate.store(rate.to_bits(), Ordering::Relaxed);
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.set(if enabled { 1.0 } else { 0.0 });
    }

    pub fn set_scratching(&self, scratching: bool) {
        self.scratching.set(if scratching { 1.0 } else { 0.0 });
    }
}
