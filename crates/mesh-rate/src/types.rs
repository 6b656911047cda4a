//! Common types for mesh-rate
//!
//! Deck identifiers, channel groups and the per-track information the rate
//! core needs from the loader.

use std::fmt;

/// Default sample rate (48kHz - standard professional audio rate)
pub const SAMPLE_RATE: u32 = 48000;

/// Number of decks in the DJ player
pub const NUM_DECKS: usize = 4;

/// Deck identifier (0-3)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeckId(pub usize);

impl DeckId {
    /// Create a new deck ID (panics if >= NUM_DECKS)
    pub fn new(id: usize) -> Self {
        assert!(id < NUM_DECKS, "Deck ID must be less than {}", NUM_DECKS);
        Self(id)
    }

    /// Non-panicking constructor for ids coming from outside the engine
    pub fn checked(id: usize) -> Option<Self> {
        (id < NUM_DECKS).then_some(Self(id))
    }

    /// Get the deck number (1-4 for display)
    pub fn display_number(&self) -> usize {
        self.0 + 1
    }

    /// Get the channel group this deck's controls live in
    pub fn group(&self) -> ChannelGroup {
        ChannelGroup::for_deck(*self)
    }
}

/// Control group a deck's parameters are scoped by, e.g. `[Channel1]`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelGroup(String);

impl ChannelGroup {
    /// Create a group from an arbitrary name (brackets included)
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Standard group for a deck: `[Channel{n}]`
    pub fn for_deck(deck: DeckId) -> Self {
        Self(format!("[Channel{}]", deck.display_number()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Track data the rate core cares about
///
/// Filled by the loader/analysis; everything else about a track (stems,
/// waveforms, cue points) lives elsewhere.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackInfo {
    /// Detected file BPM (0.0 if analysis hasn't produced one)
    pub bpm: f64,
    /// Sample position of the first beat of the grid
    pub first_beat_sample: f64,
    /// Track length in samples
    pub total_samples: u64,
    /// Native sample rate of the file
    pub sample_rate: u32,
}

impl TrackInfo {
    pub fn new(bpm: f64, first_beat_sample: f64, total_samples: u64, sample_rate: u32) -> Self {
        Self {
            bpm,
            first_beat_sample,
            total_samples,
            sample_rate,
        }
    }

    /// Samples per beat at the file's native tempo (None without a usable BPM)
    pub fn samples_per_beat(&self) -> Option<f64> {
        samples_per_beat(self.bpm, self.sample_rate)
    }
}

/// Samples per beat for a BPM at a sample rate (None for zero/negative/NaN BPM)
pub fn samples_per_beat(bpm: f64, sample_rate: u32) -> Option<f64> {
    if bpm.is_finite() && bpm > 0.0 && sample_rate > 0 {
        Some(sample_rate as f64 * 60.0 / bpm)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deck_group_names() {
        assert_eq!(DeckId::new(0).group().as_str(), "[Channel1]");
        assert_eq!(DeckId::new(3).group().to_string(), "[Channel4]");
    }

    #[test]
    fn test_checked_deck_id() {
        assert_eq!(DeckId::checked(2), Some(DeckId(2)));
        assert_eq!(DeckId::checked(NUM_DECKS), None);
    }

    #[test]
    fn test_samples_per_beat() {
        let spb = samples_per_beat(120.0, 48000).unwrap();
        assert!((spb - 24000.0).abs() < 1e-9);
        assert!(samples_per_beat(0.0, 48000).is_none());
        assert!(samples_per_beat(f64::NAN, 48000).is_none());
    }
}
