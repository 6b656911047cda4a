//! Lifecycle hooks shared by every per-deck engine control
//!
//! [`EngineBuffer`](super::EngineBuffer) owns a list of controls and calls
//! these hooks on each of them in registration order, then calls the rate
//! control last so it sees the state the other controls produced for this
//! callback.

use crate::types::TrackInfo;

/// A per-deck control driven by the audio thread
///
/// All hooks run on the audio thread and must not block or allocate.
pub trait EngineControl: Send {
    /// Short name for debugging
    fn name(&self) -> &'static str;

    /// Advance one callback
    ///
    /// Returns a sample position to jump to, if this control wants the
    /// playhead relocated.
    fn process(
        &mut self,
        _rate: f64,
        _current_sample: f64,
        _total_samples: f64,
        _buffer_samples: usize,
    ) -> Option<f64> {
        None
    }

    /// The playhead jumped to `fraction` (0.0-1.0) of the track
    fn notify_seek(&mut self, _fraction: f64) {}

    fn track_loaded(&mut self, _track: &TrackInfo) {}

    fn track_unloaded(&mut self) {}
}
