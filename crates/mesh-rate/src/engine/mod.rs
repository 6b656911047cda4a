//! Real-time rate engine
//!
//! This module contains the per-deck playback rate machinery:
//! - RateControl: combines slider, pitch bend, scratch and sync into one rate
//! - Ramp: pitch bend (temp) and slider step (perm) math
//! - Scratch: jog filtering, scratch sessions, position scratching
//! - Sync: master registry and follower tempo/phase matching
//! - EngineBuffer: the audio-thread host, DeckHandle: its control-thread side

mod bpm;
mod buffer;
mod command;
mod control;
mod handle;
pub mod ramp;
mod rate;
pub mod scratch;
pub mod sync;
mod vinyl;

pub use bpm::BpmControl;
pub use buffer::{EngineBuffer, PlaybackAtomics};
pub use command::{
    command_channel, CommandSender, EngineCommand, COMMAND_QUEUE_CAPACITY,
    MAX_COMMANDS_PER_CALLBACK,
};
pub use control::EngineControl;
pub use handle::DeckHandle;
pub use ramp::{RampDirection, RateRamp};
pub use rate::{RateControl, RateOutput, DEFAULT_RATE_RANGE, MIN_RATE_RANGE, SEARCH_SPEED};
pub use scratch::{PositionScratchController, ScratchSession, ScratchSource, ScratchTranslator};
pub use sync::{EngineSync, SyncCoordinator, SyncMode};
pub use vinyl::VinylControl;
