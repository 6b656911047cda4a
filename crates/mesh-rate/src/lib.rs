//! Mesh Rate - Playback rate control core for the DJ player
//!
//! Computes each deck's playback speed once per audio callback from the
//! pitch slider, pitch bend buttons, jog/scratch input and tempo sync.

pub mod config;
pub mod control;
pub mod engine;
pub mod error;
pub mod types;

pub use error::{RateError, RateResult};
pub use types::*;
