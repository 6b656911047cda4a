//! Lock-free command queue from the control thread to a deck's audio thread
//!
//! Track loads, transport and settings snapshots are events: they are pushed
//! into a per-deck `rtrb` ring buffer and drained by
//! [`EngineBuffer`](super::EngineBuffer) at the start of each callback.
//! Everything that is a level (slider, buttons, scratch toggles and targets,
//! wheel) doesn't go through here; it is read straight from its atomic
//! control, so a full queue can't drop it.

use std::sync::Mutex;

use crate::config::RateSettings;
use crate::error::{RateError, RateResult};
use crate::types::TrackInfo;

/// Commands sent from the control thread to the audio thread
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EngineCommand {
    // ─────────────────────────────────────────────────────────────
    // Track / transport
    // ─────────────────────────────────────────────────────────────
    /// A track finished loading
    LoadTrack(TrackInfo),
    /// The deck was emptied
    UnloadTrack,
    Play,
    Pause,
    /// Jump to a position given as a fraction of the track (0.0-1.0)
    Seek { fraction: f64 },

    // ─────────────────────────────────────────────────────────────
    // Global
    // ─────────────────────────────────────────────────────────────
    /// New snapshot of the process-wide rate settings
    ApplySettings(RateSettings),
}

/// Capacity of each deck's command queue
pub const COMMAND_QUEUE_CAPACITY: usize = 256;

/// Maximum commands applied per callback
///
/// Keeps the worst-case callback time bounded if the UI floods the queue;
/// leftovers are picked up on the next callback.
pub const MAX_COMMANDS_PER_CALLBACK: usize = 64;

/// Create a new command channel (producer/consumer pair)
///
/// - Producer: send side, owned by the control thread
/// - Consumer: receive side, owned by the audio thread
pub fn command_channel() -> (rtrb::Producer<EngineCommand>, rtrb::Consumer<EngineCommand>) {
    rtrb::RingBuffer::new(COMMAND_QUEUE_CAPACITY)
}

/// Shareable send side of a deck's command queue
///
/// The producer is behind a mutex so several control-thread owners (the
/// deck's subscriptions, the settings holder) can share it. The audio thread
/// only ever sees the consumer, so this lock is never contended by it.
pub struct CommandSender {
    group: String,
    producer: Mutex<rtrb::Producer<EngineCommand>>,
}

impl CommandSender {
    pub fn new(group: impl Into<String>, producer: rtrb::Producer<EngineCommand>) -> Self {
        Self {
            group: group.into(),
            producer: Mutex::new(producer),
        }
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    /// Send a command to the audio thread
    ///
    /// Returns `QueueFull` if the queue is full (command dropped).
    pub fn send(&self, cmd: EngineCommand) -> RateResult<()> {
        let mut producer = match self.producer.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        producer.push(cmd).map_err(|_| {
            log::warn!("send: command queue full for {}, dropping {:?}", self.group, cmd);
            RateError::QueueFull {
                group: self.group.clone(),
            }
        })
    }

    /// Free slots left in the queue
    pub fn slots(&self) -> usize {
        self.producer.lock().map(|p| p.slots()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_channel_roundtrip() {
        let (tx, mut rx) = command_channel();
        let sender = CommandSender::new("[Channel1]", tx);

        sender.send(EngineCommand::Seek { fraction: 0.25 }).unwrap();

        let cmd = rx.pop().unwrap();
        assert_eq!(cmd, EngineCommand::Seek { fraction: 0.25 });
        assert!(rx.pop().is_err());
    }

    #[test]
    fn test_full_queue_reports_error() {
        let (tx, _rx) = command_channel();
        let sender = CommandSender::new("[Channel1]", tx);
        for _ in 0..COMMAND_QUEUE_CAPACITY {
            sender.send(EngineCommand::Play).unwrap();
        }
        assert!(matches!(
            sender.send(EngineCommand::Play),
            Err(RateError::QueueFull { .. })
        ));
        assert_eq!(sender.slots(), 0);
    }

    #[test]
    fn test_command_size() {
        // Settings snapshots are the largest payload; keep the enum compact
        let size = std::mem::size_of::<EngineCommand>();
        assert!(size <= 64, "EngineCommand is {} bytes, expected <= 64", size);
    }
}
