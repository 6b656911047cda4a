//! Canonical owner of the process-wide rate settings
//!
//! Every deck runs on an immutable snapshot of [`RateSettings`]. Changing a
//! setting here clamps it, stores it, and pushes the new snapshot into the
//! command queue of every attached deck, so a change reaches all decks
//! without any deck reading shared mutable state on the audio thread.

use std::sync::{Arc, RwLock};

use super::RateSettings;
use crate::engine::{CommandSender, EngineCommand};

/// Process-wide settings holder
pub struct SettingsHolder {
    current: RwLock<RateSettings>,
    decks: RwLock<Vec<Arc<CommandSender>>>,
}

impl SettingsHolder {
    pub fn new(settings: RateSettings) -> Self {
        Self {
            current: RwLock::new(settings.clamped()),
            decks: RwLock::new(Vec::new()),
        }
    }

    /// Current snapshot
    pub fn snapshot(&self) -> RateSettings {
        match self.current.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Attach a deck so it receives future snapshots
    pub fn attach(&self, sender: Arc<CommandSender>) {
        log::debug!("SettingsHolder: attaching {}", sender.group());
        match self.decks.write() {
            Ok(mut decks) => decks.push(sender),
            Err(poisoned) => poisoned.into_inner().push(sender),
        }
    }

    /// Modify the settings and broadcast the result to all decks
    pub fn update<F>(&self, f: F) -> RateSettings
    where
        F: FnOnce(&mut RateSettings),
    {
        let snapshot = {
            let mut guard = match self.current.write() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            f(&mut guard);
            *guard = guard.clamped();
            *guard
        };
        self.broadcast(snapshot);
        snapshot
    }

    /// Replace the settings wholesale (e.g. after loading a config file)
    pub fn replace(&self, settings: RateSettings) -> RateSettings {
        self.update(|s| *s = settings)
    }

    fn broadcast(&self, snapshot: RateSettings) {
        let decks = match self.decks.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        log::info!(
            "SettingsHolder: broadcasting to {} decks (ramp {:?}, sensitivity {})",
            decks.len(),
            snapshot.ramp_mode,
            snapshot.ramp_sensitivity
        );
        for deck in decks.iter() {
            // A full queue already logged; the deck keeps its previous snapshot
            let _ = deck.send(EngineCommand::ApplySettings(snapshot));
        }
    }
}

impl Default for SettingsHolder {
    fn default() -> Self {
        Self::new(RateSettings::default())
    }
}
