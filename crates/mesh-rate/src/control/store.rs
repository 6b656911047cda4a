//! Registry of named controls
//!
//! The map itself is behind an `RwLock` and is only consulted when wiring up
//! a deck or from UI code. Real-time code resolves its `Arc<ControlObject>`
//! handles once at construction and never looks anything up afterwards.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::object::{ControlKey, ControlObject, Listener};
use crate::error::{RateError, RateResult};

/// Shared parameter store
#[derive(Default)]
pub struct ControlStore {
    controls: RwLock<HashMap<ControlKey, Arc<ControlObject>>>,
}

impl ControlStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create a control
    ///
    /// If the control already exists its current value is kept and `default`
    /// is ignored, so two owners may safely declare the same control.
    pub fn create(&self, group: &str, item: &str, default: f64) -> Arc<ControlObject> {
        let key = ControlKey::new(group, item);
        if let Some(existing) = self.lookup(&key) {
            return existing;
        }
        let mut map = match self.controls.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Arc::clone(
            map.entry(key.clone())
                .or_insert_with(|| Arc::new(ControlObject::new(key, default))),
        )
    }

    /// Look up an existing control
    pub fn get(&self, group: &str, item: &str) -> Option<Arc<ControlObject>> {
        self.lookup(&ControlKey::new(group, item))
    }

    fn lookup(&self, key: &ControlKey) -> Option<Arc<ControlObject>> {
        let map = match self.controls.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        map.get(key).cloned()
    }

    fn require(&self, group: &str, item: &str) -> RateResult<Arc<ControlObject>> {
        self.get(group, item)
            .ok_or_else(|| RateError::UnknownControl(ControlKey::new(group, item)))
    }

    /// Read a control's value
    pub fn value(&self, group: &str, item: &str) -> RateResult<f64> {
        Ok(self.require(group, item)?.get())
    }

    /// Write a control's value and notify its listeners
    pub fn set_value(&self, group: &str, item: &str, value: f64) -> RateResult<()> {
        self.require(group, item)?.set(value);
        Ok(())
    }

    /// Subscribe to changes of a control
    pub fn subscribe<F>(&self, group: &str, item: &str, callback: F) -> RateResult<()>
    where
        F: Fn(f64) + Send + Sync + 'static,
    {
        let listener: Listener = Arc::new(callback);
        self.require(group, item)?.subscribe(listener);
        log::debug!("subscribe: {},{}", group, item);
        Ok(())
    }

    /// Number of registered controls
    pub fn len(&self) -> usize {
        self.controls.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
