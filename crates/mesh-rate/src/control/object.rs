//! A single observable scalar control
//!
//! Values are `f64` stored as bits in an `AtomicU64`, so readers on the audio
//! thread never block. Listeners are only invoked by [`ControlObject::set`],
//! which is meant for the UI/control thread. The audio thread writes its
//! outputs with [`ControlObject::publish`], which never touches the listener
//! list.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// Change listener, called with the new value on the writer's thread
pub type Listener = Arc<dyn Fn(f64) + Send + Sync>;

/// Key of a control: `(group, item)`, e.g. `("[Channel1]", "rate")`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ControlKey {
    pub group: String,
    pub item: String,
}

impl ControlKey {
    pub fn new(group: impl Into<String>, item: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            item: item.into(),
        }
    }
}

impl fmt::Display for ControlKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.group, self.item)
    }
}

/// Observable scalar value
pub struct ControlObject {
    key: ControlKey,
    bits: AtomicU64,
    default: f64,
    listeners: RwLock<Vec<Listener>>,
}

impl ControlObject {
    pub fn new(key: ControlKey, default: f64) -> Self {
        Self {
            key,
            bits: AtomicU64::new(default.to_bits()),
            default,
            listeners: RwLock::new(Vec::new()),
        }
    }

    pub fn key(&self) -> &ControlKey {
        &self.key
    }

    /// Current value (lock-free)
    #[inline]
    pub fn get(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Acquire))
    }

    /// Convenience for button-like controls
    #[inline]
    pub fn is_set(&self) -> bool {
        self.get() != 0.0
    }

    pub fn default_value(&self) -> f64 {
        self.default
    }

    /// Store a value without notifying listeners (real-time safe)
    #[inline]
    pub fn publish(&self, value: f64) {
        self.bits.store(value.to_bits(), Ordering::Release);
    }

    /// Store a value and notify listeners on the calling thread
    ///
    /// Never call this from the audio thread.
    pub fn set(&self, value: f64) {
        self.publish(value);
        // Clone out of the lock so listeners may set other controls
        let listeners: Vec<Listener> = match self.listeners.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        for listener in listeners {
            listener(value);
        }
    }

    /// Reset to the default value (notifies)
    pub fn reset(&self) {
        self.set(self.default);
    }

    /// Add to the value atomically (accumulator controls like `jog`)
    pub fn add(&self, delta: f64) {
        let mut current = self.bits.load(Ordering::Acquire);
        loop {
            let next = (f64::from_bits(current) + delta).to_bits();
            match self
                .bits
                .compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }

    /// Read the value and reset it to zero in one step (real-time safe)
    #[inline]
    pub fn take(&self) -> f64 {
        f64::from_bits(self.bits.swap(0.0f64.to_bits(), Ordering::AcqRel))
    }

    /// Register a change listener
    pub fn subscribe(&self, listener: Listener) {
        match self.listeners.write() {
            Ok(mut guard) => guard.push(listener),
            Err(poisoned) => poisoned.into_inner().push(listener),
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().map(|l| l.len()).unwrap_or(0)
    }
}

impl fmt::Debug for ControlObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlObject")
            .field("key", &self.key)
            .field("value", &self.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn control(default: f64) -> ControlObject {
        ControlObject::new(ControlKey::new("[Channel1]", "test"), default)
    }

    #[test]
    fn test_publish_does_not_notify() {
        let co = control(0.0);
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        co.subscribe(Arc::new(move |_| {
            c.fetch_add(1, Ordering::Relaxed);
        }));

        co.publish(0.5);
        assert_eq!(co.get(), 0.5);
        assert_eq!(calls.load(Ordering::Relaxed), 0);

        co.set(0.25);
        assert_eq!(co.get(), 0.25);
        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_accumulate_and_take() {
        let co = control(0.0);
        co.add(1.5);
        co.add(-0.5);
        assert_eq!(co.take(), 1.0);
        assert_eq!(co.get(), 0.0);
    }

    #[test]
    fn test_reset_to_default() {
        let co = control(0.08);
        co.set(0.5);
        co.reset();
        assert_eq!(co.get(), 0.08);
    }
}
