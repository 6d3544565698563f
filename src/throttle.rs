//! Rate limiting of per-resource progress notifications

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Per-resource throttle for "cache updated" notifications
///
/// The first attempt for a resource always passes. Later attempts pass only
/// once `interval` has elapsed since the last one that passed; everything in
/// between is dropped, not deferred.
#[derive(Debug)]
pub struct NotifyThrottle {
    interval: RwLock<Duration>,
    last_emitted: Mutex<HashMap<String, Instant>>,
}

impl NotifyThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: RwLock::new(interval),
            last_emitted: Mutex::new(HashMap::new()),
        }
    }

    pub fn interval(&self) -> Duration {
        *self.interval.read()
    }

    pub fn set_interval(&self, interval: Duration) {
        *self.interval.write() = interval;
    }

    /// Decide whether an update for `resource_key` may be emitted now
    pub fn try_acquire(&self, resource_key: &str) -> bool {
        self.try_acquire_at(resource_key, Instant::now())
    }

    /// Same as [`try_acquire`](Self::try_acquire) with an explicit clock reading
    pub fn try_acquire_at(&self, resource_key: &str, now: Instant) -> bool {
        let interval = self.interval();
        let mut last_emitted = self.last_emitted.lock();

        match last_emitted.get_mut(resource_key) {
            Some(last) if now.saturating_duration_since(*last) < interval => false,
            Some(last) => {
                *last = now;
                true
            }
            None => {
                last_emitted.insert(resource_key.to_string(), now);
                true
            }
        }
    }

    /// Forget the throttle state of a resource
    ///
    /// Called when a download session finishes so the next session starts
    /// with an immediate update.
    pub fn reset(&self, resource_key: &str) {
        self.last_emitted.lock().remove(resource_key);
    }

    pub fn clear(&self) {
        self.last_emitted.lock().clear();
    }

    /// Number of resources with live throttle state
    pub fn tracked(&self) -> usize {
        self.last_emitted.lock().len()
    }
}
