use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use uuid::Uuid;

/// Minimum spacing between repeated notifications for a sustained `down`
/// status, scaled by how long the monitor has been failing.
pub fn backoff(failure_count: u32) -> Duration {
    match failure_count {
        0..3 => Duration::from_secs(5 * 60),
        3..10 => Duration::from_secs(15 * 60),
        10..20 => Duration::from_secs(30 * 60),
        _ => Duration::from_secs(60 * 60),
    }
}

/// Tracks when each monitor was last notified about, so a sustained outage
/// does not page on every check cycle.
///
/// State lives for the process lifetime only; a restart re-triggering fresh
/// notifications is acceptable.
pub struct NotificationThrottle {
    last_notified: Mutex<HashMap<Uuid, Instant>>,
}

impl NotificationThrottle {
    pub fn new() -> Self {
        Self { last_notified: Mutex::new(HashMap::new()) }
    }

    /// Decide whether a repeat notification may fire for this monitor, and
    /// stamp the send time when it may. The check-and-stamp is atomic per
    /// monitor so two concurrent cycles cannot both pass.
    pub fn should_notify(&self, monitor_id: Uuid, failure_count: u32) -> bool {
        self.should_notify_at(monitor_id, failure_count, Instant::now())
    }

    fn should_notify_at(&self, monitor_id: Uuid, failure_count: u32, now: Instant) -> bool {
        let mut map = self.last_notified.lock().unwrap_or_else(|e| e.into_inner());
        match map.get(&monitor_id) {
            Some(&last) if now.duration_since(last) < backoff(failure_count) => false,
            _ => {
                map.insert(monitor_id, now);
                true
            }
        }
    }

    /// Drop throttle state for a monitor that left the live set.
    pub fn forget(&self, monitor_id: Uuid) {
        let mut map = self.last_notified.lock().unwrap_or_else(|e| e.into_inner());
        map.remove(&monitor_id);
    }
}

impl Default for NotificationThrottle {
    fn default() -> Self {
        Self::new()
    }
}
