//! Per-device RSSI update throttling.
//!
//! BLE advertisements arrive several times per second while scanning, and
//! forwarding every RSSI fluctuation churns the device list. The throttle
//! accepts at most one update per address per interval. It is not a general
//! rate limiter: there is no burst allowance and suppressed values are
//! dropped, not queued.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

/// Default minimum interval between accepted RSSI updates per address.
pub const DEFAULT_RSSI_INTERVAL: Duration = Duration::from_secs(3);

/// Rate limiter for per-device signal-strength updates.
///
/// Owned by the discovery engine instance and discarded with it, so
/// throttle state never leaks across scan sessions.
#[derive(Debug)]
pub struct RssiThrottle {
    interval: Duration,
    last_accepted: HashMap<String, Instant>,
}

impl RssiThrottle {
    /// Create a throttle with a custom interval.
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_accepted: HashMap::new(),
        }
    }

    /// Whether an RSSI update for this address should be forwarded now.
    ///
    /// Returns true and records the acceptance if the interval has elapsed
    /// since the last accepted update (or none was ever accepted); otherwise
    /// returns false without touching state.
    pub fn should_update(&mut self, address: &str) -> bool {
        let now = Instant::now();
        match self.last_accepted.get(address) {
            Some(last) if now.duration_since(*last) < self.interval => false,
            _ => {
                self.last_accepted.insert(address.to_string(), now);
                true
            }
        }
    }

    /// Drop all recorded timestamps, e.g. at the start of a new scan pass.
    pub fn reset(&mut self) {
        self.last_accepted.clear();
    }
}

impl Default for RssiThrottle {
    fn default() -> Self {
        Self::new(DEFAULT_RSSI_INTERVAL)
    }
}
