//! Wall-clock/monotonic time abstraction, swappable for deterministic tests.

use std::sync::RwLock;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Supplies both a monotonic instant (for RTT/timeout math) and a wall-clock
/// reading in milliseconds since the Unix epoch (for reconciling PTP
/// timestamps carried on the wire with local time).
pub trait TimeProvider: Send + Sync {
    fn now_instant(&self) -> Instant;
    fn now_system_ms(&self) -> i64;
}

/// The default provider, backed by the OS clock.
#[derive(Debug, Default)]
pub struct SystemTimeProvider;

impl TimeProvider for SystemTimeProvider {
    fn now_instant(&self) -> Instant {
        Instant::now()
    }

    fn now_system_ms(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as i64
    }
}

/// A manually-advanced clock for deterministic tests.
#[derive(Debug)]
pub struct ManualTimeProvider {
    instant: RwLock<Instant>,
    system_ms: RwLock<i64>,
}

impl ManualTimeProvider {
    pub fn new(instant: Instant, system_ms: i64) -> Self {
        Self {
            instant: RwLock::new(instant),
            system_ms: RwLock::new(system_ms),
        }
    }

    pub fn advance(&self, duration: Duration) {
        *self.instant.write().unwrap() += duration;
        *self.system_ms.write().unwrap() += duration.as_millis() as i64;
    }

    pub fn set(&self, instant: Instant, system_ms: i64) {
        *self.instant.write().unwrap() = instant;
        *self.system_ms.write().unwrap() = system_ms;
    }
}

impl TimeProvider for ManualTimeProvider {
    fn now_instant(&self) -> Instant {
        *self.instant.read().unwrap()
    }

    fn now_system_ms(&self) -> i64 {
        *self.system_ms.read().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances_both_axes() {
        let clock = ManualTimeProvider::new(Instant::now(), 1_000);
        let before = clock.now_instant();
        clock.advance(Duration::from_millis(250));
        assert_eq!(clock.now_instant() - before, Duration::from_millis(250));
        assert_eq!(clock.now_system_ms(), 1_250);
    }
}
