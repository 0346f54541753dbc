//! Per-leg liveness tracking (ping/pong accounting).
//!
//! Each leg's writer sends a Ping every interval and checks whether the
//! peer answered since the previous tick. A leg that misses its full pong
//! budget is treated exactly like a transport error: the session closes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Tracks whether one leg of a session is still answering pings.
#[derive(Debug)]
pub struct LegHealth {
    /// Whether the peer responded since the last heartbeat check.
    alive: AtomicBool,
    /// When the last Pong (or Ping) was received.
    last_pong: Mutex<Instant>,
}

impl LegHealth {
    /// A freshly established leg counts as alive.
    #[must_use]
    pub fn new() -> Self {
        Self {
            alive: AtomicBool::new(true),
            last_pong: Mutex::new(Instant::now()),
        }
    }

    /// Record a pong (or inbound ping — either proves the peer is there).
    pub fn mark_alive(&self) {
        self.alive.store(true, Ordering::Relaxed);
        *self.last_pong.lock() = Instant::now();
    }

    /// Check and reset the alive flag for the heartbeat tick.
    ///
    /// Returns `true` if the leg answered since the previous check.
    pub fn check_alive(&self) -> bool {
        self.alive.swap(false, Ordering::Relaxed)
    }

    /// Duration since the last pong (or leg establishment).
    pub fn last_pong_elapsed(&self) -> Duration {
        self.last_pong.lock().elapsed()
    }
}

impl Default for LegHealth {
    fn default() -> Self {
        Self::new()
    }
}

/// How many consecutive missed heartbeat checks a leg is allowed.
///
/// Computed as `timeout / interval`, clamped to at least 1 so a timeout
/// shorter than the interval still allows one full interval.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn max_missed_pongs(interval: Duration, timeout: Duration) -> u32 {
    let interval_ms = interval.as_millis().max(1);
    ((timeout.as_millis() / interval_ms) as u32).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_leg_is_alive() {
        let health = LegHealth::new();
        assert!(health.check_alive());
    }

    #[test]
    fn check_resets_the_flag() {
        let health = LegHealth::new();
        assert!(health.check_alive());
        assert!(!health.check_alive());
    }

    #[test]
    fn mark_alive_sets_the_flag_again() {
        let health = LegHealth::new();
        let _ = health.check_alive();
        health.mark_alive();
        assert!(health.check_alive());
    }

    #[test]
    fn last_pong_updates_on_mark() {
        let health = LegHealth::new();
        std::thread::sleep(Duration::from_millis(10));
        let before = health.last_pong_elapsed();
        health.mark_alive();
        let after = health.last_pong_elapsed();
        assert!(after < before);
    }

    #[test]
    fn pong_budget_is_timeout_over_interval() {
        assert_eq!(
            max_missed_pongs(Duration::from_secs(30), Duration::from_secs(90)),
            3
        );
        assert_eq!(
            max_missed_pongs(Duration::from_millis(100), Duration::from_millis(450)),
            4
        );
    }

    #[test]
    fn pong_budget_is_at_least_one() {
        assert_eq!(
            max_missed_pongs(Duration::from_secs(60), Duration::from_secs(5)),
            1
        );
        assert_eq!(max_missed_pongs(Duration::ZERO, Duration::ZERO), 1);
    }
}
