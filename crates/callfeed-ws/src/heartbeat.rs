//! Heartbeat monitoring for the stream connection.
//!
//! Any inbound frame counts as liveness. After `interval` of silence the
//! subscriber sends a protocol Ping; if nothing arrives within `timeout`
//! after that, the connection is considered dead.

use std::time::{Duration, Instant};
use tracing::debug;

/// Lower bound for the check period so a tiny config cannot spin the loop.
const MIN_CHECK_PERIOD: Duration = Duration::from_millis(10);

/// Tracks inbound activity and outstanding pings for one connection.
#[derive(Debug)]
pub struct HeartbeatMonitor {
    /// Silence before a ping is sent. Zero disables the heartbeat.
    interval: Duration,
    /// How long a ping may go unanswered.
    timeout: Duration,
    last_inbound: Instant,
    ping_sent_at: Option<Instant>,
}

impl HeartbeatMonitor {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval,
            timeout,
            last_inbound: Instant::now(),
            ping_sent_at: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.interval.is_zero()
    }

    /// Reset on a fresh connection.
    pub fn reset(&mut self, now: Instant) {
        self.last_inbound = now;
        self.ping_sent_at = None;
    }

    /// Record any inbound frame.
    pub fn record_inbound(&mut self, now: Instant) {
        if let Some(sent) = self.ping_sent_at.take() {
            let rtt_ms = now.saturating_duration_since(sent).as_millis() as u64;
            debug!(rtt_ms, "Heartbeat answered");
        }
        self.last_inbound = now;
    }

    /// Record that a ping was sent.
    pub fn record_ping(&mut self, now: Instant) {
        self.ping_sent_at = Some(now);
    }

    /// Whether an outstanding ping has gone unanswered for too long.
    pub fn is_timed_out(&self, now: Instant) -> bool {
        self.ping_sent_at
            .is_some_and(|sent| now.saturating_duration_since(sent) >= self.timeout)
    }

    /// Whether the connection has been silent long enough to ping it.
    pub fn should_ping(&self, now: Instant) -> bool {
        self.is_enabled()
            && self.ping_sent_at.is_none()
            && now.saturating_duration_since(self.last_inbound) >= self.interval
    }

    /// How often the owner should call `should_ping` / `is_timed_out`.
    pub fn check_period(&self) -> Duration {
        (self.interval.min(self.timeout) / 2).max(MIN_CHECK_PERIOD)
    }
}
