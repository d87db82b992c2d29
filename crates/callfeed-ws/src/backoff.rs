//! Reconnection policy.
//!
//! The subscriber itself never reconnects; a closed connection is terminal.
//! The owner consults this policy to decide whether and when to build a new
//! subscriber after `Closed(Some(_))`.

use std::time::Duration;

/// Exponent cap so the shift cannot overflow.
const MAX_EXPONENT: u32 = 10;

/// Exponential backoff with bounded jitter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Reconnect automatically at all.
    pub enabled: bool,
    /// Maximum consecutive reconnection attempts (0 = infinite).
    pub max_attempts: u32,
    /// Delay before the first reconnect.
    pub base_delay_ms: u64,
    /// Delay ceiling.
    pub max_delay_ms: u64,
    /// Upper bound of the random jitter added to each delay.
    pub jitter_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 0,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            jitter_ms: 1000,
        }
    }
}

impl ReconnectPolicy {
    /// Policy that never reconnects.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Whether reconnect number `attempt` (1-based) may proceed.
    pub fn allows(&self, attempt: u32) -> bool {
        self.enabled && (self.max_attempts == 0 || attempt <= self.max_attempts)
    }

    /// Delay before reconnect number `attempt` (1-based).
    ///
    /// `base * 2^(attempt-1)`, capped at `max_delay_ms`, plus jitter.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(MAX_EXPONENT);
        let delay = self
            .base_delay_ms
            .saturating_mul(1u64 << exponent)
            .min(self.max_delay_ms);
        Duration::from_millis(delay + self.jitter())
    }

    fn jitter(&self) -> u64 {
        if self.jitter_ms == 0 {
            return 0;
        }
        use std::time::{SystemTime, UNIX_EPOCH};
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.subsec_nanos())
            .unwrap_or(0);
        u64::from(nanos) % (self.jitter_ms + 1)
    }
}
