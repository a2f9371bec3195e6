//! Reconnect policy with exponential back-off.

use std::time::Duration;

/// Controls how the supervisor re-dials after a failed or dropped
/// connection.
///
/// The schedule is deterministic: `initial_delay * 2^attempt`, capped at
/// `max_delay`. The supervisor resets its attempt counter after a
/// successful auth handshake, so the schedule starts over once the engine
/// has been reachable.
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    /// Delay before the first reconnect attempt.
    pub initial_delay: Duration,
    /// Maximum delay between attempts (cap).
    pub max_delay: Duration,
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl ReconnectBackoff {
    /// Compute the delay for the given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_ms = self.initial_delay.as_millis() as u64;
        let factor = 1u64 << attempt.min(16);
        let delay_ms = base_ms.saturating_mul(factor);
        Duration::from_millis(delay_ms.min(self.max_delay.as_millis() as u64))
    }
}
