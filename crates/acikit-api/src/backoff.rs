// ── Backoff policy ──
//
// One exponential-backoff shape shared by request retries, the token
// refresh loop and WebSocket reconnects.

use std::time::Duration;

/// Exponential backoff configuration.
#[derive(Debug, Clone)]
pub struct Backoff {
    /// Delay before the first retry.
    pub initial_delay: Duration,

    /// Upper bound on a single delay.
    pub max_delay: Duration,

    /// Maximum attempts before giving up. `None` means retry forever.
    pub max_retries: Option<u32>,
}

impl Backoff {
    /// Transport retries for idempotent requests: 3 attempts, short delays.
    pub fn request_retry() -> Self {
        Self {
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(4),
            max_retries: Some(3),
        }
    }

    /// Token refresh and WebSocket reconnect: base 1s, cap 60s, forever.
    pub fn reconnect() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            max_retries: None,
        }
    }

    /// `true` once `attempt` retries have used up the budget.
    pub fn exhausted(&self, attempt: u32) -> bool {
        self.max_retries.is_some_and(|max| attempt >= max)
    }

    /// Delay before retry number `attempt` (0-based).
    ///
    /// `delay = min(initial * 2^attempt, max) * jitter`, jitter within ±25%.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.min(30)).unwrap_or(30);
        let base = self.initial_delay.as_secs_f64() * 2.0_f64.powi(exponent);
        let capped = base.min(self.max_delay.as_secs_f64());

        // Deterministic jitter seeded from the attempt number.
        let jitter_factor = 1.0 + 0.25 * (f64::from(attempt) * 7.3).sin();
        Duration::from_secs_f64((capped * jitter_factor).max(0.0))
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::reconnect()
    }
}
