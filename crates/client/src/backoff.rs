//! Reconnection backoff math.
//!
//! Deliberately free of any runtime dependency so the policy is testable as
//! plain arithmetic; the connection manager owns the actual waiting.

/// Delay before the first retry, in milliseconds.
pub const INITIAL_RETRY_DELAY_MS: u64 = 1_000;

/// Ceiling on total connection attempts (the initial attempt included).
pub const MAX_RETRY_ATTEMPTS: u32 = 5;

/// Upper bound on any single backoff delay.
pub const MAX_RETRY_DELAY_MS: u64 = 30_000;

/// Exponential backoff state for one connect/reconnect cycle.
///
/// Attempt `n` failing records failure number `n`; the delay returned before
/// attempt `n + 1` is `base * 2^(n-1)`, capped at [`MAX_RETRY_DELAY_MS`].
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    attempts: u32,
    max_attempts: u32,
    base_delay_ms: u64,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(MAX_RETRY_ATTEMPTS, INITIAL_RETRY_DELAY_MS)
    }
}

impl Backoff {
    pub fn new(max_attempts: u32, base_delay_ms: u64) -> Self {
        Self {
            attempts: 0,
            max_attempts,
            base_delay_ms,
        }
    }

    /// Failures (or unexpected disconnects) recorded so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }

    /// Record one failed attempt.
    ///
    /// Returns the delay to wait before the next attempt, or `None` once the
    /// ceiling is reached and no further attempt may be scheduled.
    pub fn record_failure(&mut self) -> Option<u64> {
        self.attempts += 1;
        if self.is_exhausted() {
            return None;
        }
        Some(self.delay_for(self.attempts))
    }

    /// `base * 2^(n-1)` for failure count `n`, capped.
    fn delay_for(&self, failures: u32) -> u64 {
        let factor = 1u64 << failures.saturating_sub(1).min(32);
        self.base_delay_ms
            .saturating_mul(factor)
            .min(MAX_RETRY_DELAY_MS)
    }

    /// Reset after a successful connect.
    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_double_per_failure() {
        let mut backoff = Backoff::new(5, 1_000);
        assert_eq!(backoff.record_failure(), Some(1_000));
        assert_eq!(backoff.record_failure(), Some(2_000));
        assert_eq!(backoff.record_failure(), Some(4_000));
        assert_eq!(backoff.record_failure(), Some(8_000));
    }

    #[test]
    fn ceiling_stops_scheduling() {
        let mut backoff = Backoff::new(5, 1_000);
        for _ in 0..4 {
            assert!(backoff.record_failure().is_some());
        }
        // Fifth failure hits the ceiling: no sixth attempt gets a delay.
        assert_eq!(backoff.record_failure(), None);
        assert!(backoff.is_exhausted());
        assert_eq!(backoff.attempts(), 5);
    }

    #[test]
    fn delay_is_capped() {
        let mut backoff = Backoff::new(32, 1_000);
        let mut last = 0;
        for _ in 0..20 {
            if let Some(delay) = backoff.record_failure() {
                last = delay;
            }
        }
        assert_eq!(last, MAX_RETRY_DELAY_MS);
    }

    #[test]
    fn reset_restarts_the_schedule() {
        let mut backoff = Backoff::new(5, 1_000);
        backoff.record_failure();
        backoff.record_failure();
        backoff.reset();
        assert_eq!(backoff.attempts(), 0);
        assert_eq!(backoff.record_failure(), Some(1_000));
    }
}
