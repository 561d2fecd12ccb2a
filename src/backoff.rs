// src/backoff.rs
use std::time::Duration;

/// Exponential backoff schedule with a bounded attempt count.
///
/// The delay before retrying attempt `n` (1-based) is `base * 2^(n-1)`,
/// capped at `cap`. Both fetch and dispatch retries share this schedule so
/// the attempt/delay sequence stays part of the observable contract.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    pub max_attempts: u32,
    pub base: Duration,
    pub cap: Duration,
}

impl Backoff {
    pub fn new(max_attempts: u32, base: Duration, cap: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base,
            cap,
        }
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        // Shift bound keeps the multiplier inside u32 range.
        let exp = attempt.saturating_sub(1).min(20);
        self.base.saturating_mul(1u32 << exp).min(self.cap)
    }
}
