use std::time::Duration;

/// Exponential backoff with an upper bound and optional jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base: Duration,
    pub max: Duration,
    pub jitter: bool,
}

impl Backoff {
    pub const fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            jitter: false,
        }
    }

    pub const fn with_jitter(mut self) -> Self {
        self.jitter = true;
        self
    }

    /// Delay before retry number `attempt` (0-based): `base * 2^attempt`,
    /// capped at `max`. With jitter, up to 25% of the delay is added (still capped).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(16));
        let delay = self.base.saturating_mul(factor).min(self.max);
        if self.jitter {
            let extra_ms = (delay.as_millis() as u64) / 4;
            let jitter = Duration::from_millis(fastrand::u64(0..=extra_ms));
            (delay + jitter).min(self.max)
        } else {
            delay
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(500), Duration::from_secs(5))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_until_capped() {
        let backoff = Backoff::default();
        assert_eq!(backoff.delay_for_attempt(0), Duration::from_millis(500));
        assert_eq!(backoff.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(backoff.delay_for_attempt(2), Duration::from_secs(2));
        assert_eq!(backoff.delay_for_attempt(3), Duration::from_secs(4));
        assert_eq!(backoff.delay_for_attempt(4), Duration::from_secs(5));
        assert_eq!(backoff.delay_for_attempt(u32::MAX), Duration::from_secs(5));
    }

    #[test]
    fn jitter_never_exceeds_cap() {
        let backoff = Backoff::new(Duration::from_millis(100), Duration::from_secs(30)).with_jitter();
        for attempt in 0..20 {
            let delay = backoff.delay_for_attempt(attempt);
            assert!(delay <= Duration::from_secs(30), "attempt {attempt}: {delay:?}");
            assert!(delay >= Backoff::new(backoff.base, backoff.max).delay_for_attempt(attempt));
        }
    }
}
