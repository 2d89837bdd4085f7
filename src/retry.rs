use std::time::Duration;

/// How attempt delays grow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Same pause after every failed attempt.
    Fixed(Duration),
    /// Pause grows as `base * attempt` (attempt counted from 1).
    Linear(Duration),
}

/// Bounded retry policy shared by the listing scraper and the review pager.
///
/// The policy only decides *how long* and *how often*; which errors are
/// retryable stays with the call site.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub const fn fixed(max_attempts: usize, delay: Duration) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Fixed(delay),
        }
    }

    pub const fn linear(max_attempts: usize, base: Duration) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Linear(base),
        }
    }

    /// Full listing scrapes: up to 3 attempts, 2 s apart.
    pub const fn listing() -> Self {
        Self::fixed(3, Duration::from_secs(2))
    }

    /// Rate-limited review pages: up to 5 retries, 10 s * attempt apart.
    pub const fn rate_limit() -> Self {
        Self::linear(5, Duration::from_secs(10))
    }

    /// Pause to take after the given failed attempt (counted from 1).
    pub fn delay_after(&self, attempt: usize) -> Duration {
        match self.backoff {
            Backoff::Fixed(d) => d,
            Backoff::Linear(base) => base * attempt as u32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_delay_is_constant() {
        let policy = RetryPolicy::listing();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.delay_after(1), Duration::from_secs(2));
        assert_eq!(policy.delay_after(3), Duration::from_secs(2));
    }

    #[test]
    fn linear_delay_scales_with_attempt() {
        let policy = RetryPolicy::rate_limit();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.delay_after(1), Duration::from_secs(10));
        assert_eq!(policy.delay_after(2), Duration::from_secs(20));
        assert_eq!(policy.delay_after(5), Duration::from_secs(50));
    }
}
