//! Retry utilities with exponential backoff and jitter.
//!
//! [`Backoff`] yields the sequence of delays the reconciliation driver
//! sleeps between attempts; [`sleep_or_cancel`] makes each sleep
//! interruptible and [`deadline_after`] turns a budget into a deadline.

use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Deadline used when a budget would overflow the clock (about 30 years)
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Backoff configuration for operations that may fail transiently.
#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Maximum number of attempts (0 = infinite)
    pub max_attempts: u32,
    /// Initial delay between retries
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
    /// Relative jitter applied to every delay (0.2 = ±20%)
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 0, // infinite
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter: 0.2,
        }
    }
}

/// Stateful exponential backoff: base delay doubling up to a cap, with
/// symmetric jitter applied to each yielded delay.
#[derive(Clone, Debug)]
pub struct Backoff {
    config: RetryConfig,
    current: Duration,
    attempt: u32,
}

impl Backoff {
    /// Start a new backoff sequence
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            config: config.clone(),
            current: config.initial_delay,
            attempt: 0,
        }
    }

    /// Number of delays handed out so far
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Whether the configured attempt limit has been reached
    pub fn exhausted(&self) -> bool {
        self.config.max_attempts > 0 && self.attempt >= self.config.max_attempts
    }

    /// Next jittered delay; advances the un-jittered base toward the cap.
    pub fn next_delay(&mut self) -> Duration {
        self.attempt += 1;
        let base = self.current.min(self.config.max_delay);
        let jitter = self.config.jitter.clamp(0.0, 1.0);
        let factor = if jitter > 0.0 {
            rand::thread_rng().gen_range((1.0 - jitter)..=(1.0 + jitter))
        } else {
            1.0
        };
        self.current = Duration::from_secs_f64(
            (base.as_secs_f64() * self.config.backoff_multiplier)
                .min(self.config.max_delay.as_secs_f64()),
        );
        Duration::from_secs_f64(base.as_secs_f64() * factor)
    }
}

/// The instant `budget` from now.
///
/// Budgets too large for the clock are capped at a far-future deadline
/// instead of overflowing.
pub fn deadline_after(budget: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(budget)
        .unwrap_or_else(|| now + FAR_FUTURE)
}

/// Sleep for `delay` unless `cancel` fires first.
///
/// Returns `false` when the sleep was interrupted by cancellation.
pub async fn sleep_or_cancel(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn test_attempt_limit() {
        let mut backoff = Backoff::new(&RetryConfig {
            max_attempts: 2,
            ..RetryConfig::default()
        });
        assert!(!backoff.exhausted());
        backoff.next_delay();
        assert!(!backoff.exhausted());
        backoff.next_delay();
        assert!(backoff.exhausted());

        let mut unlimited = Backoff::new(&RetryConfig::default());
        for _ in 0..100 {
            unlimited.next_delay();
        }
        assert!(!unlimited.exhausted());
    }

    #[test]
    fn test_backoff_doubles_within_jitter_and_caps() {
        let config = RetryConfig::default();
        let mut backoff = Backoff::new(&config);
        let bases = [1.0, 2.0, 4.0, 8.0, 16.0, 30.0, 30.0, 30.0];
        for base in bases {
            let d = backoff.next_delay().as_secs_f64();
            assert!(d >= base * 0.8 - 1e-9, "{} below jitter floor of {}", d, base);
            assert!(d <= base * 1.2 + 1e-9, "{} above jitter ceiling of {}", d, base);
        }
        assert!(backoff.next_delay() <= Duration::from_secs(36));
    }

    #[test]
    fn test_backoff_without_jitter_is_exact() {
        let config = RetryConfig {
            jitter: 0.0,
            ..RetryConfig::default()
        };
        let mut backoff = Backoff::new(&config);
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
        assert_eq!(backoff.next_delay(), Duration::from_secs(2));
        assert_eq!(backoff.next_delay(), Duration::from_secs(4));
        assert_eq!(backoff.attempt(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_after_caps_huge_budgets() {
        let start = Instant::now();
        assert_eq!(deadline_after(Duration::from_secs(5)), start + Duration::from_secs(5));

        let capped = deadline_after(Duration::from_secs(u64::MAX));
        assert!(capped > start + Duration::from_secs(86_400 * 365));
        let capped = deadline_after(Duration::MAX);
        assert!(capped > start + Duration::from_secs(86_400 * 365));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_or_cancel_interrupts() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let start = tokio::time::Instant::now();
        assert!(!sleep_or_cancel(Duration::from_secs(30), &cancel).await);
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
