//! Error-adaptive spacing between outbound requests.

use core::time::Duration;

use rand::Rng;

use crate::config::BackoffConfig;

/// Exponential backoff with appended full jitter.
///
/// Every failure doubles the base delay (capped at `cap`) and schedules a wait of
/// `delay + uniform(0, delay)` for the *next* request. A success resets the
/// failure streak but does not cancel a wait that is already scheduled.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    cap: Duration,
    consecutive_errors: u32,
    pending: Option<Duration>,
}

impl Backoff {
    #[must_use]
    pub const fn new(base: Duration, cap: Duration) -> Self {
        Self {
            base,
            cap,
            consecutive_errors: 0,
            pending: None,
        }
    }

    #[must_use]
    pub fn from_config(cfg: &BackoffConfig) -> Self {
        Self::new(
            Duration::from_secs_f64(cfg.base_unit),
            Duration::from_secs_f64(cfg.max_cap),
        )
    }

    #[must_use]
    pub const fn consecutive_errors(&self) -> u32 {
        self.consecutive_errors
    }

    /// `min(base * 2^k, cap)` for the current streak `k`.
    #[must_use]
    pub fn base_delay(&self) -> Duration {
        if self.base.is_zero() {
            return Duration::ZERO;
        }
        let factor = 2f64.powi(self.consecutive_errors.min(64) as i32);
        let secs = (self.base.as_secs_f64() * factor).min(self.cap.as_secs_f64());
        Duration::from_secs_f64(secs)
    }

    pub fn on_success(&mut self) {
        self.consecutive_errors = 0;
    }

    /// Records a failure and returns the wait scheduled before the next request.
    pub fn on_failure<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Duration {
        self.consecutive_errors = self.consecutive_errors.saturating_add(1);
        let delay = self.base_delay();
        let wait = delay.saturating_add(delay.mul_f64(rng.random::<f64>()));
        self.pending = Some(wait);
        wait
    }

    /// Hands out the scheduled wait once; later calls return `None` until the next failure.
    pub fn take_pending(&mut self) -> Option<Duration> {
        self.pending.take()
    }
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    fn half_second_backoff() -> Backoff {
        Backoff::new(Duration::from_millis(500), Duration::from_secs(60))
    }

    #[test]
    fn third_failure_waits_between_four_and_eight_seconds() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut backoff = half_second_backoff();
        let mut wait = Duration::ZERO;
        for _ in 0..3 {
            wait = backoff.on_failure(&mut rng);
        }
        assert_eq!(backoff.consecutive_errors(), 3);
        assert_eq!(backoff.base_delay(), Duration::from_secs(4));
        assert!(wait >= Duration::from_secs(4));
        assert!(wait < Duration::from_secs(8));
    }

    #[test]
    fn delay_is_capped() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut backoff = half_second_backoff();
        for _ in 0..200 {
            let wait = backoff.on_failure(&mut rng);
            assert!(wait <= Duration::from_secs(120));
        }
        assert_eq!(backoff.base_delay(), Duration::from_secs(60));
    }

    #[test]
    fn success_resets_streak_but_keeps_scheduled_wait() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut backoff = half_second_backoff();
        let wait = backoff.on_failure(&mut rng);
        backoff.on_success();
        assert_eq!(backoff.consecutive_errors(), 0);
        assert_eq!(backoff.base_delay(), Duration::from_millis(500));
        assert_eq!(backoff.take_pending(), Some(wait));
        assert_eq!(backoff.take_pending(), None);
    }

    #[test]
    fn zero_base_never_waits() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut backoff = Backoff::new(Duration::ZERO, Duration::from_secs(60));
        for _ in 0..100 {
            assert_eq!(backoff.on_failure(&mut rng), Duration::ZERO);
        }
    }
}
