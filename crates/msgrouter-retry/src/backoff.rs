use rand::Rng;
use std::time::Duration;

/// Computes the delay to wait before a retry.
///
/// `retry` is 1-based: `delay(1)` is the wait between the first attempt and
/// the first retry. Any `Fn(usize) -> Duration` closure is a backoff.
pub trait Backoff: Send + Sync {
    fn delay(&self, retry: usize) -> Duration;
}

impl<F> Backoff for F
where
    F: Fn(usize) -> Duration + Send + Sync,
{
    fn delay(&self, retry: usize) -> Duration {
        self(retry)
    }
}

/// Waits the same amount of time before every retry.
#[derive(Debug, Clone, Copy)]
pub struct ConstantBackoff(pub Duration);

impl Backoff for ConstantBackoff {
    fn delay(&self, _retry: usize) -> Duration {
        self.0
    }
}

/// Exponentially growing delays, optionally randomized.
///
/// Retry `n` waits `initial * multiplier^(n-1)`, capped at the maximum
/// interval. With a randomization factor `f`, the delay is drawn uniformly
/// from `[d * (1 - f), d * (1 + f)]` and then capped again, so the cap holds
/// for randomized delays too.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    initial: Duration,
    multiplier: f64,
    cap: Option<Duration>,
    randomization: f64,
}

impl ExponentialBackoff {
    /// Doubles from `initial` without a cap or randomization.
    pub fn new(initial: Duration) -> Self {
        Self {
            initial,
            multiplier: 2.0,
            cap: None,
            randomization: 0.0,
        }
    }

    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    pub fn max_interval(mut self, cap: Duration) -> Self {
        self.cap = Some(cap);
        self
    }

    /// Clamped to `0.0..=1.0`.
    pub fn randomization_factor(mut self, factor: f64) -> Self {
        self.randomization = factor.clamp(0.0, 1.0);
        self
    }

    fn capped(&self, delay: Duration) -> Duration {
        self.cap.map_or(delay, |cap| delay.min(cap))
    }

    fn scheduled(&self, retry: usize) -> Duration {
        let exponent = i32::try_from(retry.saturating_sub(1)).unwrap_or(i32::MAX);
        let secs = self.initial.as_secs_f64() * self.multiplier.powi(exponent);
        // An overflowing product saturates rather than panicking.
        self.capped(Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX))
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if self.randomization == 0.0 {
            return delay;
        }
        let secs = delay.as_secs_f64();
        let spread = secs * self.randomization;
        let drawn = rand::rng().random_range((secs - spread)..=(secs + spread));
        self.capped(Duration::try_from_secs_f64(drawn.max(0.0)).unwrap_or(delay))
    }
}

impl Backoff for ExponentialBackoff {
    fn delay(&self, retry: usize) -> Duration {
        self.jittered(self.scheduled(retry))
    }
}
