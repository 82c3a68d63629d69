use crate::backoff::Backoff;
use std::sync::Arc;
use std::time::Duration;

/// Retry budget of a single message.
///
/// Combines the maximum number of retries, the optional elapsed-time budget
/// (measured from the first attempt), and the backoff strategy.
pub struct RetryPolicy {
    pub(crate) max_retries: usize,
    pub(crate) max_elapsed_time: Option<Duration>,
    pub(crate) backoff: Arc<dyn Backoff>,
}

impl RetryPolicy {
    pub fn new(max_retries: usize, backoff: Arc<dyn Backoff>) -> Self {
        Self {
            max_retries,
            max_elapsed_time: None,
            backoff,
        }
    }

    /// Bounds the total time since the first attempt. `None` or zero is unbounded.
    pub fn with_max_elapsed_time(mut self, max_elapsed_time: Option<Duration>) -> Self {
        self.max_elapsed_time = max_elapsed_time.filter(|d| !d.is_zero());
        self
    }

    pub fn max_retries(&self) -> usize {
        self.max_retries
    }

    pub fn max_elapsed_time(&self) -> Option<Duration> {
        self.max_elapsed_time
    }

    pub fn retries_enabled(&self) -> bool {
        self.max_retries > 0
    }

    /// Decides whether retry number `retry` (1-based) may start `elapsed`
    /// after the first attempt began, its backoff delay included.
    pub fn allows(&self, retry: usize, elapsed: Duration) -> bool {
        if !self.retries_enabled() || retry > self.max_retries {
            return false;
        }
        match self.max_elapsed_time {
            Some(budget) => elapsed <= budget,
            None => true,
        }
    }

    /// Computes the delay before retry number `retry` (1-based).
    pub fn next_backoff(&self, retry: usize) -> Duration {
        self.backoff.delay(retry)
    }
}
