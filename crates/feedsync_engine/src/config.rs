//! Configuration for the sync engine.

use std::time::Duration;

/// Configuration for sync cycles.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Items requested per page.
    pub item_batch_size: u32,
    /// Stop fetching items after this many in one cycle.
    pub max_items: Option<usize>,
    /// Maximum number of mutations pushed per cycle.
    pub push_limit: usize,
    /// Timeout of each network call.
    pub timeout: Duration,
    /// Fetch folders and feeds concurrently.
    pub parallel_fetch: bool,
    /// Probe the account at the start of every cycle.
    pub revalidate_each_cycle: bool,
    /// Interval between timer-triggered cycles.
    pub sync_interval: Duration,
    /// Backoff after failed cycles.
    pub retry: RetryConfig,
}

impl SyncConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self {
            item_batch_size: 200,
            max_items: None,
            push_limit: 500,
            timeout: Duration::from_secs(30),
            parallel_fetch: true,
            revalidate_each_cycle: true,
            sync_interval: Duration::from_secs(15 * 60),
            retry: RetryConfig::default(),
        }
    }

    /// Sets the item page size.
    pub fn with_item_batch_size(mut self, size: u32) -> Self {
        self.item_batch_size = size;
        self
    }

    /// Caps the number of items fetched per cycle.
    pub fn with_max_items(mut self, max_items: usize) -> Self {
        self.max_items = Some(max_items);
        self
    }

    /// Sets the number of mutations pushed per cycle.
    pub fn with_push_limit(mut self, limit: usize) -> Self {
        self.push_limit = limit;
        self
    }

    /// Sets the per-call timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Enables or disables concurrent folder and feed fetching.
    pub fn with_parallel_fetch(mut self, parallel: bool) -> Self {
        self.parallel_fetch = parallel;
        self
    }

    /// Enables or disables validation at the start of every cycle.
    pub fn with_revalidate_each_cycle(mut self, revalidate: bool) -> Self {
        self.revalidate_each_cycle = revalidate;
        self
    }

    /// Sets the interval for timer-triggered cycles.
    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval;
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Backoff between failed cycles.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Delay after the first failure.
    pub initial_delay: Duration,
    /// Ceiling for the delay.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Whether to add jitter to delays.
    pub add_jitter: bool,
}

impl RetryConfig {
    /// Creates a configuration starting at `initial_delay`.
    pub fn new(initial_delay: Duration) -> Self {
        Self {
            initial_delay,
            max_delay: Duration::from_secs(30 * 60),
            backoff_multiplier: 2.0,
            add_jitter: true,
        }
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Enables or disables jitter.
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.add_jitter = jitter;
        self
    }

    /// Calculates the delay after `failures` consecutive failed cycles.
    ///
    /// Zero failures means no delay.
    pub fn delay_for_attempt(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(failures - 1).unwrap_or(i32::MAX);
        let base_delay = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        let delay_secs = base_delay.min(self.max_delay.as_secs_f64());

        if self.add_jitter {
            // Up to 25% on top of the capped delay
            let jitter = delay_secs * 0.25 * rand_jitter();
            Duration::from_secs_f64(delay_secs + jitter)
        } else {
            Duration::from_secs_f64(delay_secs)
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

/// Pseudo-random value in `[0, 1)` from the clock.
fn rand_jitter() -> f64 {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    f64::from(nanos % 1000) / 1000.0
}
