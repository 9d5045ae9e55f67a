//! Configuration for the sync engine.

use crate::http::ResponseBody;
use rand::Rng;
use std::time::Duration;

/// Storage key of the persisted operation queue.
pub const QUEUE_KEY: &str = "closetsync.queue";

/// Storage key of the last successful sync timestamp.
pub const LAST_SYNC_KEY: &str = "closetsync.last_sync";

/// Storage key of the persisted profile snapshot.
pub const PROFILE_KEY: &str = "closetsync.profile";

/// Configuration for sync operations.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Server base URL.
    pub base_url: String,
    /// Interval of the periodic sync timer.
    pub sync_interval: Duration,
    /// Failed delivery attempts after which an operation is abandoned.
    pub max_operation_retries: u32,
    /// Call options used when dispatching queued operations.
    pub dispatch: CallOptions,
    /// Call options used when fetching the remote snapshot.
    pub fetch: CallOptions,
}

impl SyncConfig {
    /// Creates a new sync configuration.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            sync_interval: Duration::from_secs(30),
            max_operation_retries: 5,
            dispatch: CallOptions::new().with_retries(0),
            fetch: CallOptions::new(),
        }
    }

    /// Sets the periodic sync interval.
    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval;
        self
    }

    /// Sets the retry ceiling for queued operations.
    pub fn with_max_operation_retries(mut self, retries: u32) -> Self {
        self.max_operation_retries = retries;
        self
    }

    /// Sets the call options used for dispatch.
    pub fn with_dispatch_options(mut self, options: CallOptions) -> Self {
        self.dispatch = options;
        self
    }

    /// Sets the call options used for snapshot fetches.
    pub fn with_fetch_options(mut self, options: CallOptions) -> Self {
        self.fetch = options;
        self
    }

    /// Sets the per-attempt timeout for both dispatch and fetch.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.dispatch.timeout = timeout;
        self.fetch.timeout = timeout;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new("http://localhost:8000")
    }
}

/// Delay policy between retries of a single call.
#[derive(Debug, Clone, PartialEq)]
pub enum Backoff {
    /// Every retry waits the base delay.
    Fixed,
    /// The delay grows by `multiplier` per retry, capped at `max_delay`.
    Exponential {
        /// Growth factor per retry.
        multiplier: f64,
        /// Upper bound for a single delay.
        max_delay: Duration,
        /// Adds up to 25% random jitter.
        jitter: bool,
    },
}

impl Backoff {
    /// Exponential backoff doubling up to 30 seconds, with jitter.
    pub fn exponential() -> Self {
        Backoff::Exponential {
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
            jitter: true,
        }
    }

    /// Calculates the delay before a retry (1-indexed).
    pub fn delay_for_retry(&self, base: Duration, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }

        match self {
            Backoff::Fixed => base,
            Backoff::Exponential {
                multiplier,
                max_delay,
                jitter,
            } => {
                let exponent = i32::try_from(retry - 1).unwrap_or(i32::MAX);
                let delay_secs = (base.as_secs_f64() * multiplier.powi(exponent))
                    .min(max_delay.as_secs_f64());

                if *jitter {
                    let spread = rand::thread_rng().gen_range(0.0..=0.25);
                    Duration::from_secs_f64(delay_secs * (1.0 + spread))
                } else {
                    Duration::from_secs_f64(delay_secs)
                }
            }
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff::Fixed
    }
}

/// Options for a single network call.
#[derive(Debug, Clone, PartialEq)]
pub struct CallOptions {
    /// Retries after the first attempt.
    pub retries: u32,
    /// Base delay between attempts.
    pub retry_delay: Duration,
    /// Deadline of a single attempt.
    pub timeout: Duration,
    /// Whether an offline device may be answered with `fallback`.
    pub offlineable: bool,
    /// Value returned when the call fails while offline.
    pub fallback: Option<ResponseBody>,
    /// Delay policy.
    pub backoff: Backoff,
}

impl CallOptions {
    /// Creates call options with the defaults: 2 retries, 1s fixed delay,
    /// 10s timeout, offlineable without fallback.
    pub fn new() -> Self {
        Self {
            retries: 2,
            retry_delay: Duration::from_secs(1),
            timeout: Duration::from_secs(10),
            offlineable: true,
            fallback: None,
            backoff: Backoff::Fixed,
        }
    }

    /// Creates options with no retries.
    pub fn no_retry() -> Self {
        Self::new().with_retries(0)
    }

    /// Sets the number of retries.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Sets the base retry delay.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Sets the per-attempt timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets whether offline failures may use the fallback.
    pub fn with_offlineable(mut self, offlineable: bool) -> Self {
        self.offlineable = offlineable;
        self
    }

    /// Sets the offline fallback value.
    pub fn with_fallback(mut self, fallback: ResponseBody) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Sets the delay policy.
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Delay before the given retry (1-indexed).
    pub fn delay_before_retry(&self, retry: u32) -> Duration {
        self.backoff.delay_for_retry(self.retry_delay, retry)
    }
}

impl Default for CallOptions {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_config_builder() {
        let config = SyncConfig::new("https://api.example.com")
            .with_sync_interval(Duration::from_secs(5))
            .with_max_operation_retries(3)
            .with_timeout(Duration::from_millis(500));

        assert_eq!(config.base_url, "https://api.example.com");
        assert_eq!(config.sync_interval, Duration::from_secs(5));
        assert_eq!(config.max_operation_retries, 3);
        assert_eq!(config.dispatch.timeout, Duration::from_millis(500));
        assert_eq!(config.fetch.timeout, Duration::from_millis(500));
    }

    #[test]
    fn sync_config_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.sync_interval, Duration::from_secs(30));
        assert_eq!(config.max_operation_retries, 5);
        // Dispatch relies on later cycles instead of in-call retries.
        assert_eq!(config.dispatch.retries, 0);
        assert!(config.fetch.retries > 0);
    }

    #[test]
    fn fixed_backoff() {
        let options = CallOptions::new().with_retry_delay(Duration::from_millis(250));
        assert_eq!(options.delay_before_retry(0), Duration::ZERO);
        assert_eq!(options.delay_before_retry(1), Duration::from_millis(250));
        assert_eq!(options.delay_before_retry(4), Duration::from_millis(250));
    }

    #[test]
    fn exponential_backoff_without_jitter() {
        let backoff = Backoff::Exponential {
            multiplier: 2.0,
            max_delay: Duration::from_secs(1),
            jitter: false,
        };
        let base = Duration::from_millis(100);

        assert_eq!(backoff.delay_for_retry(base, 1), Duration::from_millis(100));
        assert_eq!(backoff.delay_for_retry(base, 2), Duration::from_millis(200));
        assert_eq!(backoff.delay_for_retry(base, 3), Duration::from_millis(400));
        assert_eq!(backoff.delay_for_retry(base, 10), Duration::from_secs(1));
    }

    #[test]
    fn exponential_backoff_jitter_bounds() {
        let backoff = Backoff::exponential();
        let base = Duration::from_millis(100);
        for _ in 0..20 {
            let delay = backoff.delay_for_retry(base, 2);
            assert!(delay >= Duration::from_millis(200));
            assert!(delay <= Duration::from_millis(251));
        }
    }

    #[test]
    fn call_options_builder() {
        let options = CallOptions::no_retry()
            .with_offlineable(false)
            .with_fallback(ResponseBody::Text("cached".into()))
            .with_backoff(Backoff::exponential());

        assert_eq!(options.retries, 0);
        assert!(!options.offlineable);
        assert_eq!(options.fallback, Some(ResponseBody::Text("cached".into())));
        assert_ne!(options.backoff, Backoff::Fixed);
    }
}
