use crate::events::RetryEvent;
use resilience_proxy_core::{BoxError, ErrorType, EventListeners};
use std::any::Any;
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

pub(crate) type ErrorPredicate = Arc<dyn Fn(&BoxError) -> bool + Send + Sync>;
pub(crate) type ResultPredicate = Arc<dyn Fn(&dyn Any) -> bool + Send + Sync>;

/// Wait between attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Interval {
    /// The same wait before every retry.
    Fixed(Duration),
    /// `initial * multiplier^(retry - 1)`, capped at `max`. A multiplier
    /// below 1 or NaN is treated as 1.
    Exponential {
        initial: Duration,
        multiplier: f64,
        max: Duration,
    },
}

impl Interval {
    /// Wait before retry number `retry` (1-based).
    pub fn wait(&self, retry: usize) -> Duration {
        match *self {
            Interval::Fixed(wait) => wait,
            Interval::Exponential {
                initial,
                multiplier,
                max,
            } => {
                let exponent = retry.saturating_sub(1).min(i32::MAX as usize) as i32;
                let factor = clamp_multiplier(multiplier).powi(exponent);
                Duration::try_from_secs_f64(initial.as_secs_f64() * factor)
                    .map_or(max, |wait| wait.min(max))
            }
        }
    }
}

fn clamp_multiplier(multiplier: f64) -> f64 {
    if multiplier >= 1.0 {
        multiplier
    } else {
        1.0
    }
}

/// Configuration for a [`Retry`](crate::Retry).
#[derive(Clone)]
pub struct RetryConfig {
    pub(crate) max_attempts: usize,
    pub(crate) interval: Interval,
    pub(crate) retry_errors: Vec<ErrorType>,
    pub(crate) retry_predicate: Option<ErrorPredicate>,
    pub(crate) result_predicate: Option<ResultPredicate>,
    pub(crate) fail_after_max_attempts: bool,
    pub(crate) event_listeners: EventListeners<RetryEvent>,
}

impl RetryConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> RetryConfigBuilder {
        RetryConfigBuilder::new()
    }

    /// Maximum number of attempts, the first call included.
    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// Wait between attempts.
    pub fn interval(&self) -> Interval {
        self.interval
    }

    pub(crate) fn should_retry_error(&self, error: &BoxError) -> bool {
        if self.retry_errors.is_empty() && self.retry_predicate.is_none() {
            return true;
        }
        self.retry_errors.iter().any(|ty| ty.matches(error.as_ref()))
            || self.retry_predicate.as_ref().is_some_and(|p| p(error))
    }

    pub(crate) fn should_retry_result(&self, result: &dyn Any) -> bool {
        self.result_predicate.as_ref().is_some_and(|p| p(result))
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfigBuilder::new().build()
    }
}

impl fmt::Debug for RetryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryConfig")
            .field("max_attempts", &self.max_attempts)
            .field("interval", &self.interval)
            .field("retry_errors", &self.retry_errors)
            .field("fail_after_max_attempts", &self.fail_after_max_attempts)
            .finish_non_exhaustive()
    }
}

/// Builder for [`RetryConfig`].
pub struct RetryConfigBuilder {
    config: RetryConfig,
}

impl Default for RetryConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryConfigBuilder {
    /// Creates a new builder with defaults.
    ///
    /// Defaults:
    /// - max_attempts: 3
    /// - interval: fixed 500ms
    /// - retried errors: all
    /// - retried results: none
    /// - fail_after_max_attempts: false
    pub fn new() -> Self {
        Self {
            config: RetryConfig {
                max_attempts: 3,
                interval: Interval::Fixed(Duration::from_millis(500)),
                retry_errors: Vec::new(),
                retry_predicate: None,
                result_predicate: None,
                fail_after_max_attempts: false,
                event_listeners: EventListeners::new(),
            },
        }
    }

    /// Sets the maximum number of attempts.
    ///
    /// This includes the initial attempt, so `max_attempts(3)` means
    /// 1 initial attempt + 2 retries. Values below 1 are raised to 1.
    pub fn max_attempts(mut self, max_attempts: usize) -> Self {
        self.config.max_attempts = max_attempts.max(1);
        self
    }

    /// Waits a fixed duration between attempts.
    pub fn wait_duration(mut self, wait: Duration) -> Self {
        self.config.interval = Interval::Fixed(wait);
        self
    }

    /// Waits exponentially longer between attempts, capped at one minute.
    ///
    /// Multipliers below 1, and NaN, are raised to 1.
    pub fn exponential_backoff(mut self, initial: Duration, multiplier: f64) -> Self {
        self.config.interval = Interval::Exponential {
            initial,
            multiplier: clamp_multiplier(multiplier),
            max: Duration::from_secs(60),
        };
        self
    }

    /// Sets the interval directly.
    pub fn interval(mut self, interval: Interval) -> Self {
        self.config.interval = interval;
        self
    }

    /// Retries errors of type `E`.
    ///
    /// Once any error filter is set, errors that match none of them are not retried.
    pub fn retry_on<E: Error + 'static>(mut self) -> Self {
        self.config.retry_errors.push(ErrorType::of::<E>());
        self
    }

    /// Retries errors accepted by `predicate`.
    pub fn retry_on_error<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&BoxError) -> bool + Send + Sync + 'static,
    {
        self.config.retry_predicate = Some(Arc::new(predicate));
        self
    }

    /// Retries successful results of type `T` accepted by `predicate`.
    ///
    /// Results of any other type are never retried.
    pub fn retry_on_result<T, F>(mut self, predicate: F) -> Self
    where
        T: 'static,
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.config.result_predicate = Some(Arc::new(move |result: &dyn Any| {
            result.downcast_ref::<T>().is_some_and(&predicate)
        }));
        self
    }

    /// Fails with [`MaxRetriesExceeded`](crate::MaxRetriesExceeded) when the
    /// last attempt still returns a retried result.
    ///
    /// By default that last result is returned to the caller.
    pub fn fail_after_max_attempts(mut self, fail: bool) -> Self {
        self.config.fail_after_max_attempts = fail;
        self
    }

    /// Registers a callback invoked before each retry with the retry number and wait.
    pub fn on_retry<F>(mut self, f: F) -> Self
    where
        F: Fn(usize, Duration) + Send + Sync + 'static,
    {
        self.config.event_listeners.add(move |event: &RetryEvent| {
            if let RetryEvent::Retry { attempt, wait, .. } = event {
                f(*attempt, *wait);
            }
        });
        self
    }

    /// Registers a callback invoked when a call succeeds, with the attempts it took.
    pub fn on_success<F>(mut self, f: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.config.event_listeners.add(move |event: &RetryEvent| {
            if let RetryEvent::Success { attempts, .. } = event {
                f(*attempts);
            }
        });
        self
    }

    /// Registers a callback invoked when a call fails after exhausting its attempts.
    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.config.event_listeners.add(move |event: &RetryEvent| {
            if let RetryEvent::Error { attempts, .. } = event {
                f(*attempts);
            }
        });
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> RetryConfig {
        self.config
    }
}
