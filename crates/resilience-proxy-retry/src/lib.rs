//! Retry primitive.
//!
//! A [`Retry`] re-invokes a callable while it fails with a retried error or
//! returns a retried result, up to a maximum number of attempts, waiting the
//! configured [`Interval`] in between.
//!
//! Synchronous decorations wait on the calling thread. Asynchronous
//! decorations wait through a [`Scheduler`] and never block.
//!
//! # Example
//!
//! ```rust
//! use resilience_proxy_retry::{Retry, RetryConfig};
//! use resilience_proxy_core::BoxError;
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::time::Duration;
//!
//! let calls = Arc::new(AtomicUsize::new(0));
//! let counter = Arc::clone(&calls);
//! let retry = Retry::new(
//!     "backend",
//!     RetryConfig::builder()
//!         .max_attempts(3)
//!         .wait_duration(Duration::ZERO)
//!         .build(),
//! );
//!
//! let call = retry.decorate_sync(Arc::new(move |x: u32| {
//!     if counter.fetch_add(1, Ordering::SeqCst) < 2 {
//!         Err::<u32, BoxError>("transient".into())
//!     } else {
//!         Ok(x)
//!     }
//! }));
//!
//! assert_eq!(call(7).unwrap(), 7);
//! assert_eq!(calls.load(Ordering::SeqCst), 3);
//! ```

mod config;
mod events;

pub use config::{Interval, RetryConfig, RetryConfigBuilder};
pub use events::RetryEvent;

use futures::future::BoxFuture;
use resilience_proxy_core::{AsyncFn, BoxError, Scheduler, SyncFn};
use std::any::Any;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

#[cfg(feature = "metrics")]
use metrics::counter;

/// Returned when the last attempt still produced a retried result and the
/// retry is configured to fail in that case.
#[derive(Debug, Clone, Error)]
#[error("retry '{name}' exhausted {attempts} attempts without an accepted result")]
pub struct MaxRetriesExceeded {
    /// Name of the retry.
    pub name: String,
    /// Attempts made.
    pub attempts: usize,
}

/// A named retry instance.
///
/// Cloning is cheap and clones share the same configuration.
#[derive(Clone, Debug)]
pub struct Retry {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    name: String,
    config: RetryConfig,
}

impl Retry {
    /// Creates a retry with the given configuration.
    pub fn new(name: impl Into<String>, config: RetryConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                config,
            }),
        }
    }

    /// Creates a retry with the default configuration.
    pub fn of_defaults(name: impl Into<String>) -> Self {
        Self::new(name, RetryConfig::default())
    }

    /// Name of this retry.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Configuration of this retry.
    pub fn config(&self) -> &RetryConfig {
        &self.inner.config
    }

    fn context(&self) -> RetryContext<'_> {
        RetryContext {
            name: &self.inner.name,
            config: &self.inner.config,
            attempts: 0,
        }
    }

    /// Decorates a synchronous callable. Waits block the calling thread.
    pub fn decorate_sync<A, T>(&self, call: SyncFn<A, T>) -> SyncFn<A, T>
    where
        A: Clone + Send + 'static,
        T: Send + 'static,
    {
        let retry = self.clone();
        Arc::new(move |args: A| -> Result<T, BoxError> {
            let mut context = retry.context();
            loop {
                let wait = match call(args.clone()) {
                    Ok(value) => match context.on_result(&value)? {
                        Some(wait) => wait,
                        None => return Ok(value),
                    },
                    Err(error) => match context.on_error(&error) {
                        Some(wait) => wait,
                        None => return Err(error),
                    },
                };
                if !wait.is_zero() {
                    std::thread::sleep(wait);
                }
            }
        })
    }

    /// Decorates a future-returning callable. Waits run on `scheduler`;
    /// without one, attempts follow each other immediately.
    pub fn decorate_async<A, T>(
        &self,
        call: AsyncFn<A, T>,
        scheduler: Option<Scheduler>,
    ) -> AsyncFn<A, T>
    where
        A: Clone + Send + 'static,
        T: Send + 'static,
    {
        let retry = self.clone();
        Arc::new(move |args: A| -> BoxFuture<'static, Result<T, BoxError>> {
            let retry = retry.clone();
            let call = Arc::clone(&call);
            let scheduler = scheduler.clone();
            Box::pin(async move {
                let mut context = retry.context();
                loop {
                    let wait = match call(args.clone()).await {
                        Ok(value) => match context.on_result(&value)? {
                            Some(wait) => wait,
                            None => return Ok(value),
                        },
                        Err(error) => match context.on_error(&error) {
                            Some(wait) => wait,
                            None => return Err(error),
                        },
                    };
                    if let Some(scheduler) = &scheduler {
                        scheduler.delay(wait).await;
                    }
                }
            })
        })
    }
}

/// Per-call attempt bookkeeping.
struct RetryContext<'a> {
    name: &'a str,
    config: &'a RetryConfig,
    attempts: usize,
}

impl RetryContext<'_> {
    /// Records a failed attempt. Returns the wait before the next attempt,
    /// or `None` when the error must propagate.
    fn on_error(&mut self, error: &BoxError) -> Option<Duration> {
        self.attempts += 1;

        if !self.config.should_retry_error(error) {
            self.emit(RetryEvent::IgnoredError {
                policy_name: self.name.to_string(),
                timestamp: Instant::now(),
            });
            return None;
        }

        if self.attempts >= self.config.max_attempts {
            #[cfg(feature = "tracing")]
            tracing::debug!(retry = self.name, attempts = self.attempts, "retries exhausted");

            #[cfg(feature = "metrics")]
            counter!("retry_calls_total", "retry" => self.name.to_string(), "outcome" => "failed")
                .increment(1);

            self.emit(RetryEvent::Error {
                policy_name: self.name.to_string(),
                timestamp: Instant::now(),
                attempts: self.attempts,
            });
            return None;
        }

        Some(self.schedule_retry())
    }

    /// Records a successful attempt. Returns the wait before the next attempt
    /// when the result is retried.
    fn on_result(&mut self, result: &dyn Any) -> Result<Option<Duration>, MaxRetriesExceeded> {
        self.attempts += 1;

        if !self.config.should_retry_result(result) {
            #[cfg(feature = "metrics")]
            counter!("retry_calls_total", "retry" => self.name.to_string(), "outcome" => "success")
                .increment(1);

            self.emit(RetryEvent::Success {
                policy_name: self.name.to_string(),
                timestamp: Instant::now(),
                attempts: self.attempts,
            });
            return Ok(None);
        }

        if self.attempts >= self.config.max_attempts {
            self.emit(RetryEvent::Error {
                policy_name: self.name.to_string(),
                timestamp: Instant::now(),
                attempts: self.attempts,
            });
            if self.config.fail_after_max_attempts {
                return Err(MaxRetriesExceeded {
                    name: self.name.to_string(),
                    attempts: self.attempts,
                });
            }
            return Ok(None);
        }

        Ok(Some(self.schedule_retry()))
    }

    fn schedule_retry(&self) -> Duration {
        let wait = self.config.interval.wait(self.attempts);

        #[cfg(feature = "tracing")]
        tracing::debug!(retry = self.name, attempt = self.attempts, ?wait, "retrying call");

        #[cfg(feature = "metrics")]
        counter!("retry_attempts_total", "retry" => self.name.to_string()).increment(1);

        self.emit(RetryEvent::Retry {
            policy_name: self.name.to_string(),
            timestamp: Instant::now(),
            attempt: self.attempts,
            wait,
        });
        wait
    }

    fn emit(&self, event: RetryEvent) {
        if !self.config.event_listeners.is_empty() {
            self.config.event_listeners.emit(&event);
        }
    }
}
