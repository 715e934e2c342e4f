//! Rate limiter primitive.
//!
//! A [`RateLimiter`] grants `limit_for_period` permissions per refresh
//! period. A caller that finds no permission available may reserve one from
//! an upcoming period if the wait fits within `timeout_duration`; otherwise
//! the call is rejected with [`RequestNotPermitted`].
//!
//! Synchronous decorations wait on the calling thread. Asynchronous
//! decorations wait through a [`Scheduler`]; without one they never wait.

mod config;
mod events;
mod limiter;

pub use config::{RateLimiterConfig, RateLimiterConfigBuilder};
pub use events::RateLimiterEvent;

use futures::future::BoxFuture;
use limiter::LimiterState;
use resilience_proxy_core::{AsyncFn, BoxError, Scheduler, SyncFn};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;

#[cfg(feature = "metrics")]
use metrics::counter;

/// Returned when no permission is available within the timeout.
#[derive(Debug, Clone, Error)]
#[error("rate limiter '{name}' does not permit further calls")]
pub struct RequestNotPermitted {
    /// Name of the rate limiter.
    pub name: String,
}

/// A named rate limiter.
///
/// Cloning is cheap and clones share the same permissions.
#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<Inner>,
}

struct Inner {
    name: String,
    config: RateLimiterConfig,
    state: Mutex<LimiterState>,
}

impl RateLimiter {
    /// Creates a rate limiter with the given configuration.
    pub fn new(name: impl Into<String>, config: RateLimiterConfig) -> Self {
        let state = LimiterState::new(config.limit_for_period, config.limit_refresh_period);
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                config,
                state: Mutex::new(state),
            }),
        }
    }

    /// Creates a rate limiter with the default configuration.
    pub fn of_defaults(name: impl Into<String>) -> Self {
        Self::new(name, RateLimiterConfig::default())
    }

    /// Name of this rate limiter.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Configuration of this rate limiter.
    pub fn config(&self) -> &RateLimiterConfig {
        &self.inner.config
    }

    /// Permissions left in the current period; negative when reserved ahead.
    pub fn available_permissions(&self) -> i64 {
        self.state().available_permissions()
    }

    /// Reserves a permission, waiting at most `timeout`.
    ///
    /// On success returns how long the caller must wait before proceeding.
    pub fn reserve_permission(&self, timeout: Duration) -> Result<Duration, RequestNotPermitted> {
        let reserved = self.state().reserve(timeout);
        match reserved {
            Ok(wait) => {
                self.emit(RateLimiterEvent::PermitAcquired {
                    policy_name: self.inner.name.clone(),
                    timestamp: Instant::now(),
                    wait,
                });
                Ok(wait)
            }
            Err(_needed) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(rate_limiter = %self.inner.name, ?timeout, needed = ?_needed, "call rejected");

                #[cfg(feature = "metrics")]
                counter!("ratelimiter_calls_rejected_total", "ratelimiter" => self.inner.name.clone())
                    .increment(1);

                self.emit(RateLimiterEvent::PermitRejected {
                    policy_name: self.inner.name.clone(),
                    timestamp: Instant::now(),
                    timeout,
                });
                Err(RequestNotPermitted {
                    name: self.inner.name.clone(),
                })
            }
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, LimiterState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: RateLimiterEvent) {
        self.inner.config.event_listeners.emit(&event);
    }

    /// Decorates a synchronous callable. Waits block the calling thread.
    pub fn decorate_sync<A, T>(&self, call: SyncFn<A, T>) -> SyncFn<A, T>
    where
        A: Send + 'static,
        T: Send + 'static,
    {
        let limiter = self.clone();
        Arc::new(move |args: A| -> Result<T, BoxError> {
            let wait = limiter.reserve_permission(limiter.inner.config.timeout_duration)?;
            if !wait.is_zero() {
                std::thread::sleep(wait);
            }
            call(args)
        })
    }

    /// Decorates a future-returning callable.
    ///
    /// Reservations that require waiting are only made when a scheduler is given.
    pub fn decorate_async<A, T>(
        &self,
        call: AsyncFn<A, T>,
        scheduler: Option<Scheduler>,
    ) -> AsyncFn<A, T>
    where
        A: Send + 'static,
        T: Send + 'static,
    {
        let limiter = self.clone();
        let timeout = match scheduler {
            Some(_) => self.inner.config.timeout_duration,
            None => Duration::ZERO,
        };
        Arc::new(move |args: A| -> BoxFuture<'static, Result<T, BoxError>> {
            let wait = match limiter.reserve_permission(timeout) {
                Ok(wait) => wait,
                Err(rejected) => return Box::pin(futures::future::err::<T, BoxError>(rejected.into())),
            };
            let pending = call(args);
            match (&scheduler, wait.is_zero()) {
                (Some(scheduler), false) => {
                    let delay = scheduler.delay(wait);
                    Box::pin(async move {
                        delay.await;
                        pending.await
                    })
                }
                _ => pending,
            }
        })
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("name", &self.inner.name)
            .field("available_permissions", &self.available_permissions())
            .finish()
    }
}
