//! Bulkhead primitive.
//!
//! A [`Bulkhead`] caps the number of calls in flight. When every slot is
//! taken, a call either waits up to `max_wait_duration` for one to free up or
//! is rejected with [`BulkheadFull`].
//!
//! Waiting is driven by a [`Scheduler`] timer racing the slot acquisition.
//! Synchronous decorations block the calling thread while they wait, so they
//! should be given a dedicated scheduler rather than one borrowed from the
//! calling runtime.

mod config;
mod events;

pub use config::{BulkheadConfig, BulkheadConfigBuilder};
pub use events::BulkheadEvent;

use futures::future::{self, BoxFuture, Either};
use resilience_proxy_core::{AsyncFn, BoxError, Scheduler, SyncFn};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

#[cfg(feature = "metrics")]
use metrics::counter;

/// Returned when no slot is available.
#[derive(Debug, Clone, Error)]
#[error("bulkhead '{name}' is full: max concurrent calls ({max_concurrent_calls}) reached")]
pub struct BulkheadFull {
    /// Name of the bulkhead.
    pub name: String,
    /// Configured capacity.
    pub max_concurrent_calls: usize,
}

/// A named bulkhead.
///
/// Cloning is cheap and clones share the same slots.
#[derive(Clone)]
pub struct Bulkhead {
    inner: Arc<Inner>,
}

struct Inner {
    name: String,
    config: BulkheadConfig,
    semaphore: Arc<Semaphore>,
}

/// A held slot. Dropping it frees the slot.
struct Admission {
    bulkhead: Bulkhead,
    _permit: OwnedSemaphorePermit,
}

impl Drop for Admission {
    fn drop(&mut self) {
        self.bulkhead
            .inner
            .config
            .event_listeners
            .emit(&BulkheadEvent::CallFinished {
                policy_name: self.bulkhead.inner.name.clone(),
                timestamp: Instant::now(),
            });
    }
}

impl Bulkhead {
    /// Creates a bulkhead with the given configuration.
    pub fn new(name: impl Into<String>, config: BulkheadConfig) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent_calls));
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                config,
                semaphore,
            }),
        }
    }

    /// Creates a bulkhead with the default configuration.
    pub fn of_defaults(name: impl Into<String>) -> Self {
        Self::new(name, BulkheadConfig::default())
    }

    /// Name of this bulkhead.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Configuration of this bulkhead.
    pub fn config(&self) -> &BulkheadConfig {
        &self.inner.config
    }

    /// Number of free slots.
    pub fn available_concurrent_calls(&self) -> usize {
        self.inner.semaphore.available_permits()
    }

    async fn admit(&self, scheduler: Option<Scheduler>) -> Result<Admission, BulkheadFull> {
        if let Ok(permit) = Arc::clone(&self.inner.semaphore).try_acquire_owned() {
            return Ok(self.permitted(permit));
        }

        let max_wait = self.inner.config.max_wait_duration;
        if let (Some(scheduler), false) = (scheduler, max_wait.is_zero()) {
            let acquire = Box::pin(Arc::clone(&self.inner.semaphore).acquire_owned());
            if let Either::Left((Ok(permit), _)) =
                future::select(acquire, scheduler.delay(max_wait)).await
            {
                return Ok(self.permitted(permit));
            }
        }

        Err(self.rejected())
    }

    fn permitted(&self, permit: OwnedSemaphorePermit) -> Admission {
        let concurrent_calls =
            self.inner.config.max_concurrent_calls - self.inner.semaphore.available_permits();

        #[cfg(feature = "metrics")]
        counter!("bulkhead_calls_permitted_total", "bulkhead" => self.inner.name.clone())
            .increment(1);

        self.inner
            .config
            .event_listeners
            .emit(&BulkheadEvent::CallPermitted {
                policy_name: self.inner.name.clone(),
                timestamp: Instant::now(),
                concurrent_calls,
            });
        Admission {
            bulkhead: self.clone(),
            _permit: permit,
        }
    }

    fn rejected(&self) -> BulkheadFull {
        let max_concurrent_calls = self.inner.config.max_concurrent_calls;

        #[cfg(feature = "tracing")]
        tracing::debug!(bulkhead = %self.inner.name, max_concurrent_calls, "call rejected");

        #[cfg(feature = "metrics")]
        counter!("bulkhead_calls_rejected_total", "bulkhead" => self.inner.name.clone())
            .increment(1);

        self.inner
            .config
            .event_listeners
            .emit(&BulkheadEvent::CallRejected {
                policy_name: self.inner.name.clone(),
                timestamp: Instant::now(),
                max_concurrent_calls,
            });
        BulkheadFull {
            name: self.inner.name.clone(),
            max_concurrent_calls,
        }
    }

    /// Decorates a synchronous callable. The slot is held for the duration of the call.
    pub fn decorate_sync<A, T>(
        &self,
        call: SyncFn<A, T>,
        scheduler: Option<Scheduler>,
    ) -> SyncFn<A, T>
    where
        A: Send + 'static,
        T: Send + 'static,
    {
        let bulkhead = self.clone();
        Arc::new(move |args: A| -> Result<T, BoxError> {
            let admission = futures::executor::block_on(bulkhead.admit(scheduler.clone()))?;
            let outcome = call(args);
            drop(admission);
            outcome
        })
    }

    /// Decorates a future-returning callable. The slot is held until the future completes.
    pub fn decorate_async<A, T>(
        &self,
        call: AsyncFn<A, T>,
        scheduler: Option<Scheduler>,
    ) -> AsyncFn<A, T>
    where
        A: Send + 'static,
        T: Send + 'static,
    {
        let bulkhead = self.clone();
        Arc::new(move |args: A| -> BoxFuture<'static, Result<T, BoxError>> {
            let bulkhead = bulkhead.clone();
            let call = Arc::clone(&call);
            let scheduler = scheduler.clone();
            Box::pin(async move {
                let _admission = bulkhead.admit(scheduler).await?;
                call(args).await
            })
        })
    }
}

impl std::fmt::Debug for Bulkhead {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bulkhead")
            .field("name", &self.inner.name)
            .field("available", &self.available_concurrent_calls())
            .finish()
    }
}
