//! Background scheduler for timed asynchronous operations.
//!
//! Asynchronous decorations never block the caller. When one needs to wait
//! (a retry backoff, a rate-limit reservation, a bulkhead queue) it asks the
//! [`Scheduler`] for a delay, which runs the timer on the scheduler's own
//! runtime. The returned future can then be awaited from any executor.

use crate::error::ConfigError;
use futures::future::BoxFuture;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::runtime::{Builder, Handle, Runtime};

const THREAD_NAME: &str = "resilience-proxy-scheduler";

/// Shared timer resource for asynchronous decorations.
///
/// Cloning is cheap and every clone drives the same runtime.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

struct Inner {
    handle: Handle,
    owned: Mutex<Option<Runtime>>,
}

impl Scheduler {
    /// Starts a dedicated single-threaded scheduler.
    ///
    /// The runtime is shut down in the background when the last clone is dropped.
    pub fn new() -> Result<Self, ConfigError> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name(THREAD_NAME)
            .enable_time()
            .build()
            .map_err(ConfigError::Scheduler)?;

        #[cfg(feature = "tracing")]
        tracing::debug!(thread = THREAD_NAME, "started default scheduler");

        Ok(Self {
            inner: Arc::new(Inner {
                handle: runtime.handle().clone(),
                owned: Mutex::new(Some(runtime)),
            }),
        })
    }

    /// Uses an existing runtime for timers.
    pub fn from_handle(handle: Handle) -> Self {
        Self {
            inner: Arc::new(Inner {
                handle,
                owned: Mutex::new(None),
            }),
        }
    }

    /// Uses the runtime of the calling context, if there is one.
    pub fn current() -> Option<Self> {
        Handle::try_current().ok().map(Self::from_handle)
    }

    /// Returns a future that completes after `duration`.
    ///
    /// The timer is registered immediately on the scheduler's runtime.
    pub fn delay(&self, duration: Duration) -> BoxFuture<'static, ()> {
        if duration.is_zero() {
            return Box::pin(futures::future::ready(()));
        }
        // The sleep must be created on the scheduler's runtime, not the caller's.
        let timer = self
            .inner
            .handle
            .spawn(async move { tokio::time::sleep(duration).await });
        Box::pin(async move {
            // A cancelled timer only happens at runtime shutdown.
            let _ = timer.await;
        })
    }

    /// Returns true if this scheduler owns its runtime.
    pub fn is_dedicated(&self) -> bool {
        self.inner
            .owned
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let runtime = self
            .owned
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(runtime) = runtime {
            runtime.shutdown_background();
        }
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("dedicated", &self.is_dedicated())
            .finish()
    }
}
