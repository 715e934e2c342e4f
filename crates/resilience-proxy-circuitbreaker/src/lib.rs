//! Circuit breaker primitive.
//!
//! A [`CircuitBreaker`] records call outcomes over a count-based sliding
//! window. Once the failure rate reaches the configured threshold the circuit
//! opens and rejects calls with [`CallNotPermitted`] until the open wait has
//! elapsed; a limited number of half-open trial calls then decide whether it
//! closes again.
//!
//! ## State Machine
//!
//! - **Closed**: calls pass through, outcomes are recorded
//! - **Open**: calls are rejected immediately
//! - **Half-Open**: trial calls are permitted to test recovery

mod circuit;
mod config;
mod events;

pub use circuit::CircuitState;
pub use config::{CircuitBreakerConfig, CircuitBreakerConfigBuilder};
pub use events::CircuitBreakerEvent;

use circuit::Circuit;
use futures::future::BoxFuture;
use resilience_proxy_core::{AsyncFn, BoxError, SyncFn};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use thiserror::Error;

#[cfg(feature = "metrics")]
use metrics::counter;

/// Returned when the circuit does not permit a call.
#[derive(Debug, Clone, Error)]
#[error("circuit breaker '{name}' is {state} and does not permit further calls")]
pub struct CallNotPermitted {
    /// Name of the circuit breaker.
    pub name: String,
    /// State at the time of rejection.
    pub state: CircuitState,
}

/// A named circuit breaker.
///
/// Cloning is cheap and clones share the same circuit.
#[derive(Clone)]
pub struct CircuitBreaker {
    inner: Arc<Inner>,
}

struct Inner {
    name: String,
    config: CircuitBreakerConfig,
    circuit: Mutex<Circuit>,
}

impl CircuitBreaker {
    /// Creates a circuit breaker with the given configuration.
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                config,
                circuit: Mutex::new(Circuit::new()),
            }),
        }
    }

    /// Creates a circuit breaker with the default configuration.
    pub fn of_defaults(name: impl Into<String>) -> Self {
        Self::new(name, CircuitBreakerConfig::default())
    }

    /// Name of this circuit breaker.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Configuration of this circuit breaker.
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.inner.config
    }

    /// Current state.
    pub fn state(&self) -> CircuitState {
        self.circuit().state()
    }

    /// Forces the circuit open.
    pub fn force_open(&self) {
        self.circuit()
            .transition_to(CircuitState::Open, &self.inner.name, &self.inner.config);
    }

    /// Forces the circuit closed, discarding recorded outcomes.
    pub fn reset(&self) {
        self.circuit()
            .transition_to(CircuitState::Closed, &self.inner.name, &self.inner.config);
    }

    /// Asks for permission to make a call.
    ///
    /// A caller that obtains permission is expected to report the outcome
    /// through [`on_success`](Self::on_success) or [`on_error`](Self::on_error).
    pub fn try_acquire_permission(&self) -> Result<(), CallNotPermitted> {
        self.acquire().map(|_| ())
    }

    fn acquire(&self) -> Result<Option<u64>, CallNotPermitted> {
        let result = self
            .circuit()
            .try_acquire(&self.inner.name, &self.inner.config);
        result.map_err(|state| {
            #[cfg(feature = "tracing")]
            tracing::debug!(circuit_breaker = %self.inner.name, %state, "call rejected");

            #[cfg(feature = "metrics")]
            counter!("circuitbreaker_calls_rejected_total", "circuitbreaker" => self.inner.name.clone())
                .increment(1);

            self.inner
                .config
                .event_listeners
                .emit(&CircuitBreakerEvent::CallRejected {
                    policy_name: self.inner.name.clone(),
                    timestamp: Instant::now(),
                    state,
                });
            CallNotPermitted {
                name: self.inner.name.clone(),
                state,
            }
        })
    }

    fn permit(&self) -> Result<Permit, CallNotPermitted> {
        let half_open_epoch = self.acquire()?;
        Ok(Permit {
            breaker: self.clone(),
            half_open_epoch,
        })
    }

    /// Records a successful call.
    pub fn on_success(&self) {
        self.circuit()
            .record(false, &self.inner.name, &self.inner.config);
    }

    /// Records a failed call. Errors the configuration does not record count as successes.
    pub fn on_error(&self, error: &BoxError) {
        let failed = self.inner.config.records(error);
        self.circuit()
            .record(failed, &self.inner.name, &self.inner.config);
    }

    fn record<T>(&self, outcome: &Result<T, BoxError>) {
        match outcome {
            Ok(_) => self.on_success(),
            Err(error) => self.on_error(error),
        }
    }

    fn circuit(&self) -> MutexGuard<'_, Circuit> {
        self.inner
            .circuit
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Decorates a synchronous callable.
    pub fn decorate_sync<A, T>(&self, call: SyncFn<A, T>) -> SyncFn<A, T>
    where
        A: Send + 'static,
        T: Send + 'static,
    {
        let breaker = self.clone();
        Arc::new(move |args: A| -> Result<T, BoxError> {
            let permit = breaker.permit()?;
            let outcome = call(args);
            permit.complete(&outcome);
            outcome
        })
    }

    /// Decorates a future-returning callable.
    ///
    /// Permission is requested when the future is created; the outcome is
    /// recorded when it completes. Dropping the future before it completes
    /// records nothing and hands back any half-open permit it held.
    pub fn decorate_async<A, T>(&self, call: AsyncFn<A, T>) -> AsyncFn<A, T>
    where
        A: Send + 'static,
        T: Send + 'static,
    {
        let breaker = self.clone();
        Arc::new(move |args: A| -> BoxFuture<'static, Result<T, BoxError>> {
            let permit = match breaker.permit() {
                Ok(permit) => permit,
                Err(rejected) => {
                    return Box::pin(futures::future::err::<T, BoxError>(rejected.into()))
                }
            };
            let pending = call(args);
            Box::pin(async move {
                let outcome = pending.await;
                permit.complete(&outcome);
                outcome
            })
        })
    }
}

/// Permission for a single call. Dropped without an outcome, it hands its
/// half-open slot back.
struct Permit {
    breaker: CircuitBreaker,
    half_open_epoch: Option<u64>,
}

impl Permit {
    fn complete<T>(mut self, outcome: &Result<T, BoxError>) {
        self.half_open_epoch = None;
        self.breaker.record(outcome);
    }
}

impl Drop for Permit {
    fn drop(&mut self) {
        if let Some(epoch) = self.half_open_epoch.take() {
            #[cfg(feature = "tracing")]
            tracing::debug!(circuit_breaker = %self.breaker.inner.name, "half-open call abandoned");

            self.breaker.circuit().release_half_open_permit(epoch);
        }
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.inner.name)
            .field("state", &self.state())
            .finish()
    }
}
