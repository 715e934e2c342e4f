use crate::events::CircuitBreakerEvent;
use crate::CircuitState;
use resilience_proxy_core::{BoxError, EventListeners};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

pub(crate) type FailurePredicate = Arc<dyn Fn(&BoxError) -> bool + Send + Sync>;

/// Configuration for a [`CircuitBreaker`](crate::CircuitBreaker).
#[derive(Clone)]
pub struct CircuitBreakerConfig {
    pub(crate) failure_rate_threshold: f64,
    pub(crate) sliding_window_size: usize,
    pub(crate) minimum_number_of_calls: usize,
    pub(crate) wait_duration_in_open_state: Duration,
    pub(crate) permitted_calls_in_half_open_state: usize,
    pub(crate) record_error: Option<FailurePredicate>,
    pub(crate) event_listeners: EventListeners<CircuitBreakerEvent>,
}

impl CircuitBreakerConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> CircuitBreakerConfigBuilder {
        CircuitBreakerConfigBuilder::new()
    }

    /// Failure rate, in percent, at or above which the circuit opens.
    pub fn failure_rate_threshold(&self) -> f64 {
        self.failure_rate_threshold
    }

    /// How long the circuit stays open before probing.
    pub fn wait_duration_in_open_state(&self) -> Duration {
        self.wait_duration_in_open_state
    }

    pub(crate) fn records(&self, error: &BoxError) -> bool {
        self.record_error.as_ref().map_or(true, |p| p(error))
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        CircuitBreakerConfigBuilder::new().build()
    }
}

impl fmt::Debug for CircuitBreakerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreakerConfig")
            .field("failure_rate_threshold", &self.failure_rate_threshold)
            .field("sliding_window_size", &self.sliding_window_size)
            .field("minimum_number_of_calls", &self.minimum_number_of_calls)
            .field("wait_duration_in_open_state", &self.wait_duration_in_open_state)
            .field(
                "permitted_calls_in_half_open_state",
                &self.permitted_calls_in_half_open_state,
            )
            .finish_non_exhaustive()
    }
}

/// Builder for [`CircuitBreakerConfig`].
pub struct CircuitBreakerConfigBuilder {
    config: CircuitBreakerConfig,
}

impl Default for CircuitBreakerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CircuitBreakerConfigBuilder {
    /// Creates a new builder with defaults.
    ///
    /// Defaults:
    /// - failure_rate_threshold: 50%
    /// - sliding_window_size: 100 calls
    /// - minimum_number_of_calls: 100
    /// - wait_duration_in_open_state: 60s
    /// - permitted_calls_in_half_open_state: 10
    /// - recorded errors: all
    pub fn new() -> Self {
        Self {
            config: CircuitBreakerConfig {
                failure_rate_threshold: 50.0,
                sliding_window_size: 100,
                minimum_number_of_calls: 100,
                wait_duration_in_open_state: Duration::from_secs(60),
                permitted_calls_in_half_open_state: 10,
                record_error: None,
                event_listeners: EventListeners::new(),
            },
        }
    }

    /// Sets the failure rate threshold in percent (clamped to 0..=100).
    pub fn failure_rate_threshold(mut self, percent: f64) -> Self {
        self.config.failure_rate_threshold = percent.clamp(0.0, 100.0);
        self
    }

    /// Sets the number of most recent calls the failure rate is computed over.
    pub fn sliding_window_size(mut self, size: usize) -> Self {
        self.config.sliding_window_size = size.max(1);
        self
    }

    /// Sets how many calls must be recorded before the failure rate is evaluated.
    pub fn minimum_number_of_calls(mut self, calls: usize) -> Self {
        self.config.minimum_number_of_calls = calls.max(1);
        self
    }

    /// Sets how long the circuit stays open before allowing trial calls.
    pub fn wait_duration_in_open_state(mut self, wait: Duration) -> Self {
        self.config.wait_duration_in_open_state = wait;
        self
    }

    /// Sets the number of trial calls allowed while half-open.
    pub fn permitted_calls_in_half_open_state(mut self, calls: usize) -> Self {
        self.config.permitted_calls_in_half_open_state = calls.max(1);
        self
    }

    /// Only errors accepted by `predicate` count as failures; others count as successes.
    pub fn record_error<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&BoxError) -> bool + Send + Sync + 'static,
    {
        self.config.record_error = Some(Arc::new(predicate));
        self
    }

    /// Registers a callback invoked on every state transition.
    pub fn on_state_transition<F>(mut self, f: F) -> Self
    where
        F: Fn(CircuitState, CircuitState) + Send + Sync + 'static,
    {
        self.config
            .event_listeners
            .add(move |event: &CircuitBreakerEvent| {
                if let CircuitBreakerEvent::StateTransition { from, to, .. } = event {
                    f(*from, *to);
                }
            });
        self
    }

    /// Registers a callback invoked when a call is rejected.
    pub fn on_call_rejected<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.config
            .event_listeners
            .add(move |event: &CircuitBreakerEvent| {
                if let CircuitBreakerEvent::CallRejected { .. } = event {
                    f();
                }
            });
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> CircuitBreakerConfig {
        self.config
    }
}
