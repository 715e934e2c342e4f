use crate::events::BulkheadEvent;
use resilience_proxy_core::EventListeners;
use std::time::Duration;

/// Configuration for a [`Bulkhead`](crate::Bulkhead).
#[derive(Debug, Clone)]
pub struct BulkheadConfig {
    pub(crate) max_concurrent_calls: usize,
    pub(crate) max_wait_duration: Duration,
    pub(crate) event_listeners: EventListeners<BulkheadEvent>,
}

impl BulkheadConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> BulkheadConfigBuilder {
        BulkheadConfigBuilder::new()
    }

    /// Maximum number of calls in flight.
    pub fn max_concurrent_calls(&self) -> usize {
        self.max_concurrent_calls
    }

    /// Longest a call waits for a free slot.
    pub fn max_wait_duration(&self) -> Duration {
        self.max_wait_duration
    }
}

impl Default for BulkheadConfig {
    fn default() -> Self {
        BulkheadConfigBuilder::new().build()
    }
}

/// Builder for [`BulkheadConfig`].
pub struct BulkheadConfigBuilder {
    max_concurrent_calls: usize,
    max_wait_duration: Duration,
    event_listeners: EventListeners<BulkheadEvent>,
}

impl Default for BulkheadConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl BulkheadConfigBuilder {
    /// Creates a new builder with defaults.
    ///
    /// Defaults:
    /// - max_concurrent_calls: 25
    /// - max_wait_duration: 0 (reject immediately when full)
    pub fn new() -> Self {
        Self {
            max_concurrent_calls: 25,
            max_wait_duration: Duration::ZERO,
            event_listeners: EventListeners::new(),
        }
    }

    /// Sets the maximum number of calls in flight.
    pub fn max_concurrent_calls(mut self, max: usize) -> Self {
        self.max_concurrent_calls = max;
        self
    }

    /// Sets how long a call may wait for a free slot.
    pub fn max_wait_duration(mut self, wait: Duration) -> Self {
        self.max_wait_duration = wait;
        self
    }

    /// Registers a callback invoked when a call is admitted, with the calls now in flight.
    pub fn on_call_permitted<F>(mut self, f: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.event_listeners.add(move |event: &BulkheadEvent| {
            if let BulkheadEvent::CallPermitted { concurrent_calls, .. } = event {
                f(*concurrent_calls);
            }
        });
        self
    }

    /// Registers a callback invoked when a call is rejected.
    pub fn on_call_rejected<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.event_listeners.add(move |event: &BulkheadEvent| {
            if let BulkheadEvent::CallRejected { .. } = event {
                f();
            }
        });
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> BulkheadConfig {
        BulkheadConfig {
            max_concurrent_calls: self.max_concurrent_calls,
            max_wait_duration: self.max_wait_duration,
            event_listeners: self.event_listeners,
        }
    }
}
