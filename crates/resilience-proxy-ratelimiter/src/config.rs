use crate::events::RateLimiterEvent;
use resilience_proxy_core::EventListeners;
use std::time::Duration;

/// Configuration for a [`RateLimiter`](crate::RateLimiter).
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    pub(crate) limit_for_period: usize,
    pub(crate) limit_refresh_period: Duration,
    pub(crate) timeout_duration: Duration,
    pub(crate) event_listeners: EventListeners<RateLimiterEvent>,
}

impl RateLimiterConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> RateLimiterConfigBuilder {
        RateLimiterConfigBuilder::new()
    }

    /// Permissions granted per refresh period.
    pub fn limit_for_period(&self) -> usize {
        self.limit_for_period
    }

    /// Length of a refresh period.
    pub fn limit_refresh_period(&self) -> Duration {
        self.limit_refresh_period
    }

    /// Longest a caller waits for a permission.
    pub fn timeout_duration(&self) -> Duration {
        self.timeout_duration
    }
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        RateLimiterConfigBuilder::new().build()
    }
}

/// Builder for [`RateLimiterConfig`].
pub struct RateLimiterConfigBuilder {
    limit_for_period: usize,
    limit_refresh_period: Duration,
    timeout_duration: Duration,
    event_listeners: EventListeners<RateLimiterEvent>,
}

impl Default for RateLimiterConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiterConfigBuilder {
    /// Creates a new builder with defaults.
    ///
    /// Defaults:
    /// - limit_for_period: 50
    /// - limit_refresh_period: 500ms
    /// - timeout_duration: 5s
    pub fn new() -> Self {
        Self {
            limit_for_period: 50,
            limit_refresh_period: Duration::from_millis(500),
            timeout_duration: Duration::from_secs(5),
            event_listeners: EventListeners::new(),
        }
    }

    /// Sets the number of permissions granted per refresh period.
    pub fn limit_for_period(mut self, limit: usize) -> Self {
        self.limit_for_period = limit;
        self
    }

    /// Sets the refresh period.
    pub fn limit_refresh_period(mut self, period: Duration) -> Self {
        self.limit_refresh_period = period;
        self
    }

    /// Sets how long a caller may wait for a permission.
    ///
    /// Zero rejects immediately when no permission is available.
    pub fn timeout_duration(mut self, timeout: Duration) -> Self {
        self.timeout_duration = timeout;
        self
    }

    /// Registers a callback invoked when a permission is granted, with the wait it required.
    pub fn on_permit_acquired<F>(mut self, f: F) -> Self
    where
        F: Fn(Duration) + Send + Sync + 'static,
    {
        self.event_listeners.add(move |event: &RateLimiterEvent| {
            if let RateLimiterEvent::PermitAcquired { wait, .. } = event {
                f(*wait);
            }
        });
        self
    }

    /// Registers a callback invoked when a call is rejected.
    pub fn on_permit_rejected<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.event_listeners.add(move |event: &RateLimiterEvent| {
            if let RateLimiterEvent::PermitRejected { .. } = event {
                f();
            }
        });
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> RateLimiterConfig {
        RateLimiterConfig {
            limit_for_period: self.limit_for_period,
            limit_refresh_period: self.limit_refresh_period,
            timeout_duration: self.timeout_duration,
            event_listeners: self.event_listeners,
        }
    }
}
