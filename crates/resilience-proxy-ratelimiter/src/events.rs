use resilience_proxy_core::PolicyEvent;
use std::time::{Duration, Instant};

/// Events emitted by a [`RateLimiter`](crate::RateLimiter).
#[derive(Debug, Clone)]
pub enum RateLimiterEvent {
    /// A permission was granted after `wait`.
    PermitAcquired {
        policy_name: String,
        timestamp: Instant,
        wait: Duration,
    },
    /// No permission was available within the timeout.
    PermitRejected {
        policy_name: String,
        timestamp: Instant,
        timeout: Duration,
    },
}

impl PolicyEvent for RateLimiterEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RateLimiterEvent::PermitAcquired { .. } => "permit_acquired",
            RateLimiterEvent::PermitRejected { .. } => "permit_rejected",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            RateLimiterEvent::PermitAcquired { timestamp, .. }
            | RateLimiterEvent::PermitRejected { timestamp, .. } => *timestamp,
        }
    }

    fn policy_name(&self) -> &str {
        match self {
            RateLimiterEvent::PermitAcquired { policy_name, .. }
            | RateLimiterEvent::PermitRejected { policy_name, .. } => policy_name,
        }
    }
}
