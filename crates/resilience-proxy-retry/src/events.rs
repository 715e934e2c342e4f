use resilience_proxy_core::PolicyEvent;
use std::time::{Duration, Instant};

/// Events emitted by a [`Retry`](crate::Retry).
#[derive(Debug, Clone)]
pub enum RetryEvent {
    /// Another attempt will be made after `wait`.
    Retry {
        policy_name: String,
        timestamp: Instant,
        attempt: usize,
        wait: Duration,
    },
    /// The call completed with an accepted outcome.
    Success {
        policy_name: String,
        timestamp: Instant,
        attempts: usize,
    },
    /// The call failed after exhausting its attempts.
    Error {
        policy_name: String,
        timestamp: Instant,
        attempts: usize,
    },
    /// The call failed with an error the retry does not handle.
    IgnoredError {
        policy_name: String,
        timestamp: Instant,
    },
}

impl PolicyEvent for RetryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RetryEvent::Retry { .. } => "retry",
            RetryEvent::Success { .. } => "success",
            RetryEvent::Error { .. } => "error",
            RetryEvent::IgnoredError { .. } => "ignored_error",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            RetryEvent::Retry { timestamp, .. }
            | RetryEvent::Success { timestamp, .. }
            | RetryEvent::Error { timestamp, .. }
            | RetryEvent::IgnoredError { timestamp, .. } => *timestamp,
        }
    }

    fn policy_name(&self) -> &str {
        match self {
            RetryEvent::Retry { policy_name, .. }
            | RetryEvent::Success { policy_name, .. }
            | RetryEvent::Error { policy_name, .. }
            | RetryEvent::IgnoredError { policy_name, .. } => policy_name,
        }
    }
}
