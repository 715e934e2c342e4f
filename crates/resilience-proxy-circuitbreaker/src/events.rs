use crate::CircuitState;
use resilience_proxy_core::PolicyEvent;
use std::time::Instant;

/// Events emitted by a [`CircuitBreaker`](crate::CircuitBreaker).
#[derive(Debug, Clone)]
pub enum CircuitBreakerEvent {
    /// The circuit moved between states.
    StateTransition {
        policy_name: String,
        timestamp: Instant,
        from: CircuitState,
        to: CircuitState,
    },
    /// A call was rejected because the circuit does not permit it.
    CallRejected {
        policy_name: String,
        timestamp: Instant,
        state: CircuitState,
    },
    /// A call completed and counted as a success.
    SuccessRecorded {
        policy_name: String,
        timestamp: Instant,
    },
    /// A call failed and counted as a failure.
    FailureRecorded {
        policy_name: String,
        timestamp: Instant,
    },
}

impl PolicyEvent for CircuitBreakerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CircuitBreakerEvent::StateTransition { .. } => "state_transition",
            CircuitBreakerEvent::CallRejected { .. } => "call_rejected",
            CircuitBreakerEvent::SuccessRecorded { .. } => "success_recorded",
            CircuitBreakerEvent::FailureRecorded { .. } => "failure_recorded",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            CircuitBreakerEvent::StateTransition { timestamp, .. }
            | CircuitBreakerEvent::CallRejected { timestamp, .. }
            | CircuitBreakerEvent::SuccessRecorded { timestamp, .. }
            | CircuitBreakerEvent::FailureRecorded { timestamp, .. } => *timestamp,
        }
    }

    fn policy_name(&self) -> &str {
        match self {
            CircuitBreakerEvent::StateTransition { policy_name, .. }
            | CircuitBreakerEvent::CallRejected { policy_name, .. }
            | CircuitBreakerEvent::SuccessRecorded { policy_name, .. }
            | CircuitBreakerEvent::FailureRecorded { policy_name, .. } => policy_name,
        }
    }
}
