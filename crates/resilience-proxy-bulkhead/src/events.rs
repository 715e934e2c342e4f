use resilience_proxy_core::PolicyEvent;
use std::time::Instant;

/// Events emitted by a [`Bulkhead`](crate::Bulkhead).
#[derive(Debug, Clone)]
pub enum BulkheadEvent {
    /// A call was admitted.
    CallPermitted {
        policy_name: String,
        timestamp: Instant,
        concurrent_calls: usize,
    },
    /// A call was rejected because the bulkhead is full.
    CallRejected {
        policy_name: String,
        timestamp: Instant,
        max_concurrent_calls: usize,
    },
    /// An admitted call completed and released its slot.
    CallFinished {
        policy_name: String,
        timestamp: Instant,
    },
}

impl PolicyEvent for BulkheadEvent {
    fn event_type(&self) -> &'static str {
        match self {
            BulkheadEvent::CallPermitted { .. } => "call_permitted",
            BulkheadEvent::CallRejected { .. } => "call_rejected",
            BulkheadEvent::CallFinished { .. } => "call_finished",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            BulkheadEvent::CallPermitted { timestamp, .. }
            | BulkheadEvent::CallRejected { timestamp, .. }
            | BulkheadEvent::CallFinished { timestamp, .. } => *timestamp,
        }
    }

    fn policy_name(&self) -> &str {
        match self {
            BulkheadEvent::CallPermitted { policy_name, .. }
            | BulkheadEvent::CallRejected { policy_name, .. }
            | BulkheadEvent::CallFinished { policy_name, .. } => policy_name,
        }
    }
}
