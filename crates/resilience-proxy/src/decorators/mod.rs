//! Per-capability decorators wrapping the resilience primitives.
//!
//! Each decorator resolves its primitive from the [`ProxyContext`] by name and
//! wraps an [`Invocation`](resilience_proxy_core::Invocation) with the
//! primitive's synchronous or asynchronous decoration, depending on the shape
//! of the callable.

mod bulkhead;
mod circuitbreaker;
mod ratelimiter;
mod retry;

pub use bulkhead::BulkheadDecorator;
pub use circuitbreaker::CircuitBreakerDecorator;
pub use ratelimiter::RateLimiterDecorator;
pub use retry::RetryDecorator;

use crate::context::ProxyContext;
use crate::metadata::Capability;
use resilience_proxy_core::{ConfigError, MethodDescriptor, Scheduler};

/// Returns the context's scheduler, or a configuration error naming the
/// capability that needs it.
fn require_scheduler(
    context: &ProxyContext,
    capability: Capability,
    method: &MethodDescriptor,
) -> Result<Scheduler, ConfigError> {
    context
        .scheduler()?
        .ok_or_else(|| ConfigError::MissingScheduler {
            capability: capability.name(),
            method: method.to_string(),
        })
}
