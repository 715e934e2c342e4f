use super::require_scheduler;
use crate::context::ProxyContext;
use crate::metadata::{Capability, RateLimiterPolicy};
use resilience_proxy_core::{Call, CallShape, ConfigError, Invocation, MethodDescriptor, Scheduler};
use resilience_proxy_ratelimiter::RateLimiter;
use tower_layer::Layer;

/// Wraps a callable with a named [`RateLimiter`].
///
/// Asynchronous methods whose limiter may make callers wait need the
/// context's scheduler to wait on.
#[derive(Debug, Clone)]
pub struct RateLimiterDecorator {
    limiter: RateLimiter,
    scheduler: Option<Scheduler>,
}

impl RateLimiterDecorator {
    /// Resolves the rate limiter named by `policy` for `method`.
    pub fn resolve(
        policy: &RateLimiterPolicy,
        context: &ProxyContext,
        method: &MethodDescriptor,
    ) -> Result<Self, ConfigError> {
        let limiter = context.rate_limiter(policy)?;
        let waits = !limiter.config().timeout_duration().is_zero();
        let scheduler = match method.shape() {
            CallShape::Async if waits => Some(require_scheduler(
                context,
                Capability::RateLimiter,
                method,
            )?),
            _ => None,
        };
        Ok(Self { limiter, scheduler })
    }

    /// The underlying rate limiter.
    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.limiter
    }
}

impl<A, T> Layer<Invocation<A, T>> for RateLimiterDecorator
where
    A: Send + 'static,
    T: Send + 'static,
{
    type Service = Invocation<A, T>;

    fn layer(&self, inner: Invocation<A, T>) -> Self::Service {
        inner.map_call(|call| match call {
            Call::Sync(f) => Call::Sync(self.limiter.decorate_sync(f)),
            Call::Async(f) => {
                Call::Async(self.limiter.decorate_async(f, self.scheduler.clone()))
            }
        })
    }
}
