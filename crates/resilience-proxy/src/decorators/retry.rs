use super::require_scheduler;
use crate::context::ProxyContext;
use crate::metadata::{Capability, RetryPolicy};
use resilience_proxy_core::{Call, CallShape, ConfigError, Invocation, MethodDescriptor, Scheduler};
use resilience_proxy_retry::Retry;
use tower_layer::Layer;

/// Wraps a callable with a named [`Retry`].
///
/// Asynchronous methods wait between attempts on the context's scheduler.
#[derive(Debug, Clone)]
pub struct RetryDecorator {
    retry: Retry,
    scheduler: Option<Scheduler>,
}

impl RetryDecorator {
    /// Resolves the retry named by `policy` for `method`.
    pub fn resolve(
        policy: &RetryPolicy,
        context: &ProxyContext,
        method: &MethodDescriptor,
    ) -> Result<Self, ConfigError> {
        let retry = context.retry(policy)?;
        let scheduler = match method.shape() {
            CallShape::Sync => None,
            CallShape::Async => Some(require_scheduler(context, Capability::Retry, method)?),
        };
        Ok(Self { retry, scheduler })
    }

    /// The underlying retry.
    pub fn retry(&self) -> &Retry {
        &self.retry
    }
}

impl<A, T> Layer<Invocation<A, T>> for RetryDecorator
where
    A: Clone + Send + 'static,
    T: Send + 'static,
{
    type Service = Invocation<A, T>;

    fn layer(&self, inner: Invocation<A, T>) -> Self::Service {
        inner.map_call(|call| match call {
            Call::Sync(f) => Call::Sync(self.retry.decorate_sync(f)),
            Call::Async(f) => Call::Async(self.retry.decorate_async(f, self.scheduler.clone())),
        })
    }
}
