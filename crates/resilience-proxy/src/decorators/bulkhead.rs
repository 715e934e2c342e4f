use super::require_scheduler;
use crate::context::ProxyContext;
use crate::metadata::{BulkheadPolicy, Capability};
use resilience_proxy_bulkhead::Bulkhead;
use resilience_proxy_core::{Call, ConfigError, Invocation, MethodDescriptor, Scheduler};
use tower_layer::Layer;

/// Wraps a callable with a named [`Bulkhead`].
///
/// A bulkhead that lets callers wait for a slot needs the context's
/// scheduler, whatever the shape of the method.
#[derive(Debug, Clone)]
pub struct BulkheadDecorator {
    bulkhead: Bulkhead,
    scheduler: Option<Scheduler>,
}

impl BulkheadDecorator {
    /// Resolves the bulkhead named by `policy` for `method`.
    pub fn resolve(
        policy: &BulkheadPolicy,
        context: &ProxyContext,
        method: &MethodDescriptor,
    ) -> Result<Self, ConfigError> {
        let bulkhead = context.bulkhead(policy)?;
        let scheduler = if bulkhead.config().max_wait_duration().is_zero() {
            None
        } else {
            Some(require_scheduler(context, Capability::Bulkhead, method)?)
        };
        Ok(Self {
            bulkhead,
            scheduler,
        })
    }

    /// The underlying bulkhead.
    pub fn bulkhead(&self) -> &Bulkhead {
        &self.bulkhead
    }
}

impl<A, T> Layer<Invocation<A, T>> for BulkheadDecorator
where
    A: Send + 'static,
    T: Send + 'static,
{
    type Service = Invocation<A, T>;

    fn layer(&self, inner: Invocation<A, T>) -> Self::Service {
        let scheduler = self.scheduler.clone();
        inner.map_call(|call| match call {
            Call::Sync(f) => Call::Sync(self.bulkhead.decorate_sync(f, scheduler)),
            Call::Async(f) => Call::Async(self.bulkhead.decorate_async(f, scheduler)),
        })
    }
}
