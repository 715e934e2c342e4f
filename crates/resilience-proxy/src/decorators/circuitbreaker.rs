use crate::context::ProxyContext;
use crate::metadata::CircuitBreakerPolicy;
use resilience_proxy_circuitbreaker::CircuitBreaker;
use resilience_proxy_core::{Call, ConfigError, Invocation};
use tower_layer::Layer;

/// Wraps a callable with a named [`CircuitBreaker`].
#[derive(Debug, Clone)]
pub struct CircuitBreakerDecorator {
    breaker: CircuitBreaker,
}

impl CircuitBreakerDecorator {
    /// Resolves the circuit breaker named by `policy`.
    pub fn resolve(
        policy: &CircuitBreakerPolicy,
        context: &ProxyContext,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            breaker: context.circuit_breaker(policy)?,
        })
    }

    /// The underlying circuit breaker.
    pub fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }
}

impl<A, T> Layer<Invocation<A, T>> for CircuitBreakerDecorator
where
    A: Send + 'static,
    T: Send + 'static,
{
    type Service = Invocation<A, T>;

    fn layer(&self, inner: Invocation<A, T>) -> Self::Service {
        inner.map_call(|call| match call {
            Call::Sync(f) => Call::Sync(self.breaker.decorate_sync(f)),
            Call::Async(f) => Call::Async(self.breaker.decorate_async(f)),
        })
    }
}
