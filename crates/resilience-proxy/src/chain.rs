//! Ordered composition of decorators around a method.

use crate::adapter::Target;
use crate::context::{FallbackPlacement, ProxyContext};
use crate::decorators::{
    BulkheadDecorator, CircuitBreakerDecorator, RateLimiterDecorator, RetryDecorator,
};
use crate::exceptions::ExceptionsDecorator;
use crate::fallback::FallbackDecorator;
use crate::metadata::{Capability, Policy, PolicyResolver};
use resilience_proxy_core::{ConfigError, Invocation, MethodDescriptor};
use std::sync::Arc;
use tower_layer::Layer;

/// Capabilities in chain order, outermost first, for a fallback placement.
pub fn chain_order(placement: FallbackPlacement) -> [Capability; 6] {
    match placement {
        FallbackPlacement::Inner => Capability::ALL,
        FallbackPlacement::Outer => [
            Capability::Exceptions,
            Capability::Fallback,
            Capability::Retry,
            Capability::RateLimiter,
            Capability::CircuitBreaker,
            Capability::Bulkhead,
        ],
    }
}

/// One resolved stage of a chain.
#[derive(Debug, Clone)]
pub enum Decorator {
    Exceptions(ExceptionsDecorator),
    Retry(RetryDecorator),
    RateLimiter(RateLimiterDecorator),
    CircuitBreaker(CircuitBreakerDecorator),
    Fallback(FallbackDecorator),
    Bulkhead(BulkheadDecorator),
}

impl Decorator {
    fn resolve(
        policy: &Policy,
        context: &ProxyContext,
        method: &MethodDescriptor,
    ) -> Result<Self, ConfigError> {
        Ok(match policy {
            Policy::Exceptions(policy) => {
                Decorator::Exceptions(ExceptionsDecorator::resolve(policy, context, method)?)
            }
            Policy::Retry(policy) => {
                Decorator::Retry(RetryDecorator::resolve(policy, context, method)?)
            }
            Policy::RateLimiter(policy) => {
                Decorator::RateLimiter(RateLimiterDecorator::resolve(policy, context, method)?)
            }
            Policy::CircuitBreaker(policy) => {
                Decorator::CircuitBreaker(CircuitBreakerDecorator::resolve(policy, context)?)
            }
            Policy::Fallback(policy) => {
                Decorator::Fallback(FallbackDecorator::resolve(policy, context)?)
            }
            Policy::Bulkhead(policy) => {
                Decorator::Bulkhead(BulkheadDecorator::resolve(policy, context, method)?)
            }
        })
    }

    /// The capability this stage implements.
    pub fn capability(&self) -> Capability {
        match self {
            Decorator::Exceptions(_) => Capability::Exceptions,
            Decorator::Retry(_) => Capability::Retry,
            Decorator::RateLimiter(_) => Capability::RateLimiter,
            Decorator::CircuitBreaker(_) => Capability::CircuitBreaker,
            Decorator::Fallback(_) => Capability::Fallback,
            Decorator::Bulkhead(_) => Capability::Bulkhead,
        }
    }
}

/// The decorators applying to one method, outermost first.
///
/// A chain is resolved once per method and proxy; applying it wraps the
/// method's invocation so that the first stage is the first to see a call and
/// the last to see its outcome.
#[derive(Debug, Clone)]
pub struct DecoratorChain {
    stages: Vec<Decorator>,
}

impl DecoratorChain {
    /// Resolves every capability that applies to `method`.
    ///
    /// Capabilities without a policy are skipped. Configuration problems of
    /// any stage fail the whole chain.
    pub fn resolve(
        resolver: &dyn PolicyResolver,
        context: &ProxyContext,
        method: &MethodDescriptor,
    ) -> Result<Self, ConfigError> {
        let mut stages = Vec::new();
        for capability in chain_order(context.fallback_placement()) {
            let Some(policy) = resolver.find(capability, method) else {
                continue;
            };
            let stage = Decorator::resolve(&policy, context, method).map_err(|error| {
                #[cfg(feature = "tracing")]
                tracing::warn!(method = %method, %capability, %error, "failed to resolve decorator");
                error
            })?;
            stages.push(stage);
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(method = %method, stages = stages.len(), "decorator chain resolved");

        Ok(Self { stages })
    }

    /// Capabilities of the stages, outermost first.
    pub fn capabilities(&self) -> Vec<Capability> {
        self.stages.iter().map(Decorator::capability).collect()
    }

    /// The stages, outermost first.
    pub fn stages(&self) -> &[Decorator] {
        &self.stages
    }

    /// Returns true if no capability applies; the method passes straight through.
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Wraps `invocation` with every stage.
    ///
    /// `target` is the method body fallbacks are invoked through; it fixes
    /// the interface every fallback must implement.
    pub fn apply<S, A, T>(
        &self,
        invocation: Invocation<A, T>,
        target: Target<S, A, T>,
    ) -> Result<Invocation<A, T>, ConfigError>
    where
        S: ?Sized + Send + Sync + 'static,
        A: Clone + Send + 'static,
        T: Send + 'static,
    {
        let method = Arc::clone(invocation.method());
        self.stages
            .iter()
            .rev()
            .try_fold(invocation, |inner, stage| -> Result<_, ConfigError> {
                Ok(match stage {
                    Decorator::Exceptions(decorator) => decorator.layer(inner),
                    Decorator::Retry(decorator) => decorator.layer(inner),
                    Decorator::RateLimiter(decorator) => decorator.layer(inner),
                    Decorator::CircuitBreaker(decorator) => decorator.layer(inner),
                    Decorator::Fallback(decorator) => decorator.bind(target, &method)?.layer(inner),
                    Decorator::Bulkhead(decorator) => decorator.layer(inner),
                })
            })
    }
}
