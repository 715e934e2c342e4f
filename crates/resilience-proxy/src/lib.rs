//! Resilience decorators for trait objects.
//!
//! `resilience-proxy` wraps an implementation of a trait in a proxy whose
//! methods run through a chain of resilience decorators. Which decorators
//! apply, and how they are configured, is declared as policy metadata per
//! interface or per method; the proxy resolves it once per method and caches
//! the resulting chain.
//!
//! # Capabilities
//!
//! Decorators are composed outermost first in this order:
//!
//! 1. **Exceptions**: maps errors escaping the chain through [`ExceptionMapper`]s
//! 2. **Retry**: re-invokes the rest of the chain on failures or unwanted results
//! 3. **Rate limiter**: admits a bounded number of calls per refresh period
//! 4. **Circuit breaker**: stops calling a failing target
//! 5. **Fallback**: substitutes an alternate implementation on accepted outcomes
//! 6. **Bulkhead**: bounds concurrent calls
//!
//! [`FallbackPlacement::Outer`] moves the fallback directly inside the
//! exception mapping so it also covers rejections by the other decorators.
//!
//! # Example
//!
//! ```rust,no_run
//! use resilience_proxy::retry::RetryConfig;
//! use resilience_proxy::{
//!     resilient_proxy, BoxError, FallbackPolicy, FallbackStage, PolicyTable, ProxyContext,
//!     RetryPolicy,
//! };
//! use std::sync::Arc;
//!
//! pub trait Quotes: Send + Sync {
//!     fn latest(&self, symbol: String) -> Result<f64, BoxError>;
//! }
//!
//! struct Exchange;
//!
//! impl Quotes for Exchange {
//!     fn latest(&self, _symbol: String) -> Result<f64, BoxError> {
//!         Err("exchange unavailable".into())
//!     }
//! }
//!
//! #[derive(Default)]
//! struct Cached;
//!
//! impl Quotes for Cached {
//!     fn latest(&self, _symbol: String) -> Result<f64, BoxError> {
//!         Ok(42.0)
//!     }
//! }
//!
//! resilient_proxy! {
//!     pub struct QuotesProxy for dyn Quotes {
//!         fn latest(&self, symbol: String) -> f64;
//!     }
//! }
//!
//! let policies = PolicyTable::builder()
//!     .interface(RetryPolicy::named("quotes").config(
//!         RetryConfig::builder().max_attempts(3).build(),
//!     ))
//!     .method(
//!         "latest",
//!         FallbackPolicy::from(FallbackStage::new(QuotesProxy::fallback::<Cached>())),
//!     )
//!     .build();
//!
//! let quotes = QuotesProxy::new(Arc::new(Exchange), Arc::new(policies), ProxyContext::new());
//! assert_eq!(quotes.latest("ACME".into()).unwrap(), 42.0);
//! ```
//!
//! # Feature Flags
//!
//! - `tracing`: logs chain resolution and configuration failures, and turns
//!   on tracing in the primitive crates

mod adapter;
mod chain;
mod context;
mod decorators;
mod dispatcher;
mod exceptions;
mod fallback;
mod macros;
mod metadata;
mod registry;

pub use adapter::{AsyncTarget, SyncTarget, Target};
pub use chain::{chain_order, Decorator, DecoratorChain};
pub use context::{
    FallbackPlacement, InstanceKey, InstanceRef, ProxyContext, ProxyContextBuilder,
};
pub use decorators::{
    BulkheadDecorator, CircuitBreakerDecorator, RateLimiterDecorator, RetryDecorator,
};
pub use dispatcher::{Method, ProxyDispatcher};
pub use exceptions::{ExceptionMapper, ExceptionsDecorator, ExceptionsPolicy, FnMapper};
pub use fallback::{
    AnyError, BoundFallback, ErrorPredicate, ErrorTypeHandler, FallbackDecorator,
    FallbackHandler, FallbackPolicy, FallbackSource, FallbackStage, Outcome, ResultPredicate,
};
pub use metadata::{
    BulkheadPolicy, Capability, CircuitBreakerPolicy, ConfigProvider, Policy, PolicyResolver,
    PolicyTable, PolicyTableBuilder, PrimitivePolicy, RateLimiterPolicy, RetryPolicy,
};

pub use futures::future::BoxFuture;
pub use resilience_proxy_core::{
    BoxError, CallShape, ConfigError, ErrorClass, ErrorType, Invocation, MethodDescriptor,
    MethodKey, Scheduler,
};

pub use resilience_proxy_bulkhead as bulkhead;
pub use resilience_proxy_circuitbreaker as circuitbreaker;
pub use resilience_proxy_core as core;
pub use resilience_proxy_ratelimiter as ratelimiter;
pub use resilience_proxy_retry as retry;
