//! Policy metadata and its resolution.
//!
//! Policies are declared per interface or per method through a
//! [`PolicyTable`]. A method-level policy for a capability fully replaces the
//! interface-level policy for that same capability and leaves every other
//! capability untouched.

use crate::context::InstanceRef;
use crate::exceptions::ExceptionsPolicy;
use crate::fallback::FallbackPolicy;
use resilience_proxy_bulkhead::BulkheadConfig;
use resilience_proxy_circuitbreaker::CircuitBreakerConfig;
use resilience_proxy_core::MethodDescriptor;
use resilience_proxy_ratelimiter::RateLimiterConfig;
use resilience_proxy_retry::RetryConfig;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// One resilience concern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Capability {
    Exceptions,
    Retry,
    RateLimiter,
    CircuitBreaker,
    Fallback,
    Bulkhead,
}

impl Capability {
    /// Every capability, in default chain order from outermost to innermost.
    pub const ALL: [Capability; 6] = [
        Capability::Exceptions,
        Capability::Retry,
        Capability::RateLimiter,
        Capability::CircuitBreaker,
        Capability::Fallback,
        Capability::Bulkhead,
    ];

    /// Human readable name.
    pub fn name(&self) -> &'static str {
        match self {
            Capability::Exceptions => "exceptions",
            Capability::Retry => "retry",
            Capability::RateLimiter => "rate limiter",
            Capability::CircuitBreaker => "circuit breaker",
            Capability::Fallback => "fallback",
            Capability::Bulkhead => "bulkhead",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Supplies a primitive's configuration from outside the policy declaration.
///
/// A provider referenced by a policy takes precedence over the policy's
/// inline configuration.
pub trait ConfigProvider<C>: Send + Sync + 'static {
    /// Returns the configuration to build the primitive with.
    fn config(&self) -> C;
}

/// Policy for a named resilience primitive.
///
/// The name identifies the primitive instance inside a
/// [`ProxyContext`](crate::ProxyContext): every policy with the same name
/// shares one instance, configured by whichever policy first created it.
#[derive(Clone)]
pub struct PrimitivePolicy<C> {
    name: String,
    config: Option<C>,
    provider: Option<InstanceRef>,
}

/// Retry policy.
pub type RetryPolicy = PrimitivePolicy<RetryConfig>;
/// Circuit breaker policy.
pub type CircuitBreakerPolicy = PrimitivePolicy<CircuitBreakerConfig>;
/// Rate limiter policy.
pub type RateLimiterPolicy = PrimitivePolicy<RateLimiterConfig>;
/// Bulkhead policy.
pub type BulkheadPolicy = PrimitivePolicy<BulkheadConfig>;

impl<C: Send + Sync + 'static> PrimitivePolicy<C> {
    /// A policy for the primitive `name`, with default configuration.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: None,
            provider: None,
        }
    }

    /// Configures the primitive inline.
    pub fn config(mut self, config: C) -> Self {
        self.config = Some(config);
        self
    }

    /// Configures the primitive through provider `P`, default-constructed on first use.
    pub fn config_provider<P>(mut self) -> Self
    where
        P: ConfigProvider<C> + Default,
    {
        self.provider = Some(InstanceRef::constructed::<P, _, _>(|| {
            Ok(Arc::new(P::default()) as Arc<dyn ConfigProvider<C>>)
        }));
        self
    }

    /// Configures the primitive through provider `P`, which must be registered
    /// on the context.
    pub fn registered_config_provider<P: 'static>(mut self) -> Self {
        self.provider = Some(InstanceRef::registered::<P>());
        self
    }

    /// Name of the primitive instance.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn inline_config(&self) -> Option<&C> {
        self.config.as_ref()
    }

    pub(crate) fn provider(&self) -> Option<&InstanceRef> {
        self.provider.as_ref()
    }
}

impl<C> fmt::Debug for PrimitivePolicy<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrimitivePolicy")
            .field("name", &self.name)
            .field("inline", &self.config.is_some())
            .field("provider", &self.provider.as_ref().map(InstanceRef::type_name))
            .finish()
    }
}

/// Declared policy for one capability.
#[derive(Clone, Debug)]
pub enum Policy {
    Retry(RetryPolicy),
    CircuitBreaker(CircuitBreakerPolicy),
    RateLimiter(RateLimiterPolicy),
    Bulkhead(BulkheadPolicy),
    Fallback(FallbackPolicy),
    Exceptions(ExceptionsPolicy),
}

impl Policy {
    /// The capability this policy configures.
    pub fn capability(&self) -> Capability {
        match self {
            Policy::Retry(_) => Capability::Retry,
            Policy::CircuitBreaker(_) => Capability::CircuitBreaker,
            Policy::RateLimiter(_) => Capability::RateLimiter,
            Policy::Bulkhead(_) => Capability::Bulkhead,
            Policy::Fallback(_) => Capability::Fallback,
            Policy::Exceptions(_) => Capability::Exceptions,
        }
    }
}

impl From<RetryPolicy> for Policy {
    fn from(policy: RetryPolicy) -> Self {
        Policy::Retry(policy)
    }
}

impl From<CircuitBreakerPolicy> for Policy {
    fn from(policy: CircuitBreakerPolicy) -> Self {
        Policy::CircuitBreaker(policy)
    }
}

impl From<RateLimiterPolicy> for Policy {
    fn from(policy: RateLimiterPolicy) -> Self {
        Policy::RateLimiter(policy)
    }
}

impl From<BulkheadPolicy> for Policy {
    fn from(policy: BulkheadPolicy) -> Self {
        Policy::Bulkhead(policy)
    }
}

impl From<FallbackPolicy> for Policy {
    fn from(policy: FallbackPolicy) -> Self {
        Policy::Fallback(policy)
    }
}

impl From<ExceptionsPolicy> for Policy {
    fn from(policy: ExceptionsPolicy) -> Self {
        Policy::Exceptions(policy)
    }
}

/// Finds the policy that applies to a method for a capability.
pub trait PolicyResolver: Send + Sync + 'static {
    /// Returns the applicable policy, or `None` when the capability does not apply.
    fn find(&self, capability: Capability, method: &MethodDescriptor) -> Option<Policy>;
}

/// Statically declared policies for one interface.
#[derive(Clone, Debug, Default)]
pub struct PolicyTable {
    interface: HashMap<Capability, Policy>,
    methods: HashMap<String, HashMap<Capability, Policy>>,
}

impl PolicyTable {
    /// Creates a new table builder.
    pub fn builder() -> PolicyTableBuilder {
        PolicyTableBuilder {
            table: PolicyTable::default(),
        }
    }

    /// A table with no policies; every method passes straight through.
    pub fn empty() -> Self {
        Self::default()
    }
}

impl PolicyResolver for PolicyTable {
    fn find(&self, capability: Capability, method: &MethodDescriptor) -> Option<Policy> {
        self.methods
            .get(method.name())
            .and_then(|policies| policies.get(&capability))
            .or_else(|| self.interface.get(&capability))
            .cloned()
    }
}

/// Builder for [`PolicyTable`].
#[derive(Debug)]
pub struct PolicyTableBuilder {
    table: PolicyTable,
}

impl PolicyTableBuilder {
    /// Declares a policy for every method of the interface.
    ///
    /// A later declaration for the same capability replaces an earlier one.
    pub fn interface(mut self, policy: impl Into<Policy>) -> Self {
        let policy = policy.into();
        self.table.interface.insert(policy.capability(), policy);
        self
    }

    /// Declares a policy for the method `name`, overriding the interface-level
    /// policy of the same capability.
    pub fn method(mut self, name: impl Into<String>, policy: impl Into<Policy>) -> Self {
        let policy = policy.into();
        self.table
            .methods
            .entry(name.into())
            .or_default()
            .insert(policy.capability(), policy);
        self
    }

    /// Builds the table.
    pub fn build(self) -> PolicyTable {
        self.table
    }
}
