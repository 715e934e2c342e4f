//! The context object owning every shared resource of a set of proxies.
//!
//! A [`ProxyContext`] holds the named primitive instances, the fallback,
//! mapper and config-provider instances, and the scheduler used by
//! asynchronous decorations. Nothing here is global: two contexts never share
//! state, and everything a context owns lives as long as the context does.

use crate::exceptions::ExceptionMapper;
use crate::metadata::{
    BulkheadPolicy, CircuitBreakerPolicy, ConfigProvider, PrimitivePolicy, RateLimiterPolicy,
    RetryPolicy,
};
use crate::registry::Registry;
use once_cell::sync::OnceCell;
use resilience_proxy_bulkhead::Bulkhead;
use resilience_proxy_circuitbreaker::CircuitBreaker;
use resilience_proxy_core::{BoxError, ConfigError, Scheduler};
use resilience_proxy_ratelimiter::RateLimiter;
use resilience_proxy_retry::Retry;
use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

pub(crate) type Erased = Arc<dyn Any + Send + Sync>;
type Constructor = Arc<dyn Fn() -> Result<Erased, BoxError> + Send + Sync>;

/// Registry key of a managed instance: the type it is registered under.
#[derive(Clone, Copy)]
pub struct InstanceKey {
    id: TypeId,
    type_name: &'static str,
}

impl InstanceKey {
    /// The key for type `K`.
    pub fn of<K: 'static>() -> Self {
        Self {
            id: TypeId::of::<K>(),
            type_name: std::any::type_name::<K>(),
        }
    }

    /// Name of the key type.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl PartialEq for InstanceKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for InstanceKey {}

impl std::hash::Hash for InstanceKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for InstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name)
    }
}

/// Reference to a context-managed instance, optionally with a way to build it.
#[derive(Clone)]
pub struct InstanceRef {
    key: InstanceKey,
    constructor: Option<Constructor>,
}

impl InstanceRef {
    /// References the instance registered under `K`, built by `constructor`
    /// on first lookup when nothing is registered.
    pub fn constructed<K, V, F>(constructor: F) -> Self
    where
        K: 'static,
        V: Send + Sync + 'static,
        F: Fn() -> Result<V, BoxError> + Send + Sync + 'static,
    {
        Self {
            key: InstanceKey::of::<K>(),
            constructor: Some(Arc::new(move || {
                constructor().map(|value| Arc::new(value) as Erased)
            })),
        }
    }

    /// References the instance registered under `K`, which must be registered
    /// on the context before first use.
    pub fn registered<K: 'static>() -> Self {
        Self {
            key: InstanceKey::of::<K>(),
            constructor: None,
        }
    }

    /// The registry key.
    pub fn key(&self) -> InstanceKey {
        self.key
    }

    /// Name of the key type.
    pub fn type_name(&self) -> &'static str {
        self.key.type_name
    }
}

impl fmt::Debug for InstanceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceRef")
            .field("key", &self.key)
            .field("constructible", &self.constructor.is_some())
            .finish()
    }
}

/// Where the fallback stage sits relative to the failure-inducing policies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FallbackPlacement {
    /// Between the circuit breaker and the bulkhead. Fallbacks see target
    /// failures and bulkhead rejections, but not open circuits, rate-limit
    /// rejections or exhausted retries.
    #[default]
    Inner,
    /// Directly inside exception mapping. Fallbacks see every failure the
    /// chain produces.
    Outer,
}

enum SchedulerSlot {
    Explicit(Scheduler),
    Lazy(OnceCell<Scheduler>),
    Disabled,
}

/// Owner of the shared state behind a set of proxies.
///
/// Cloning is cheap; clones share everything.
#[derive(Clone)]
pub struct ProxyContext {
    inner: Arc<Inner>,
}

struct Inner {
    instances: Registry<InstanceKey, Erased>,
    retries: Registry<String, Retry>,
    circuit_breakers: Registry<String, CircuitBreaker>,
    rate_limiters: Registry<String, RateLimiter>,
    bulkheads: Registry<String, Bulkhead>,
    scheduler: SchedulerSlot,
    fallback_placement: FallbackPlacement,
}

impl ProxyContext {
    /// Creates a new context builder.
    pub fn builder() -> ProxyContextBuilder {
        ProxyContextBuilder::new()
    }

    /// A context with nothing registered and a lazily started default scheduler.
    pub fn new() -> Self {
        ProxyContextBuilder::new().build()
    }

    /// Returns the instance referenced by `reference`, constructing and caching
    /// it on first use.
    ///
    /// Repeated lookups return the same instance. Concurrent first lookups
    /// construct it at most once.
    pub fn lookup<V>(&self, reference: &InstanceRef) -> Result<V, ConfigError>
    where
        V: Clone + Send + Sync + 'static,
    {
        let erased = self.lookup_erased(reference)?;
        erased
            .downcast_ref::<V>()
            .cloned()
            .ok_or(ConfigError::WrongType {
                key: reference.type_name(),
                expected: std::any::type_name::<V>(),
            })
    }

    pub(crate) fn lookup_erased(&self, reference: &InstanceRef) -> Result<Erased, ConfigError> {
        let type_name = reference.type_name();
        self.inner
            .instances
            .get_or_try_init(reference.key, || match &reference.constructor {
                Some(constructor) => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(instance = type_name, "constructing default instance");

                    constructor().map_err(|source| ConfigError::Construction { type_name, source })
                }
                None => Err(ConfigError::NoDefault { type_name }),
            })
    }

    /// Returns the retry named by `policy`, creating it on first use.
    pub fn retry(&self, policy: &RetryPolicy) -> Result<Retry, ConfigError> {
        self.inner
            .retries
            .get_or_try_init(policy.name().to_string(), || {
                Ok(Retry::new(policy.name(), self.resolve_config(policy)?))
            })
    }

    /// Returns the circuit breaker named by `policy`, creating it on first use.
    pub fn circuit_breaker(
        &self,
        policy: &CircuitBreakerPolicy,
    ) -> Result<CircuitBreaker, ConfigError> {
        self.inner
            .circuit_breakers
            .get_or_try_init(policy.name().to_string(), || {
                Ok(CircuitBreaker::new(policy.name(), self.resolve_config(policy)?))
            })
    }

    /// Returns the rate limiter named by `policy`, creating it on first use.
    pub fn rate_limiter(&self, policy: &RateLimiterPolicy) -> Result<RateLimiter, ConfigError> {
        self.inner
            .rate_limiters
            .get_or_try_init(policy.name().to_string(), || {
                Ok(RateLimiter::new(policy.name(), self.resolve_config(policy)?))
            })
    }

    /// Returns the bulkhead named by `policy`, creating it on first use.
    pub fn bulkhead(&self, policy: &BulkheadPolicy) -> Result<Bulkhead, ConfigError> {
        self.inner
            .bulkheads
            .get_or_try_init(policy.name().to_string(), || {
                Ok(Bulkhead::new(policy.name(), self.resolve_config(policy)?))
            })
    }

    /// The retry named `name`, if it exists.
    pub fn find_retry(&self, name: &str) -> Option<Retry> {
        self.inner.retries.get(&name.to_string())
    }

    /// The circuit breaker named `name`, if it exists.
    pub fn find_circuit_breaker(&self, name: &str) -> Option<CircuitBreaker> {
        self.inner.circuit_breakers.get(&name.to_string())
    }

    /// The rate limiter named `name`, if it exists.
    pub fn find_rate_limiter(&self, name: &str) -> Option<RateLimiter> {
        self.inner.rate_limiters.get(&name.to_string())
    }

    /// The bulkhead named `name`, if it exists.
    pub fn find_bulkhead(&self, name: &str) -> Option<Bulkhead> {
        self.inner.bulkheads.get(&name.to_string())
    }

    /// Returns true if both handles refer to the same context.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Number of managed instances constructed or registered so far.
    pub fn instance_count(&self) -> usize {
        self.inner.instances.len()
    }

    /// The scheduler for asynchronous decorations.
    ///
    /// Starts the default scheduler on first call unless one was configured
    /// explicitly or the default was disabled, in which case `None` is returned.
    pub fn scheduler(&self) -> Result<Option<Scheduler>, ConfigError> {
        match &self.inner.scheduler {
            SchedulerSlot::Explicit(scheduler) => Ok(Some(scheduler.clone())),
            SchedulerSlot::Lazy(cell) => cell.get_or_try_init(Scheduler::new).cloned().map(Some),
            SchedulerSlot::Disabled => Ok(None),
        }
    }

    /// Where fallback stages are placed in decorator chains.
    pub fn fallback_placement(&self) -> FallbackPlacement {
        self.inner.fallback_placement
    }

    fn resolve_config<C>(&self, policy: &PrimitivePolicy<C>) -> Result<C, ConfigError>
    where
        C: Clone + Default + Send + Sync + 'static,
    {
        if let Some(provider) = policy.provider() {
            let provider: Arc<dyn ConfigProvider<C>> = self.lookup(provider)?;
            return Ok(provider.config());
        }
        Ok(policy.inline_config().cloned().unwrap_or_default())
    }
}

impl Default for ProxyContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ProxyContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyContext")
            .field("instances", &self.inner.instances.len())
            .field("fallback_placement", &self.inner.fallback_placement)
            .finish_non_exhaustive()
    }
}

enum SchedulerChoice {
    Default,
    Explicit(Scheduler),
    Disabled,
}

/// Builder for [`ProxyContext`].
pub struct ProxyContextBuilder {
    instances: Vec<(InstanceKey, Erased)>,
    retries: Vec<Retry>,
    circuit_breakers: Vec<CircuitBreaker>,
    rate_limiters: Vec<RateLimiter>,
    bulkheads: Vec<Bulkhead>,
    scheduler: SchedulerChoice,
    fallback_placement: FallbackPlacement,
}

impl Default for ProxyContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ProxyContextBuilder {
    /// Creates a new builder with defaults.
    ///
    /// Defaults:
    /// - nothing registered
    /// - a dedicated scheduler started on first use
    /// - fallback placement: [`FallbackPlacement::Inner`]
    pub fn new() -> Self {
        Self {
            instances: Vec::new(),
            retries: Vec::new(),
            circuit_breakers: Vec::new(),
            rate_limiters: Vec::new(),
            bulkheads: Vec::new(),
            scheduler: SchedulerChoice::Default,
            fallback_placement: FallbackPlacement::default(),
        }
    }

    /// Registers `value` under key type `K`.
    pub fn instance<K, V>(mut self, value: V) -> Self
    where
        K: 'static,
        V: Send + Sync + 'static,
    {
        self.instances
            .push((InstanceKey::of::<K>(), Arc::new(value) as Erased));
        self
    }

    /// Registers a fallback implementation of interface `S` under its concrete type `F`.
    pub fn fallback<F, S>(self, fallback: Arc<S>) -> Self
    where
        F: 'static,
        S: ?Sized + Send + Sync + 'static,
    {
        self.instance::<F, Arc<S>>(fallback)
    }

    /// Registers an exception mapper under its own type.
    pub fn exception_mapper<M: ExceptionMapper>(self, mapper: M) -> Self {
        self.instance::<M, Arc<dyn ExceptionMapper>>(Arc::new(mapper))
    }

    /// Registers a configuration provider under its own type.
    pub fn config_provider<C, P>(self, provider: P) -> Self
    where
        C: 'static,
        P: ConfigProvider<C>,
    {
        self.instance::<P, Arc<dyn ConfigProvider<C>>>(Arc::new(provider))
    }

    /// Registers a preconfigured retry under its name.
    pub fn retry(mut self, retry: Retry) -> Self {
        self.retries.push(retry);
        self
    }

    /// Registers a preconfigured circuit breaker under its name.
    pub fn circuit_breaker(mut self, breaker: CircuitBreaker) -> Self {
        self.circuit_breakers.push(breaker);
        self
    }

    /// Registers a preconfigured rate limiter under its name.
    pub fn rate_limiter(mut self, limiter: RateLimiter) -> Self {
        self.rate_limiters.push(limiter);
        self
    }

    /// Registers a preconfigured bulkhead under its name.
    pub fn bulkhead(mut self, bulkhead: Bulkhead) -> Self {
        self.bulkheads.push(bulkhead);
        self
    }

    /// Uses `scheduler` for every asynchronous decoration.
    pub fn scheduler(mut self, scheduler: Scheduler) -> Self {
        self.scheduler = SchedulerChoice::Explicit(scheduler);
        self
    }

    /// Disables the default scheduler.
    ///
    /// Asynchronous decorations that need one then fail to build.
    pub fn without_default_scheduler(mut self) -> Self {
        self.scheduler = SchedulerChoice::Disabled;
        self
    }

    /// Sets where fallback stages are placed.
    pub fn fallback_placement(mut self, placement: FallbackPlacement) -> Self {
        self.fallback_placement = placement;
        self
    }

    /// Builds the context.
    pub fn build(self) -> ProxyContext {
        let inner = Inner {
            instances: Registry::new(),
            retries: Registry::new(),
            circuit_breakers: Registry::new(),
            rate_limiters: Registry::new(),
            bulkheads: Registry::new(),
            scheduler: match self.scheduler {
                SchedulerChoice::Default => SchedulerSlot::Lazy(OnceCell::new()),
                SchedulerChoice::Explicit(scheduler) => SchedulerSlot::Explicit(scheduler),
                SchedulerChoice::Disabled => SchedulerSlot::Disabled,
            },
            fallback_placement: self.fallback_placement,
        };
        for (key, value) in self.instances {
            inner.instances.insert(key, value);
        }
        for retry in self.retries {
            inner.retries.insert(retry.name().to_string(), retry);
        }
        for breaker in self.circuit_breakers {
            inner
                .circuit_breakers
                .insert(breaker.name().to_string(), breaker);
        }
        for limiter in self.rate_limiters {
            inner.rate_limiters.insert(limiter.name().to_string(), limiter);
        }
        for bulkhead in self.bulkheads {
            inner.bulkheads.insert(bulkhead.name().to_string(), bulkhead);
        }
        ProxyContext {
            inner: Arc::new(inner),
        }
    }
}
