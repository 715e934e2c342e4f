//! Per-proxy invocation handling.
//!
//! A [`ProxyDispatcher`] owns the wrapped target, the policy resolver and the
//! context. Each method is described by a [`Method`]; on its first call the
//! dispatcher resolves the method's [`DecoratorChain`], wraps the target with
//! it and caches the result for the lifetime of the dispatcher. Later calls
//! reuse the cached invocation without consulting the resolver again.

use crate::adapter::{AsyncTarget, SyncTarget, Target};
use crate::chain::DecoratorChain;
use crate::context::{Erased, ProxyContext};
use crate::metadata::PolicyResolver;
use crate::registry::Registry;
use futures::future::{self, BoxFuture};
use resilience_proxy_core::{
    BoxError, Call, CallShape, ConfigError, ErrorType, Invocation, MethodDescriptor, MethodKey,
};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tower_service::Service;

fn no_declared_errors() -> Vec<ErrorType> {
    Vec::new()
}

/// A method of interface `S`, as routed through a dispatcher.
pub struct Method<S: ?Sized, A, T> {
    name: &'static str,
    params: &'static [&'static str],
    declared: fn() -> Vec<ErrorType>,
    target: Target<S, A, T>,
}

impl<S: ?Sized, A, T> Method<S, A, T> {
    /// A method returning its result directly.
    pub fn sync(
        name: &'static str,
        params: &'static [&'static str],
        target: SyncTarget<S, A, T>,
    ) -> Self {
        Self {
            name,
            params,
            declared: no_declared_errors,
            target: Target::Sync(target),
        }
    }

    /// A method returning a future of its result.
    pub fn asynchronous(
        name: &'static str,
        params: &'static [&'static str],
        target: AsyncTarget<S, A, T>,
    ) -> Self {
        Self {
            name,
            params,
            declared: no_declared_errors,
            target: Target::Async(target),
        }
    }

    /// Declares the checked error types the method may return.
    pub fn throws(mut self, declared: fn() -> Vec<ErrorType>) -> Self {
        self.declared = declared;
        self
    }

    /// The cache key of this method.
    pub fn key(&self) -> MethodKey {
        MethodKey::new(self.name, self.params)
    }

    fn shape(&self) -> CallShape {
        match self.target {
            Target::Sync(_) => CallShape::Sync,
            Target::Async(_) => CallShape::Async,
        }
    }

    fn descriptor(&self, interface: &'static str) -> MethodDescriptor {
        MethodDescriptor::new(interface, self.name, self.params, self.shape())
            .with_declared_errors((self.declared)())
    }
}

/// Routes calls on a proxy through cached decorator chains.
///
/// Cloning is cheap; clones share the cache.
///
/// Two dispatchers are equal when they wrap the same target instance with
/// the same resolver and context, regardless of which dispatcher instance
/// they are. They hash by target instance.
pub struct ProxyDispatcher<S: ?Sized> {
    inner: Arc<Inner<S>>,
}

struct Inner<S: ?Sized> {
    interface: &'static str,
    target: Arc<S>,
    resolver: Arc<dyn PolicyResolver>,
    context: ProxyContext,
    invocations: Registry<MethodKey, Erased>,
}

impl<S: ?Sized> Clone for ProxyDispatcher<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S> ProxyDispatcher<S>
where
    S: ?Sized + Send + Sync + 'static,
{
    /// Creates a dispatcher for `target`, an implementation of `interface`.
    pub fn new(
        interface: &'static str,
        target: Arc<S>,
        resolver: Arc<dyn PolicyResolver>,
        context: ProxyContext,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                interface,
                target,
                resolver,
                context,
                invocations: Registry::new(),
            }),
        }
    }

    /// Name of the proxied interface.
    pub fn interface(&self) -> &'static str {
        self.inner.interface
    }

    /// The wrapped target.
    pub fn target(&self) -> &Arc<S> {
        &self.inner.target
    }

    /// The context owning the shared resources of this proxy.
    pub fn context(&self) -> &ProxyContext {
        &self.inner.context
    }

    /// Number of methods whose chain has been built.
    pub fn cached_methods(&self) -> usize {
        self.inner.invocations.len()
    }

    /// Calls `method`, blocking until it completes.
    ///
    /// Configuration errors from building the method's chain are returned
    /// boxed; downcast to [`ConfigError`] to inspect them.
    pub fn call<A, T>(&self, method: &Method<S, A, T>, args: A) -> Result<T, BoxError>
    where
        A: Clone + Send + 'static,
        T: Send + 'static,
    {
        let invocation = self.invocation(method)?;
        match invocation.callable() {
            Call::Sync(f) => f(args),
            Call::Async(f) => futures::executor::block_on(f(args)),
        }
    }

    /// Calls `method`, returning a future of its result.
    pub fn call_async<A, T>(
        &self,
        method: &Method<S, A, T>,
        args: A,
    ) -> BoxFuture<'static, Result<T, BoxError>>
    where
        A: Clone + Send + 'static,
        T: Send + 'static,
    {
        match self.invocation(method) {
            Ok(mut invocation) => invocation.call(args),
            Err(error) => Box::pin(future::err::<T, BoxError>(error.into())),
        }
    }

    /// Resolves the decorator chain of `method` without caching it.
    pub fn resolve_chain<A, T>(
        &self,
        method: &Method<S, A, T>,
    ) -> Result<DecoratorChain, ConfigError> {
        let descriptor = method.descriptor(self.inner.interface);
        DecoratorChain::resolve(&*self.inner.resolver, &self.inner.context, &descriptor)
    }

    fn invocation<A, T>(&self, method: &Method<S, A, T>) -> Result<Invocation<A, T>, ConfigError>
    where
        A: Clone + Send + 'static,
        T: Send + 'static,
    {
        let erased = self
            .inner
            .invocations
            .get_or_try_init(method.key(), || {
                self.build(method).map(|invocation| Arc::new(invocation) as Erased)
            })?;
        erased
            .downcast_ref::<Invocation<A, T>>()
            .cloned()
            .ok_or_else(|| ConfigError::SignatureConflict {
                method: method.descriptor(self.inner.interface).to_string(),
            })
    }

    fn build<A, T>(&self, method: &Method<S, A, T>) -> Result<Invocation<A, T>, ConfigError>
    where
        A: Clone + Send + 'static,
        T: Send + 'static,
    {
        let descriptor = Arc::new(method.descriptor(self.inner.interface));

        #[cfg(feature = "tracing")]
        tracing::debug!(method = %descriptor, "building decorator chain");

        let chain =
            DecoratorChain::resolve(&*self.inner.resolver, &self.inner.context, &descriptor)?;
        let invocation = method
            .target
            .adapt(Arc::clone(&self.inner.target), descriptor);
        chain.apply(invocation, method.target)
    }

    fn target_ptr(&self) -> *const () {
        Arc::as_ptr(&self.inner.target).cast::<()>()
    }
}

impl<S> PartialEq for ProxyDispatcher<S>
where
    S: ?Sized + Send + Sync + 'static,
{
    fn eq(&self, other: &Self) -> bool {
        self.target_ptr() == other.target_ptr()
            && Arc::as_ptr(&self.inner.resolver).cast::<()>()
                == Arc::as_ptr(&other.inner.resolver).cast::<()>()
            && self.inner.context.ptr_eq(&other.inner.context)
    }
}

impl<S> Eq for ProxyDispatcher<S> where S: ?Sized + Send + Sync + 'static {}

impl<S> Hash for ProxyDispatcher<S>
where
    S: ?Sized + Send + Sync + 'static,
{
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.target_ptr().hash(state);
    }
}

impl<S> fmt::Debug for ProxyDispatcher<S>
where
    S: ?Sized + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyDispatcher")
            .field("interface", &self.inner.interface)
            .field("target", &self.target_ptr())
            .field("cached_methods", &self.cached_methods())
            .finish()
    }
}

impl<S> fmt::Display for ProxyDispatcher<S>
where
    S: ?Sized + fmt::Display,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.inner.target, f)
    }
}
