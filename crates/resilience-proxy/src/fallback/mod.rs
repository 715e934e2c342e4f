//! Multi-stage fallbacks.
//!
//! A [`FallbackPolicy`] is an ordered list of stages. Each stage pairs a
//! [`FallbackSource`], which supplies an alternate implementation of the
//! proxied interface, with a [`FallbackHandler`] deciding which outcomes the
//! stage accepts.
//!
//! When the decorated call completes, the stages are scanned in declaration
//! order and the first one accepting the outcome has its fallback invoked with
//! the original arguments. Its result, or its error, is what the caller sees;
//! no other stage runs. When no stage accepts, the original outcome passes
//! through untouched.
//!
//! # Sources
//!
//! - [`FallbackSource::of`]: a type default-constructed by the context on
//!   first use and shared afterwards
//! - [`FallbackSource::registered`]: an instance registered on the context
//! - [`FallbackSource::instance`]: an explicit instance
//! - [`FallbackSource::factory`]: a factory receiving the triggering error
//!
//! A source that does not implement the proxied interface is rejected when the
//! chain is built with [`ConfigError::FallbackMismatch`].

mod handler;

pub use handler::{
    AnyError, ErrorPredicate, ErrorTypeHandler, FallbackHandler, Outcome, ResultPredicate,
};

use crate::adapter::Target;
use crate::context::{Erased, InstanceRef, ProxyContext};
use futures::future::BoxFuture;
use resilience_proxy_core::{BoxError, Call, ConfigError, Invocation, MethodDescriptor};
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use tower_layer::Layer;

type FactoryFn<S> = dyn Fn(Option<&BoxError>) -> Arc<S> + Send + Sync;

#[derive(Clone)]
enum SourceKind {
    Managed(InstanceRef),
    Instance(Erased),
    Factory(Erased),
}

/// Supplies the implementation a fallback stage invokes.
#[derive(Clone)]
pub struct FallbackSource {
    kind: SourceKind,
    type_name: &'static str,
}

impl FallbackSource {
    /// Fallback type `F`, default-constructed on first use and exposed as interface `S`.
    ///
    /// `upcast` is normally the unsizing coercion `|f| f`.
    pub fn of<F, S>(upcast: fn(Arc<F>) -> Arc<S>) -> Self
    where
        F: Default + Send + Sync + 'static,
        S: ?Sized + Send + Sync + 'static,
    {
        Self {
            kind: SourceKind::Managed(InstanceRef::constructed::<F, Arc<S>, _>(move || {
                Ok(upcast(Arc::new(F::default())))
            })),
            type_name: std::any::type_name::<F>(),
        }
    }

    /// Fallback registered on the context under type `F`.
    pub fn registered<F: 'static>() -> Self {
        Self {
            kind: SourceKind::Managed(InstanceRef::registered::<F>()),
            type_name: std::any::type_name::<F>(),
        }
    }

    /// An explicit fallback instance of type `F`, exposed as interface `S`.
    ///
    /// `upcast` is normally the unsizing coercion `|f| f`. Errors name `F`.
    pub fn instance<F, S>(fallback: Arc<F>, upcast: fn(Arc<F>) -> Arc<S>) -> Self
    where
        F: ?Sized + Send + Sync + 'static,
        S: ?Sized + Send + Sync + 'static,
    {
        Self {
            kind: SourceKind::Instance(Arc::new(upcast(fallback)) as Erased),
            type_name: std::any::type_name::<F>(),
        }
    }

    /// A factory creating the fallback from the triggering error.
    ///
    /// The error is `None` when the stage was triggered by a result.
    pub fn factory<S, G>(factory: G) -> Self
    where
        S: ?Sized + Send + Sync + 'static,
        G: Fn(Option<&BoxError>) -> Arc<S> + Send + Sync + 'static,
    {
        let factory: Arc<FactoryFn<S>> = Arc::new(factory);
        Self {
            kind: SourceKind::Factory(Arc::new(factory) as Erased),
            type_name: std::any::type_name::<G>(),
        }
    }

    /// Name of the fallback type.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl fmt::Debug for FallbackSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name)
    }
}

/// One fallback stage.
#[derive(Clone)]
pub struct FallbackStage {
    source: FallbackSource,
    handler: Arc<dyn FallbackHandler>,
}

impl FallbackStage {
    /// A stage falling back to `source` on any error.
    pub fn new(source: FallbackSource) -> Self {
        Self {
            source,
            handler: Arc::new(AnyError),
        }
    }

    /// Replaces the decision of when this stage applies.
    pub fn when<H: FallbackHandler>(mut self, handler: H) -> Self {
        self.handler = Arc::new(handler);
        self
    }

    /// Applies only to errors of type `E`.
    pub fn on_error_type<E: Error + 'static>(self) -> Self {
        self.when(ErrorTypeHandler::of::<E>())
    }

    /// Applies only to errors accepted by `predicate`.
    pub fn on_error<F>(self, predicate: F) -> Self
    where
        F: Fn(&BoxError) -> bool + Send + Sync + 'static,
    {
        self.when(ErrorPredicate::new(predicate))
    }

    /// Applies only to successful results of type `T` accepted by `predicate`.
    pub fn on_result<T, F>(self, predicate: F) -> Self
    where
        T: 'static,
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.when(ResultPredicate::new(predicate))
    }
}

impl fmt::Debug for FallbackStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FallbackStage")
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

/// Ordered fallback stages for a method or interface.
#[derive(Clone, Debug, Default)]
pub struct FallbackPolicy {
    stages: Vec<FallbackStage>,
}

impl FallbackPolicy {
    /// A policy with no stages.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a stage. Earlier stages take precedence.
    pub fn stage(mut self, stage: FallbackStage) -> Self {
        self.stages.push(stage);
        self
    }

    /// Stages in declaration order.
    pub fn stages(&self) -> &[FallbackStage] {
        &self.stages
    }
}

impl From<FallbackStage> for FallbackPolicy {
    fn from(stage: FallbackStage) -> Self {
        FallbackPolicy::new().stage(stage)
    }
}

#[derive(Clone)]
struct ResolvedStage {
    value: Erased,
    factory: bool,
    type_name: &'static str,
    handler: Arc<dyn FallbackHandler>,
}

/// Fallback stages with their sources resolved against a context.
#[derive(Clone)]
pub struct FallbackDecorator {
    stages: Vec<ResolvedStage>,
}

impl FallbackDecorator {
    /// Resolves every stage's source, constructing default instances as needed.
    pub fn resolve(policy: &FallbackPolicy, context: &ProxyContext) -> Result<Self, ConfigError> {
        let stages = policy
            .stages
            .iter()
            .map(|stage| {
                let (value, factory) = match &stage.source.kind {
                    SourceKind::Managed(reference) => (context.lookup_erased(reference)?, false),
                    SourceKind::Instance(value) => (Arc::clone(value), false),
                    SourceKind::Factory(value) => (Arc::clone(value), true),
                };
                Ok(ResolvedStage {
                    value,
                    factory,
                    type_name: stage.source.type_name,
                    handler: Arc::clone(&stage.handler),
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;
        Ok(Self { stages })
    }

    /// Checks every source implements interface `S` and binds the stages to `target`.
    pub fn bind<S, A, T>(
        &self,
        target: Target<S, A, T>,
        method: &MethodDescriptor,
    ) -> Result<BoundFallback<S, A, T>, ConfigError>
    where
        S: ?Sized + Send + Sync + 'static,
    {
        let stages = self
            .stages
            .iter()
            .map(|stage| {
                let provider = if stage.factory {
                    stage
                        .value
                        .downcast_ref::<Arc<FactoryFn<S>>>()
                        .map(|factory| Provider::Factory(Arc::clone(factory)))
                } else {
                    stage
                        .value
                        .downcast_ref::<Arc<S>>()
                        .map(|instance| Provider::Instance(Arc::clone(instance)))
                };
                match provider {
                    Some(provider) => Ok(BoundStage {
                        provider,
                        type_name: stage.type_name,
                        handler: Arc::clone(&stage.handler),
                    }),
                    None => {
                        #[cfg(feature = "tracing")]
                        tracing::warn!(fallback = stage.type_name, method = %method, "fallback does not implement the interface");

                        Err(ConfigError::FallbackMismatch {
                            fallback: stage.type_name,
                            method: method.to_string(),
                        })
                    }
                }
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;
        Ok(BoundFallback {
            stages: stages.into(),
            target,
        })
    }
}

impl fmt::Debug for FallbackDecorator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.stages.iter().map(|stage| stage.type_name))
            .finish()
    }
}

enum Provider<S: ?Sized> {
    Instance(Arc<S>),
    Factory(Arc<FactoryFn<S>>),
}

impl<S: ?Sized> Provider<S> {
    fn get(&self, error: Option<&BoxError>) -> Arc<S> {
        match self {
            Provider::Instance(instance) => Arc::clone(instance),
            Provider::Factory(factory) => factory(error),
        }
    }
}

struct BoundStage<S: ?Sized> {
    provider: Provider<S>,
    type_name: &'static str,
    handler: Arc<dyn FallbackHandler>,
}

/// Fallback stages bound to one method of interface `S`.
pub struct BoundFallback<S: ?Sized, A, T> {
    stages: Arc<[BoundStage<S>]>,
    target: Target<S, A, T>,
}

impl<S: ?Sized, A, T> fmt::Debug for BoundFallback<S, A, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.stages.iter().map(|stage| stage.type_name))
            .finish()
    }
}

fn select<S, T>(
    stages: &[BoundStage<S>],
    method: &MethodDescriptor,
    outcome: &Result<T, BoxError>,
) -> Option<Arc<S>>
where
    S: ?Sized,
    T: 'static,
{
    let view = match outcome {
        Ok(value) => Outcome::Success(value),
        Err(error) => Outcome::Failure(error),
    };
    let stage = stages
        .iter()
        .find(|stage| stage.handler.should_fallback(method, view))?;

    #[cfg(feature = "tracing")]
    tracing::debug!(method = %method, fallback = stage.type_name, "invoking fallback");

    Some(stage.provider.get(view.error()))
}

impl<S, A, T> Layer<Invocation<A, T>> for BoundFallback<S, A, T>
where
    S: ?Sized + Send + Sync + 'static,
    A: Clone + Send + 'static,
    T: Send + 'static,
{
    type Service = Invocation<A, T>;

    fn layer(&self, inner: Invocation<A, T>) -> Self::Service {
        if self.stages.is_empty() {
            return inner;
        }
        let method = Arc::clone(inner.method());
        let stages = Arc::clone(&self.stages);
        let target = self.target;
        inner.map_call(move |call| match call {
            Call::Sync(f) => Call::Sync(Arc::new(move |args: A| -> Result<T, BoxError> {
                let outcome = f(args.clone());
                match select(&stages, &method, &outcome) {
                    Some(fallback) => target.call_blocking(&*fallback, args),
                    None => outcome,
                }
            })),
            Call::Async(f) => Call::Async(Arc::new(
                move |args: A| -> BoxFuture<'static, Result<T, BoxError>> {
                    let pending = f(args.clone());
                    let stages = Arc::clone(&stages);
                    let method = Arc::clone(&method);
                    Box::pin(async move {
                        let outcome = pending.await;
                        match select(&stages, &method, &outcome) {
                            Some(fallback) => target.call_future(&*fallback, args).await,
                            None => outcome,
                        }
                    })
                },
            )),
        })
    }
}
