//! Error remapping before failures leave a proxy.
//!
//! An [`ExceptionsPolicy`] lists mappers in order. On failure each mapper is
//! offered the error; the first one returning a replacement wins and the rest
//! are skipped. When every mapper declines, the original error propagates.
//!
//! Each mapper declares the class of error it produces. A mapper producing a
//! checked error may only be attached to methods declaring that error type;
//! this is verified when the chain is built.

use crate::context::{InstanceRef, ProxyContext};
use futures::future::BoxFuture;
use resilience_proxy_core::{
    BoxError, Call, ConfigError, ErrorClass, ErrorType, Invocation, MethodDescriptor,
};
use std::error::Error;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use tower_layer::Layer;

/// Translates one error into another.
pub trait ExceptionMapper: Send + Sync + 'static {
    /// Returns a replacement for `error`, or `None` to decline.
    fn map(&self, error: &BoxError) -> Option<BoxError>;

    /// The class of error this mapper produces.
    fn output(&self) -> ErrorClass {
        ErrorClass::Unchecked
    }
}

/// A mapper from errors of type `E` to errors of type `O`, built from a closure.
///
/// Errors of any other type are declined.
pub struct FnMapper<E, O, F> {
    map: F,
    output: ErrorClass,
    _types: PhantomData<fn(&E) -> O>,
}

impl<E, O, F> FnMapper<E, O, F>
where
    E: Error + 'static,
    O: Error + Send + Sync + 'static,
    F: Fn(&E) -> O + Send + Sync + 'static,
{
    /// Creates a mapper producing unchecked errors.
    pub fn new(map: F) -> Self {
        Self {
            map,
            output: ErrorClass::Unchecked,
            _types: PhantomData,
        }
    }

    /// Marks the produced error as checked: only methods declaring `O` accept this mapper.
    pub fn declared(mut self) -> Self {
        self.output = ErrorClass::checked::<O>();
        self
    }
}

impl<E, O, F> ExceptionMapper for FnMapper<E, O, F>
where
    E: Error + 'static,
    O: Error + Send + Sync + 'static,
    F: Fn(&E) -> O + Send + Sync + 'static,
{
    fn map(&self, error: &BoxError) -> Option<BoxError> {
        error
            .downcast_ref::<E>()
            .map(|error| Box::new((self.map)(error)) as BoxError)
    }

    fn output(&self) -> ErrorClass {
        self.output
    }
}

#[derive(Clone)]
enum MapperSource {
    Managed(InstanceRef),
    Instance {
        mapper: Arc<dyn ExceptionMapper>,
        type_name: &'static str,
    },
}

impl MapperSource {
    fn type_name(&self) -> &'static str {
        match self {
            MapperSource::Managed(reference) => reference.type_name(),
            MapperSource::Instance { type_name, .. } => type_name,
        }
    }
}

/// Ordered list of exception mappers.
#[derive(Clone, Default)]
pub struct ExceptionsPolicy {
    mappers: Vec<MapperSource>,
}

impl ExceptionsPolicy {
    /// A policy with no mappers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends mapper `M`, default-constructed by the context on first use.
    pub fn mapper<M: ExceptionMapper + Default>(mut self) -> Self {
        self.mappers
            .push(MapperSource::Managed(InstanceRef::constructed::<M, _, _>(|| {
                Ok(Arc::new(M::default()) as Arc<dyn ExceptionMapper>)
            })));
        self
    }

    /// Appends mapper `M`, which must be registered on the context.
    pub fn registered_mapper<M: ExceptionMapper>(mut self) -> Self {
        self.mappers
            .push(MapperSource::Managed(InstanceRef::registered::<M>()));
        self
    }

    /// Appends a mapper instance.
    pub fn mapper_instance<M: ExceptionMapper>(mut self, mapper: M) -> Self {
        self.mappers.push(MapperSource::Instance {
            mapper: Arc::new(mapper),
            type_name: std::any::type_name::<M>(),
        });
        self
    }

    /// Number of mappers.
    pub fn len(&self) -> usize {
        self.mappers.len()
    }

    /// Returns true if the policy has no mappers.
    pub fn is_empty(&self) -> bool {
        self.mappers.is_empty()
    }
}

impl fmt::Debug for ExceptionsPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.mappers.iter().map(MapperSource::type_name))
            .finish()
    }
}

/// Resolved, validated mappers for one method.
#[derive(Clone)]
pub struct ExceptionsDecorator {
    mappers: Arc<[Arc<dyn ExceptionMapper>]>,
}

impl ExceptionsDecorator {
    /// Resolves the mappers of `policy` and checks each against what `method` may signal.
    pub fn resolve(
        policy: &ExceptionsPolicy,
        context: &ProxyContext,
        method: &MethodDescriptor,
    ) -> Result<Self, ConfigError> {
        let mut mappers = Vec::with_capacity(policy.mappers.len());
        for source in &policy.mappers {
            let mapper: Arc<dyn ExceptionMapper> = match source {
                MapperSource::Managed(reference) => context.lookup(reference)?,
                MapperSource::Instance { mapper, .. } => Arc::clone(mapper),
            };
            if let ErrorClass::Checked(output) = mapper.output() {
                check_declared(source.type_name(), output, method)?;
            }
            mappers.push(mapper);
        }
        Ok(Self {
            mappers: mappers.into(),
        })
    }
}

fn check_declared(
    mapper: &'static str,
    output: ErrorType,
    method: &MethodDescriptor,
) -> Result<(), ConfigError> {
    if method.declares(&output) {
        return Ok(());
    }

    #[cfg(feature = "tracing")]
    tracing::warn!(mapper, output = output.name(), method = %method, "incompatible exception mapper");

    Err(ConfigError::IncompatibleMapper {
        mapper,
        output: output.name(),
        method: method.to_string(),
    })
}

fn remap(mappers: &[Arc<dyn ExceptionMapper>], error: BoxError) -> BoxError {
    for mapper in mappers {
        if let Some(replacement) = mapper.map(&error) {
            #[cfg(feature = "tracing")]
            tracing::debug!(from = %error, to = %replacement, "error remapped");

            return replacement;
        }
    }
    error
}

impl<A, T> Layer<Invocation<A, T>> for ExceptionsDecorator
where
    A: Send + 'static,
    T: Send + 'static,
{
    type Service = Invocation<A, T>;

    fn layer(&self, inner: Invocation<A, T>) -> Self::Service {
        let mappers = Arc::clone(&self.mappers);
        if mappers.is_empty() {
            return inner;
        }
        inner.map_call(|call| match call {
            Call::Sync(f) => Call::Sync(Arc::new(move |args: A| -> Result<T, BoxError> {
                f(args).map_err(|error| remap(&mappers, error))
            })),
            Call::Async(f) => Call::Async(Arc::new(
                move |args: A| -> BoxFuture<'static, Result<T, BoxError>> {
                    let pending = f(args);
                    let mappers = Arc::clone(&mappers);
                    Box::pin(async move { pending.await.map_err(|error| remap(&mappers, error)) })
                },
            )),
        })
    }
}

impl fmt::Debug for ExceptionsDecorator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExceptionsDecorator")
            .field("mappers", &self.mappers.len())
            .finish()
    }
}
