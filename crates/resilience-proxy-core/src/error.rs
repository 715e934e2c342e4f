//! Error taxonomy shared by the primitives and the decorator engine.

use std::any::TypeId;
use std::error::Error;
use std::fmt;
use std::hash::{Hash, Hasher};
use thiserror::Error;

/// Boxed error threaded through every decorated call.
///
/// Predicates and mappers inspect it by downcasting to concrete types.
pub type BoxError = Box<dyn Error + Send + Sync>;

/// Identifies a concrete error type at runtime.
#[derive(Clone, Copy)]
pub struct ErrorType {
    id: TypeId,
    name: &'static str,
    is: fn(&(dyn Error + 'static)) -> bool,
}

fn is_type<E: Error + 'static>(error: &(dyn Error + 'static)) -> bool {
    error.is::<E>()
}

impl ErrorType {
    /// Returns the descriptor for `E`.
    pub fn of<E: Error + 'static>() -> Self {
        Self {
            id: TypeId::of::<E>(),
            name: std::any::type_name::<E>(),
            is: is_type::<E>,
        }
    }

    /// Returns the type name of the described error.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns true if `error` is an instance of the described type.
    pub fn matches(&self, error: &(dyn Error + 'static)) -> bool {
        (self.is)(error)
    }
}

impl PartialEq for ErrorType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ErrorType {}

impl Hash for ErrorType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Category of an error a method is allowed to signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// May be returned from any method.
    Unchecked,
    /// May only be returned from methods that declare this type.
    Checked(ErrorType),
}

impl ErrorClass {
    /// Shorthand for `ErrorClass::Checked(ErrorType::of::<E>())`.
    pub fn checked<E: Error + 'static>() -> Self {
        ErrorClass::Checked(ErrorType::of::<E>())
    }
}

/// Configuration errors raised while building a method's decorator chain.
///
/// These surface on the first invocation of the affected method and are
/// returned to the caller boxed into a [`BoxError`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A fallback does not implement the interface of the decorated method.
    #[error("fallback `{fallback}` does not implement the interface of `{method}`")]
    FallbackMismatch {
        /// Type of the offending fallback.
        fallback: &'static str,
        /// The decorated method.
        method: String,
    },

    /// An exception mapper produces an error the method does not declare.
    #[error("exception mapper `{mapper}` produces `{output}`, which `{method}` does not declare")]
    IncompatibleMapper {
        /// Type of the offending mapper.
        mapper: &'static str,
        /// The checked error type the mapper produces.
        output: &'static str,
        /// The decorated method.
        method: String,
    },

    /// An asynchronous decoration needs a scheduler and none is configured.
    #[error("{capability} on `{method}` needs a scheduler, but the context has none")]
    MissingScheduler {
        /// The capability that needed the scheduler.
        capability: &'static str,
        /// The decorated method.
        method: String,
    },

    /// Constructing a registry-managed instance failed.
    #[error("failed to construct `{type_name}`: {source}")]
    Construction {
        /// Type being constructed.
        type_name: &'static str,
        /// Underlying failure.
        #[source]
        source: BoxError,
    },

    /// A referenced type has no default constructor and nothing was registered.
    #[error("`{type_name}` has no default constructor and no instance is registered for it")]
    NoDefault {
        /// The referenced type.
        type_name: &'static str,
    },

    /// A registered instance has a different type than the one requested.
    #[error("instance registered for `{key}` is not a `{expected}`")]
    WrongType {
        /// Registry key the instance was stored under.
        key: &'static str,
        /// Type the caller asked for.
        expected: &'static str,
    },

    /// A method was invoked with a signature other than the one it was first built for.
    #[error("`{method}` was invoked with a different signature than its cached chain")]
    SignatureConflict {
        /// The conflicting method.
        method: String,
    },

    /// The default scheduler could not be started.
    #[error("failed to start the default scheduler: {0}")]
    Scheduler(#[source] std::io::Error),
}
