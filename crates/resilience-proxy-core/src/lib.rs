//! Core infrastructure for resilience-proxy.
//!
//! This crate provides the pieces shared by the resilience primitives and the
//! decorator engine:
//! - [`Invocation`], the uniform callable every decorator wraps
//! - [`MethodDescriptor`], identifying a proxied method and its declared errors
//! - [`Scheduler`], the background timer used by asynchronous decorations
//! - An event system for observability
//! - The error taxonomy shared across crates

pub mod error;
pub mod events;
pub mod invocation;
pub mod scheduler;

pub use error::{BoxError, ConfigError, ErrorClass, ErrorType};
pub use events::{EventListeners, PolicyEvent};
pub use invocation::{
    AsyncFn, Call, CallShape, Invocation, MethodDescriptor, MethodKey, SyncFn,
};
pub use scheduler::Scheduler;
