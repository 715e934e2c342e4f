//! Property-based tests for resilience proxies.
//!
//! Run with: cargo test --test property_tests
//!
//! These tests use proptest to generate random inputs and verify that
//! invariants hold across the primitives and the proxy chain.

pub mod chain;
pub mod circuit_breaker;
pub mod rate_limiter;
pub mod retry;
