//! Policy resolution and decorator ordering.

use super::{is, proxy, Counted, Inventory, InventoryError, ServiceError, Warehouse};
use resilience_proxy::bulkhead::{BulkheadConfig, BulkheadFull};
use resilience_proxy::circuitbreaker::{CallNotPermitted, CircuitBreaker};
use resilience_proxy::retry::RetryConfig;
use resilience_proxy::{
    BulkheadPolicy, CircuitBreakerPolicy, ExceptionsPolicy, FallbackPlacement, FallbackPolicy,
    FallbackSource, FallbackStage, FnMapper, PolicyTable, ProxyContext, RateLimiterPolicy,
    RetryPolicy,
};
use std::sync::Arc;
use std::time::Duration;

fn retry(name: &str, attempts: usize) -> RetryPolicy {
    RetryPolicy::named(name).config(
        RetryConfig::builder()
            .max_attempts(attempts)
            .wait_duration(Duration::ZERO)
            .build(),
    )
}

fn counted_fallback(fallback: &Arc<Counted>) -> FallbackPolicy {
    FallbackPolicy::from(FallbackStage::new(FallbackSource::instance::<_, dyn Inventory>(
        Arc::clone(fallback),
        |f| f,
    )))
}

fn open_breaker_context(placement: FallbackPlacement) -> (ProxyContext, CircuitBreaker) {
    let breaker = CircuitBreaker::of_defaults("orders");
    breaker.force_open();
    let context = ProxyContext::builder()
        .circuit_breaker(breaker.clone())
        .fallback_placement(placement)
        .build();
    (context, breaker)
}

#[test]
fn test_method_policy_replaces_interface_policy_of_same_capability() {
    let policies = PolicyTable::builder()
        .interface(retry("interface", 1))
        .method("stock", retry("stock", 3))
        .build();
    let context = ProxyContext::new();

    let stock_target = Arc::new(Warehouse::flaky(2, 9));
    assert_eq!(
        proxy(stock_target.clone(), policies.clone(), &context)
            .stock("rye".into())
            .unwrap(),
        9
    );
    assert_eq!(stock_target.calls(), 3);

    let reserve_target = Arc::new(Warehouse::flaky(2, 9));
    assert!(proxy(reserve_target.clone(), policies, &context)
        .reserve("rye".into(), 1)
        .is_err());
    assert_eq!(reserve_target.calls(), 1);
}

#[test]
fn test_method_policy_leaves_other_capabilities_alone() {
    let policies = PolicyTable::builder()
        .interface(retry("interface-retry", 2))
        .interface(CircuitBreakerPolicy::named("interface-breaker"))
        .interface(RateLimiterPolicy::named("interface-limiter"))
        .interface(BulkheadPolicy::named("interface-bulkhead"))
        .method("stock", retry("stock-retry", 2))
        .method("stock", BulkheadPolicy::named("stock-bulkhead"))
        .build();
    let context = ProxyContext::new();

    proxy(Arc::new(Warehouse::healthy(1)), policies, &context)
        .stock("oat".into())
        .unwrap();

    assert!(context.find_retry("stock-retry").is_some());
    assert!(context.find_retry("interface-retry").is_none());
    assert!(context.find_bulkhead("stock-bulkhead").is_some());
    assert!(context.find_bulkhead("interface-bulkhead").is_none());
    assert!(context.find_circuit_breaker("interface-breaker").is_some());
    assert!(context.find_rate_limiter("interface-limiter").is_some());
}

#[test]
fn test_fallback_inside_retry_hides_failures_from_retry() {
    let fallback = Counted::new(11);
    let target = Arc::new(Warehouse::failing());
    let policies = PolicyTable::builder()
        .interface(retry("outer", 3))
        .interface(counted_fallback(&fallback))
        .build();

    let value = proxy(target.clone(), policies, &ProxyContext::new())
        .stock("bran".into())
        .unwrap();

    assert_eq!(value, 11);
    assert_eq!(target.calls(), 1);
    assert_eq!(fallback.calls(), 1);
}

#[test]
fn test_inner_fallback_does_not_see_open_circuit() {
    let fallback = Counted::new(11);
    let target = Arc::new(Warehouse::healthy(1));
    let (context, _breaker) = open_breaker_context(FallbackPlacement::Inner);
    let policies = PolicyTable::builder()
        .interface(CircuitBreakerPolicy::named("orders"))
        .interface(counted_fallback(&fallback))
        .build();

    let error = proxy(target.clone(), policies, &context)
        .stock("corn".into())
        .unwrap_err();

    assert!(is::<CallNotPermitted>(&error));
    assert_eq!(target.calls(), 0);
    assert_eq!(fallback.calls(), 0);
}

#[test]
fn test_outer_fallback_sees_open_circuit() {
    let fallback = Counted::new(11);
    let target = Arc::new(Warehouse::healthy(1));
    let (context, breaker) = open_breaker_context(FallbackPlacement::Outer);
    let policies = PolicyTable::builder()
        .interface(CircuitBreakerPolicy::named("orders"))
        .interface(counted_fallback(&fallback))
        .build();
    let proxy = proxy(target.clone(), policies, &context);

    assert_eq!(proxy.stock("corn".into()).unwrap(), 11);
    assert_eq!(target.calls(), 0);
    assert_eq!(fallback.calls(), 1);

    breaker.reset();
    assert_eq!(proxy.stock("corn".into()).unwrap(), 1);
    assert_eq!(fallback.calls(), 1);
}

#[test]
fn test_inner_fallback_sees_bulkhead_rejections() {
    let fallback = Counted::new(5);
    let target = Arc::new(Warehouse::healthy(1));
    let full = || {
        BulkheadPolicy::named("closed")
            .config(BulkheadConfig::builder().max_concurrent_calls(0).build())
    };

    let without_fallback = PolicyTable::builder().interface(full()).build();
    let error = proxy(target.clone(), without_fallback, &ProxyContext::new())
        .stock("millet".into())
        .unwrap_err();
    assert!(is::<BulkheadFull>(&error));

    let with_fallback = PolicyTable::builder()
        .interface(full())
        .interface(counted_fallback(&fallback))
        .build();
    let value = proxy(target.clone(), with_fallback, &ProxyContext::new())
        .stock("millet".into())
        .unwrap();

    assert_eq!(value, 5);
    assert_eq!(target.calls(), 0);
}

#[test]
fn test_retry_repeats_circuit_rejections() {
    let target = Arc::new(Warehouse::healthy(1));
    let (context, _breaker) = open_breaker_context(FallbackPlacement::Inner);
    let policies = PolicyTable::builder()
        .interface(retry("through-breaker", 3))
        .interface(CircuitBreakerPolicy::named("orders"))
        .build();

    let error = proxy(target.clone(), policies, &context)
        .stock("rice".into())
        .unwrap_err();

    assert!(is::<CallNotPermitted>(&error));
    assert_eq!(target.calls(), 0);
}

#[test]
fn test_exceptions_map_errors_after_retries_are_exhausted() {
    let target = Arc::new(Warehouse::failing());
    let policies = PolicyTable::builder()
        .interface(retry("mapped", 2))
        .interface(ExceptionsPolicy::new().mapper_instance(FnMapper::new(
            |error: &InventoryError| ServiceError(error.to_string()),
        )))
        .build();

    let error = proxy(target.clone(), policies, &ProxyContext::new())
        .stock("spelt".into())
        .unwrap_err();

    assert_eq!(
        error.downcast_ref::<ServiceError>(),
        Some(&ServiceError("inventory unavailable".into()))
    );
    assert_eq!(target.calls(), 2);
}
