//! Configuration failures surfaced on first call.

use super::{proxy, Inventory, Shelf, Warehouse};
use resilience_proxy::retry::RetryConfig;
use resilience_proxy::{
    BoxError, ConfigError, FallbackPolicy, FallbackSource, FallbackStage, InstanceRef,
    PolicyTable, ProxyContext, RetryPolicy,
};
use std::sync::Arc;
use std::time::Duration;

/// An interface the proxied inventory does not share.
trait Ledger: Send + Sync {
    fn balance(&self) -> i64;
}

struct Books;

impl Ledger for Books {
    fn balance(&self) -> i64 {
        0
    }
}

struct Unregistered;

fn config_error(error: &BoxError) -> &ConfigError {
    error
        .downcast_ref::<ConfigError>()
        .unwrap_or_else(|| panic!("expected a configuration error, got {}", error))
}

#[test]
fn test_fallback_of_another_interface_is_rejected() {
    let ledger = FallbackSource::instance::<_, dyn Ledger>(Arc::new(Books), |f| f);
    assert_eq!(ledger.type_name(), std::any::type_name::<Books>());
    let policies = PolicyTable::builder()
        .interface(FallbackPolicy::from(FallbackStage::new(ledger)))
        .build();
    let target = Arc::new(Warehouse::failing());
    let proxy = proxy(target.clone(), policies, &ProxyContext::new());

    let error = proxy.stock("lentil".into()).unwrap_err();

    assert!(matches!(
        config_error(&error),
        ConfigError::FallbackMismatch { fallback, method }
            if method.contains("stock") && fallback.ends_with("Books")
    ));
    assert_eq!(target.calls(), 0);
}

#[test]
fn test_unregistered_fallback_has_no_default() {
    let policies = PolicyTable::builder()
        .interface(FallbackPolicy::from(FallbackStage::new(
            FallbackSource::registered::<Unregistered>(),
        )))
        .build();
    let proxy = proxy(Arc::new(Warehouse::failing()), policies, &ProxyContext::new());

    let error = proxy.stock("lentil".into()).unwrap_err();

    assert!(matches!(
        config_error(&error),
        ConfigError::NoDefault { type_name } if type_name.contains("Unregistered")
    ));
}

#[tokio::test]
async fn test_async_retry_needs_a_scheduler() {
    let context = ProxyContext::builder().without_default_scheduler().build();
    let policies = PolicyTable::builder()
        .interface(
            RetryPolicy::named("unscheduled").config(
                RetryConfig::builder()
                    .max_attempts(2)
                    .wait_duration(Duration::ZERO)
                    .build(),
            ),
        )
        .build();
    let target = Arc::new(Warehouse::flaky(1, 3));
    let proxy = proxy(target.clone(), policies, &context);

    let error = proxy.restock("pea".into()).await.unwrap_err();
    assert!(matches!(
        config_error(&error),
        ConfigError::MissingScheduler { capability: "retry", .. }
    ));
    assert_eq!(target.calls(), 0);

    assert_eq!(proxy.stock("pea".into()).unwrap(), 3);
    assert_eq!(target.calls(), 2);
}

#[test]
fn test_registered_value_of_wrong_type_is_rejected() {
    let context = ProxyContext::builder()
        .instance::<Unregistered, u32>(5)
        .build();
    let policies = PolicyTable::builder()
        .interface(RetryPolicy::named("mistyped").registered_config_provider::<Unregistered>())
        .build();
    let proxy = proxy(Arc::new(Warehouse::healthy(1)), policies, &context);

    let error = proxy.stock("bean".into()).unwrap_err();

    assert!(matches!(
        config_error(&error),
        ConfigError::WrongType { .. }
    ));
}

#[test]
fn test_failing_constructor_is_reported() {
    let context = ProxyContext::new();
    let reference = InstanceRef::constructed::<Shelf, Arc<Shelf>, _>(|| {
        Err(Box::new(std::io::Error::other("shelf collapsed")) as BoxError)
    });

    let error = context.lookup::<Arc<Shelf>>(&reference).unwrap_err();

    assert!(matches!(error, ConfigError::Construction { .. }));
    assert!(error.to_string().contains("shelf collapsed"));
}

#[test]
fn test_configuration_errors_are_not_cached() {
    let policies = PolicyTable::builder()
        .interface(FallbackPolicy::from(FallbackStage::new(
            FallbackSource::registered::<Unregistered>(),
        )))
        .build();
    let target = Arc::new(Warehouse::healthy(1));
    let proxy = proxy(target.clone(), policies, &ProxyContext::new());

    for _ in 0..3 {
        let error = proxy.stock("chickpea".into()).unwrap_err();
        assert!(matches!(config_error(&error), ConfigError::NoDefault { .. }));
    }

    assert_eq!(proxy.dispatcher().cached_methods(), 0);
    assert_eq!(target.calls(), 0);
}
