//! End-to-end scenarios.

use super::{Counted, Inventory, InventoryError, InventoryProxy, Shelf, Warehouse, proxy};
use resilience_proxy::retry::RetryConfig;
use resilience_proxy::{
    FallbackPolicy, FallbackSource, FallbackStage, InstanceRef, PolicyTable, ProxyContext,
    RetryPolicy,
};
use std::sync::Arc;
use std::time::Duration;

fn retry(attempts: usize) -> RetryPolicy {
    RetryPolicy::named("scenario").config(
        RetryConfig::builder()
            .max_attempts(attempts)
            .wait_duration(Duration::ZERO)
            .build(),
    )
}

#[test]
fn test_transient_failures_are_retried_to_success() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing_subscriber::filter::LevelFilter::DEBUG)
        .with_test_writer()
        .try_init();

    let target = Arc::new(Warehouse::flaky(2, 12));
    let policies = PolicyTable::builder().interface(retry(3)).build();

    let value = proxy(target.clone(), policies, &ProxyContext::new())
        .stock("wheat".into())
        .unwrap();

    assert_eq!(value, 12);
    assert_eq!(target.calls(), 3);
}

#[test]
fn test_persistent_failures_use_the_fallback_every_time() {
    let fallback = Counted::new(4);
    let source = FallbackSource::instance::<_, dyn Inventory>(fallback.clone(), |f| f);
    let policies = PolicyTable::builder()
        .interface(FallbackPolicy::from(
            FallbackStage::new(source).on_error_type::<InventoryError>(),
        ))
        .build();
    let target = Arc::new(Warehouse::failing());
    let proxy = proxy(target.clone(), policies, &ProxyContext::new());

    for call in 1..=3 {
        assert_eq!(proxy.stock("barley".into()).unwrap(), 4);
        assert_eq!(fallback.calls(), call);
    }
    assert_eq!(target.calls(), 3);
}

#[test]
fn test_rejected_results_are_retried_until_attempts_run_out() {
    let target = Arc::new(Warehouse::healthy(0));
    let policies = PolicyTable::builder()
        .interface(
            RetryPolicy::named("result-scenario").config(
                RetryConfig::builder()
                    .max_attempts(2)
                    .wait_duration(Duration::ZERO)
                    .retry_on_result(|stock: &u32| *stock == 0)
                    .build(),
            ),
        )
        .build();

    let value = proxy(target.clone(), policies, &ProxyContext::new())
        .stock("rye".into())
        .unwrap();

    assert_eq!(value, 0);
    assert_eq!(target.calls(), 2);
}

#[test]
fn test_registry_lookups_return_the_same_instance() {
    let context = ProxyContext::new();
    let reference = InstanceRef::constructed::<Shelf, Arc<dyn Inventory>, _>(|| {
        Ok(Arc::new(Shelf) as Arc<dyn Inventory>)
    });

    let first = context.lookup::<Arc<dyn Inventory>>(&reference).unwrap();
    let second = context.lookup::<Arc<dyn Inventory>>(&reference).unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(context.instance_count(), 1);

    let default = InventoryProxy::fallback::<Shelf>();
    assert_eq!(default.type_name(), std::any::type_name::<Shelf>());
}
