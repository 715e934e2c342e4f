//! Pass-through, chain caching, identity and sync/async parity.

use super::{
    bare, is, proxy, Inventory, InventoryError, InventoryProxy, OutOfStock, Shelf, Warehouse,
};
use resilience_proxy::retry::RetryConfig;
use resilience_proxy::{
    Capability, FallbackPolicy, FallbackStage, MethodDescriptor, Policy, PolicyResolver,
    PolicyTable, ProxyContext, RetryPolicy,
};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Resolver counting how often it is consulted.
struct CountingResolver {
    table: PolicyTable,
    finds: AtomicUsize,
}

impl CountingResolver {
    fn new(table: PolicyTable) -> Arc<Self> {
        Arc::new(Self {
            table,
            finds: AtomicUsize::new(0),
        })
    }

    fn finds(&self) -> usize {
        self.finds.load(Ordering::SeqCst)
    }
}

impl PolicyResolver for CountingResolver {
    fn find(&self, capability: Capability, method: &MethodDescriptor) -> Option<Policy> {
        self.finds.fetch_add(1, Ordering::SeqCst);
        self.table.find(capability, method)
    }
}

fn quick_retry(name: &str) -> RetryPolicy {
    RetryPolicy::named(name).config(
        RetryConfig::builder()
            .max_attempts(3)
            .wait_duration(Duration::ZERO)
            .build(),
    )
}

fn hash_of<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

#[tokio::test]
async fn test_undecorated_methods_pass_through() {
    let proxy = bare(Arc::new(Warehouse::healthy(5)));

    assert_eq!(proxy.stock("apple".into()).unwrap(), 5);
    assert_eq!(proxy.reserve("apple".into(), 2).unwrap(), 3);
    assert_eq!(proxy.restock("apple".into()).await.unwrap(), 5);
}

#[tokio::test]
async fn test_undecorated_errors_pass_through_unchanged() {
    let proxy = bare(Arc::new(Warehouse::failing_with(InventoryError::UnknownSku(
        "pear".into(),
    ))));

    let error = proxy.stock("pear".into()).unwrap_err();
    assert_eq!(
        error.downcast_ref::<InventoryError>(),
        Some(&InventoryError::UnknownSku("pear".into()))
    );

    let error = proxy.restock("pear".into()).await.unwrap_err();
    assert!(is::<InventoryError>(&error));
}

#[test]
fn test_declared_errors_pass_through() {
    let proxy = bare(Arc::new(Warehouse::healthy(1)));

    let error = proxy.reserve("plum".into(), 3).unwrap_err();
    assert_eq!(
        error.downcast_ref::<OutOfStock>(),
        Some(&OutOfStock { sku: "plum".into() })
    );
}

#[test]
fn test_chain_is_resolved_once_per_method() {
    let resolver = CountingResolver::new(
        PolicyTable::builder()
            .interface(quick_retry("inventory"))
            .build(),
    );
    let proxy = InventoryProxy::new(
        Arc::new(Warehouse::healthy(4)),
        resolver.clone(),
        ProxyContext::new(),
    );

    for _ in 0..5 {
        assert_eq!(proxy.stock("fig".into()).unwrap(), 4);
    }
    assert_eq!(resolver.finds(), Capability::ALL.len());

    proxy.reserve("fig".into(), 1).unwrap();
    proxy.reserve("fig".into(), 1).unwrap();
    assert_eq!(resolver.finds(), 2 * Capability::ALL.len());
    assert_eq!(proxy.dispatcher().cached_methods(), 2);
}

#[test]
fn test_clones_share_the_cached_chains() {
    let resolver = CountingResolver::new(PolicyTable::empty());
    let proxy = InventoryProxy::new(
        Arc::new(Warehouse::healthy(4)),
        resolver.clone(),
        ProxyContext::new(),
    );
    let clone = proxy.clone();

    proxy.stock("kiwi".into()).unwrap();
    clone.stock("kiwi".into()).unwrap();

    assert_eq!(resolver.finds(), Capability::ALL.len());
}

#[test]
fn test_proxies_of_the_same_target_are_equal() {
    let target: Arc<dyn Inventory> = Arc::new(Warehouse::healthy(1));
    let resolver: Arc<dyn PolicyResolver> = Arc::new(PolicyTable::empty());
    let context = ProxyContext::new();

    let first = InventoryProxy::new(Arc::clone(&target), Arc::clone(&resolver), context.clone());
    let second = InventoryProxy::new(Arc::clone(&target), Arc::clone(&resolver), context.clone());
    let other = InventoryProxy::new(Arc::new(Warehouse::healthy(1)), resolver, context);

    assert_eq!(first, second);
    assert_eq!(hash_of(&first), hash_of(&second));
    assert_ne!(first, other);
}

#[test]
fn test_proxies_under_different_policy_sources_differ() {
    let target: Arc<dyn Inventory> = Arc::new(Warehouse::healthy(1));
    let context = ProxyContext::new();

    let first = proxy(Arc::clone(&target), PolicyTable::empty(), &context);
    let second = proxy(Arc::clone(&target), PolicyTable::empty(), &context);

    assert_ne!(first, second);
    assert_eq!(hash_of(&first), hash_of(&second));
}

#[tokio::test]
async fn test_retry_resolves_alike_for_sync_and_async_methods() {
    let policies = || PolicyTable::builder().interface(quick_retry("parity")).build();
    let context = ProxyContext::new();

    let sync_target = Arc::new(Warehouse::flaky(2, 9));
    let sync_proxy = proxy(sync_target.clone(), policies(), &context);
    assert_eq!(sync_proxy.stock("lime".into()).unwrap(), 9);

    let async_target = Arc::new(Warehouse::flaky(2, 9));
    let async_proxy = proxy(async_target.clone(), policies(), &context);
    assert_eq!(async_proxy.restock("lime".into()).await.unwrap(), 9);

    assert_eq!(sync_target.calls(), 3);
    assert_eq!(async_target.calls(), 3);
}

#[tokio::test]
async fn test_exhausted_retries_fail_alike_for_sync_and_async_methods() {
    let policies = || PolicyTable::builder().interface(quick_retry("parity")).build();
    let context = ProxyContext::new();

    let sync_target = Arc::new(Warehouse::failing());
    let sync_error = proxy(sync_target.clone(), policies(), &context)
        .stock("lime".into())
        .unwrap_err();

    let async_target = Arc::new(Warehouse::failing());
    let async_error = proxy(async_target.clone(), policies(), &context)
        .restock("lime".into())
        .await
        .unwrap_err();

    assert_eq!(sync_error.to_string(), async_error.to_string());
    assert_eq!(sync_target.calls(), async_target.calls());
}

#[tokio::test]
async fn test_fallback_resolves_alike_for_sync_and_async_methods() {
    let policies = PolicyTable::builder()
        .interface(FallbackPolicy::from(FallbackStage::new(
            InventoryProxy::fallback::<Shelf>(),
        )))
        .build();
    let proxy = proxy(Arc::new(Warehouse::failing()), policies, &ProxyContext::new());

    assert_eq!(proxy.stock("yam".into()).unwrap(), super::SHELF_STOCK);
    assert_eq!(proxy.restock("yam".into()).await.unwrap(), super::SHELF_STOCK);
}

#[test]
fn test_debug_names_the_interface() {
    let proxy = bare(Arc::new(Warehouse::healthy(1)));
    let debug = format!("{:?}", proxy);
    assert!(debug.contains("InventoryProxy"));
    assert!(debug.contains("Inventory"));
}
