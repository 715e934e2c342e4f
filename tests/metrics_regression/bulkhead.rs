//! Bulkhead metrics regression tests

use super::helpers::*;
use resilience_proxy_bulkhead::{Bulkhead, BulkheadConfig};
use serial_test::serial;

#[test]
#[serial]
fn bulkhead_metrics_exist() {
    init_recorder();

    let open = Bulkhead::new(
        "test_bulkhead",
        BulkheadConfig::builder().max_concurrent_calls(1).build(),
    );
    let call = open.decorate_sync(flaky(0), None);
    assert!(call(()).is_ok());

    assert_counter_exists("bulkhead_calls_permitted_total");
    assert_metric_has_label("bulkhead_calls_permitted_total", "bulkhead", "test_bulkhead");
}

#[test]
#[serial]
fn bulkhead_rejection_metrics() {
    init_recorder();

    let closed = Bulkhead::new(
        "test_bulkhead_full",
        BulkheadConfig::builder().max_concurrent_calls(0).build(),
    );
    let call = closed.decorate_sync(flaky(0), None);
    assert!(call(()).is_err());

    assert_counter_exists("bulkhead_calls_rejected_total");
    assert_metric_has_label(
        "bulkhead_calls_rejected_total",
        "bulkhead",
        "test_bulkhead_full",
    );
}
