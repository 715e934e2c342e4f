//! Circuit breaker metrics regression tests

use super::helpers::*;
use resilience_proxy_circuitbreaker::{CircuitBreaker, CircuitBreakerConfig};
use serial_test::serial;

#[test]
#[serial]
fn circuitbreaker_transition_metrics() {
    init_recorder();

    let breaker = CircuitBreaker::new(
        "test_cb_transitions",
        CircuitBreakerConfig::builder()
            .sliding_window_size(2)
            .minimum_number_of_calls(2)
            .failure_rate_threshold(50.0)
            .build(),
    );
    let call = breaker.decorate_sync(flaky(usize::MAX));
    assert!(call(()).is_err());
    assert!(call(()).is_err());

    assert_counter_exists("circuitbreaker_transitions_total");
    assert_metric_has_label(
        "circuitbreaker_transitions_total",
        "circuitbreaker",
        "test_cb_transitions",
    );
    assert_metric_has_label("circuitbreaker_transitions_total", "to", "OPEN");
}

#[test]
#[serial]
fn circuitbreaker_rejection_metrics() {
    init_recorder();

    let breaker = CircuitBreaker::of_defaults("test_cb_rejections");
    breaker.force_open();
    let call = breaker.decorate_sync(flaky(0));
    assert!(call(()).is_err());

    assert_counter_exists("circuitbreaker_calls_rejected_total");
    assert_metric_has_label(
        "circuitbreaker_calls_rejected_total",
        "circuitbreaker",
        "test_cb_rejections",
    );
}
