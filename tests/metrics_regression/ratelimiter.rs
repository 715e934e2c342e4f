//! Rate limiter metrics regression tests

use super::helpers::*;
use resilience_proxy_ratelimiter::{RateLimiter, RateLimiterConfig};
use serial_test::serial;
use std::time::Duration;

#[test]
#[serial]
fn ratelimiter_rejection_metrics() {
    init_recorder();

    let limiter = RateLimiter::new(
        "test_rl",
        RateLimiterConfig::builder()
            .limit_for_period(1)
            .limit_refresh_period(Duration::from_secs(60))
            .timeout_duration(Duration::ZERO)
            .build(),
    );
    let call = limiter.decorate_sync(flaky(0));
    assert!(call(()).is_ok());
    assert!(call(()).is_err());

    assert_counter_exists("ratelimiter_calls_rejected_total");
    assert_metric_has_label("ratelimiter_calls_rejected_total", "ratelimiter", "test_rl");
}
