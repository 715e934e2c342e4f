//! Property tests for the rate limiter primitive.
//!
//! Invariants tested:
//! - Never permits more calls than the limit within one period
//! - Rejections do not reach the callable

use proptest::prelude::*;
use resilience_proxy_core::{BoxError, SyncFn};
use resilience_proxy_ratelimiter::{RateLimiter, RateLimiterConfig, RequestNotPermitted};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

fn counting(calls: &Arc<AtomicUsize>) -> SyncFn<(), ()> {
    let calls = Arc::clone(calls);
    Arc::new(move |_: ()| -> Result<(), BoxError> {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    /// Property: At most limit_for_period calls pass within one period
    #[test]
    fn rate_limiter_respects_limit(
        limit in 1usize..=20,
        requests in 1usize..=40,
    ) {
        let limiter = RateLimiter::new(
            "property",
            RateLimiterConfig::builder()
                .limit_for_period(limit)
                .limit_refresh_period(Duration::from_secs(60))
                .timeout_duration(Duration::ZERO)
                .build(),
        );
        let calls = Arc::new(AtomicUsize::new(0));
        let call = limiter.decorate_sync(counting(&calls));

        let mut rejected = 0;
        for _ in 0..requests {
            if let Err(error) = call(()) {
                prop_assert!(error.downcast_ref::<RequestNotPermitted>().is_some());
                rejected += 1;
            }
        }

        prop_assert_eq!(calls.load(Ordering::SeqCst), requests.min(limit));
        prop_assert_eq!(rejected, requests.saturating_sub(limit));
    }
}
