//! Property tests for the circuit breaker primitive.
//!
//! Invariants tested:
//! - Stays closed below the minimum number of calls
//! - Opens exactly when the failure rate reaches the threshold
//! - An open circuit rejects without calling through

use proptest::prelude::*;
use resilience_proxy_circuitbreaker::{
    CallNotPermitted, CircuitBreaker, CircuitBreakerConfig, CircuitState,
};
use resilience_proxy_core::{BoxError, SyncFn};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

fn breaker(window: usize, threshold: f64) -> CircuitBreaker {
    CircuitBreaker::new(
        "property",
        CircuitBreakerConfig::builder()
            .sliding_window_size(window)
            .minimum_number_of_calls(window)
            .failure_rate_threshold(threshold)
            .build(),
    )
}

fn outcome(calls: &Arc<AtomicUsize>, fail: bool) -> SyncFn<(), ()> {
    let calls = Arc::clone(calls);
    Arc::new(move |_: ()| -> Result<(), BoxError> {
        calls.fetch_add(1, Ordering::SeqCst);
        if fail { Err("failure".into()) } else { Ok(()) }
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    /// Property: Fewer calls than the window never open the circuit
    #[test]
    fn circuit_stays_closed_below_minimum(window in 2usize..=20) {
        let breaker = breaker(window, 50.0);
        let calls = Arc::new(AtomicUsize::new(0));
        let call = breaker.decorate_sync(outcome(&calls, true));

        for _ in 0..window - 1 {
            let _ = call(());
        }
        prop_assert_eq!(breaker.state(), CircuitState::Closed);
    }

    /// Property: A full window opens the circuit iff its failure rate reaches the threshold
    #[test]
    fn circuit_opens_at_threshold(
        outcomes in prop::collection::vec(any::<bool>(), 1..=20),
        threshold in 1u32..=100,
    ) {
        let window = outcomes.len();
        let breaker = breaker(window, f64::from(threshold));
        let calls = Arc::new(AtomicUsize::new(0));
        let succeed = breaker.decorate_sync(outcome(&calls, false));
        let fail = breaker.decorate_sync(outcome(&calls, true));

        for failed in &outcomes {
            let _ = if *failed { fail(()) } else { succeed(()) };
        }

        let failures = outcomes.iter().filter(|failed| **failed).count();
        let rate = failures as f64 * 100.0 / window as f64;
        let expected = if rate >= f64::from(threshold) {
            CircuitState::Open
        } else {
            CircuitState::Closed
        };
        prop_assert_eq!(breaker.state(), expected);
    }

    /// Property: Every call through an open circuit is rejected
    #[test]
    fn open_circuit_rejects_all_calls(attempts in 1usize..=20) {
        let breaker = CircuitBreaker::of_defaults("property-open");
        breaker.force_open();
        let calls = Arc::new(AtomicUsize::new(0));
        let call = breaker.decorate_sync(outcome(&calls, false));

        for _ in 0..attempts {
            let error = call(()).unwrap_err();
            prop_assert!(error.downcast_ref::<CallNotPermitted>().is_some());
        }
        prop_assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
