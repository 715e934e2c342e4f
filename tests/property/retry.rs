//! Property tests for the retry primitive.
//!
//! Invariants tested:
//! - Never exceeds max_attempts
//! - Succeeds on first success
//! - Unlisted errors are not retried
//! - Sync and async decoration agree

use proptest::prelude::*;
use futures::future::BoxFuture;
use resilience_proxy_core::{AsyncFn, BoxError, SyncFn};
use resilience_proxy_retry::{Retry, RetryConfig};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::runtime::Runtime;

/// A cloneable error type for testing
#[derive(Debug, Clone, PartialEq)]
enum TestError {
    Retryable,
    Fatal,
}

impl std::fmt::Display for TestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TestError::Retryable => write!(f, "retryable error"),
            TestError::Fatal => write!(f, "fatal error"),
        }
    }
}

impl std::error::Error for TestError {}

/// A callable failing its first `failures` calls with `error`.
fn failing(calls: &Arc<AtomicUsize>, failures: usize, error: TestError) -> SyncFn<(), usize> {
    let calls = Arc::clone(calls);
    Arc::new(move |_: ()| -> Result<usize, BoxError> {
        let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= failures {
            Err(Box::new(error.clone()))
        } else {
            Ok(call)
        }
    })
}

fn retry(max_attempts: usize) -> Retry {
    Retry::new(
        "property",
        RetryConfig::builder()
            .max_attempts(max_attempts)
            .wait_duration(Duration::ZERO)
            .build(),
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    /// Property: Retry never exceeds max_attempts
    #[test]
    fn retry_respects_max_attempts(max_attempts in 1usize..=10) {
        let calls = Arc::new(AtomicUsize::new(0));
        let call = retry(max_attempts).decorate_sync(failing(&calls, usize::MAX, TestError::Retryable));

        prop_assert!(call(()).is_err(), "Should fail after exhausting retries");
        prop_assert_eq!(calls.load(Ordering::SeqCst), max_attempts);
    }

    /// Property: Success on Nth attempt stops retrying
    #[test]
    fn retry_stops_on_success(
        max_attempts in 1usize..=10,
        failures in 0usize..10,
    ) {
        let calls = Arc::new(AtomicUsize::new(0));
        let call = retry(max_attempts).decorate_sync(failing(&calls, failures, TestError::Retryable));

        let result = call(());
        let expected = (failures + 1).min(max_attempts);
        prop_assert_eq!(calls.load(Ordering::SeqCst), expected);
        prop_assert_eq!(result.is_ok(), failures < max_attempts);
    }

    /// Property: Errors outside the retried types propagate after one attempt
    #[test]
    fn retry_ignores_unlisted_errors(max_attempts in 1usize..=10) {
        let calls = Arc::new(AtomicUsize::new(0));
        let retry = Retry::new(
            "property-filtered",
            RetryConfig::builder()
                .max_attempts(max_attempts)
                .wait_duration(Duration::ZERO)
                .retry_on_error(|error| {
                    error.downcast_ref::<TestError>() == Some(&TestError::Retryable)
                })
                .build(),
        );
        let call = retry.decorate_sync(failing(&calls, usize::MAX, TestError::Fatal));

        let error = call(()).unwrap_err();
        prop_assert_eq!(error.downcast_ref::<TestError>(), Some(&TestError::Fatal));
        prop_assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    /// Property: Async decoration makes as many attempts as sync decoration
    #[test]
    fn retry_async_matches_sync(
        max_attempts in 1usize..=6,
        failures in 0usize..8,
    ) {
        let rt = Runtime::new().unwrap();
        let sync_calls = Arc::new(AtomicUsize::new(0));
        let async_calls = Arc::new(AtomicUsize::new(0));

        let sync_call = retry(max_attempts).decorate_sync(failing(&sync_calls, failures, TestError::Retryable));
        let inner = failing(&async_calls, failures, TestError::Retryable);
        let async_target: AsyncFn<(), usize> = Arc::new(move |args: ()| -> BoxFuture<'static, Result<usize, BoxError>> {
            let result = inner(args);
            Box::pin(async move { result })
        });
        let async_call = retry(max_attempts).decorate_async(async_target, None);

        let sync_result = sync_call(());
        let async_result = rt.block_on(async_call(()));

        prop_assert_eq!(sync_result.is_ok(), async_result.is_ok());
        prop_assert_eq!(sync_calls.load(Ordering::SeqCst), async_calls.load(Ordering::SeqCst));
    }
}
