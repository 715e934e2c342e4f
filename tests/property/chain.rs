//! Property tests for proxy dispatch and chain composition.
//!
//! Invariants tested:
//! - Undecorated proxies return exactly what the target returns
//! - The first fallback stage accepting an error handles it
//! - Chain order keeps exceptions outermost and the bulkhead innermost

use proptest::prelude::*;
use resilience_proxy::{
    BoxError, Capability, FallbackPlacement, FallbackPolicy, FallbackSource, FallbackStage,
    PolicyTable, ProxyContext, chain_order, resilient_proxy,
};
use std::sync::Arc;

trait Echo: Send + Sync {
    fn echo(&self, value: u64) -> Result<u64, BoxError>;
}

resilient_proxy! {
    struct EchoProxy for dyn Echo {
        fn echo(&self, value: u64) -> u64;
    }
}

/// Error carrying the kind of failure.
#[derive(Debug, Clone, PartialEq)]
struct Kind(u8);

impl std::fmt::Display for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "failure of kind {}", self.0)
    }
}

impl std::error::Error for Kind {}

/// Echoes its input, or fails with a fixed kind.
struct Target(Option<u8>);

impl Echo for Target {
    fn echo(&self, value: u64) -> Result<u64, BoxError> {
        match self.0 {
            Some(kind) => Err(Box::new(Kind(kind))),
            None => Ok(value),
        }
    }
}

/// Fallback answering a constant.
struct Constant(u64);

impl Echo for Constant {
    fn echo(&self, _value: u64) -> Result<u64, BoxError> {
        Ok(self.0)
    }
}

fn echo_proxy(target: Target, policies: PolicyTable) -> EchoProxy {
    EchoProxy::new(Arc::new(target), Arc::new(policies), ProxyContext::new())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    /// Property: Values pass through an undecorated proxy unchanged
    #[test]
    fn undecorated_values_pass_through(value in any::<u64>()) {
        let proxy = echo_proxy(Target(None), PolicyTable::empty());
        prop_assert_eq!(proxy.echo(value).unwrap(), value);
    }

    /// Property: Errors pass through an undecorated proxy unchanged
    #[test]
    fn undecorated_errors_pass_through(kind in any::<u8>(), value in any::<u64>()) {
        let proxy = echo_proxy(Target(Some(kind)), PolicyTable::empty());
        let error = proxy.echo(value).unwrap_err();
        prop_assert_eq!(error.downcast_ref::<Kind>(), Some(&Kind(kind)));
    }

    /// Property: The first stage accepting the error answers the call
    #[test]
    fn first_accepting_stage_answers(
        accepted in prop::collection::vec(0u8..4, 1..6),
        kind in 0u8..4,
    ) {
        let policy = accepted.iter().enumerate().fold(FallbackPolicy::new(), |policy, (index, accepts)| {
            let accepts = *accepts;
            let fallback = Arc::new(Constant(index as u64));
            policy.stage(
                FallbackStage::new(FallbackSource::instance::<_, dyn Echo>(fallback, |f| f)).on_error(move |error| {
                    error.downcast_ref::<Kind>() == Some(&Kind(accepts))
                }),
            )
        });
        let proxy = echo_proxy(
            Target(Some(kind)),
            PolicyTable::builder().interface(policy).build(),
        );

        let result = proxy.echo(0);
        match accepted.iter().position(|accepts| *accepts == kind) {
            Some(index) => prop_assert_eq!(result.unwrap(), index as u64),
            None => {
                let error = result.unwrap_err();
                prop_assert_eq!(error.downcast_ref::<Kind>(), Some(&Kind(kind)))
            }
        }
    }
}

#[test]
fn chain_order_is_a_permutation_with_fixed_ends() {
    for placement in [FallbackPlacement::Inner, FallbackPlacement::Outer] {
        let order = chain_order(placement);
        for capability in Capability::ALL {
            assert_eq!(order.iter().filter(|c| **c == capability).count(), 1);
        }
        assert_eq!(order[0], Capability::Exceptions);
        assert_eq!(order[order.len() - 1], Capability::Bulkhead);
    }

    let fallback_at = |placement| {
        chain_order(placement)
            .iter()
            .position(|c| *c == Capability::Fallback)
    };
    assert_eq!(fallback_at(FallbackPlacement::Inner), Some(4));
    assert_eq!(fallback_at(FallbackPlacement::Outer), Some(1));
}
