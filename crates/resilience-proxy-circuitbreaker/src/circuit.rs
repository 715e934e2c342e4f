use crate::config::CircuitBreakerConfig;
use crate::events::CircuitBreakerEvent;
#[cfg(feature = "metrics")]
use metrics::counter;
use std::collections::VecDeque;
use std::fmt;
use std::time::Instant;

/// State of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CircuitState {
    /// Calls flow and outcomes are recorded.
    Closed,
    /// Calls are rejected until the open wait elapses.
    Open,
    /// A limited number of trial calls decide whether to close again.
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => f.write_str("CLOSED"),
            CircuitState::Open => f.write_str("OPEN"),
            CircuitState::HalfOpen => f.write_str("HALF_OPEN"),
        }
    }
}

/// Mutable state behind the breaker's lock.
pub(crate) struct Circuit {
    state: CircuitState,
    /// Most recent outcomes, `true` for failure.
    window: VecDeque<bool>,
    opened_at: Option<Instant>,
    half_open_permits: usize,
    half_open_outcomes: Vec<bool>,
    /// Bumped on every transition.
    epoch: u64,
}

impl Circuit {
    pub(crate) fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            window: VecDeque::new(),
            opened_at: None,
            half_open_permits: 0,
            half_open_outcomes: Vec::new(),
            epoch: 0,
        }
    }

    pub(crate) fn state(&self) -> CircuitState {
        self.state
    }

    /// Returns `Err(state)` when a call must be rejected. A half-open permit
    /// carries the epoch it was granted in.
    pub(crate) fn try_acquire(
        &mut self,
        name: &str,
        config: &CircuitBreakerConfig,
    ) -> Result<Option<u64>, CircuitState> {
        if self.state == CircuitState::Open {
            let elapsed = self.opened_at.map(|at| at.elapsed());
            if elapsed.is_some_and(|e| e >= config.wait_duration_in_open_state) {
                self.transition_to(CircuitState::HalfOpen, name, config);
            }
        }

        match self.state {
            CircuitState::Closed => Ok(None),
            CircuitState::HalfOpen
                if self.half_open_permits < config.permitted_calls_in_half_open_state =>
            {
                self.half_open_permits += 1;
                Ok(Some(self.epoch))
            }
            state => Err(state),
        }
    }

    /// Hands back a half-open permit whose call never produced an outcome.
    /// Permits from an earlier epoch are ignored.
    pub(crate) fn release_half_open_permit(&mut self, epoch: u64) {
        if self.state == CircuitState::HalfOpen && self.epoch == epoch {
            self.half_open_permits = self.half_open_permits.saturating_sub(1);
        }
    }

    pub(crate) fn record(&mut self, failed: bool, name: &str, config: &CircuitBreakerConfig) {
        let event = if failed {
            CircuitBreakerEvent::FailureRecorded {
                policy_name: name.to_string(),
                timestamp: Instant::now(),
            }
        } else {
            CircuitBreakerEvent::SuccessRecorded {
                policy_name: name.to_string(),
                timestamp: Instant::now(),
            }
        };
        config.event_listeners.emit(&event);

        match self.state {
            CircuitState::Closed => {
                self.window.push_back(failed);
                while self.window.len() > config.sliding_window_size {
                    self.window.pop_front();
                }
                let minimum = config
                    .minimum_number_of_calls
                    .min(config.sliding_window_size);
                if self.window.len() >= minimum
                    && failure_rate(self.window.iter()) >= config.failure_rate_threshold
                {
                    self.transition_to(CircuitState::Open, name, config);
                }
            }
            CircuitState::HalfOpen => {
                self.half_open_outcomes.push(failed);
                if self.half_open_outcomes.len() >= config.permitted_calls_in_half_open_state {
                    let rate = failure_rate(self.half_open_outcomes.iter());
                    if rate >= config.failure_rate_threshold {
                        self.transition_to(CircuitState::Open, name, config);
                    } else {
                        self.transition_to(CircuitState::Closed, name, config);
                    }
                }
            }
            // Calls permitted before the circuit opened may still complete.
            CircuitState::Open => {}
        }
    }

    pub(crate) fn transition_to(
        &mut self,
        to: CircuitState,
        name: &str,
        config: &CircuitBreakerConfig,
    ) {
        let from = self.state;
        if from == to {
            return;
        }
        self.state = to;
        self.epoch = self.epoch.wrapping_add(1);
        self.window.clear();
        self.half_open_permits = 0;
        self.half_open_outcomes.clear();
        self.opened_at = (to == CircuitState::Open).then(Instant::now);

        #[cfg(feature = "tracing")]
        tracing::info!(circuit_breaker = name, %from, %to, "circuit state transition");

        #[cfg(feature = "metrics")]
        counter!(
            "circuitbreaker_transitions_total",
            "circuitbreaker" => name.to_string(),
            "to" => to.to_string()
        )
        .increment(1);

        config
            .event_listeners
            .emit(&CircuitBreakerEvent::StateTransition {
                policy_name: name.to_string(),
                timestamp: Instant::now(),
                from,
                to,
            });
    }
}

fn failure_rate<'a>(outcomes: impl Iterator<Item = &'a bool>) -> f64 {
    let (total, failures) = outcomes.fold((0usize, 0usize), |(t, f), failed| {
        (t + 1, f + usize::from(*failed))
    });
    if total == 0 {
        return 0.0;
    }
    failures as f64 * 100.0 / total as f64
}
