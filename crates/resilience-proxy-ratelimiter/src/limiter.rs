use std::time::{Duration, Instant};

/// Permission bookkeeping for one limiter.
///
/// Time is divided into cycles of `refresh_period` counted from `origin`.
/// Each new cycle adds `limit_for_period` permissions, never exceeding that
/// limit. Permissions may go negative: a caller that is willing to wait
/// reserves a permission from a future cycle and is told how long to wait.
#[derive(Debug)]
pub(crate) struct LimiterState {
    limit_for_period: i64,
    refresh_period: Duration,
    origin: Instant,
    active_cycle: u128,
    active_permissions: i64,
}

impl LimiterState {
    pub(crate) fn new(limit_for_period: usize, refresh_period: Duration) -> Self {
        let limit = i64::try_from(limit_for_period).unwrap_or(i64::MAX);
        Self {
            limit_for_period: limit,
            refresh_period,
            origin: Instant::now(),
            active_cycle: 0,
            active_permissions: limit,
        }
    }

    /// Reserves one permission.
    ///
    /// Returns the wait before the permission becomes valid, or `Err(wait)`
    /// when that wait exceeds `timeout`, in which case nothing is reserved.
    pub(crate) fn reserve(&mut self, timeout: Duration) -> Result<Duration, Duration> {
        self.reserve_at(Instant::now(), timeout)
    }

    fn reserve_at(&mut self, now: Instant, timeout: Duration) -> Result<Duration, Duration> {
        let period = self.refresh_period.as_nanos().max(1);
        let elapsed = now.saturating_duration_since(self.origin).as_nanos();
        let cycle = elapsed / period;

        if cycle > self.active_cycle {
            let refills = i64::try_from(cycle - self.active_cycle).unwrap_or(i64::MAX);
            self.active_permissions = self
                .active_permissions
                .saturating_add(refills.saturating_mul(self.limit_for_period))
                .min(self.limit_for_period);
            self.active_cycle = cycle;
        }

        let wait = self.wait_for_permission(elapsed, period);
        if wait > timeout {
            return Err(wait);
        }
        self.active_permissions -= 1;
        Ok(wait)
    }

    fn wait_for_permission(&self, elapsed: u128, period: u128) -> Duration {
        if self.active_permissions > 0 {
            return Duration::ZERO;
        }
        if self.limit_for_period <= 0 {
            return Duration::MAX;
        }
        let until_next_cycle = period * (self.active_cycle + 1) - elapsed;
        // Cycles needed until the balance becomes positive.
        let deficit = 1 - self.active_permissions;
        let cycles = (deficit + self.limit_for_period - 1) / self.limit_for_period;
        let nanos = until_next_cycle + (cycles as u128 - 1) * period;
        u64::try_from(nanos).map_or(Duration::MAX, Duration::from_nanos)
    }

    /// Permissions left in the current cycle; negative when reserved ahead.
    pub(crate) fn available_permissions(&self) -> i64 {
        self.active_permissions
    }
}
