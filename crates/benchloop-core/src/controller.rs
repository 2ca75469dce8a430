//! Adaptive iteration-count controller.
//!
//! Starting from a single iteration, each step estimates how many iterations
//! would fill the target duration from the previous run's time per operation,
//! damps the growth to at most 100x per step, guarantees forward progress, and
//! rounds the result to a 1/2/5 magnitude so repeated runs of the same
//! workload land on the same counts.

use crate::measurement::{Measurement, duration_nanos};
use std::time::Duration;

/// Absolute ceiling on the iteration count.
pub const MAX_ITERATIONS: u64 = 1_000_000_000_000;

/// Maximum growth factor between consecutive steps.
const MAX_GROWTH: u64 = 100;

/// Chooses the next iteration count until a run fills the target duration.
#[derive(Debug, Clone, Copy)]
pub struct IterationController {
    target: Duration,
}

impl IterationController {
    /// Create a controller converging on `target`.
    pub fn new(target: Duration) -> Self {
        Self { target }
    }

    /// The duration a run must reach to converge.
    pub fn target(&self) -> Duration {
        self.target
    }

    /// Next iteration count to try, or `None` once converged.
    ///
    /// `prev` is the previous run's record; `None` (or the zero-iteration
    /// seed) starts the sequence at 1.
    pub fn next(&self, prev: Option<&Measurement>) -> Option<u64> {
        let Some(prev) = prev.filter(|m| !m.is_seed()) else {
            return Some(1);
        };

        let last = prev.iterations;
        if prev.duration >= self.target || last >= MAX_ITERATIONS {
            return None;
        }

        let ns_per_op = prev.time_per_op.max(1);
        let estimate = duration_nanos(self.target) / ns_per_op;
        let damped = estimate
            .saturating_add(estimate / 2)
            .min(last.saturating_mul(MAX_GROWTH));
        let n = damped.max(last.saturating_add(1));

        Some(round_up(n))
    }
}

/// Round `n` up to the nearest 1, 2 or 5 times its leading power of ten.
///
/// `round_up(137) == 200`, `round_up(73) == 100`, `round_up(4200) == 5000`.
pub fn round_up(n: u64) -> u64 {
    let mut base = 1u64;
    let mut tmp = n;
    while tmp >= 10 {
        tmp /= 10;
        base *= 10;
    }

    [1, 2, 5, 10]
        .into_iter()
        .map(|m| base.saturating_mul(m))
        .find(|&candidate| n <= candidate)
        .unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(iterations: u64, duration: Duration) -> Measurement {
        Measurement::new(iterations, duration)
    }

    #[test]
    fn test_round_up_examples() {
        assert_eq!(round_up(1), 1);
        assert_eq!(round_up(3), 5);
        assert_eq!(round_up(73), 100);
        assert_eq!(round_up(100), 100);
        assert_eq!(round_up(101), 200);
        assert_eq!(round_up(137), 200);
        assert_eq!(round_up(4200), 5000);
        assert_eq!(round_up(5001), 10000);
    }

    #[test]
    fn test_round_up_zero() {
        assert_eq!(round_up(0), 1);
    }

    #[test]
    fn test_round_up_near_max() {
        // 10^19 does not fit; saturate rather than overflow.
        assert_eq!(round_up(u64::MAX), u64::MAX);
    }

    #[test]
    fn test_first_call_returns_one() {
        let c = IterationController::new(Duration::from_secs(1));
        assert_eq!(c.next(None), Some(1));
        assert_eq!(c.next(Some(&Measurement::seed())), Some(1));
    }

    #[test]
    fn test_converges_when_target_reached() {
        let c = IterationController::new(Duration::from_secs(1));
        assert_eq!(c.next(Some(&record(1, Duration::from_secs(1)))), None);
        assert_eq!(c.next(Some(&record(50, Duration::from_secs(3)))), None);
    }

    #[test]
    fn test_converges_at_iteration_ceiling() {
        let c = IterationController::new(Duration::from_secs(10));
        assert_eq!(c.next(Some(&record(MAX_ITERATIONS, Duration::from_millis(1)))), None);
    }

    #[test]
    fn test_growth_capped_at_100x() {
        // 1ns per op would ask for 1.5e9 iterations; the cap keeps it at 100.
        let c = IterationController::new(Duration::from_secs(1));
        assert_eq!(c.next(Some(&record(1, Duration::from_nanos(1)))), Some(100));
    }

    #[test]
    fn test_estimate_with_damping() {
        // 1ms per op, 1s target: estimate 1000, +50% = 1500, rounded to 2000.
        let c = IterationController::new(Duration::from_secs(1));
        let prev = record(100, Duration::from_millis(100));
        assert_eq!(c.next(Some(&prev)), Some(2000));
    }

    #[test]
    fn test_forward_progress_for_slow_ops() {
        // 600ms per op on a 1s target estimates a single iteration; still grow.
        let c = IterationController::new(Duration::from_secs(1));
        let prev = record(1, Duration::from_millis(600));
        assert_eq!(c.next(Some(&prev)), Some(2));
    }

    #[test]
    fn test_zero_time_per_op_floors_at_one() {
        let c = IterationController::new(Duration::from_secs(1));
        let mut prev = record(10, Duration::ZERO);
        prev.time_per_op = 0;
        assert_eq!(c.next(Some(&prev)), Some(1000));
    }
}
