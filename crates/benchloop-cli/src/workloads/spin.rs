//! Pure CPU busy loop.

use benchloop_core::{LatencyRecorder, Workload};
use std::hint::black_box;

/// Default multiply-add steps per operation.
pub const DEFAULT_STEPS: u64 = 1000;

/// Runs a fixed number of dependent multiply-adds per operation.
#[derive(Debug, Clone)]
pub struct SpinWorkload {
    steps: u64,
}

impl Default for SpinWorkload {
    fn default() -> Self {
        Self::new(DEFAULT_STEPS)
    }
}

impl SpinWorkload {
    /// Busy loop of `steps` multiply-adds per operation.
    pub fn new(steps: u64) -> Self {
        Self { steps }
    }

    /// One operation. Returns the accumulator so it cannot be optimised away.
    pub fn op(&self) -> u64 {
        let mut acc = black_box(1u64);
        for i in 0..self.steps {
            acc = acc.wrapping_mul(6364136223846793005).wrapping_add(i);
        }
        acc
    }
}

impl Workload for SpinWorkload {
    fn run(&mut self, iterations: u64, _recorder: &LatencyRecorder<'_>) {
        for _ in 0..iterations {
            black_box(self.op());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use benchloop_core::LatencySampler;

    #[test]
    fn test_op_is_deterministic() {
        let w = SpinWorkload::new(10);
        assert_eq!(w.op(), w.op());
        assert_ne!(SpinWorkload::new(10).op(), SpinWorkload::new(11).op());
    }

    #[test]
    fn test_run_records_nothing() {
        let mut sampler = LatencySampler::with_capacity(10);
        SpinWorkload::new(5).run(10, &sampler.recorder());
        assert!(sampler.percentiles().is_none());
    }
}
