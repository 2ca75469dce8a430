//! Fan a workload out over a pool of worker threads.

use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

/// Number of workers [`run_parallel`] spawns for `multiplier`.
pub fn worker_count(multiplier: usize) -> usize {
    let cpus = thread::available_parallelism().map_or(1, std::num::NonZero::get);
    multiplier.max(1).saturating_mul(cpus)
}

/// Call `op` exactly `iterations` times across `multiplier × CPUs` workers.
///
/// Workers share a single countdown and claim one iteration at a time, so
/// fast workers pick up the slack of slow ones. Returns once every worker has
/// finished.
pub fn run_parallel<F>(iterations: u64, multiplier: usize, op: F)
where
    F: Fn() + Sync,
{
    let remaining = AtomicU64::new(iterations);
    let workers = worker_count(multiplier);
    thread::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|| {
                while claim(&remaining) {
                    op();
                }
            });
        }
    });
}

/// Take one iteration off a shared countdown; `false` once it is exhausted.
pub fn claim(remaining: &AtomicU64) -> bool {
    remaining
        .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
        .is_ok()
}
