//! Deadline supervision for a whole benchmark invocation.
//!
//! A hung workload would otherwise block the harness forever. [`Watchdog::arm`]
//! starts a timer thread that waits on a condition variable; disarming (or
//! dropping) the returned guard wakes it early and nothing happens. If the
//! deadline passes first, the expiry action runs. The default action logs
//! and aborts the process.

use crate::config::Config;
use crate::error::Result;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Lower bound on the per-trial allowance.
pub const MIN_TRIAL_ALLOWANCE: Duration = Duration::from_secs(60);

/// Action run when a deadline expires. Receives the deadline.
pub type ExpiryAction = Box<dyn FnOnce(Duration) + Send + 'static>;

/// Time a full invocation under `config` may take before the watchdog fires.
///
/// `max(target, 60s) * trials * 2`, times `flake + 2` in flakiness mode.
pub fn deadline_for(config: &Config) -> Duration {
    let per_trial = config.target_duration.max(MIN_TRIAL_ALLOWANCE);
    let deadline = per_trial
        .saturating_mul(config.trials.max(1))
        .saturating_mul(2);
    if config.flake_mode() {
        deadline.saturating_mul(config.flake.saturating_add(2))
    } else {
        deadline
    }
}

/// Default expiry action: report and abort.
pub fn abort_on_expiry(deadline: Duration) {
    tracing::error!("Benchmark did not finish within {:?}; aborting", deadline);
    eprintln!("benchloop: watchdog deadline of {deadline:?} expired, aborting");
    std::process::abort();
}

struct State {
    disarmed: Mutex<bool>,
    wake: Condvar,
}

/// Armed deadline. Disarm or drop to cancel.
pub struct Watchdog {
    state: Arc<State>,
    thread: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for Watchdog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watchdog")
            .field("disarmed", &*self.state.disarmed.lock())
            .finish_non_exhaustive()
    }
}

impl Watchdog {
    /// Arm a deadline with the default abort action.
    pub fn arm(deadline: Duration) -> Result<Self> {
        Self::arm_with(deadline, Box::new(abort_on_expiry))
    }

    /// Arm a deadline that runs `action` on expiry.
    pub fn arm_with(deadline: Duration, action: ExpiryAction) -> Result<Self> {
        let state = Arc::new(State {
            disarmed: Mutex::new(false),
            wake: Condvar::new(),
        });
        let thread_state = Arc::clone(&state);
        let thread = std::thread::Builder::new()
            .name("benchloop-watchdog".into())
            .spawn(move || {
                let mut disarmed = thread_state.disarmed.lock();
                let result = thread_state
                    .wake
                    .wait_while_for(&mut disarmed, |disarmed| !*disarmed, deadline);
                if result.timed_out() && !*disarmed {
                    drop(disarmed);
                    action(deadline);
                }
            })?;
        tracing::debug!("Watchdog armed for {:?}", deadline);
        Ok(Self {
            state,
            thread: Some(thread),
        })
    }

    /// Cancel the deadline and wait for the timer thread to exit.
    pub fn disarm(mut self) {
        self.cancel();
    }

    fn cancel(&mut self) {
        *self.state.disarmed.lock() = true;
        self.state.wake.notify_all();
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            tracing::warn!("Watchdog expiry action panicked");
        }
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::mpsc;

    #[test]
    fn test_deadline_defaults() {
        let config = Config::default();
        // max(5s, 60s) * 5 trials * 2
        assert_eq!(deadline_for(&config), Duration::from_secs(600));
    }

    #[test]
    fn test_deadline_long_target() {
        let config = Config {
            target_duration: Duration::from_secs(90),
            trials: 1,
            ..Config::default()
        };
        assert_eq!(deadline_for(&config), Duration::from_secs(180));
    }

    #[test]
    fn test_deadline_flake_mode() {
        let config = Config {
            trials: 1,
            flake: 3,
            ..Config::default()
        };
        assert_eq!(deadline_for(&config), Duration::from_secs(60 * 2 * 5));
    }

    #[test]
    fn test_expiry_runs_action() {
        let (tx, rx) = mpsc::channel();
        let dog = Watchdog::arm_with(
            Duration::from_millis(10),
            Box::new(move |deadline| {
                let _ = tx.send(deadline);
            }),
        )
        .unwrap();
        let fired = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(fired, Duration::from_millis(10));
        dog.disarm();
    }

    #[test]
    fn test_disarm_cancels() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        let dog = Watchdog::arm_with(
            Duration::from_millis(200),
            Box::new(move |_| flag.store(true, Ordering::SeqCst)),
        )
        .unwrap();
        dog.disarm();
        std::thread::sleep(Duration::from_millis(300));
        assert!(!fired.load(Ordering::SeqCst));
    }

    #[test]
    fn test_drop_cancels() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        {
            let _dog = Watchdog::arm_with(
                Duration::from_millis(100),
                Box::new(move |_| flag.store(true, Ordering::SeqCst)),
            )
            .unwrap();
        }
        std::thread::sleep(Duration::from_millis(200));
        assert!(!fired.load(Ordering::SeqCst));
    }
}
