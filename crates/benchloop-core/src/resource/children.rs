//! Resource accounting for child processes.
//!
//! Counters of the benchmark process miss everything its children do, so
//! subprocess-based workloads spawn through the [`ChildWatcher`]. The watcher
//! owns one background listener thread, started on first use. Spawned
//! children are handed to it over a channel; it reaps each one with `wait4`
//! (which returns that child's own resource usage), closes the handle, and
//! sends a [`ChildExit`] to every subscriber. Each [`ChildUsage`] subscribes
//! when created and folds its own queue into running totals whenever a
//! snapshot is taken. Exits with no live subscriber are dropped.
//!
//! Callers waiting on a [`TrackedChild`] receive the exit status over a
//! per-child reply channel, after the usage has been published, so a snapshot
//! taken right after `wait()` returns already includes the child.

use super::rusage::{max_rss_bytes, raw_cpu_time};
use super::{ResourceProvider, ResourceSnapshot};
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use parking_lot::Mutex;
use std::io;
use std::os::unix::process::ExitStatusExt;
use std::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command, ExitStatus};
use std::sync::{Arc, OnceLock};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

/// How often the listener polls children that have not exited yet.
const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Usage reported by one reaped child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildExit {
    /// Process id of the child.
    pub pid: u32,
    /// Exit status.
    pub status: ExitStatus,
    /// User + system CPU time of the child.
    pub cpu_time: Duration,
    /// Peak resident bytes of the child.
    pub max_rss: u64,
}

/// A child handed to the listener thread.
struct Registration {
    child: Child,
    reply: Sender<io::Result<ExitStatus>>,
}

type Subscribers = Arc<Mutex<Vec<Sender<ChildExit>>>>;

/// Handle to the process-wide child listener.
pub struct ChildWatcher {
    register: Sender<Registration>,
    subscribers: Subscribers,
}

impl ChildWatcher {
    /// The process-wide watcher, starting the listener thread on first call.
    pub fn global() -> &'static Self {
        static WATCHER: OnceLock<ChildWatcher> = OnceLock::new();
        WATCHER.get_or_init(Self::start)
    }

    fn start() -> Self {
        let (register, registrations) = mpsc::channel();
        let subscribers = Subscribers::default();
        let shared = Arc::clone(&subscribers);
        let listener = std::thread::Builder::new()
            .name("benchloop-child-watcher".into())
            .spawn(move || listen(&registrations, &shared));
        if let Err(e) = listener {
            // spawn() reports the dead listener to every caller.
            tracing::error!("Failed to start child watcher thread: {}", e);
        }
        Self {
            register,
            subscribers,
        }
    }

    /// Spawn `cmd` and track its resource usage.
    ///
    /// Pipes requested on `cmd` are available on the returned handle.
    pub fn spawn(&self, cmd: &mut Command) -> io::Result<TrackedChild> {
        let mut child = cmd.spawn()?;
        let pid = child.id();
        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let (reply, status) = mpsc::channel();
        if let Err(mpsc::SendError(mut orphan)) = self.register.send(Registration { child, reply }) {
            let _ = orphan.child.kill();
            let _ = orphan.child.wait();
            return Err(io::Error::other("child watcher thread is not running"));
        }

        tracing::trace!("Tracking child process {}", pid);
        Ok(TrackedChild {
            pid,
            status,
            stdin,
            stdout,
            stderr,
        })
    }

    /// Receive every exit reaped from now on.
    ///
    /// Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> Receiver<ChildExit> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.lock().push(tx);
        rx
    }

    #[cfg(test)]
    fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

/// Send `exit` to every live subscriber, forgetting the ones that are gone.
fn publish(subscribers: &Mutex<Vec<Sender<ChildExit>>>, exit: ChildExit) {
    subscribers.lock().retain(|tx| tx.send(exit).is_ok());
}

/// Listener loop: accept registrations and reap children as they exit.
fn listen(registrations: &Receiver<Registration>, subscribers: &Mutex<Vec<Sender<ChildExit>>>) {
    let mut pending: Vec<Registration> = Vec::new();
    loop {
        let next = if pending.is_empty() {
            registrations.recv().map_err(|_| RecvTimeoutError::Disconnected)
        } else {
            registrations.recv_timeout(POLL_INTERVAL)
        };

        match next {
            Ok(registration) => pending.push(registration),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) if pending.is_empty() => return,
            Err(RecvTimeoutError::Disconnected) => {}
        }

        pending.retain(|registration| {
            let pid = registration.child.id();
            match try_reap(pid) {
                Ok(None) => true,
                Ok(Some(exit)) => {
                    // Publish usage before waking the waiter.
                    publish(subscribers, exit);
                    let _ = registration.reply.send(Ok(exit.status));
                    false
                }
                Err(e) => {
                    tracing::warn!("Lost track of child process {}: {}", pid, e);
                    let _ = registration.reply.send(Err(e));
                    false
                }
            }
        });
    }
}

/// Non-blocking `wait4` on one child.
fn try_reap(pid: u32) -> io::Result<Option<ChildExit>> {
    let raw_pid = libc::pid_t::try_from(pid).map_err(io::Error::other)?;
    let mut status: libc::c_int = 0;
    // SAFETY: rusage is plain old data; zeroed is a valid initial state.
    let mut usage: libc::rusage = unsafe { std::mem::zeroed() };
    loop {
        // SAFETY: status and usage are valid, exclusively borrowed out-pointers.
        let ret = unsafe { libc::wait4(raw_pid, &raw mut status, libc::WNOHANG, &raw mut usage) };
        match ret {
            0 => return Ok(None),
            r if r == raw_pid => {
                return Ok(Some(ChildExit {
                    pid,
                    status: ExitStatus::from_raw(status),
                    cpu_time: raw_cpu_time(&usage),
                    max_rss: max_rss_bytes(usage.ru_maxrss),
                }));
            }
            _ => {
                let err = io::Error::last_os_error();
                if err.kind() != io::ErrorKind::Interrupted {
                    return Err(err);
                }
            }
        }
    }
}

/// A child process whose usage is being tracked.
#[derive(Debug)]
pub struct TrackedChild {
    pid: u32,
    status: Receiver<io::Result<ExitStatus>>,
    /// Child's stdin, if piped.
    pub stdin: Option<ChildStdin>,
    /// Child's stdout, if piped.
    pub stdout: Option<ChildStdout>,
    /// Child's stderr, if piped.
    pub stderr: Option<ChildStderr>,
}

impl TrackedChild {
    /// Process id of the child.
    pub fn id(&self) -> u32 {
        self.pid
    }

    /// Block until the child exits.
    pub fn wait(self) -> io::Result<ExitStatus> {
        drop(self.stdin);
        self.status
            .recv()
            .map_err(|_| io::Error::other("child watcher dropped the process"))?
    }

    /// Send SIGKILL to the child. It is still reaped by the watcher.
    pub fn kill(&self) -> io::Result<()> {
        let pid = i32::try_from(self.pid).map_err(io::Error::other)?;
        kill(Pid::from_raw(pid), Signal::SIGKILL).map_err(io::Error::from)
    }
}

/// Accumulated usage of every child the [`ChildWatcher`] reaps while this
/// provider exists.
#[derive(Debug)]
pub struct ChildUsage {
    exits: Mutex<Receiver<ChildExit>>,
    totals: Mutex<ChildTotals>,
}

#[derive(Debug, Default, Clone, Copy)]
struct ChildTotals {
    cpu_time: Duration,
    peak_rss: u64,
    reaped: u64,
}

impl ChildUsage {
    /// Create a provider with empty totals, subscribed to the global watcher.
    pub fn new() -> Self {
        Self {
            exits: Mutex::new(ChildWatcher::global().subscribe()),
            totals: Mutex::default(),
        }
    }

    /// Number of children accounted for so far.
    pub fn reaped(&self) -> u64 {
        self.totals.lock().reaped
    }
}

impl Default for ChildUsage {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceProvider for ChildUsage {
    fn name(&self) -> &'static str {
        "children"
    }

    fn snapshot(&self) -> ResourceSnapshot {
        let mut totals = self.totals.lock();
        for exit in self.exits.lock().try_iter() {
            if !exit.status.success() {
                tracing::debug!("Child {} exited with {}", exit.pid, exit.status);
            }
            totals.cpu_time += exit.cpu_time;
            totals.peak_rss = totals.peak_rss.max(exit.max_rss);
            totals.reaped += 1;
        }
        ResourceSnapshot {
            cpu_time: Some(totals.cpu_time),
            peak_rss: (totals.reaped > 0).then_some(totals.peak_rss),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wait_returns_status() {
        let child = ChildWatcher::global()
            .spawn(Command::new("sh").args(["-c", "exit 3"]))
            .unwrap();
        let status = child.wait().unwrap();
        assert_eq!(status.code(), Some(3));
    }

    #[test]
    fn test_kill_is_reaped() {
        let child = ChildWatcher::global()
            .spawn(Command::new("sleep").arg("30"))
            .unwrap();
        child.kill().unwrap();
        let status = child.wait().unwrap();
        assert_eq!(status.signal(), Some(libc::SIGKILL));
    }

    #[test]
    fn test_dropped_provider_unsubscribes() {
        let watcher = ChildWatcher::global();
        drop(ChildUsage::new());

        let child = watcher.spawn(&mut Command::new("true")).unwrap();
        assert!(child.wait().unwrap().success());

        // Publishing the exit found the receiver gone.
        assert_eq!(watcher.subscriber_count(), 0);
    }

    #[test]
    fn test_spawn_failure_is_reported() {
        let result = ChildWatcher::global().spawn(&mut Command::new("/nonexistent/binary/12345"));
        assert!(result.is_err());
    }
}
