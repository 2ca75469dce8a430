//! `getrusage`-backed counters for Unix targets.

use super::{ResourceProvider, ResourceSnapshot};
use crate::error::BenchError;
use nix::sys::resource::{Usage, UsageWho, getrusage};
use nix::sys::time::TimeVal;
use std::time::Duration;

/// Counters of the current process.
#[derive(Debug, Default, Clone, Copy)]
pub struct SelfUsage;

impl ResourceProvider for SelfUsage {
    fn name(&self) -> &'static str {
        "self"
    }

    fn snapshot(&self) -> ResourceSnapshot {
        match getrusage(UsageWho::RUSAGE_SELF) {
            Ok(usage) => snapshot_from_usage(&usage),
            Err(e) => {
                let err = BenchError::Resource {
                    counter: "getrusage(RUSAGE_SELF)",
                    reason: e.to_string(),
                };
                tracing::warn!("{}", err);
                ResourceSnapshot::default()
            }
        }
    }
}

fn snapshot_from_usage(usage: &Usage) -> ResourceSnapshot {
    ResourceSnapshot {
        cpu_time: Some(timeval(usage.user_time()) + timeval(usage.system_time())),
        peak_rss: Some(max_rss_bytes(usage.max_rss())),
    }
}

fn timeval(tv: TimeVal) -> Duration {
    let secs = u64::try_from(tv.tv_sec()).unwrap_or(0);
    let micros = u64::try_from(tv.tv_usec()).unwrap_or(0);
    Duration::from_secs(secs) + Duration::from_micros(micros)
}

/// CPU time (user + system) from a raw `libc::rusage`.
pub(super) fn raw_cpu_time(usage: &libc::rusage) -> Duration {
    let tv = |t: libc::timeval| {
        Duration::from_secs(u64::try_from(t.tv_sec).unwrap_or(0))
            + Duration::from_micros(u64::try_from(t.tv_usec).unwrap_or(0))
    };
    tv(usage.ru_utime) + tv(usage.ru_stime)
}

/// Normalise `ru_maxrss` to bytes.
///
/// macOS reports bytes, Linux and the BSDs report kilobytes.
pub(super) fn max_rss_bytes(max_rss: libc::c_long) -> u64 {
    let raw = u64::try_from(max_rss).unwrap_or(0);
    if cfg!(target_os = "macos") { raw } else { raw * 1024 }
}
