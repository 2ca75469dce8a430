//! Resource snapshot providers.
//!
//! A [`ResourceProvider`] returns a [`ResourceSnapshot`] of cumulative CPU
//! time and peak resident memory. Snapshots are only meaningful in pairs:
//! the timed wrapper takes one before and one after the workload and folds
//! [`ResourceSnapshot::delta`] into the run's metrics.
//!
//! Variants:
//! - [`SelfUsage`]: the current process (`getrusage(RUSAGE_SELF)`)
//! - [`ChildUsage`]: every child spawned through the [`ChildWatcher`]
//! - [`UnsupportedUsage`]: platforms without a counter source
//!
//! Any counter that cannot be read is logged and left as `None`; the matching
//! metric is then omitted instead of failing the run.

#[cfg(unix)]
mod children;
#[cfg(unix)]
mod rusage;

#[cfg(unix)]
pub use children::{ChildExit, ChildUsage, ChildWatcher, TrackedChild};
#[cfg(unix)]
pub use rusage::SelfUsage;

use std::sync::{Arc, OnceLock};
use std::time::Duration;

/// Point-in-time reading of cumulative resource counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceSnapshot {
    /// Cumulative user + system CPU time.
    pub cpu_time: Option<Duration>,
    /// Peak resident set size in bytes.
    pub peak_rss: Option<u64>,
}

/// Difference between two snapshots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceDelta {
    /// CPU time consumed between the snapshots.
    pub cpu_time: Option<Duration>,
    /// Peak resident bytes as of the later snapshot.
    ///
    /// A high-water mark cannot be differenced, so this is the later value.
    pub peak_memory: Option<u64>,
}

impl ResourceSnapshot {
    /// Usage between `self` (before) and `after`.
    pub fn delta(&self, after: &Self) -> ResourceDelta {
        let cpu_time = match (self.cpu_time, after.cpu_time) {
            (Some(before), Some(after)) => Some(after.saturating_sub(before)),
            _ => None,
        };
        ResourceDelta {
            cpu_time,
            peak_memory: after.peak_rss,
        }
    }
}

/// Source of resource snapshots.
pub trait ResourceProvider: Send + Sync {
    /// Short name used in log messages.
    fn name(&self) -> &'static str;

    /// Read the current counters. Never fails; unreadable counters are `None`.
    fn snapshot(&self) -> ResourceSnapshot;
}

/// Provider that has no counters to read.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedUsage;

impl ResourceProvider for UnsupportedUsage {
    fn name(&self) -> &'static str {
        "unsupported"
    }

    fn snapshot(&self) -> ResourceSnapshot {
        ResourceSnapshot::default()
    }
}

/// In-process provider for the current platform, chosen once.
pub fn platform_provider() -> Arc<dyn ResourceProvider> {
    static PROVIDER: OnceLock<Arc<dyn ResourceProvider>> = OnceLock::new();
    PROVIDER
        .get_or_init(|| {
            #[cfg(unix)]
            let provider: Arc<dyn ResourceProvider> = Arc::new(SelfUsage);
            #[cfg(not(unix))]
            let provider: Arc<dyn ResourceProvider> = Arc::new(UnsupportedUsage);
            tracing::debug!("Using {} resource provider", provider.name());
            provider
        })
        .clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delta_subtracts_cpu_time() {
        let before = ResourceSnapshot {
            cpu_time: Some(Duration::from_millis(10)),
            peak_rss: Some(100),
        };
        let after = ResourceSnapshot {
            cpu_time: Some(Duration::from_millis(35)),
            peak_rss: Some(150),
        };
        let d = before.delta(&after);
        assert_eq!(d.cpu_time, Some(Duration::from_millis(25)));
        assert_eq!(d.peak_memory, Some(150));
    }

    #[test]
    fn test_delta_missing_reading_is_omitted() {
        let before = ResourceSnapshot { cpu_time: None, peak_rss: None };
        let after = ResourceSnapshot {
            cpu_time: Some(Duration::from_millis(1)),
            peak_rss: None,
        };
        let d = before.delta(&after);
        assert_eq!(d.cpu_time, None);
        assert_eq!(d.peak_memory, None);
    }

    #[test]
    fn test_unsupported_is_empty() {
        assert_eq!(UnsupportedUsage.snapshot(), ResourceSnapshot::default());
    }

    #[cfg(unix)]
    #[test]
    fn test_platform_provider_reads_self() {
        let provider = platform_provider();
        assert_eq!(provider.name(), "self");
        let snap = provider.snapshot();
        assert!(snap.cpu_time.is_some());
        assert!(snap.peak_rss.is_some_and(|rss| rss > 0));
    }
}
