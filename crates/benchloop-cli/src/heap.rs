//! Heap profiles for `--memprof`.
//!
//! On Linux the binary runs on jemalloc with its sampling heap profiler
//! compiled in but inactive. Asking for a profiler activates sampling and
//! returns a [`HeapProfiler`] that dumps the current heap as a gzipped pprof
//! protobuf, which the external renderer can diff.

use anyhow::Result;
use benchloop_core::HeapProfiler;
use std::sync::Arc;

/// Heap profiler for this binary, with sampling switched on.
pub fn profiler() -> Result<Arc<dyn HeapProfiler>> {
    imp::profiler()
}

#[cfg(all(target_os = "linux", feature = "jemalloc"))]
mod imp {
    use anyhow::{Context, Result, anyhow};
    use benchloop_core::HeapProfiler;
    use jemalloc_pprof::JemallocProfCtl;
    use std::fs::File;
    use std::io::{self, Write};
    use std::sync::Arc;
    use tokio::sync::Mutex;

    /// Dumps jemalloc's sampled heap.
    pub struct JemallocHeap {
        ctl: Arc<Mutex<JemallocProfCtl>>,
    }

    pub fn profiler() -> Result<Arc<dyn HeapProfiler>> {
        let ctl = jemalloc_pprof::PROF_CTL
            .as_ref()
            .context("jemalloc was started without profiling (opt.prof is off)")?
            .clone();
        {
            let mut guard = ctl.blocking_lock();
            if !guard.activated() {
                guard
                    .activate()
                    .map_err(|e| anyhow!("Failed to activate jemalloc heap profiling: {e}"))?;
                tracing::debug!("Activated jemalloc heap profiling");
            }
        }
        Ok(Arc::new(JemallocHeap { ctl }))
    }

    impl HeapProfiler for JemallocHeap {
        fn dump(&self, out: &mut File) -> io::Result<()> {
            let profile = self
                .ctl
                .blocking_lock()
                .dump_pprof()
                .map_err(|e| io::Error::other(e.to_string()))?;
            out.write_all(&profile)
        }
    }
}

#[cfg(not(all(target_os = "linux", feature = "jemalloc")))]
mod imp {
    use anyhow::{Result, bail};
    use benchloop_core::HeapProfiler;
    use std::sync::Arc;

    pub fn profiler() -> Result<Arc<dyn HeapProfiler>> {
        bail!("Heap profiling needs a Linux build with the `jemalloc` feature")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Only the benchmark binary exports `malloc_conf`; here jemalloc starts
    // with `opt.prof` off.
    #[test]
    fn test_unavailable_without_prof_conf() {
        assert!(profiler().is_err());
    }
}
