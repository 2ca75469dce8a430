//! Profile capture around a timed run.
//!
//! CPU profiles are sampled in-process with `pprof` and written as protobuf
//! so the external renderer can read them. Heap profiles come from a
//! [`HeapProfiler`] supplied by the host, since only the global allocator
//! knows where its memory went.

use crate::error::{BenchError, Result};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

/// Create a uniquely named artifact file in `dir` that outlives this process.
///
/// Failure is fatal for the run.
pub fn create_artifact(dir: &Path, name: &str) -> Result<(File, PathBuf)> {
    tempfile::Builder::new()
        .prefix(&format!("{name}-"))
        .suffix(".prof")
        .tempfile_in(dir)
        .and_then(|file| file.keep().map_err(|e| e.error))
        .map_err(|source| BenchError::Artifact {
            dir: dir.to_path_buf(),
            source,
        })
}

/// Source of heap profiles.
///
/// Implementations write a profile the external renderer understands.
pub trait HeapProfiler: Send + Sync {
    /// Write the current heap profile to `out`.
    fn dump(&self, out: &mut File) -> io::Result<()>;
}

/// Capture a heap profile into a fresh artifact.
///
/// Returns `Ok(None)` if the profiler failed (logged, file removed). Only
/// artifact creation errors propagate.
pub fn capture_heap(
    profiler: &dyn HeapProfiler,
    dir: &Path,
    name: &str,
) -> Result<Option<PathBuf>> {
    let (mut file, path) = create_artifact(dir, name)?;
    match profiler.dump(&mut file) {
        Ok(()) => Ok(Some(path)),
        Err(e) => {
            tracing::warn!("Failed to write {} heap profile: {}", name, e);
            drop(file);
            let _ = std::fs::remove_file(&path);
            Ok(None)
        }
    }
}

/// In-flight CPU profile.
#[cfg(unix)]
pub struct CpuProfile {
    guard: pprof::ProfilerGuard<'static>,
    file: File,
    path: PathBuf,
}

#[cfg(unix)]
impl CpuProfile {
    /// Start sampling at `frequency` Hz, writing to a new artifact in `dir`.
    ///
    /// Returns `Ok(None)` if the profiler cannot start (logged).
    pub fn start(dir: &Path, frequency: i32) -> Result<Option<Self>> {
        let (file, path) = create_artifact(dir, crate::measurement::ARTIFACT_CPU_PROFILE)?;
        match pprof::ProfilerGuardBuilder::default()
            .frequency(frequency)
            .blocklist(&["libc", "libgcc", "pthread", "vdso"])
            .build()
        {
            Ok(guard) => {
                tracing::debug!("Started CPU profiler at {}Hz", frequency);
                Ok(Some(Self { guard, file, path }))
            }
            Err(e) => {
                tracing::warn!("Failed to start CPU profiler: {}", e);
                drop(file);
                let _ = std::fs::remove_file(&path);
                Ok(None)
            }
        }
    }

    /// Stop sampling and write the protobuf profile.
    ///
    /// Returns the artifact path, or `None` if the report could not be
    /// written (logged, file removed).
    pub fn finish(self) -> Option<PathBuf> {
        let Self { guard, mut file, path } = self;
        match write_pprof(&guard, &mut file) {
            Ok(samples) => {
                if samples == 0 {
                    tracing::warn!(
                        "No profiler samples collected for {} - run may be too short for sampling",
                        path.display()
                    );
                }
                Some(path)
            }
            Err(e) => {
                tracing::warn!("Failed to write CPU profile: {}", e);
                drop(file);
                let _ = std::fs::remove_file(&path);
                None
            }
        }
    }
}

/// Placeholder on platforms without a sampling profiler.
#[cfg(not(unix))]
pub enum CpuProfile {}

#[cfg(not(unix))]
impl CpuProfile {
    /// Always `Ok(None)`: CPU profiling is not supported here.
    pub fn start(_dir: &Path, _frequency: i32) -> Result<Option<Self>> {
        tracing::warn!("CPU profiling is not supported on this platform");
        Ok(None)
    }

    /// Never called; there are no values of this type.
    pub fn finish(self) -> Option<PathBuf> {
        match self {}
    }
}

/// Encode the guard's report into `out`, returning the sample count.
#[cfg(unix)]
fn write_pprof(guard: &pprof::ProfilerGuard<'_>, out: &mut File) -> Result<isize> {
    use pprof::protos::Message;
    use std::io::Write;

    let report = guard
        .report()
        .build()
        .map_err(|e| BenchError::Profile(e.to_string()))?;
    let samples: isize = report.data.values().copied().sum();

    let profile = report
        .pprof()
        .map_err(|e| BenchError::Profile(e.to_string()))?;
    let mut content = Vec::new();
    profile
        .encode(&mut content)
        .map_err(|e| BenchError::Profile(e.to_string()))?;
    out.write_all(&content)?;
    Ok(samples)
}
