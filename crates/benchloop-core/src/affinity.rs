//! Pin the benchmark process to a set of CPUs.

use crate::error::{BenchError, Result};

/// CPU indices selected by `mask`, lowest first.
pub fn cpus_in_mask(mask: u64) -> impl Iterator<Item = usize> {
    (0..u64::BITS as usize).filter(move |&cpu| mask & (1 << cpu) != 0)
}

/// Restrict the current process to the CPUs set in `mask`.
#[cfg(target_os = "linux")]
pub fn pin_process(mask: u64) -> Result<()> {
    use nix::sched::{CpuSet, sched_setaffinity};
    use nix::unistd::Pid;

    let mut set = CpuSet::new();
    for cpu in cpus_in_mask(mask) {
        set.set(cpu)
            .map_err(|e| BenchError::InvalidConfig(format!("CPU {cpu} out of range: {e}")))?;
    }
    sched_setaffinity(Pid::from_raw(0), &set)
        .map_err(|e| BenchError::Io(std::io::Error::from(e)))?;
    tracing::debug!("Pinned process to CPU mask {:#x}", mask);
    Ok(())
}

/// Restrict the current process to the CPUs set in `mask`.
///
/// Not supported on this platform.
#[cfg(not(target_os = "linux"))]
pub fn pin_process(mask: u64) -> Result<()> {
    Err(BenchError::Io(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        format!("cannot apply CPU mask {mask:#x}: affinity is only supported on Linux"),
    )))
}
