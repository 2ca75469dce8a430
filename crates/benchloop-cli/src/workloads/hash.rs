//! SHA-256 throughput over a buffer sized from the memory budget.

use super::WORKLOAD_SEED;
use benchloop_core::{LatencyRecorder, Workload};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use sha2::{Digest, Sha256};

/// Share of the memory budget used for the hashed buffer.
const BUDGET_DIVISOR: u64 = 64;
/// Smallest buffer hashed per operation.
const MIN_BUFFER: usize = 4096;

/// Hashes one buffer per operation.
#[derive(Debug, Clone)]
pub struct HashWorkload {
    buffer: Vec<u8>,
}

impl HashWorkload {
    /// Workload with a buffer of `budget / 64` bytes (at least 4 KiB).
    pub fn new(memory_budget: u64) -> Self {
        let len = usize::try_from(memory_budget / BUDGET_DIVISOR)
            .unwrap_or(usize::MAX)
            .max(MIN_BUFFER);
        let mut buffer = vec![0u8; len];
        ChaCha8Rng::seed_from_u64(WORKLOAD_SEED).fill_bytes(&mut buffer);
        Self { buffer }
    }

    /// Bytes hashed per operation.
    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }

    /// Hash the buffer once.
    pub fn digest(&self) -> [u8; 32] {
        Sha256::digest(&self.buffer).into()
    }
}

impl Workload for HashWorkload {
    fn run(&mut self, iterations: u64, recorder: &LatencyRecorder<'_>) {
        for _ in 0..iterations {
            let start = quanta::Instant::now();
            std::hint::black_box(self.digest());
            recorder.observe(start);
        }
    }
}
