//! benchloop - adaptive benchmark runner.
//!
//! Command-line front end for `benchloop-core` plus a set of demonstration
//! workloads that exercise each of the engine's collectors.

pub mod cli;
pub mod export;
pub mod heap;
pub mod workloads;
