//! Cross-subsystem scenarios.

pub mod harness;

mod concurrency;
mod failure_modes;
mod write_flow;
