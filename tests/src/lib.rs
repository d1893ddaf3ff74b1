//! # BeanBlock Test Suite
//!
//! Cross-subsystem tests that wire the real store, queue, watcher and cache
//! against the simulated chain.
//!
//! ## Structure
//!
//! ```text
//! tests/
//! ├── src/integration/
//! │   ├── harness.rs       # Fully wired ledger with background workers
//! │   ├── write_flow.rs    # Accept → broadcast → confirm → read
//! │   ├── concurrency.rs   # Single writer per key, concurrent replays
//! │   └── failure_modes.rs # Reverts, timeouts, restarts
//! └── benches/             # Store and queue throughput
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p bb-tests
//! cargo test -p bb-tests integration::concurrency::
//! cargo bench -p bb-tests
//! ```

pub mod integration;
