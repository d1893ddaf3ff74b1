//! # BB-06 API Gateway
//!
//! HTTP interface of the ledger coordinator. Writes are accepted
//! asynchronously and answered with a request id to poll; reads go through
//! the read-repair cache; pinning routes proxy the pinning service.
//!
//! **Subsystem ID:** 6
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                        API GATEWAY (bb-06)                         │
//! ├───────────────────────────────────────────────────────────────────┤
//! │   Middleware Stack                                                 │
//! │   Trace → CORS → Timeout → Body limit                           │
//! │                           │                                        │
//! │   ┌───────────────┬───────┴───────┬───────────────┬────────────┐   │
//! │   │ /api/documents│ /api/requests │ /api/products │ /api/ipfs  │   │
//! │   └───────┬───────┴───────┬───────┴───────┬───────┴─────┬──────┘   │
//! └───────────┼───────────────┼───────────────┼─────────────┼──────────┘
//!             ▼               ▼               ▼             ▼
//!     Submission Queue   Chain Watcher   Read-Repair     Pinning
//!          (bb-02)          (bb-03)      Cache (bb-04)   service
//! ```
//!
//! ## Guarantees
//!
//! | Guarantee | Enforcement Location |
//! |-----------|---------------------|
//! | Writes answer 202 with `{requestId, status}` | `handlers/writes.rs` |
//! | Every error carries `kind` and `message` | `domain/error.rs` |
//! | Status code derived from the error kind only | `ApiError::status` |
//! | A missing idempotency token is generated server-side | `handlers/writes.rs` |
//!
//! ## Response Envelope
//!
//! ```json
//! { "success": true, "data": { ... }, "timestamp": "2024-05-01T12:00:00Z" }
//! { "success": false, "error": { "kind": "key_busy", "message": "..." }, "timestamp": "..." }
//! ```

#![warn(clippy::all)]
#![deny(unsafe_code)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod domain;
pub mod handlers;
pub mod middleware;
pub mod service;

pub use domain::{ApiError, ApiResponse, ConfigError, CorsConfig, GatewayConfig};
pub use service::{build_router, serve, AppState};
