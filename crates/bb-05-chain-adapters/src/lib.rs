//! # Chain & Pinning Adapters
//!
//! Concrete implementations of the two external ports defined in
//! `shared-types`:
//!
//! | Port | Adapter | Use |
//! |------|---------|-----|
//! | `TradeDocumentsContract` | [`JsonRpcContract`] | Ethereum JSON-RPC node with a node-managed signer |
//! | `TradeDocumentsContract` | [`SimulatedChain`] | In-process chain for tests and local runs |
//! | `PinningService` | [`PinataClient`] | Pinata pinning API and gateway |
//! | `PinningService` | [`InMemoryPinning`] | Content-addressed map for tests and local runs |
//!
//! The runtime picks one adapter per port at startup and injects it as an
//! `Arc<dyn …>`; nothing downstream knows which one it got.

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod chain;
pub mod pinning;

pub use chain::abi;
pub use chain::json_rpc::{JsonRpcConfig, JsonRpcContract};
pub use chain::simulated::SimulatedChain;
pub use pinning::memory::InMemoryPinning;
pub use pinning::pinata::{PinataClient, PinataConfig};
