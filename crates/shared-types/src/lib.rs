//! # Shared Types Crate
//!
//! Domain primitives shared by the BeanBlock subsystems.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: every type that crosses a subsystem boundary
//!   (queue → watcher → cache → API) is defined here.
//! - **Validated Construction**: `ProductId`, `Cid`, `IdempotencyToken` and
//!   `WriteRequest` can only be built through validating constructors, so a
//!   value that exists is a value that is well-formed.
//! - **Ports, not clients**: the contract and pinning collaborators are
//!   described as traits (`contract`, `pinning`); concrete clients live in
//!   `bb-05-chain-adapters` and are injected at startup.

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod clock;
pub mod contract;
pub mod entities;
pub mod errors;
pub mod pinning;

pub use clock::{ManualTimeSource, SystemTimeSource, TimeSource};
pub use contract::{
    ChainError, ContractCall, DocumentRecord, EmissionRecord, ReadAt, TradeDocumentsContract,
    TxReceipt,
};
pub use entities::*;
pub use errors::*;
pub use pinning::{PinningError, PinningService};
