//! TradeDocuments contract adapters.

pub mod abi;
pub mod json_rpc;
pub mod simulated;
