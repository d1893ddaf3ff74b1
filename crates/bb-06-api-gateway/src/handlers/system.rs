//! Service description, liveness and status.

use crate::domain::{ApiError, ApiResponse};
use crate::service::AppState;
use axum::extract::State;
use axum::http::Uri;
use bb_01_fingerprint_store::StoreStats;
use bb_03_chain_watcher::WatcherStats;
use bb_04_read_cache::CacheStats;
use serde::Serialize;
use serde_json::{json, Value};
use shared_types::Address;
use tracing::warn;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Health {
    pub status: &'static str,
    pub uptime_secs: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainStatus {
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,
    pub signer: Address,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeStatus {
    /// `operational`, or `degraded` while the chain is unreachable.
    pub status: &'static str,
    pub uptime_secs: u64,
    pub blockchain: ChainStatus,
    pub queue_depth: usize,
    pub store: StoreStats,
    pub watcher: WatcherStats,
    pub cache: CacheStats,
}

/// GET /
pub async fn root() -> ApiResponse<Value> {
    ApiResponse::ok(json!({
        "name": "BeanBlock Ledger Coordinator",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Idempotent, confirmation-tracked writes of trade documents and carbon emissions",
        "endpoints": {
            "health": "/api/health",
            "status": "/api/status",
            "documents": "/api/documents",
            "requests": "/api/requests/:id",
            "products": "/api/products/:id",
            "ipfs": "/api/ipfs",
        },
    }))
}

/// GET /api/health
pub async fn health(State(state): State<AppState>) -> ApiResponse<Health> {
    ApiResponse::ok(Health {
        status: "healthy",
        uptime_secs: state.started_at.elapsed().as_secs(),
    })
}

/// GET /api/status
pub async fn status(State(state): State<AppState>) -> ApiResponse<NodeStatus> {
    let blockchain = match state.contract.block_number().await {
        Ok(head) => ChainStatus {
            connected: true,
            block_number: Some(head),
            signer: state.contract.signer(),
            error: None,
        },
        Err(e) => {
            warn!(error = %e, "Status check could not reach the chain");
            ChainStatus {
                connected: false,
                block_number: None,
                signer: state.contract.signer(),
                error: Some(e.to_string()),
            }
        }
    };

    ApiResponse::ok(NodeStatus {
        status: if blockchain.connected {
            "operational"
        } else {
            "degraded"
        },
        uptime_secs: state.started_at.elapsed().as_secs(),
        blockchain,
        queue_depth: state.submissions.depth(),
        store: state.store.stats(),
        watcher: state.watcher.stats(),
        cache: state.reads.stats(),
    })
}

/// Fallback for unknown routes.
pub async fn not_found(uri: Uri) -> ApiError {
    ApiError::not_found(format!("Route not found: {}", uri.path()))
}
