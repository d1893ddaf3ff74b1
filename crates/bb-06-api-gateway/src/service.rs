//! Router construction and the HTTP server loop.

use crate::domain::GatewayConfig;
use crate::handlers::{ipfs, products, requests, system, writes};
use crate::middleware::create_cors_layer;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use bb_01_fingerprint_store::FingerprintStore;
use bb_02_submission_queue::SubmissionApi;
use bb_03_chain_watcher::WatcherApi;
use bb_04_read_cache::ReadApi;
use shared_types::{PinningService, TimeSource, TradeDocumentsContract};
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower::ServiceBuilder;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared state for every handler.
#[derive(Clone)]
pub struct AppState {
    pub submissions: Arc<dyn SubmissionApi>,
    pub watcher: Arc<dyn WatcherApi>,
    pub reads: Arc<dyn ReadApi>,
    pub pinning: Arc<dyn PinningService>,
    pub contract: Arc<dyn TradeDocumentsContract>,
    pub store: Arc<dyn FingerprintStore>,
    pub time: Arc<dyn TimeSource>,
    pub config: Arc<GatewayConfig>,
    pub started_at: Instant,
}

/// Build the HTTP router with the full middleware stack.
pub fn build_router(state: AppState) -> Router {
    let config = Arc::clone(&state.config);

    let middleware = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(create_cors_layer(&config.cors))
        .layer(TimeoutLayer::new(config.request_timeout));

    Router::new()
        .route("/", get(system::root))
        .route("/api/health", get(system::health))
        .route("/api/status", get(system::status))
        // Writes
        .route("/api/documents/store", post(writes::store_document))
        .route("/api/documents/carbon/set", post(writes::set_carbon_emission))
        // Request lifecycle
        .route(
            "/api/requests/:id",
            get(requests::status).delete(requests::cancel),
        )
        .route("/api/requests/:id/reconcile", post(requests::reconcile))
        // Cached reads
        .route(
            "/api/products/:id/documents/:doc_type",
            get(products::document),
        )
        .route("/api/products/:id/carbon", get(products::carbon_emission))
        .route("/api/products/:id/status", get(products::status))
        .route("/api/products/:id/summary", get(products::summary))
        // Pinning
        .route("/api/ipfs/upload", post(ipfs::upload_file))
        .route("/api/ipfs/upload-json", post(ipfs::upload_json))
        .route("/api/ipfs/get", get(ipfs::get_content))
        .route("/api/ipfs/url", get(ipfs::gateway_url))
        .route("/api/ipfs/pin", post(ipfs::pin))
        .route("/api/ipfs/unpin", post(ipfs::unpin))
        .fallback(system::not_found)
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        .layer(middleware)
        .with_state(state)
}

/// Serve `router` on `listener` until `shutdown` turns true.
pub async fn serve(
    listener: TcpListener,
    router: Router,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    info!(addr = %listener.local_addr()?, "HTTP API listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
        })
        .await?;
    info!("HTTP API stopped");
    Ok(())
}
