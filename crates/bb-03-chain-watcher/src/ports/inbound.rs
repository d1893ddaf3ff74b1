//! Inbound (Driving) port: what the API gateway and the runtime may ask of
//! the watcher beyond its background workers.

use crate::domain::{ReconcileOutcome, WatcherError};
use async_trait::async_trait;
use serde::Serialize;
use shared_types::RequestId;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WatcherStats {
    pub broadcasts: u64,
    pub retries: u64,
    pub confirmed: u64,
    pub failed: u64,
    pub timeouts: u64,
    pub reconciled: u64,
}

#[async_trait]
pub trait WatcherApi: Send + Sync {
    /// Settles a timed-out record against the chain.
    async fn reconcile(&self, request_id: &RequestId) -> Result<ReconcileOutcome, WatcherError>;

    fn stats(&self) -> WatcherStats;
}
