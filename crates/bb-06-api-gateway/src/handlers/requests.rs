//! Status polling, cancellation and reconciliation of accepted writes.

use super::parse_request_id;
use crate::domain::{ApiResponse, ApiResult};
use crate::service::AppState;
use axum::extract::{Path, State};
use bb_03_chain_watcher::ReconcileOutcome;
use serde::Serialize;
use shared_types::{RequestId, SubmissionRecord};
use tracing::info;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileResponse {
    pub request_id: RequestId,
    #[serde(flatten)]
    pub outcome: ReconcileOutcome,
    pub record: Option<SubmissionRecord>,
}

/// GET /api/requests/:id
pub async fn status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<ApiResponse<SubmissionRecord>> {
    let id = parse_request_id(&id)?;
    Ok(ApiResponse::ok(state.submissions.status(&id)?))
}

/// DELETE /api/requests/:id
pub async fn cancel(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<ApiResponse<SubmissionRecord>> {
    let id = parse_request_id(&id)?;
    let record = state.submissions.cancel(&id).await?;
    info!(request_id = %id, "Request cancelled");
    Ok(ApiResponse::ok(record))
}

/// POST /api/requests/:id/reconcile
pub async fn reconcile(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<ApiResponse<ReconcileResponse>> {
    let id = parse_request_id(&id)?;
    let outcome = state.watcher.reconcile(&id).await?;
    info!(request_id = %id, outcome = ?outcome, "Reconcile requested");
    Ok(ApiResponse::ok(ReconcileResponse {
        request_id: id,
        outcome,
        record: state.submissions.status(&id).ok(),
    }))
}
