//! Write endpoints.
//!
//! A write is never executed inline: the handler validates the body, hands a
//! `WriteRequest` to the submission queue and answers 202 with the request
//! id. Clients poll `/api/requests/:id` for the outcome.

use super::IntField;
use crate::domain::{ApiError, ApiResponse, ApiResult};
use crate::service::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};
use shared_types::{
    Cid, DocType, IdempotencyToken, ProductId, RequestId, SubmissionStatus, WriteRequest,
};
use tracing::info;

pub const IDEMPOTENCY_HEADER: &str = "idempotency-key";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreDocumentBody {
    pub product_id: IntField,
    pub doc_type: IntField,
    pub cid: String,
    #[serde(default)]
    pub idempotency_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CarbonEmissionBody {
    pub product_id: IntField,
    pub total_emissions: IntField,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub idempotency_token: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptedWrite {
    pub request_id: RequestId,
    pub status: SubmissionStatus,
    pub idempotency_token: IdempotencyToken,
}

/// POST /api/documents/store
pub async fn store_document(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<StoreDocumentBody>, JsonRejection>,
) -> ApiResult<ApiResponse<AcceptedWrite>> {
    let Json(body) = payload?;
    let product = ProductId::new(body.product_id.get("productId")?)?;
    let doc_type = DocType::from_u64(body.doc_type.get("docType")?)?;
    let cid = Cid::parse(body.cid.trim())?;
    let token = resolve_token(&headers, body.idempotency_token)?;

    let request = WriteRequest::store_document(product, doc_type, cid, token, state.time.now());
    accept(&state, request).await
}

/// POST /api/documents/carbon/set
pub async fn set_carbon_emission(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<CarbonEmissionBody>, JsonRejection>,
) -> ApiResult<ApiResponse<AcceptedWrite>> {
    let Json(body) = payload?;
    let product = ProductId::new(body.product_id.get("productId")?)?;
    let total_emissions = body.total_emissions.get("totalEmissions")?;
    let unit = body
        .unit
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .unwrap_or_else(|| state.config.default_emission_unit.clone());
    let token = resolve_token(&headers, body.idempotency_token)?;

    let request =
        WriteRequest::set_carbon_emission(product, total_emissions, unit, token, state.time.now());
    accept(&state, request).await
}

async fn accept(state: &AppState, request: WriteRequest) -> ApiResult<ApiResponse<AcceptedWrite>> {
    let key = *request.key();
    let record = state.submissions.enqueue(request).await?;
    info!(
        request_id = %record.request_id,
        key = %key,
        status = %record.status,
        "Write accepted"
    );
    Ok(ApiResponse::accepted(AcceptedWrite {
        request_id: record.request_id,
        status: record.status,
        idempotency_token: record.idempotency_token,
    }))
}

/// Token from the body, else the `Idempotency-Key` header, else a fresh one.
///
/// A generated token deduplicates nothing; it only lets the record carry one.
fn resolve_token(headers: &HeaderMap, from_body: Option<String>) -> ApiResult<IdempotencyToken> {
    let from_header = match headers.get(IDEMPOTENCY_HEADER) {
        Some(value) => Some(
            value
                .to_str()
                .map_err(|_| ApiError::invalid_payload("Idempotency-Key must be ASCII"))?
                .to_string(),
        ),
        None => None,
    };

    match (from_body, from_header) {
        (Some(body), Some(header)) if body != header => Err(ApiError::invalid_payload(
            "idempotencyToken and Idempotency-Key header disagree",
        )),
        (Some(token), _) | (None, Some(token)) => Ok(IdempotencyToken::new(token)?),
        (None, None) => Ok(IdempotencyToken::generate()),
    }
}
