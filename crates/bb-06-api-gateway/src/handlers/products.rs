//! Cached reads of confirmed contract state.

use super::{parse_doc_type, parse_product_id};
use crate::domain::{ApiError, ApiResponse, ApiResult};
use crate::service::AppState;
use axum::extract::{Path, State};
use bb_04_read_cache::{CachedRecord, CachedValue, ProductStatus};
use serde::Serialize;
use shared_types::{Address, DocType, ErrorKind, LogicalKey, ProductId};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentView {
    pub product_id: ProductId,
    pub doc_type: DocType,
    pub doc_type_name: &'static str,
    pub cid: String,
    pub uploaded_by: Address,
    pub timestamp: u64,
    pub confirmed_at_block: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmissionView {
    pub product_id: ProductId,
    pub total_emissions: u64,
    pub unit: String,
    pub reported_by: Address,
    pub timestamp: u64,
    pub confirmed_at_block: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSummary {
    pub product_id: ProductId,
    pub carbon_data: Option<EmissionView>,
    pub is_complete: bool,
}

/// GET /api/products/:id/documents/:doc_type
pub async fn document(
    State(state): State<AppState>,
    Path((product, doc_type)): Path<(String, String)>,
) -> ApiResult<ApiResponse<DocumentView>> {
    let product = parse_product_id(&product)?;
    let doc_type = parse_doc_type(&doc_type)?;
    let cached = state
        .reads
        .get(&LogicalKey::document(product, doc_type))
        .await?;

    let CachedRecord {
        value,
        confirmed_at_block,
        ..
    } = cached;
    let CachedValue::Document(record) = value else {
        return Err(ApiError::internal("document slot returned a non-document value"));
    };
    Ok(ApiResponse::ok(DocumentView {
        product_id: product,
        doc_type,
        doc_type_name: doc_type.name(),
        cid: record.cid,
        uploaded_by: record.uploaded_by,
        timestamp: record.timestamp,
        confirmed_at_block,
    }))
}

/// GET /api/products/:id/carbon
pub async fn carbon_emission(
    State(state): State<AppState>,
    Path(product): Path<String>,
) -> ApiResult<ApiResponse<EmissionView>> {
    let product = parse_product_id(&product)?;
    Ok(ApiResponse::ok(read_emission(&state, product).await?))
}

/// GET /api/products/:id/status
pub async fn status(
    State(state): State<AppState>,
    Path(product): Path<String>,
) -> ApiResult<ApiResponse<ProductStatus>> {
    let product = parse_product_id(&product)?;
    Ok(ApiResponse::ok(state.reads.is_product_complete(product).await?))
}

/// GET /api/products/:id/summary
///
/// Missing emission data is `null`; any other read failure fails the call.
pub async fn summary(
    State(state): State<AppState>,
    Path(product): Path<String>,
) -> ApiResult<ApiResponse<ProductSummary>> {
    let product = parse_product_id(&product)?;
    let carbon_data = match read_emission(&state, product).await {
        Ok(view) => Some(view),
        Err(e) if e.kind == ErrorKind::NotFound => None,
        Err(e) => return Err(e),
    };
    let status = state.reads.is_product_complete(product).await?;
    Ok(ApiResponse::ok(ProductSummary {
        product_id: product,
        carbon_data,
        is_complete: status.is_complete,
    }))
}

async fn read_emission(state: &AppState, product: ProductId) -> ApiResult<EmissionView> {
    let cached = state
        .reads
        .get(&LogicalKey::carbon_emission(product))
        .await?;
    match cached.value {
        CachedValue::CarbonEmission(record) => Ok(EmissionView {
            product_id: product,
            total_emissions: record.total_emissions,
            unit: record.unit,
            reported_by: record.reported_by,
            timestamp: record.timestamp,
            confirmed_at_block: cached.confirmed_at_block,
        }),
        CachedValue::Document(_) => Err(ApiError::internal(
            "emission slot returned a non-emission value",
        )),
    }
}
