//! Pinning routes. Thin proxies over the configured pinning service.

use crate::domain::{ApiError, ApiResponse, ApiResult};
use crate::service::AppState;
use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Multipart, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared_types::Cid;
use tracing::info;

const DEFAULT_JSON_NAME: &str = "data.json";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Uploaded {
    pub cid: Cid,
    pub url: String,
    pub filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct UploadJsonBody {
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub filename: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CidQuery {
    pub cid: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct HashBody {
    #[serde(alias = "ipfsHash")]
    pub hash: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Content {
    pub cid: Cid,
    pub data: Value,
}

#[derive(Debug, Serialize)]
pub struct GatewayUrl {
    pub cid: Cid,
    pub url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PinChange {
    pub ipfs_hash: Cid,
    pub pinned: bool,
}

/// POST /api/ipfs/upload (multipart, field `file`)
pub async fn upload_file(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<ApiResponse<Uploaded>> {
    let mut multipart = multipart?;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::invalid_payload(e.body_text()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or("upload").to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::invalid_payload(e.body_text()))?;
        let size = bytes.len();
        info!(filename = %filename, size, "Uploading file to pinning service");

        let cid = state.pinning.pin_file(bytes.to_vec(), &filename).await?;
        return Ok(ApiResponse::ok(Uploaded {
            url: state.pinning.gateway_url(&cid),
            cid,
            filename,
            size: Some(size),
        }));
    }
    Err(ApiError::invalid_payload("No file provided"))
}

/// POST /api/ipfs/upload-json
pub async fn upload_json(
    State(state): State<AppState>,
    payload: Result<Json<UploadJsonBody>, JsonRejection>,
) -> ApiResult<ApiResponse<Uploaded>> {
    let Json(body) = payload?;
    if body.data.is_null() {
        return Err(ApiError::invalid_payload("No data provided"));
    }
    let filename = body
        .filename
        .filter(|f| !f.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_JSON_NAME.to_string());
    info!(filename = %filename, "Uploading JSON to pinning service");

    let cid = state.pinning.pin_json(&body.data, Some(&filename)).await?;
    Ok(ApiResponse::ok(Uploaded {
        url: state.pinning.gateway_url(&cid),
        cid,
        filename,
        size: None,
    }))
}

/// GET /api/ipfs/get?cid=
pub async fn get_content(
    State(state): State<AppState>,
    query: Result<Query<CidQuery>, QueryRejection>,
) -> ApiResult<ApiResponse<Content>> {
    let cid = required_cid(query?.0.cid)?;
    let bytes = state.pinning.fetch(&cid).await?;
    Ok(ApiResponse::ok(Content {
        cid,
        data: decode_content(bytes),
    }))
}

/// GET /api/ipfs/url?cid=
pub async fn gateway_url(
    State(state): State<AppState>,
    query: Result<Query<CidQuery>, QueryRejection>,
) -> ApiResult<ApiResponse<GatewayUrl>> {
    let cid = required_cid(query?.0.cid)?;
    Ok(ApiResponse::ok(GatewayUrl {
        url: state.pinning.gateway_url(&cid),
        cid,
    }))
}

/// POST /api/ipfs/pin
pub async fn pin(
    State(state): State<AppState>,
    payload: Result<Json<HashBody>, JsonRejection>,
) -> ApiResult<ApiResponse<PinChange>> {
    let Json(body) = payload?;
    let cid = required_cid(body.hash)?;
    state.pinning.pin(&cid).await?;
    Ok(ApiResponse::ok(PinChange {
        ipfs_hash: cid,
        pinned: true,
    }))
}

/// POST /api/ipfs/unpin
pub async fn unpin(
    State(state): State<AppState>,
    payload: Result<Json<HashBody>, JsonRejection>,
) -> ApiResult<ApiResponse<PinChange>> {
    let Json(body) = payload?;
    let cid = required_cid(body.hash)?;
    state.pinning.unpin(&cid).await?;
    Ok(ApiResponse::ok(PinChange {
        ipfs_hash: cid,
        pinned: false,
    }))
}

fn required_cid(raw: Option<String>) -> ApiResult<Cid> {
    match raw.as_deref().map(str::trim) {
        None | Some("") => Err(ApiError::invalid_payload("CID is required")),
        Some(cid) => Ok(Cid::parse(cid)?),
    }
}

/// JSON content comes back as JSON, text as a string, anything else as hex.
fn decode_content(bytes: Vec<u8>) -> Value {
    if let Ok(value) = serde_json::from_slice::<Value>(&bytes) {
        return value;
    }
    match String::from_utf8(bytes) {
        Ok(text) => Value::String(text),
        Err(e) => Value::String(format!("0x{}", hex::encode(e.into_bytes()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_content() {
        assert_eq!(decode_content(br#"{"lot":7}"#.to_vec()), json!({"lot": 7}));
        assert_eq!(decode_content(b"plain text".to_vec()), json!("plain text"));
        assert_eq!(decode_content(vec![0xff, 0x00]), json!("0xff00"));
    }

    #[test]
    fn test_required_cid() {
        assert!(required_cid(None).is_err());
        assert!(required_cid(Some("  ".into())).is_err());
        assert!(required_cid(Some("not-a-cid".into())).is_err());
        let cid = "QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG";
        assert_eq!(required_cid(Some(cid.into())).unwrap().as_str(), cid);
    }
}
