//! Route handlers, grouped by resource.

pub mod ipfs;
pub mod products;
pub mod requests;
pub mod system;
pub mod writes;

use crate::domain::{ApiError, ApiResult};
use serde::Deserialize;
use shared_types::{DocType, ProductId, RequestId, ValidationError};

/// Integer body field that also accepts a numeric string (`"42"`).
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum IntField {
    Number(u64),
    Text(String),
}

impl IntField {
    pub fn get(&self, field: &str) -> ApiResult<u64> {
        match self {
            Self::Number(value) => Ok(*value),
            Self::Text(text) => text
                .trim()
                .parse()
                .map_err(|_| ApiError::invalid_payload(format!("{field} must be an integer"))),
        }
    }
}

pub(crate) fn parse_product_id(raw: &str) -> ApiResult<ProductId> {
    let value: u64 = raw
        .trim()
        .parse()
        .map_err(|_| ValidationError::InvalidProductId)?;
    Ok(ProductId::new(value)?)
}

pub(crate) fn parse_doc_type(raw: &str) -> ApiResult<DocType> {
    let value: u64 = raw
        .trim()
        .parse()
        .map_err(|_| ApiError::invalid_payload("docType must be between 0 and 3"))?;
    Ok(DocType::from_u64(value)?)
}

pub(crate) fn parse_request_id(raw: &str) -> ApiResult<RequestId> {
    raw.trim()
        .parse()
        .map_err(|_| ApiError::invalid_payload(format!("malformed request id: {raw}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::ErrorKind;

    #[test]
    fn test_int_field_accepts_numeric_strings() {
        let field: IntField = serde_json::from_str("\"42\"").unwrap();
        assert_eq!(field.get("productId").unwrap(), 42);
        let field: IntField = serde_json::from_str("7").unwrap();
        assert_eq!(field.get("productId").unwrap(), 7);
        let field: IntField = serde_json::from_str("\"seven\"").unwrap();
        assert_eq!(field.get("productId").unwrap_err().kind, ErrorKind::InvalidPayload);
        assert!(serde_json::from_str::<IntField>("-1").is_err());
    }

    #[test]
    fn test_path_parsing() {
        assert_eq!(parse_product_id("12").unwrap().get(), 12);
        assert!(parse_product_id("0").is_err());
        assert!(parse_product_id("abc").is_err());
        assert_eq!(parse_doc_type("3").unwrap(), DocType::BillOfLading);
        assert!(parse_doc_type("4").is_err());
        assert!(parse_request_id("not-a-uuid").is_err());
        let id = RequestId::new();
        assert_eq!(parse_request_id(&id.to_string()).unwrap(), id);
    }
}
