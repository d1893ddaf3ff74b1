//! Solidity ABI codec for the five TradeDocuments calls.
//!
//! Only the shapes the contract uses are supported: `uint256`, `uint8`,
//! `address`, `bool` and `string`. Calls are encoded as selector plus head
//! words followed by the dynamic tail; return data is decoded by word index.

use primitive_types::U256;
use sha3::{Digest, Keccak256};
use shared_types::{
    Address, ChainError, ContractCall, DocType, DocumentRecord, EmissionRecord, ProductId,
};

pub const STORE_DOCUMENT: &str = "storeDocument(uint256,uint8,string)";
pub const SET_CARBON_EMISSION: &str = "setCarbonEmission(uint256,uint256,string)";
pub const GET_DOCUMENT: &str = "getDocument(uint256,uint8)";
pub const GET_CARBON_EMISSION: &str = "getCarbonEmission(uint256)";
pub const IS_PRODUCT_COMPLETE: &str = "isProductComplete(uint256)";

/// Every function the coordinator needs from the deployed contract.
pub const INTERFACE: [&str; 5] = [
    STORE_DOCUMENT,
    SET_CARBON_EMISSION,
    GET_DOCUMENT,
    GET_CARBON_EMISSION,
    IS_PRODUCT_COMPLETE,
];

/// Selector of the standard `Error(string)` revert payload.
const ERROR_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];

const WORD: usize = 32;

// =============================================================================
// HASHING
// =============================================================================

pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// First four bytes of the keccak-256 of a canonical signature.
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

// =============================================================================
// ENCODING
// =============================================================================

enum Param {
    Word([u8; 32]),
    Bytes(Vec<u8>),
}

/// Builds call data for one function.
pub struct CallEncoder {
    selector: [u8; 4],
    params: Vec<Param>,
}

impl CallEncoder {
    pub fn new(signature: &str) -> Self {
        Self {
            selector: selector(signature),
            params: Vec::new(),
        }
    }

    pub fn uint(mut self, value: impl Into<U256>) -> Self {
        let mut word = [0u8; 32];
        value.into().to_big_endian(&mut word);
        self.params.push(Param::Word(word));
        self
    }

    pub fn string(mut self, value: &str) -> Self {
        self.params.push(Param::Bytes(value.as_bytes().to_vec()));
        self
    }

    pub fn finish(self) -> Vec<u8> {
        let head_len = self.params.len() * WORD;
        let mut head = Vec::with_capacity(4 + head_len);
        let mut tail = Vec::new();
        head.extend_from_slice(&self.selector);

        for param in self.params {
            match param {
                Param::Word(word) => head.extend_from_slice(&word),
                Param::Bytes(bytes) => {
                    head.extend_from_slice(&word_from_usize(head_len + tail.len()));
                    tail.extend_from_slice(&word_from_usize(bytes.len()));
                    let padded = bytes.len().div_ceil(WORD) * WORD;
                    tail.extend_from_slice(&bytes);
                    tail.resize(tail.len() + padded - bytes.len(), 0);
                }
            }
        }

        head.extend(tail);
        head
    }
}

fn word_from_usize(value: usize) -> [u8; 32] {
    let mut word = [0u8; 32];
    U256::from(value).to_big_endian(&mut word);
    word
}

pub fn encode_store_document(product: ProductId, doc_type: DocType, cid: &str) -> Vec<u8> {
    CallEncoder::new(STORE_DOCUMENT)
        .uint(product.get())
        .uint(doc_type.as_u8())
        .string(cid)
        .finish()
}

pub fn encode_set_carbon_emission(product: ProductId, total_emissions: u64, unit: &str) -> Vec<u8> {
    CallEncoder::new(SET_CARBON_EMISSION)
        .uint(product.get())
        .uint(total_emissions)
        .string(unit)
        .finish()
}

pub fn encode_get_document(product: ProductId, doc_type: DocType) -> Vec<u8> {
    CallEncoder::new(GET_DOCUMENT)
        .uint(product.get())
        .uint(doc_type.as_u8())
        .finish()
}

pub fn encode_get_carbon_emission(product: ProductId) -> Vec<u8> {
    CallEncoder::new(GET_CARBON_EMISSION)
        .uint(product.get())
        .finish()
}

pub fn encode_is_product_complete(product: ProductId) -> Vec<u8> {
    CallEncoder::new(IS_PRODUCT_COMPLETE)
        .uint(product.get())
        .finish()
}

pub fn encode_call(call: &ContractCall) -> Vec<u8> {
    match call {
        ContractCall::StoreDocument {
            product,
            doc_type,
            cid,
        } => encode_store_document(*product, *doc_type, cid.as_str()),
        ContractCall::SetCarbonEmission {
            product,
            total_emissions,
            unit,
        } => encode_set_carbon_emission(*product, *total_emissions, unit),
    }
}

// =============================================================================
// DECODING
// =============================================================================

/// Reads return data word by word.
pub struct Decoder<'a> {
    data: &'a [u8],
}

impl<'a> Decoder<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    fn slice(&self, offset: usize, len: usize) -> Result<&'a [u8], ChainError> {
        offset
            .checked_add(len)
            .and_then(|end| self.data.get(offset..end))
            .ok_or_else(|| {
                ChainError::Decode(format!(
                    "return data too short: need {len} bytes at {offset}, have {}",
                    self.data.len()
                ))
            })
    }

    fn word_at(&self, offset: usize) -> Result<U256, ChainError> {
        Ok(U256::from_big_endian(self.slice(offset, WORD)?))
    }

    pub fn uint(&self, index: usize) -> Result<U256, ChainError> {
        self.word_at(index * WORD)
    }

    pub fn u64(&self, index: usize) -> Result<u64, ChainError> {
        let value = self.uint(index)?;
        if value > U256::from(u64::MAX) {
            return Err(ChainError::Decode(format!("value {value} does not fit in u64")));
        }
        Ok(value.low_u64())
    }

    pub fn bool(&self, index: usize) -> Result<bool, ChainError> {
        Ok(!self.uint(index)?.is_zero())
    }

    pub fn address(&self, index: usize) -> Result<Address, ChainError> {
        let word = self.slice(index * WORD, WORD)?;
        let mut address = [0u8; 20];
        address.copy_from_slice(&word[12..]);
        Ok(Address(address))
    }

    fn usize_at(&self, offset: usize) -> Result<usize, ChainError> {
        let value = self.word_at(offset)?;
        if value > U256::from(self.data.len()) {
            return Err(ChainError::Decode(format!("offset {value} out of range")));
        }
        Ok(value.low_u64() as usize)
    }

    pub fn string(&self, index: usize) -> Result<String, ChainError> {
        let offset = self.usize_at(index * WORD)?;
        let len = self.usize_at(offset)?;
        let bytes = self.slice(offset + WORD, len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| ChainError::Decode(format!("string is not UTF-8: {e}")))
    }
}

/// Decodes `getDocument` output `(string cid, address uploadedBy, uint256 timestamp)`.
pub fn decode_document(data: &[u8]) -> Result<DocumentRecord, ChainError> {
    let decoder = Decoder::new(data);
    Ok(DocumentRecord {
        cid: decoder.string(0)?,
        uploaded_by: decoder.address(1)?,
        timestamp: decoder.u64(2)?,
    })
}

/// Decodes `getCarbonEmission` output
/// `(uint256 totalEmissions, string unit, address reportedBy, uint256 timestamp)`.
pub fn decode_emission(data: &[u8]) -> Result<EmissionRecord, ChainError> {
    let decoder = Decoder::new(data);
    Ok(EmissionRecord {
        total_emissions: decoder.u64(0)?,
        unit: decoder.string(1)?,
        reported_by: decoder.address(2)?,
        timestamp: decoder.u64(3)?,
    })
}

pub fn decode_bool(data: &[u8]) -> Result<bool, ChainError> {
    Decoder::new(data).bool(0)
}

/// Extracts the message of an `Error(string)` revert payload.
pub fn decode_revert_reason(data: &[u8]) -> Option<String> {
    let body = data.strip_prefix(&ERROR_SELECTOR)?;
    Decoder::new(body).string(0).ok()
}

/// Builds an `Error(string)` revert payload.
pub fn encode_revert_reason(reason: &str) -> Vec<u8> {
    let mut data = ERROR_SELECTOR.to_vec();
    data.extend(CallEncoder::new("").string(reason).finish().split_off(4));
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(id: u64) -> ProductId {
        ProductId::new(id).unwrap()
    }

    #[test]
    fn test_known_selectors() {
        assert_eq!(hex::encode(selector("transfer(address,uint256)")), "a9059cbb");
        assert_eq!(selector("Error(string)"), ERROR_SELECTOR);
    }

    #[test]
    fn test_store_document_layout() {
        let cid = format!("Qm{}", "a".repeat(44));
        let data = encode_store_document(product(1), DocType::RetailReceipt, &cid);

        // selector + 3 head words + length word + 46 bytes padded to 64
        assert_eq!(data.len(), 4 + 3 * 32 + 32 + 64);
        assert_eq!(&data[..4], &selector(STORE_DOCUMENT));

        let body = Decoder::new(&data[4..]);
        assert_eq!(body.u64(0).unwrap(), 1);
        assert_eq!(body.u64(1).unwrap(), 0);
        assert_eq!(body.u64(2).unwrap(), 0x60);
        assert_eq!(body.string(2).unwrap(), cid);
    }

    #[test]
    fn test_decode_document_output() {
        // (string, address, uint256) laid out the way the contract returns it.
        let mut data = Vec::new();
        data.extend_from_slice(&word_from_usize(0x60));
        let mut address_word = [0u8; 32];
        address_word[12..].copy_from_slice(&[0xab; 20]);
        data.extend_from_slice(&address_word);
        data.extend_from_slice(&word_from_usize(1_700_000_000));
        data.extend_from_slice(&word_from_usize(4));
        let mut text = [0u8; 32];
        text[..4].copy_from_slice(b"QmXy");
        data.extend_from_slice(&text);

        let record = decode_document(&data).unwrap();
        assert_eq!(record.cid, "QmXy");
        assert_eq!(record.uploaded_by, Address([0xab; 20]));
        assert_eq!(record.timestamp, 1_700_000_000);
    }

    #[test]
    fn test_revert_reason() {
        let payload = encode_revert_reason("Document not found");
        assert_eq!(&payload[..4], &ERROR_SELECTOR);
        assert_eq!(
            decode_revert_reason(&payload),
            Some("Document not found".to_string())
        );
        assert_eq!(decode_revert_reason(&[0xde, 0xad]), None);
    }

    #[test]
    fn test_truncated_output_is_decode_error() {
        assert!(matches!(
            decode_emission(&[0u8; 40]),
            Err(ChainError::Decode(_))
        ));
        assert!(decode_bool(&[]).is_err());
    }

    #[test]
    fn test_oversized_uint_rejected() {
        let data = [0xffu8; 32];
        assert!(Decoder::new(&data).u64(0).is_err());
        assert!(Decoder::new(&data).bool(0).unwrap());
    }
}
