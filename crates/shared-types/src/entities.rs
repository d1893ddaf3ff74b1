//! # Core Domain Entities
//!
//! Record slots, write requests and submission records.
//!
//! A `LogicalKey` names one mutable slot of the TradeDocuments contract: a
//! document of a given type for a product, or the product's carbon emission
//! figure. Every write against a slot travels as a `WriteRequest` and is
//! tracked by exactly one `SubmissionRecord` from acceptance to a terminal
//! state.

use crate::errors::{ErrorKind, RecordedError, ValidationError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Milliseconds since the Unix epoch.
pub type Timestamp = u64;

/// Base58 alphabet used by CIDv0 (no `0`, `O`, `I`, `l`).
const BASE58_ALPHABET: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

/// Length of the base58 body following the `Qm` prefix of a CIDv0.
pub const CID_V0_BODY_LEN: usize = 44;

/// Longest accepted idempotency token.
pub const MAX_TOKEN_LEN: usize = 128;

// =============================================================================
// PRODUCT / RECORD SLOT
// =============================================================================

/// On-chain product identifier. Always ≥ 1.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct ProductId(u64);

impl ProductId {
    pub fn new(value: u64) -> Result<Self, ValidationError> {
        if value == 0 {
            return Err(ValidationError::InvalidProductId);
        }
        Ok(Self(value))
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl TryFrom<u64> for ProductId {
    type Error = ValidationError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ProductId> for u64 {
    fn from(id: ProductId) -> Self {
        id.0
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Trade document categories, numbered as the contract's `uint8 docType`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u8")]
#[repr(u8)]
pub enum DocType {
    RetailReceipt = 0,
    ProcessingInvoice = 1,
    FarmCertificate = 2,
    BillOfLading = 3,
}

impl DocType {
    /// All document types. A product is complete once each has been stored.
    pub const ALL: [DocType; 4] = [
        DocType::RetailReceipt,
        DocType::ProcessingInvoice,
        DocType::FarmCertificate,
        DocType::BillOfLading,
    ];

    pub fn from_u64(value: u64) -> Result<Self, ValidationError> {
        match value {
            0 => Ok(Self::RetailReceipt),
            1 => Ok(Self::ProcessingInvoice),
            2 => Ok(Self::FarmCertificate),
            3 => Ok(Self::BillOfLading),
            other => Err(ValidationError::InvalidDocType(other)),
        }
    }

    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::RetailReceipt => "retail_receipt",
            Self::ProcessingInvoice => "processing_invoice",
            Self::FarmCertificate => "farm_certificate",
            Self::BillOfLading => "bill_of_lading",
        }
    }
}

impl TryFrom<u64> for DocType {
    type Error = ValidationError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        Self::from_u64(value)
    }
}

impl From<DocType> for u8 {
    fn from(doc_type: DocType) -> Self {
        doc_type.as_u8()
    }
}

/// Which slot of a product a write targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RecordType {
    Document(DocType),
    CarbonEmission,
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Document(doc_type) => write!(f, "document:{}", doc_type.as_u8()),
            Self::CarbonEmission => f.write_str("carbon"),
        }
    }
}

/// Uniquely identifies one mutable on-chain record slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogicalKey {
    pub entity_id: ProductId,
    pub record_type: RecordType,
}

impl LogicalKey {
    #[must_use]
    pub const fn document(product: ProductId, doc_type: DocType) -> Self {
        Self {
            entity_id: product,
            record_type: RecordType::Document(doc_type),
        }
    }

    #[must_use]
    pub const fn carbon_emission(product: ProductId) -> Self {
        Self {
            entity_id: product,
            record_type: RecordType::CarbonEmission,
        }
    }
}

impl fmt::Display for LogicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "product:{}/{}", self.entity_id, self.record_type)
    }
}

// =============================================================================
// CONTENT IDENTIFIERS
// =============================================================================

/// CID encoding generation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CidVersion {
    V0,
    V1,
}

/// A validated content identifier.
///
/// Accepted forms:
/// - v0: `Qm` followed by exactly 44 base58 characters
/// - v1: `bafy` followed by one or more base32 (lowercase) characters
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Cid(String);

impl Cid {
    pub fn parse(value: impl Into<String>) -> Result<Self, ValidationError> {
        let value = value.into();
        if Self::detect_version(&value).is_none() {
            return Err(ValidationError::InvalidCid(value));
        }
        Ok(Self(value))
    }

    fn detect_version(value: &str) -> Option<CidVersion> {
        if let Some(body) = value.strip_prefix("Qm") {
            let valid = body.len() == CID_V0_BODY_LEN
                && body.chars().all(|c| BASE58_ALPHABET.contains(c));
            return valid.then_some(CidVersion::V0);
        }
        if let Some(body) = value.strip_prefix("bafy") {
            let valid = !body.is_empty()
                && body
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || ('2'..='7').contains(&c));
            return valid.then_some(CidVersion::V1);
        }
        None
    }

    #[must_use]
    pub fn version(&self) -> CidVersion {
        if self.0.starts_with("Qm") {
            CidVersion::V0
        } else {
            CidVersion::V1
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Cid {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<Cid> for String {
    fn from(cid: Cid) -> Self {
        cid.0
    }
}

impl FromStr for Cid {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// REQUEST IDENTITY
// =============================================================================

/// Caller-supplied deduplication token.
///
/// 1 to 128 characters drawn from `[A-Za-z0-9_-:./]`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IdempotencyToken(String);

impl IdempotencyToken {
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let value = value.into();
        if value.is_empty() {
            return Err(ValidationError::InvalidToken("token is empty".into()));
        }
        if value.len() > MAX_TOKEN_LEN {
            return Err(ValidationError::InvalidToken(format!(
                "token exceeds {MAX_TOKEN_LEN} characters"
            )));
        }
        if !value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | ':' | '.' | '/'))
        {
            return Err(ValidationError::InvalidToken(
                "token contains characters outside [A-Za-z0-9_-:./]".into(),
            ));
        }
        Ok(Self(value))
    }

    /// Server-side token for callers that did not supply one.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("srv-{}", Uuid::new_v4()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for IdempotencyToken {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<IdempotencyToken> for String {
    fn from(token: IdempotencyToken) -> Self {
        token.0
    }
}

impl fmt::Display for IdempotencyToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Server-assigned identifier of an accepted write.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub Uuid);

impl RequestId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl FromStr for RequestId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// CHAIN IDENTIFIERS
// =============================================================================

fn decode_fixed_hex<const N: usize>(value: &str) -> Result<[u8; N], ValidationError> {
    let stripped = value.strip_prefix("0x").unwrap_or(value);
    let bytes = hex::decode(stripped).map_err(|_| ValidationError::InvalidHex(value.into()))?;
    bytes
        .try_into()
        .map_err(|_| ValidationError::InvalidHex(value.into()))
}

/// 32-byte transaction hash, `0x`-prefixed hex on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TxHash(pub [u8; 32]);

impl FromStr for TxHash {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_fixed_hex::<32>(s).map(Self)
    }
}

impl TryFrom<String> for TxHash {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TxHash> for String {
    fn from(hash: TxHash) -> Self {
        hash.to_string()
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

/// 20-byte account address, `0x`-prefixed hex on the wire.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(pub [u8; 20]);

impl FromStr for Address {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_fixed_hex::<20>(s).map(Self)
    }
}

impl TryFrom<String> for Address {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.to_string()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

// =============================================================================
// WRITE REQUESTS
// =============================================================================

/// The value a write stores into its slot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum WritePayload {
    Document {
        cid: Cid,
    },
    CarbonEmission {
        #[serde(rename = "totalEmissions")]
        total_emissions: u64,
        unit: String,
    },
}

impl WritePayload {
    /// Whether this payload can be written to a slot of `record_type`.
    #[must_use]
    pub fn fits(&self, record_type: &RecordType) -> bool {
        matches!(
            (self, record_type),
            (Self::Document { .. }, RecordType::Document(_))
                | (Self::CarbonEmission { .. }, RecordType::CarbonEmission)
        )
    }

    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::Document { .. } => "document",
            Self::CarbonEmission { .. } => "carbonEmission",
        }
    }
}

/// A write against one record slot. Immutable once built.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WriteRequest {
    key: LogicalKey,
    payload: WritePayload,
    submitted_at: Timestamp,
    idempotency_token: IdempotencyToken,
}

impl WriteRequest {
    /// Builds a request, rejecting payloads that do not fit the key's slot.
    pub fn new(
        key: LogicalKey,
        payload: WritePayload,
        idempotency_token: IdempotencyToken,
        submitted_at: Timestamp,
    ) -> Result<Self, ValidationError> {
        if !payload.fits(&key.record_type) {
            return Err(ValidationError::PayloadMismatch {
                record: key.record_type.to_string(),
                payload: payload.kind_name().to_string(),
            });
        }
        Ok(Self {
            key,
            payload,
            submitted_at,
            idempotency_token,
        })
    }

    #[must_use]
    pub fn store_document(
        product: ProductId,
        doc_type: DocType,
        cid: Cid,
        idempotency_token: IdempotencyToken,
        submitted_at: Timestamp,
    ) -> Self {
        Self {
            key: LogicalKey::document(product, doc_type),
            payload: WritePayload::Document { cid },
            submitted_at,
            idempotency_token,
        }
    }

    #[must_use]
    pub fn set_carbon_emission(
        product: ProductId,
        total_emissions: u64,
        unit: impl Into<String>,
        idempotency_token: IdempotencyToken,
        submitted_at: Timestamp,
    ) -> Self {
        Self {
            key: LogicalKey::carbon_emission(product),
            payload: WritePayload::CarbonEmission {
                total_emissions,
                unit: unit.into(),
            },
            submitted_at,
            idempotency_token,
        }
    }

    #[must_use]
    pub fn key(&self) -> &LogicalKey {
        &self.key
    }

    #[must_use]
    pub fn payload(&self) -> &WritePayload {
        &self.payload
    }

    #[must_use]
    pub fn submitted_at(&self) -> Timestamp {
        self.submitted_at
    }

    #[must_use]
    pub fn idempotency_token(&self) -> &IdempotencyToken {
        &self.idempotency_token
    }
}

// =============================================================================
// SUBMISSION LIFECYCLE
// =============================================================================

/// Lifecycle state of a submission.
///
/// ```text
/// [Pending] ──broadcast──→ [Submitted] ──depth reached──→ [Confirmed]
///    │  ↑                       │
///    │  └──── retryable error ──┤
///    │                          └── revert / timeout / retries ──→ [Failed]
///    └── cancel ──→ [Failed(Cancelled)]
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionStatus {
    Pending,
    Submitted,
    Confirmed,
    Failed,
}

impl SubmissionStatus {
    /// Pending and Submitted records hold their key.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Pending | Self::Submitted)
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !self.is_active()
    }

    /// Status-level transition graph.
    ///
    /// `Failed → Confirmed` is only legal for a confirmation timeout that
    /// later turned out to have landed; the store checks the cause.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        use SubmissionStatus::*;
        matches!(
            (self, next),
            (Pending, Pending)
                | (Pending, Submitted)
                | (Pending, Failed)
                | (Submitted, Submitted)
                | (Submitted, Pending)
                | (Submitted, Confirmed)
                | (Submitted, Failed)
                | (Failed, Failed)
                | (Failed, Confirmed)
        )
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Submitted => "submitted",
            Self::Confirmed => "confirmed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a submission ended in `Failed`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cause", rename_all = "camelCase")]
pub enum FailureCause {
    /// The contract rejected the call.
    Reverted { reason: String },
    /// The signer cannot pay for gas.
    InsufficientFunds,
    /// No confirmation within the configured wait. Outcome unknown.
    ConfirmationTimeout,
    /// Retryable errors persisted past the retry bound.
    RetriesExhausted,
    /// Withdrawn by the caller while still Pending.
    Cancelled,
    /// A timed-out transaction that reconciliation proved never landed.
    /// Resubmitting with a new token is safe.
    Dropped,
}

impl FailureCause {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Reverted { .. } | Self::InsufficientFunds => ErrorKind::Reverted,
            Self::ConfirmationTimeout => ErrorKind::ConfirmationTimeout,
            Self::RetriesExhausted | Self::Dropped => ErrorKind::TransientChainError,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }
}

/// Tracks one write from acceptance to a terminal state.
///
/// `attempt` counts retries: it is 0 for the first broadcast and is only
/// incremented when a retryable failure sends the record back to Pending.
/// `revision` increases on every stored mutation and is the version checked
/// by compare-and-swap.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionRecord {
    pub request_id: RequestId,
    pub key: LogicalKey,
    pub idempotency_token: IdempotencyToken,
    pub payload: WritePayload,
    pub tx_hash: Option<TxHash>,
    pub nonce: Option<u64>,
    pub status: SubmissionStatus,
    pub attempt: u32,
    pub last_error: Option<RecordedError>,
    pub failure: Option<FailureCause>,
    pub confirmed_at_block: Option<u64>,
    pub submitted_at: Timestamp,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub broadcast_at: Option<Timestamp>,
    pub revision: u64,
}

impl SubmissionRecord {
    /// A freshly accepted record for `request`.
    #[must_use]
    pub fn pending(request_id: RequestId, request: &WriteRequest, now: Timestamp) -> Self {
        Self {
            request_id,
            key: request.key,
            idempotency_token: request.idempotency_token.clone(),
            payload: request.payload.clone(),
            tx_hash: None,
            nonce: None,
            status: SubmissionStatus::Pending,
            attempt: 0,
            last_error: None,
            failure: None,
            confirmed_at_block: None,
            submitted_at: request.submitted_at,
            created_at: now,
            updated_at: now,
            broadcast_at: None,
            revision: 0,
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// Whether `request` describes the same write as this record.
    #[must_use]
    pub fn matches_request(&self, request: &WriteRequest) -> bool {
        self.key == request.key && self.payload == request.payload
    }

    /// Timed out records whose on-chain outcome is still unknown.
    #[must_use]
    pub fn awaits_reconciliation(&self) -> bool {
        self.status == SubmissionStatus::Failed
            && self.failure == Some(FailureCause::ConfirmationTimeout)
    }
}
