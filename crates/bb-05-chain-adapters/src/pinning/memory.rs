//! In-memory pinning service.
//!
//! Content is addressed by a CIDv0 built from the SHA-256 multihash of the
//! raw bytes. That is not the CID IPFS would assign (IPFS hashes the UnixFS
//! DAG), but it has the same shape and is stable for identical content.

use async_trait::async_trait;
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use shared_types::{Cid, PinningError, PinningService};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

/// Multihash prefix for sha2-256 with a 32-byte digest.
const SHA256_MULTIHASH: [u8; 2] = [0x12, 0x20];

pub fn content_cid(content: &[u8]) -> Result<Cid, PinningError> {
    let mut multihash = SHA256_MULTIHASH.to_vec();
    multihash.extend_from_slice(&Sha256::digest(content));
    Cid::parse(bs58::encode(multihash).into_string())
        .map_err(|e| PinningError::InvalidResponse(e.to_string()))
}

pub struct InMemoryPinning {
    contents: RwLock<HashMap<Cid, Vec<u8>>>,
    pinned: RwLock<HashSet<Cid>>,
    gateway_base: String,
    unavailable: AtomicBool,
}

impl Default for InMemoryPinning {
    fn default() -> Self {
        Self::new("https://gateway.pinata.cloud/ipfs")
    }
}

impl InMemoryPinning {
    pub fn new(gateway_base: impl Into<String>) -> Self {
        Self {
            contents: RwLock::new(HashMap::new()),
            pinned: RwLock::new(HashSet::new()),
            gateway_base: gateway_base.into(),
            unavailable: AtomicBool::new(false),
        }
    }

    pub fn is_pinned(&self, cid: &Cid) -> bool {
        self.pinned.read().contains(cid)
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn ensure_available(&self) -> Result<(), PinningError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(PinningError::Unavailable("pinning service offline".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl PinningService for InMemoryPinning {
    async fn pin_file(&self, content: Vec<u8>, _file_name: &str) -> Result<Cid, PinningError> {
        self.ensure_available()?;
        let cid = content_cid(&content)?;
        self.contents.write().insert(cid.clone(), content);
        self.pinned.write().insert(cid.clone());
        Ok(cid)
    }

    async fn pin_json(
        &self,
        value: &serde_json::Value,
        name: Option<&str>,
    ) -> Result<Cid, PinningError> {
        let content = serde_json::to_vec(value)
            .map_err(|e| PinningError::InvalidResponse(e.to_string()))?;
        self.pin_file(content, name.unwrap_or("data.json")).await
    }

    async fn fetch(&self, cid: &Cid) -> Result<Vec<u8>, PinningError> {
        self.ensure_available()?;
        self.contents
            .read()
            .get(cid)
            .cloned()
            .ok_or_else(|| PinningError::NotFound(cid.to_string()))
    }

    async fn pin(&self, cid: &Cid) -> Result<(), PinningError> {
        self.ensure_available()?;
        self.pinned.write().insert(cid.clone());
        Ok(())
    }

    async fn unpin(&self, cid: &Cid) -> Result<(), PinningError> {
        self.ensure_available()?;
        if !self.pinned.write().remove(cid) {
            return Err(PinningError::NotFound(cid.to_string()));
        }
        Ok(())
    }

    fn gateway_url(&self, cid: &Cid) -> String {
        format!("{}/{cid}", self.gateway_base.trim_end_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_identical_content_same_cid() {
        let pinning = InMemoryPinning::default();
        let a = pinning.pin_file(b"bill of lading".to_vec(), "a.pdf").await.unwrap();
        let b = pinning.pin_file(b"bill of lading".to_vec(), "b.pdf").await.unwrap();
        let c = pinning.pin_file(b"farm certificate".to_vec(), "c.pdf").await.unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.as_str().starts_with("Qm"));
        assert_eq!(pinning.fetch(&a).await.unwrap(), b"bill of lading".to_vec());
    }

    #[tokio::test]
    async fn test_json_round_trips_through_fetch() {
        let pinning = InMemoryPinning::default();
        let value = json!({"lot": 42, "origin": "Sidama"});
        let cid = pinning.pin_json(&value, Some("lot.json")).await.unwrap();
        let bytes = pinning.fetch(&cid).await.unwrap();
        assert_eq!(serde_json::from_slice::<serde_json::Value>(&bytes).unwrap(), value);
    }

    #[tokio::test]
    async fn test_pin_bookkeeping() {
        let pinning = InMemoryPinning::new("http://localhost:8080/ipfs/");
        let cid = Cid::parse(format!("Qm{}", "d".repeat(44))).unwrap();

        assert!(matches!(pinning.unpin(&cid).await, Err(PinningError::NotFound(_))));
        pinning.pin(&cid).await.unwrap();
        assert!(pinning.is_pinned(&cid));
        // Pinned by hash only; the bytes were never uploaded here.
        assert!(matches!(pinning.fetch(&cid).await, Err(PinningError::NotFound(_))));
        pinning.unpin(&cid).await.unwrap();
        assert!(!pinning.is_pinned(&cid));

        assert_eq!(pinning.gateway_url(&cid), format!("http://localhost:8080/ipfs/{cid}"));
    }

    #[tokio::test]
    async fn test_outage() {
        let pinning = InMemoryPinning::default();
        pinning.set_unavailable(true);
        assert!(matches!(
            pinning.pin_file(b"x".to_vec(), "x").await,
            Err(PinningError::Unavailable(_))
        ));
    }
}
