//! In-process TradeDocuments chain.
//!
//! Used for local development (`BB_CHAIN_MODE=simulated`) and by every
//! test that needs a chain. Transactions enter a pool keyed by nonce and are
//! mined only in contiguous nonce order, the way a real node behaves. Each
//! record slot keeps its full history so reads can be pinned to a block.
//!
//! Fault injection hooks (`fail_next_sends`, `revert_next_send`,
//! `revert_on_mine`, `drop_next_send`, `lose_next_send_response`,
//! `set_unavailable`) drive the error paths deterministically.

use super::abi;
use async_trait::async_trait;
use parking_lot::Mutex;
use shared_types::{
    Address, ChainError, Cid, ContractCall, DocType, DocumentRecord, EmissionRecord, ProductId,
    ReadAt, TradeDocumentsContract, TxHash, TxReceipt,
};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

/// Hardhat's first development account.
pub const DEFAULT_SIGNER: Address = Address([
    0xf3, 0x9f, 0xd6, 0xe5, 0x1a, 0xad, 0x88, 0xf6, 0xf4, 0xce, 0x6a, 0xb8, 0x82, 0x72, 0x79, 0xcf,
    0xff, 0xb9, 0x22, 0x66,
]);

/// Unix time of block 0.
const GENESIS_TIMESTAMP: u64 = 1_700_000_000;
const BLOCK_TIME_SECS: u64 = 12;

struct PooledTx {
    hash: TxHash,
    call: ContractCall,
    revert: Option<String>,
}

/// Values of one slot, oldest first, tagged with the block that wrote them.
type History<T> = Vec<(u64, T)>;

#[derive(Default)]
struct ChainState {
    head: u64,
    /// Next nonce the chain will mine.
    next_nonce: u64,
    pool: BTreeMap<u64, PooledTx>,
    receipts: HashMap<TxHash, TxReceipt>,
    documents: HashMap<(ProductId, DocType), History<DocumentRecord>>,
    emissions: HashMap<ProductId, History<EmissionRecord>>,
    sends: u64,
    hash_counter: u64,
    unavailable: bool,
    send_faults: VecDeque<ChainError>,
    revert_next_send: Option<String>,
    revert_on_mine: Option<String>,
    drop_next_send: bool,
    lost_response: Option<ChainError>,
}

impl ChainState {
    fn read_height(&self, at: ReadAt) -> u64 {
        match at {
            ReadAt::Latest => self.head,
            ReadAt::Block(number) => number.min(self.head),
        }
    }
}

fn value_at<T: Clone>(history: Option<&History<T>>, height: u64) -> Option<T> {
    history?
        .iter()
        .rev()
        .find(|(block, _)| *block <= height)
        .map(|(_, value)| value.clone())
}

pub struct SimulatedChain {
    signer: Address,
    state: Mutex<ChainState>,
}

impl Default for SimulatedChain {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedChain {
    pub fn new() -> Self {
        Self::with_signer(DEFAULT_SIGNER)
    }

    pub fn with_signer(signer: Address) -> Self {
        Self {
            signer,
            state: Mutex::new(ChainState::default()),
        }
    }

    pub fn head(&self) -> u64 {
        self.state.lock().head
    }

    /// Number of send attempts, including failed ones.
    pub fn send_count(&self) -> u64 {
        self.state.lock().sends
    }

    /// Transactions waiting in the pool.
    pub fn pool_size(&self) -> usize {
        self.state.lock().pool.len()
    }

    /// Mines one block containing every pooled transaction whose nonce is
    /// contiguous with the account's. Returns the new head.
    pub fn mine_block(&self) -> u64 {
        let mut state = self.state.lock();
        state.head += 1;
        let block = state.head;
        let timestamp = GENESIS_TIMESTAMP + block * BLOCK_TIME_SECS;

        let mut included = 0usize;
        loop {
            let nonce = state.next_nonce;
            let Some(tx) = state.pool.remove(&nonce) else {
                break;
            };
            state.next_nonce += 1;
            included += 1;

            let success = tx.revert.is_none();
            if success {
                match tx.call {
                    ContractCall::StoreDocument {
                        product,
                        doc_type,
                        cid,
                    } => {
                        let record = DocumentRecord {
                            cid: cid.as_str().to_string(),
                            uploaded_by: self.signer,
                            timestamp,
                        };
                        state
                            .documents
                            .entry((product, doc_type))
                            .or_default()
                            .push((block, record));
                    }
                    ContractCall::SetCarbonEmission {
                        product,
                        total_emissions,
                        unit,
                    } => {
                        let record = EmissionRecord {
                            total_emissions,
                            unit,
                            reported_by: self.signer,
                            timestamp,
                        };
                        state
                            .emissions
                            .entry(product)
                            .or_default()
                            .push((block, record));
                    }
                }
            }
            state.receipts.insert(
                tx.hash,
                TxReceipt {
                    tx_hash: tx.hash,
                    block_number: block,
                    success,
                    revert_reason: tx.revert,
                },
            );
        }

        debug!(block, included, "Simulated block mined");
        block
    }

    pub fn mine_blocks(&self, count: u64) -> u64 {
        let mut head = self.head();
        for _ in 0..count {
            head = self.mine_block();
        }
        head
    }

    /// The next `count` sends fail with `error` before reaching the pool.
    pub fn fail_next_sends(&self, count: usize, error: ChainError) {
        let mut state = self.state.lock();
        for _ in 0..count {
            state.send_faults.push_back(error.clone());
        }
    }

    /// The next send is rejected by gas estimation with `reason`.
    pub fn revert_next_send(&self, reason: impl Into<String>) {
        self.state.lock().revert_next_send = Some(reason.into());
    }

    /// The next accepted transaction is mined with a failed receipt.
    pub fn revert_on_mine(&self, reason: impl Into<String>) {
        self.state.lock().revert_on_mine = Some(reason.into());
    }

    /// The next send returns a hash but the transaction never reaches the pool.
    pub fn drop_next_send(&self) {
        self.state.lock().drop_next_send = true;
    }

    /// The next send is pooled, but the caller gets `error` instead of the
    /// hash, as when the response to an accepted transaction is lost.
    pub fn lose_next_send_response(&self, error: ChainError) {
        self.state.lock().lost_response = Some(error);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().unavailable = unavailable;
    }

    /// Mines a block every `interval` until `shutdown` flips to true.
    pub fn spawn_auto_miner(
        self: &Arc<Self>,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let chain = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            while !*shutdown.borrow() {
                tokio::select! {
                    _ = ticker.tick() => {
                        chain.mine_block();
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
        })
    }

    fn ensure_available(&self) -> Result<(), ChainError> {
        if self.state.lock().unavailable {
            return Err(ChainError::Unavailable("simulated chain offline".into()));
        }
        Ok(())
    }

    fn send(&self, call: ContractCall, nonce: u64) -> Result<TxHash, ChainError> {
        let mut state = self.state.lock();
        state.sends += 1;
        if state.unavailable {
            return Err(ChainError::Unavailable("simulated chain offline".into()));
        }
        if let Some(error) = state.send_faults.pop_front() {
            return Err(error);
        }
        if let Some(reason) = state.revert_next_send.take() {
            return Err(ChainError::Reverted(reason));
        }
        if nonce < state.next_nonce {
            return Err(ChainError::NonceConflict(format!(
                "nonce too low: next nonce {}, tx nonce {nonce}",
                state.next_nonce
            )));
        }
        if state.pool.contains_key(&nonce) {
            return Err(ChainError::NonceConflict(format!(
                "already known: nonce {nonce}"
            )));
        }

        state.hash_counter += 1;
        let mut preimage = Vec::with_capacity(36);
        preimage.extend_from_slice(&self.signer.0);
        preimage.extend_from_slice(&nonce.to_be_bytes());
        preimage.extend_from_slice(&state.hash_counter.to_be_bytes());
        let hash = TxHash(abi::keccak256(&preimage));

        if std::mem::take(&mut state.drop_next_send) {
            debug!(nonce, tx_hash = %hash, "Simulated send dropped");
            return Ok(hash);
        }

        let revert = state.revert_on_mine.take();
        state.pool.insert(nonce, PooledTx { hash, call, revert });
        debug!(nonce, tx_hash = %hash, "Simulated send pooled");
        if let Some(error) = state.lost_response.take() {
            return Err(error);
        }
        Ok(hash)
    }
}

#[async_trait]
impl TradeDocumentsContract for SimulatedChain {
    async fn verify_interface(&self) -> Result<(), ChainError> {
        self.ensure_available()
    }

    fn signer(&self) -> Address {
        self.signer
    }

    async fn block_number(&self) -> Result<u64, ChainError> {
        self.ensure_available()?;
        Ok(self.head())
    }

    async fn pending_nonce(&self) -> Result<u64, ChainError> {
        self.ensure_available()?;
        let state = self.state.lock();
        let mut nonce = state.next_nonce;
        while state.pool.contains_key(&nonce) {
            nonce += 1;
        }
        Ok(nonce)
    }

    async fn latest_nonce(&self) -> Result<u64, ChainError> {
        self.ensure_available()?;
        Ok(self.state.lock().next_nonce)
    }

    async fn store_document(
        &self,
        product: ProductId,
        doc_type: DocType,
        cid: &Cid,
        nonce: u64,
    ) -> Result<TxHash, ChainError> {
        self.send(
            ContractCall::StoreDocument {
                product,
                doc_type,
                cid: cid.clone(),
            },
            nonce,
        )
    }

    async fn set_carbon_emission(
        &self,
        product: ProductId,
        total_emissions: u64,
        unit: &str,
        nonce: u64,
    ) -> Result<TxHash, ChainError> {
        self.send(
            ContractCall::SetCarbonEmission {
                product,
                total_emissions,
                unit: unit.to_string(),
            },
            nonce,
        )
    }

    async fn transaction_receipt(&self, tx_hash: &TxHash) -> Result<Option<TxReceipt>, ChainError> {
        self.ensure_available()?;
        Ok(self.state.lock().receipts.get(tx_hash).cloned())
    }

    async fn get_document(
        &self,
        product: ProductId,
        doc_type: DocType,
        at: ReadAt,
    ) -> Result<DocumentRecord, ChainError> {
        self.ensure_available()?;
        let state = self.state.lock();
        let height = state.read_height(at);
        value_at(state.documents.get(&(product, doc_type)), height)
            .ok_or_else(|| ChainError::NotFound("Document not found".into()))
    }

    async fn get_carbon_emission(
        &self,
        product: ProductId,
        at: ReadAt,
    ) -> Result<EmissionRecord, ChainError> {
        self.ensure_available()?;
        let state = self.state.lock();
        let height = state.read_height(at);
        value_at(state.emissions.get(&product), height)
            .ok_or_else(|| ChainError::NotFound("Carbon emission data not set".into()))
    }

    async fn is_product_complete(&self, product: ProductId, at: ReadAt) -> Result<bool, ChainError> {
        self.ensure_available()?;
        let state = self.state.lock();
        let height = state.read_height(at);
        Ok(DocType::ALL.iter().all(|doc_type| {
            value_at(state.documents.get(&(product, *doc_type)), height).is_some()
        }))
    }
}
