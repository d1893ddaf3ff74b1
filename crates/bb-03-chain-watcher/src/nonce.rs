//! Central nonce allocation for the signer account.
//!
//! Every broadcast goes through one `NonceManager`, so concurrent workers
//! never pick the same nonce. The counter is seeded lazily from the chain's
//! pending nonce. Nonces whose broadcast provably never reached the node are
//! released and handed out again lowest-first, so a failed send does not
//! leave a gap that would stall every later transaction.

use shared_types::{ChainError, TradeDocumentsContract};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, Default)]
struct NonceState {
    next: Option<u64>,
    released: BTreeSet<u64>,
}

pub struct NonceManager {
    contract: Arc<dyn TradeDocumentsContract>,
    state: Mutex<NonceState>,
}

impl NonceManager {
    pub fn new(contract: Arc<dyn TradeDocumentsContract>) -> Self {
        Self {
            contract,
            state: Mutex::new(NonceState::default()),
        }
    }

    pub async fn allocate(&self) -> Result<u64, ChainError> {
        let mut state = self.state.lock().await;
        if let Some(nonce) = state.released.pop_first() {
            return Ok(nonce);
        }
        let nonce = match state.next {
            Some(next) => next,
            None => self.contract.pending_nonce().await?,
        };
        state.next = Some(nonce + 1);
        Ok(nonce)
    }

    /// Returns a nonce whose transaction never reached the node.
    pub async fn release(&self, nonce: u64) {
        let mut state = self.state.lock().await;
        if state.next.is_some_and(|next| nonce < next) {
            state.released.insert(nonce);
        }
    }

    /// Re-reads the chain's pending nonce. The counter never drops below
    /// `floor`, the first nonce not held by an in-flight record.
    pub async fn resync(&self, floor: u64) -> Result<u64, ChainError> {
        let mut state = self.state.lock().await;
        let chain = self.contract.pending_nonce().await?;
        let next = chain.max(floor);
        debug!(chain, floor, next, "Nonce counter resynchronised");
        state.next = Some(next);
        state.released.clear();
        Ok(next)
    }

    /// The nonce the next allocation would produce, if seeded.
    pub async fn peek(&self) -> Option<u64> {
        let state = self.state.lock().await;
        state.released.first().copied().or(state.next)
    }
}
