//! # Read-Repair Cache Service
//!
//! `DashMap` keyed by logical key. Lookups consult the fingerprint store for
//! the key's latest confirmed block; an entry older than that is repaired by
//! reading the contract again.

use crate::domain::{CacheConfig, CacheError, CachedRecord, CachedValue, ProductStatus};
use crate::ports::{CacheStats, ReadApi};
use async_trait::async_trait;
use bb_01_fingerprint_store::FingerprintStore;
use dashmap::DashMap;
use shared_bus::{EventPublisher, LedgerEvent, Subscription};
use shared_types::{
    ChainError, DocType, LogicalKey, ProductId, ReadAt, RecordType, TimeSource,
    TradeDocumentsContract,
};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    invalidations: AtomicU64,
    evictions: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

pub struct ReadRepairCache {
    entries: DashMap<LogicalKey, CachedRecord>,
    store: Arc<dyn FingerprintStore>,
    contract: Arc<dyn TradeDocumentsContract>,
    publisher: Arc<dyn EventPublisher>,
    time: Arc<dyn TimeSource>,
    config: CacheConfig,
    counters: Counters,
}

impl ReadRepairCache {
    pub fn new(
        store: Arc<dyn FingerprintStore>,
        contract: Arc<dyn TradeDocumentsContract>,
        publisher: Arc<dyn EventPublisher>,
        time: Arc<dyn TimeSource>,
        config: CacheConfig,
    ) -> Self {
        Self {
            entries: DashMap::new(),
            store,
            contract,
            publisher,
            time,
            config,
            counters: Counters::default(),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Invalidates keys as their writes are confirmed, until `shutdown`.
    ///
    /// Takes an existing subscription so that no confirmation published
    /// between startup and the first poll is missed.
    pub fn spawn_invalidation(
        self: &Arc<Self>,
        mut subscription: Subscription,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    event = subscription.recv() => match event {
                        Some(LedgerEvent::SubmissionConfirmed { key, block_number, .. }) => {
                            if cache.invalidate(&key) {
                                cache
                                    .publisher
                                    .publish(LedgerEvent::CacheInvalidated { key })
                                    .await;
                            }
                            trace!(key = %key, block = block_number, "Confirmation seen by cache");
                        }
                        Some(_) => {}
                        None => break,
                    },
                }
            }
            debug!("Cache invalidation task stopped");
        })
    }

    fn is_fresh(&self, entry: &CachedRecord, latest_confirmed: Option<u64>) -> bool {
        if latest_confirmed.is_some_and(|block| block > entry.confirmed_at_block) {
            return false;
        }
        match self.config.max_age {
            Some(max_age) => {
                let age = self.time.now().saturating_sub(entry.fetched_at);
                u128::from(age) <= max_age.as_millis()
            }
            None => true,
        }
    }

    /// Highest block that is both deep enough and at or above every floor.
    async fn read_height(&self, floors: &[Option<u64>]) -> Result<u64, CacheError> {
        let head = self.rpc(self.contract.block_number()).await?;
        let safe = (head + 1).saturating_sub(self.config.confirmation_depth);
        Ok(floors.iter().flatten().copied().fold(safe, u64::max))
    }

    async fn fetch(&self, key: &LogicalKey, height: u64) -> Result<CachedValue, CacheError> {
        let at = ReadAt::Block(height);
        let value = match key.record_type {
            RecordType::Document(doc_type) => self
                .rpc(self.contract.get_document(key.entity_id, doc_type, at))
                .await
                .map(CachedValue::Document)?,
            RecordType::CarbonEmission => self
                .rpc(self.contract.get_carbon_emission(key.entity_id, at))
                .await
                .map(CachedValue::CarbonEmission)?,
        };
        Ok(value)
    }

    /// Stores a fetched value unless a concurrent read already cached a
    /// higher block, and returns whichever entry won.
    fn remember(&self, key: &LogicalKey, value: CachedValue, height: u64) -> CachedRecord {
        let fetched = CachedRecord {
            key: *key,
            value,
            confirmed_at_block: height,
            fetched_at: self.time.now(),
        };
        let stored = {
            let mut entry = self
                .entries
                .entry(*key)
                .or_insert_with(|| fetched.clone());
            if entry.confirmed_at_block <= height {
                *entry = fetched;
            }
            entry.clone()
        };
        if self.entries.len() > self.config.max_entries {
            self.evict_oldest(key);
        }
        stored
    }

    fn evict_oldest(&self, keep: &LogicalKey) {
        while self.entries.len() > self.config.max_entries {
            let oldest = self
                .entries
                .iter()
                .filter(|entry| entry.key() != keep)
                .min_by_key(|entry| entry.fetched_at)
                .map(|entry| *entry.key());
            let Some(key) = oldest else {
                break;
            };
            if self.entries.remove(&key).is_some() {
                Counters::bump(&self.counters.evictions);
                debug!(key = %key, "Evicted cache entry");
            }
        }
    }

    async fn rpc<T>(
        &self,
        call: impl Future<Output = Result<T, ChainError>>,
    ) -> Result<T, ChainError> {
        match tokio::time::timeout(self.config.rpc_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(ChainError::Transient(format!(
                "RPC call exceeded {}ms",
                self.config.rpc_timeout.as_millis()
            ))),
        }
    }
}

#[async_trait]
impl ReadApi for ReadRepairCache {
    async fn get(&self, key: &LogicalKey) -> Result<CachedRecord, CacheError> {
        let latest_confirmed = self.store.latest_confirmed_block(key);
        let cached = self.entries.get(key).map(|entry| entry.value().clone());

        if let Some(entry) = &cached {
            if self.is_fresh(entry, latest_confirmed) {
                Counters::bump(&self.counters.hits);
                trace!(key = %key, block = entry.confirmed_at_block, "Cache hit");
                return Ok(entry.clone());
            }
        }
        Counters::bump(&self.counters.misses);

        let previous = cached.map(|entry| entry.confirmed_at_block);
        let height = self.read_height(&[latest_confirmed, previous]).await?;
        let value = self.fetch(key, height).await?;
        let record = self.remember(key, value, height);

        debug!(key = %key, block = record.confirmed_at_block, "Cache repaired from chain");
        Ok(record)
    }

    async fn is_product_complete(&self, product: ProductId) -> Result<ProductStatus, CacheError> {
        let floors: Vec<Option<u64>> = DocType::ALL
            .iter()
            .map(|doc_type| {
                self.store
                    .latest_confirmed_block(&LogicalKey::document(product, *doc_type))
            })
            .collect();
        let height = self.read_height(&floors).await?;
        let is_complete = self
            .rpc(self.contract.is_product_complete(product, ReadAt::Block(height)))
            .await?;

        Ok(ProductStatus {
            product_id: product,
            is_complete,
            at_block: height,
        })
    }

    fn invalidate(&self, key: &LogicalKey) -> bool {
        let removed = self.entries.remove(key).is_some();
        if removed {
            Counters::bump(&self.counters.invalidations);
            debug!(key = %key, "Cache entry invalidated");
        }
        removed
    }

    fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            invalidations: self.counters.invalidations.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bb_01_fingerprint_store::InMemoryFingerprintStore;
    use bb_05_chain_adapters::SimulatedChain;
    use shared_bus::{EventFilter, EventTopic, InMemoryEventBus};
    use shared_types::{
        Cid, IdempotencyToken, ManualTimeSource, RequestId, SubmissionRecord, SubmissionStatus,
        WriteRequest,
    };
    use std::time::Duration;

    struct Harness {
        cache: Arc<ReadRepairCache>,
        store: Arc<InMemoryFingerprintStore>,
        chain: Arc<SimulatedChain>,
        bus: Arc<InMemoryEventBus>,
        time: Arc<ManualTimeSource>,
    }

    fn harness(config: CacheConfig) -> Harness {
        let store = Arc::new(InMemoryFingerprintStore::default());
        let chain = Arc::new(SimulatedChain::new());
        let bus = Arc::new(InMemoryEventBus::new());
        let time = Arc::new(ManualTimeSource::new(1_000));
        let cache = Arc::new(ReadRepairCache::new(
            store.clone(),
            chain.clone(),
            bus.clone(),
            time.clone(),
            config,
        ));
        Harness {
            cache,
            store,
            chain,
            bus,
            time,
        }
    }

    fn product(id: u64) -> ProductId {
        ProductId::new(id).unwrap()
    }

    fn emission_key(id: u64) -> LogicalKey {
        LogicalKey::carbon_emission(product(id))
    }

    fn total(record: &CachedRecord) -> u64 {
        match &record.value {
            CachedValue::CarbonEmission(emission) => emission.total_emissions,
            other => panic!("expected an emission, got {other:?}"),
        }
    }

    impl Harness {
        async fn write_emission(&self, id: u64, total: u64, nonce: u64) {
            self.chain
                .set_carbon_emission(product(id), total, "kgCO2e", nonce)
                .await
                .unwrap();
        }

        /// Records a Confirmed write for `key` the way the watcher would.
        fn confirm_in_store(&self, key: LogicalKey, token: &str, block: u64) {
            let request = WriteRequest::set_carbon_emission(
                key.entity_id,
                1,
                "kgCO2e",
                IdempotencyToken::new(token).unwrap(),
                0,
            );
            let mut record = SubmissionRecord::pending(RequestId::new(), &request, 0);
            record.status = SubmissionStatus::Confirmed;
            record.confirmed_at_block = Some(block);
            self.store.put(record).unwrap();
        }
    }

    #[tokio::test]
    async fn test_miss_then_hit() {
        let h = harness(CacheConfig::for_testing());
        h.write_emission(1, 1500, 0).await;
        h.chain.mine_block();

        let first = h.cache.get(&emission_key(1)).await.unwrap();
        assert_eq!(total(&first), 1500);
        assert_eq!(first.confirmed_at_block, 1);

        let second = h.cache.get(&emission_key(1)).await.unwrap();
        assert_eq!(second, first);

        let stats = h.cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.entries), (1, 1, 1));
    }

    #[tokio::test]
    async fn test_unconfirmed_write_is_invisible() {
        let h = harness(CacheConfig {
            confirmation_depth: 2,
            ..CacheConfig::for_testing()
        });
        h.write_emission(1, 1500, 0).await;
        h.chain.mine_block();

        assert_eq!(
            h.cache.get(&emission_key(1)).await,
            Err(CacheError::NotFound("Carbon emission data not set".into()))
        );
        assert!(h.cache.is_empty());

        h.chain.mine_block();
        let record = h.cache.get(&emission_key(1)).await.unwrap();
        assert_eq!(record.confirmed_at_block, 1);
    }

    #[tokio::test]
    async fn test_newer_confirmation_repairs_entry() {
        let h = harness(CacheConfig::for_testing());
        h.write_emission(4, 100, 0).await;
        h.chain.mine_block();
        assert_eq!(total(&h.cache.get(&emission_key(4)).await.unwrap()), 100);

        h.write_emission(4, 250, 1).await;
        h.chain.mine_block();
        h.confirm_in_store(emission_key(4), "emission-4", 2);

        let repaired = h.cache.get(&emission_key(4)).await.unwrap();
        assert_eq!(total(&repaired), 250);
        assert!(repaired.confirmed_at_block >= 2);
        assert_eq!(h.cache.stats().misses, 2);
    }

    #[tokio::test]
    async fn test_bus_confirmation_invalidates() {
        let h = harness(CacheConfig::for_testing());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut cache_events = h.bus.subscribe(EventFilter::topics(vec![EventTopic::Cache]));
        let task = h.cache.spawn_invalidation(
            h.bus.subscribe(EventFilter::topics(vec![EventTopic::Watcher])),
            shutdown_rx,
        );

        h.write_emission(2, 700, 0).await;
        h.chain.mine_block();
        h.cache.get(&emission_key(2)).await.unwrap();

        h.bus
            .publish(LedgerEvent::SubmissionConfirmed {
                request_id: RequestId::new(),
                key: emission_key(2),
                tx_hash: None,
                block_number: 1,
            })
            .await;

        let event = tokio::time::timeout(Duration::from_secs(5), cache_events.recv())
            .await
            .unwrap();
        assert_eq!(
            event,
            Some(LedgerEvent::CacheInvalidated {
                key: emission_key(2)
            })
        );
        assert!(h.cache.is_empty());
        assert_eq!(h.cache.stats().invalidations, 1);

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_max_age_expires_entries() {
        let h = harness(CacheConfig {
            max_age: Some(Duration::from_secs(1)),
            ..CacheConfig::for_testing()
        });
        h.write_emission(1, 10, 0).await;
        h.chain.mine_block();

        h.cache.get(&emission_key(1)).await.unwrap();
        h.time.advance(500);
        h.cache.get(&emission_key(1)).await.unwrap();
        assert_eq!(h.cache.stats().hits, 1);

        h.time.advance(1_000);
        h.cache.get(&emission_key(1)).await.unwrap();
        assert_eq!(h.cache.stats().misses, 2);
    }

    #[tokio::test]
    async fn test_evicts_oldest_fetch() {
        let h = harness(CacheConfig {
            max_entries: 2,
            ..CacheConfig::for_testing()
        });
        for id in 1..=3 {
            h.write_emission(id, id * 10, id - 1).await;
        }
        h.chain.mine_block();

        for id in 1..=3 {
            h.cache.get(&emission_key(id)).await.unwrap();
            h.time.advance(10);
        }

        let stats = h.cache.stats();
        assert_eq!((stats.entries, stats.evictions), (2, 1));
        h.cache.get(&emission_key(2)).await.unwrap();
        assert_eq!(h.cache.stats().hits, 1);
        h.cache.get(&emission_key(1)).await.unwrap();
        assert_eq!(h.cache.stats().misses, 4);
    }

    #[tokio::test]
    async fn test_confirmed_block_never_decreases() {
        let h = harness(CacheConfig::for_testing());
        let key = emission_key(9);
        let mut last_block = 0;

        for round in 0..5u64 {
            h.write_emission(9, 100 + round, round).await;
            h.chain.mine_block();
            if round % 2 == 0 {
                h.confirm_in_store(key, &format!("round-{round}"), h.chain.head());
            }
            let record = h.cache.get(&key).await.unwrap();
            assert!(record.confirmed_at_block >= last_block);
            last_block = record.confirmed_at_block;
        }
        assert_eq!(last_block, 5);
    }

    #[tokio::test]
    async fn test_product_complete_at_confirmed_height() {
        let h = harness(CacheConfig {
            confirmation_depth: 2,
            ..CacheConfig::for_testing()
        });
        let cid = Cid::parse(format!("Qm{}", "e".repeat(44))).unwrap();
        for (nonce, doc_type) in DocType::ALL.iter().enumerate() {
            h.chain
                .store_document(product(3), *doc_type, &cid, nonce as u64)
                .await
                .unwrap();
        }
        h.chain.mine_block();

        let status = h.cache.is_product_complete(product(3)).await.unwrap();
        assert!(!status.is_complete);
        assert_eq!(status.at_block, 0);

        h.chain.mine_block();
        let status = h.cache.is_product_complete(product(3)).await.unwrap();
        assert!(status.is_complete);
        assert_eq!(status.at_block, 1);
    }

    #[tokio::test]
    async fn test_chain_errors_are_not_cached() {
        let h = harness(CacheConfig::for_testing());
        h.chain.set_unavailable(true);
        assert!(matches!(
            h.cache.get(&emission_key(1)).await,
            Err(CacheError::Chain(ChainError::Unavailable(_)))
        ));
        assert!(h.cache.is_empty());
    }
}
