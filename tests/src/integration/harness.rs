//! A fully wired ledger for tests.
//!
//! Mirrors the node container without the HTTP layer: one store, one queue,
//! one watcher and one cache sharing an event bus and a simulated chain.

use std::sync::Arc;
use std::time::Duration;

use bb_01_fingerprint_store::{FingerprintStore, InMemoryFingerprintStore};
use bb_02_submission_queue::{QueueConfig, SubmissionApi, SubmissionQueue};
use bb_03_chain_watcher::{ChainWatcher, WatcherConfig};
use bb_04_read_cache::{CacheConfig, ReadRepairCache};
use bb_05_chain_adapters::SimulatedChain;
use shared_bus::{EventFilter, EventTopic, InMemoryEventBus};
use shared_types::{
    Cid, DocType, IdempotencyToken, ProductId, RequestId, SubmissionRecord, SystemTimeSource,
    TimeSource, WriteRequest,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// How long a test waits for background progress.
pub const TEST_WAIT: Duration = Duration::from_secs(10);

pub struct Ledger {
    pub store: Arc<InMemoryFingerprintStore>,
    pub queue: Arc<SubmissionQueue>,
    pub watcher: Arc<ChainWatcher>,
    pub cache: Arc<ReadRepairCache>,
    pub chain: Arc<SimulatedChain>,
    pub bus: Arc<InMemoryEventBus>,
    pub time: Arc<dyn TimeSource>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Ledger {
    /// A ledger with nothing running in the background. Tests drive the
    /// watcher and mine blocks by hand.
    pub fn manual(config: WatcherConfig) -> Self {
        Self::with_store(InMemoryFingerprintStore::default(), config)
    }

    /// Builds on an existing store, as a restarted node would.
    pub fn with_store(store: InMemoryFingerprintStore, config: WatcherConfig) -> Self {
        let store = Arc::new(store);
        let bus = Arc::new(InMemoryEventBus::new());
        let time: Arc<dyn TimeSource> = Arc::new(SystemTimeSource);
        let chain = Arc::new(SimulatedChain::new());
        let queue = Arc::new(SubmissionQueue::new(
            store.clone(),
            bus.clone(),
            time.clone(),
            QueueConfig::default(),
        ));
        let cache = Arc::new(ReadRepairCache::new(
            store.clone(),
            chain.clone(),
            bus.clone(),
            time.clone(),
            CacheConfig {
                confirmation_depth: config.confirmation_depth,
                ..CacheConfig::default()
            },
        ));
        let watcher = Arc::new(ChainWatcher::new(
            queue.clone(),
            chain.clone(),
            bus.clone(),
            time.clone(),
            config,
        ));
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            store,
            queue,
            watcher,
            cache,
            chain,
            bus,
            time,
            shutdown_tx,
            tasks: Vec::new(),
        }
    }

    /// A ledger with watcher workers, cache invalidation and a block
    /// producer running.
    pub fn running(config: WatcherConfig, block_interval: Duration) -> Self {
        let mut ledger = Self::manual(config);
        let shutdown = ledger.shutdown_tx.subscribe();
        let mut tasks = ledger.watcher.spawn_workers(shutdown.clone());
        let confirmations = ledger
            .bus
            .subscribe(EventFilter::topics(vec![EventTopic::Watcher]));
        tasks.push(
            ledger
                .cache
                .spawn_invalidation(confirmations, shutdown.clone()),
        );
        tasks.push(ledger.chain.spawn_auto_miner(block_interval, shutdown));
        ledger.tasks = tasks;
        ledger
    }

    pub async fn stop(mut self) {
        let _ = self.shutdown_tx.send(true);
        for task in self.tasks.drain(..) {
            let _ = tokio::time::timeout(TEST_WAIT, task).await;
        }
    }

    pub fn record(&self, id: &RequestId) -> SubmissionRecord {
        self.store.get(id).expect("record exists")
    }

    /// Waits until `id` is Confirmed or Failed.
    pub async fn wait_terminal(&self, id: &RequestId) -> SubmissionRecord {
        let deadline = tokio::time::Instant::now() + TEST_WAIT;
        loop {
            let record = self.queue.status(id).expect("record exists");
            if record.status.is_terminal() {
                return record;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "request {id} stuck in {}",
                record.status
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

pub fn product(id: u64) -> ProductId {
    ProductId::new(id).expect("valid product id")
}

pub fn token(value: &str) -> IdempotencyToken {
    IdempotencyToken::new(value).expect("valid token")
}

/// A CIDv0 that differs per `seed`.
pub fn cid(seed: char) -> Cid {
    Cid::parse(format!("Qm{}", seed.to_string().repeat(44))).expect("valid cid")
}

pub fn document(product_id: u64, doc_type: DocType, cid: Cid, token_value: &str) -> WriteRequest {
    WriteRequest::store_document(product(product_id), doc_type, cid, token(token_value), 0)
}

pub fn emission(product_id: u64, total: u64, token_value: &str) -> WriteRequest {
    WriteRequest::set_carbon_emission(product(product_id), total, "kgCO2e", token(token_value), 0)
}
