//! # Subsystem Container
//!
//! Holds all subsystem instances, each constructed exactly once.
//!
//! ## Initialization Order
//!
//! ```text
//! Level 0: Event bus, clock, chain adapter, pinning adapter
//! Level 1: Fingerprint Store (restored from its snapshot when present)
//! Level 2: Submission Queue (store)
//! Level 3: Chain Watcher (queue, chain), Read-Repair Cache (store, chain)
//! ```
//!
//! Everything is shared through `Arc`; the subsystems guard their own state.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use bb_01_fingerprint_store::{
    FingerprintStore, InMemoryFingerprintStore, SnapshotFile, StoreError,
};
use bb_02_submission_queue::SubmissionQueue;
use bb_03_chain_watcher::ChainWatcher;
use bb_04_read_cache::ReadRepairCache;
use bb_05_chain_adapters::{
    InMemoryPinning, JsonRpcConfig, JsonRpcContract, PinataClient, PinataConfig, SimulatedChain,
};
use shared_bus::{EventPublisher, InMemoryEventBus};
use shared_types::{PinningService, SystemTimeSource, TimeSource, TradeDocumentsContract};

use crate::container::config::{ChainMode, ConfigError, NodeConfig, PinningMode};

/// Errors raised while building the container.
#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to restore the fingerprint store: {0}")]
    Restore(#[from] StoreError),
}

/// Central container holding all subsystem instances.
pub struct SubsystemContainer {
    // =========================================================================
    // SHARED INFRASTRUCTURE
    // =========================================================================
    pub event_bus: Arc<InMemoryEventBus>,
    pub time: Arc<dyn TimeSource>,
    pub contract: Arc<dyn TradeDocumentsContract>,
    /// Set when the node runs against the in-process chain.
    pub simulated_chain: Option<Arc<SimulatedChain>>,
    pub pinning: Arc<dyn PinningService>,

    // =========================================================================
    // SUBSYSTEMS
    // =========================================================================
    /// Fingerprint Store (Subsystem 1)
    pub store: Arc<InMemoryFingerprintStore>,
    pub snapshot_file: Option<SnapshotFile>,

    /// Submission Queue (Subsystem 2)
    pub queue: Arc<SubmissionQueue>,

    /// Chain Watcher (Subsystem 3)
    pub watcher: Arc<ChainWatcher>,

    /// Read-Repair Cache (Subsystem 4)
    pub cache: Arc<ReadRepairCache>,

    /// Node configuration (immutable after initialization).
    pub config: NodeConfig,
}

impl SubsystemContainer {
    /// Build every subsystem in dependency order.
    #[instrument(name = "subsystem_init", skip(config))]
    pub fn new(config: NodeConfig) -> Result<Self, ContainerError> {
        info!("Initializing BeanBlock subsystem container");

        let event_bus = Arc::new(InMemoryEventBus::new());
        let time: Arc<dyn TimeSource> = Arc::new(SystemTimeSource);
        let publisher: Arc<dyn EventPublisher> = event_bus.clone();

        let (contract, simulated_chain) = Self::init_chain(&config)?;
        let pinning = Self::init_pinning(&config);

        let snapshot_file = config
            .persistence
            .snapshot_path
            .as_ref()
            .map(SnapshotFile::new);
        let store = Arc::new(Self::init_store(&config, snapshot_file.as_ref())?);
        let store_port: Arc<dyn FingerprintStore> = store.clone();
        info!("  [1] Fingerprint Store initialized ({} records)", store.stats().records);

        let queue = Arc::new(SubmissionQueue::new(
            Arc::clone(&store_port),
            Arc::clone(&publisher),
            Arc::clone(&time),
            config.queue.clone(),
        ));
        info!(
            "  [2] Submission Queue initialized (max depth {})",
            config.queue.max_queue_depth
        );

        let watcher = Arc::new(ChainWatcher::new(
            Arc::clone(&queue),
            Arc::clone(&contract),
            Arc::clone(&publisher),
            Arc::clone(&time),
            config.watcher.clone(),
        ));
        info!(
            "  [3] Chain Watcher initialized (depth {}, {} workers)",
            config.watcher.confirmation_depth, config.watcher.workers
        );

        let cache = Arc::new(ReadRepairCache::new(
            store_port,
            Arc::clone(&contract),
            publisher,
            Arc::clone(&time),
            config.cache.clone(),
        ));
        info!("  [4] Read-Repair Cache initialized");

        Ok(Self {
            event_bus,
            time,
            contract,
            simulated_chain,
            pinning,
            store,
            snapshot_file,
            queue,
            watcher,
            cache,
            config,
        })
    }

    /// Write the current store contents to the snapshot file, if one is
    /// configured.
    pub fn persist_snapshot(&self) -> Result<(), StoreError> {
        if let Some(file) = &self.snapshot_file {
            file.save(&self.store.snapshot(), self.time.now())?;
        }
        Ok(())
    }

    // =========================================================================
    // SUBSYSTEM INITIALIZATION METHODS
    // =========================================================================

    #[allow(clippy::type_complexity)]
    fn init_chain(
        config: &NodeConfig,
    ) -> Result<(Arc<dyn TradeDocumentsContract>, Option<Arc<SimulatedChain>>), ConfigError> {
        match config.chain.mode {
            ChainMode::Simulated => {
                let chain = Arc::new(SimulatedChain::new());
                info!(
                    "  [5] Simulated chain (block every {:?})",
                    config.chain.sim_block_interval
                );
                let contract: Arc<dyn TradeDocumentsContract> = chain.clone();
                Ok((contract, Some(chain)))
            }
            ChainMode::Rpc => {
                let mut rpc = JsonRpcConfig::new(
                    config.chain.rpc_url(),
                    config.chain.contract_address()?,
                    config.chain.signer()?,
                );
                rpc.chain_id = config.chain.chain_id;
                rpc.request_timeout = config.watcher.rpc_timeout;
                info!(
                    "  [5] JSON-RPC chain at {} (contract {})",
                    rpc.rpc_url, rpc.contract_address
                );
                Ok((Arc::new(JsonRpcContract::new(rpc)), None))
            }
        }
    }

    fn init_pinning(config: &NodeConfig) -> Arc<dyn PinningService> {
        match config.pinning.effective_mode() {
            PinningMode::Memory => {
                info!("  [5] In-memory pinning");
                Arc::new(InMemoryPinning::default())
            }
            PinningMode::Pinata => {
                info!("  [5] Pinata pinning");
                Arc::new(PinataClient::new(PinataConfig {
                    jwt: config.pinning.jwt.clone(),
                    api_key: config.pinning.api_key.clone(),
                    api_secret: config.pinning.api_secret.clone(),
                    ..PinataConfig::default()
                }))
            }
        }
    }

    fn init_store(
        config: &NodeConfig,
        snapshot_file: Option<&SnapshotFile>,
    ) -> Result<InMemoryFingerprintStore, StoreError> {
        let Some(file) = snapshot_file else {
            return Ok(InMemoryFingerprintStore::new(config.store.clone()));
        };
        match file.load()? {
            Some((saved_at, snapshot)) => {
                info!(saved_at, "Restoring fingerprint store from snapshot");
                Ok(InMemoryFingerprintStore::from_snapshot(
                    snapshot,
                    config.store.clone(),
                ))
            }
            None => {
                warn!("No fingerprint store snapshot found, starting empty");
                Ok(InMemoryFingerprintStore::new(config.store.clone()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::config::PersistenceConfig;

    #[test]
    fn test_default_container_uses_in_process_adapters() {
        let container = SubsystemContainer::new(NodeConfig::default()).unwrap();
        assert!(container.simulated_chain.is_some());
        assert!(container.snapshot_file.is_none());
        assert_eq!(container.store.stats().records, 0);
        assert!(container.persist_snapshot().is_ok());
    }

    #[test]
    fn test_rpc_mode_builds_json_rpc_adapter() {
        let mut config = NodeConfig::default();
        config.chain.mode = ChainMode::Rpc;
        let container = SubsystemContainer::new(config).unwrap();
        assert!(container.simulated_chain.is_none());
    }

    #[test]
    fn test_missing_snapshot_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let config = NodeConfig {
            persistence: PersistenceConfig {
                snapshot_path: Some(dir.path().join("store.json")),
                ..PersistenceConfig::default()
            },
            ..NodeConfig::default()
        };
        let container = SubsystemContainer::new(config).unwrap();
        assert!(container.snapshot_file.is_some());
        assert_eq!(container.store.stats().records, 0);
        container.persist_snapshot().unwrap();
        assert!(dir.path().join("store.json").exists());
    }
}
