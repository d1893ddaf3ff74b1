//! # Node Configuration
//!
//! Unified configuration for all subsystems and runtime parameters.
//! Every field has a default suitable for a local run against the simulated
//! chain; environment variables override them.
//!
//! ## Production Requirements
//!
//! With `NODE_ENV=production`, `RPC_URL`, `CONTRACT_ADDRESS`, `SIGNER_ADDRESS`
//! and `PINATA_JWT` MUST be set explicitly, and neither adapter may be the
//! in-process one.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use bb_01_fingerprint_store::StoreConfig;
use bb_02_submission_queue::QueueConfig;
use bb_03_chain_watcher::WatcherConfig;
use bb_04_read_cache::CacheConfig;
use bb_06_api_gateway::{CorsConfig, GatewayConfig};
use shared_types::Address;

/// Local Hardhat node.
pub const DEFAULT_RPC_URL: &str = "http://localhost:8545";

/// First contract deployed by Hardhat account 0.
pub const DEFAULT_CONTRACT_ADDRESS: &str = "0x5FbDB2315678afecb367f032d93F642f64180aa3";

/// Hardhat account 0.
pub const DEFAULT_SIGNER_ADDRESS: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";

const DEFAULT_CORS_ORIGINS: &str = "http://localhost:5173,http://localhost:3000";

/// Complete node configuration.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub environment: Environment,
    /// `EnvFilter` directive for the log subscriber.
    pub log_level: String,
    pub gateway: GatewayConfig,
    pub chain: ChainSettings,
    pub pinning: PinningSettings,
    pub store: StoreConfig,
    pub queue: QueueConfig,
    pub watcher: WatcherConfig,
    pub cache: CacheConfig,
    pub persistence: PersistenceConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Development,
            log_level: "info".to_string(),
            gateway: GatewayConfig {
                cors: CorsConfig::with_origins(DEFAULT_CORS_ORIGINS),
                ..GatewayConfig::default()
            },
            chain: ChainSettings::default(),
            pinning: PinningSettings::default(),
            store: StoreConfig::default(),
            queue: QueueConfig::default(),
            watcher: WatcherConfig::default(),
            cache: CacheConfig::default(),
            persistence: PersistenceConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "test" => Ok(Self::Test),
            "production" | "prod" => Ok(Self::Production),
            other => Err(ConfigError::Invalid {
                var: "NODE_ENV",
                reason: format!("unknown environment {other:?}"),
            }),
        }
    }
}

/// Which contract adapter the node runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainMode {
    /// In-process chain with its own block producer.
    Simulated,
    /// Ethereum JSON-RPC node with a node-managed signer.
    Rpc,
}

impl FromStr for ChainMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "simulated" | "sim" => Ok(Self::Simulated),
            "rpc" | "json-rpc" => Ok(Self::Rpc),
            other => Err(ConfigError::Invalid {
                var: "BB_CHAIN_MODE",
                reason: format!("expected simulated or rpc, got {other:?}"),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinningMode {
    Memory,
    Pinata,
}

impl FromStr for PinningMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "in-memory" => Ok(Self::Memory),
            "pinata" => Ok(Self::Pinata),
            other => Err(ConfigError::Invalid {
                var: "BB_PINNING_MODE",
                reason: format!("expected memory or pinata, got {other:?}"),
            }),
        }
    }
}

/// Chain adapter settings. Unset optional values fall back to the local
/// Hardhat defaults when used.
#[derive(Debug, Clone)]
pub struct ChainSettings {
    pub mode: ChainMode,
    pub rpc_url: Option<String>,
    pub chain_id: Option<u64>,
    pub contract_address: Option<Address>,
    pub signer: Option<Address>,
    /// Block interval of the simulated chain.
    pub sim_block_interval: Duration,
}

impl Default for ChainSettings {
    fn default() -> Self {
        Self {
            mode: ChainMode::Simulated,
            rpc_url: None,
            chain_id: None,
            contract_address: None,
            signer: None,
            sim_block_interval: Duration::from_millis(2_000),
        }
    }
}

impl ChainSettings {
    pub fn rpc_url(&self) -> &str {
        self.rpc_url.as_deref().unwrap_or(DEFAULT_RPC_URL)
    }

    pub fn contract_address(&self) -> Result<Address, ConfigError> {
        match self.contract_address {
            Some(address) => Ok(address),
            None => parse_address("CONTRACT_ADDRESS", DEFAULT_CONTRACT_ADDRESS),
        }
    }

    pub fn signer(&self) -> Result<Address, ConfigError> {
        match self.signer {
            Some(address) => Ok(address),
            None => parse_address("SIGNER_ADDRESS", DEFAULT_SIGNER_ADDRESS),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PinningSettings {
    pub mode: Option<PinningMode>,
    pub jwt: Option<String>,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
}

impl PinningSettings {
    /// Explicit mode, else Pinata when a JWT is configured.
    pub fn effective_mode(&self) -> PinningMode {
        match (self.mode, &self.jwt) {
            (Some(mode), _) => mode,
            (None, Some(_)) => PinningMode::Pinata,
            (None, None) => PinningMode::Memory,
        }
    }
}

/// Fingerprint store persistence.
#[derive(Debug, Clone)]
pub struct PersistenceConfig {
    /// Snapshot file. `None` keeps the store in memory only.
    pub snapshot_path: Option<PathBuf>,
    pub snapshot_interval: Duration,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            snapshot_path: None,
            snapshot_interval: Duration::from_secs(10),
        }
    }
}

impl NodeConfig {
    /// Defaults overridden from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Defaults overridden from `lookup`. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let mut config = Self::default();

        if let Some(value) = get("NODE_ENV") {
            config.environment = value.parse()?;
        }
        if let Some(value) = get("LOG_LEVEL").or_else(|| get("RUST_LOG")) {
            config.log_level = value;
        }

        // HTTP
        if let Some(value) = get("PORT") {
            config.gateway.port = parse_number("PORT", &value)?;
        }
        if let Some(value) = get("CORS_ORIGIN") {
            config.gateway.cors = CorsConfig::with_origins(&value);
        }

        // Chain
        if let Some(value) = get("BB_CHAIN_MODE") {
            config.chain.mode = value.parse()?;
        }
        config.chain.rpc_url = get("RPC_URL");
        if let Some(value) = get("CHAIN_ID") {
            config.chain.chain_id = Some(parse_number("CHAIN_ID", &value)?);
        }
        if let Some(value) = get("CONTRACT_ADDRESS") {
            config.chain.contract_address = Some(parse_address("CONTRACT_ADDRESS", &value)?);
        }
        if let Some(value) = get("SIGNER_ADDRESS") {
            config.chain.signer = Some(parse_address("SIGNER_ADDRESS", &value)?);
        }
        if let Some(value) = get("BB_SIM_BLOCK_INTERVAL_MS") {
            config.chain.sim_block_interval =
                Duration::from_millis(parse_number("BB_SIM_BLOCK_INTERVAL_MS", &value)?);
        }

        // Pinning
        if let Some(value) = get("BB_PINNING_MODE") {
            config.pinning.mode = Some(value.parse()?);
        }
        config.pinning.jwt = get("PINATA_JWT");
        config.pinning.api_key = get("PINATA_API_KEY");
        config.pinning.api_secret = get("PINATA_API_SECRET");

        // Confirmation tracking. The cache reads at the same depth the
        // watcher confirms at.
        if let Some(value) = get("BB_CONFIRMATION_DEPTH") {
            let depth = parse_number("BB_CONFIRMATION_DEPTH", &value)?;
            config.watcher.confirmation_depth = depth;
            config.cache.confirmation_depth = depth;
        }
        if let Some(value) = get("BB_CONFIRMATION_TIMEOUT_SECS") {
            config.watcher.confirmation_timeout =
                Duration::from_secs(parse_number("BB_CONFIRMATION_TIMEOUT_SECS", &value)?);
        }
        if let Some(value) = get("BB_MAX_RETRIES") {
            config.watcher.max_retries = parse_number("BB_MAX_RETRIES", &value)?;
        }
        if let Some(value) = get("BB_WORKERS") {
            config.watcher.workers = parse_number("BB_WORKERS", &value)?;
        }

        config.persistence.snapshot_path = get("BB_SNAPSHOT_PATH").map(PathBuf::from);

        Ok(config)
    }

    /// Structural checks that apply in every environment.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.gateway
            .validate()
            .map_err(|e| ConfigError::Subsystem(e.to_string()))?;
        self.watcher
            .validate()
            .map_err(|e| ConfigError::Subsystem(e.to_string()))?;
        self.cache
            .validate()
            .map_err(|e| ConfigError::Subsystem(e.to_string()))?;
        if self.queue.max_queue_depth == 0 {
            return Err(ConfigError::Subsystem(
                "max_queue_depth must be at least 1".into(),
            ));
        }
        if self.chain.mode == ChainMode::Simulated && self.chain.sim_block_interval.is_zero() {
            return Err(ConfigError::Invalid {
                var: "BB_SIM_BLOCK_INTERVAL_MS",
                reason: "must be positive".into(),
            });
        }
        if self.pinning.effective_mode() == PinningMode::Pinata && self.pinning.jwt.is_none() {
            return Err(ConfigError::Missing(vec!["PINATA_JWT"]));
        }
        Ok(())
    }

    /// Production readiness.
    ///
    /// # Returns
    ///
    /// Returns `Err` if:
    /// - any of `RPC_URL`, `CONTRACT_ADDRESS`, `SIGNER_ADDRESS`, `PINATA_JWT` was not set
    /// - the simulated chain or the in-memory pinning store is selected
    pub fn validate_for_production(&self) -> Result<(), ConfigError> {
        if self.environment != Environment::Production {
            return Ok(());
        }

        let mut missing = Vec::new();
        if self.chain.rpc_url.is_none() {
            missing.push("RPC_URL");
        }
        if self.chain.contract_address.is_none() {
            missing.push("CONTRACT_ADDRESS");
        }
        if self.chain.signer.is_none() {
            missing.push("SIGNER_ADDRESS");
        }
        if self.pinning.jwt.is_none() {
            missing.push("PINATA_JWT");
        }
        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing));
        }

        if self.chain.mode == ChainMode::Simulated {
            return Err(ConfigError::Invalid {
                var: "BB_CHAIN_MODE",
                reason: "the simulated chain cannot run in production".into(),
            });
        }
        if self.pinning.effective_mode() == PinningMode::Memory {
            return Err(ConfigError::Invalid {
                var: "BB_PINNING_MODE",
                reason: "in-memory pinning cannot run in production".into(),
            });
        }
        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variables: {}", .0.join(", "))]
    Missing(Vec<&'static str>),

    #[error("invalid {var}: {reason}")]
    Invalid { var: &'static str, reason: String },

    #[error("invalid subsystem configuration: {0}")]
    Subsystem(String),
}

fn parse_number<T: FromStr>(var: &'static str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::Invalid {
        var,
        reason: format!("{value:?} is not a valid number"),
    })
}

fn parse_address(var: &'static str, value: &str) -> Result<Address, ConfigError> {
    value.parse().map_err(|_| ConfigError::Invalid {
        var,
        reason: format!("{value:?} is not a 20-byte hex address"),
    })
}
