//! # Node Runtime
//!
//! Owns the subsystem container and every background task.
//!
//! ## Startup Sequence
//!
//! 1. Verify the contract interface (fail fast on a wrong address or network)
//! 2. Recover in-flight submissions left by the previous run
//! 3. Start watcher workers, the reconciler and cache invalidation
//! 4. Start snapshot persistence and, on the simulated chain, block production
//! 5. Bind the HTTP API
//!
//! ## Shutdown Sequence
//!
//! 1. Signal shutdown to every task
//! 2. Wait for tasks to drain (bounded)
//! 3. Write a final store snapshot

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use bb_06_api_gateway::{build_router, serve, AppState};
use shared_bus::{EventFilter, EventTopic};

use crate::container::{ContainerError, NodeConfig, SubsystemContainer};

/// How long shutdown waits for background tasks.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// The main node runtime orchestrating all subsystems.
pub struct NodeRuntime {
    container: Arc<SubsystemContainer>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl NodeRuntime {
    pub fn new(config: NodeConfig) -> Result<Self, ContainerError> {
        info!("Creating BeanBlock node runtime");
        let container = Arc::new(SubsystemContainer::new(config)?);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Ok(Self {
            container,
            tasks: Mutex::new(Vec::new()),
            shutdown_tx,
            shutdown_rx,
        })
    }

    /// Start every task and the HTTP API. Returns the bound address.
    pub async fn start(&self) -> Result<SocketAddr> {
        info!("===========================================");
        info!("  BeanBlock Ledger Coordinator v{}", env!("CARGO_PKG_VERSION"));
        info!("===========================================");

        let container = &self.container;
        let config = &container.config;

        // Step 1: the contract must answer before anything is broadcast.
        let rpc_timeout = config.watcher.rpc_timeout;
        tokio::time::timeout(rpc_timeout, container.contract.verify_interface())
            .await
            .context("contract interface check timed out")?
            .context("contract interface check failed")?;
        info!(signer = %container.contract.signer(), "Contract interface verified");

        // Step 2
        let report = container
            .watcher
            .recover()
            .await
            .context("recovering in-flight submissions")?;
        if !report.orphaned.is_empty() {
            warn!(
                orphaned = report.orphaned.len(),
                "Submissions with an unknown broadcast outcome were failed as timed out"
            );
        }

        // Step 3
        let mut tasks = container.watcher.spawn_workers(self.shutdown_rx.clone());
        tasks.push(container.watcher.spawn_reconciler(self.shutdown_rx.clone()));
        let confirmations = container
            .event_bus
            .subscribe(EventFilter::topics(vec![EventTopic::Watcher]));
        tasks.push(
            container
                .cache
                .spawn_invalidation(confirmations, self.shutdown_rx.clone()),
        );

        // Step 4
        if container.snapshot_file.is_some() {
            tasks.push(self.spawn_snapshot_task());
        }
        if let Some(chain) = &container.simulated_chain {
            tasks.push(chain.spawn_auto_miner(
                config.chain.sim_block_interval,
                self.shutdown_rx.clone(),
            ));
        }

        // Step 5
        let addr = config.gateway.http_addr();
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("binding HTTP API to {addr}"))?;
        let local_addr = listener.local_addr()?;
        let router = build_router(self.app_state());
        let shutdown = self.shutdown_rx.clone();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = serve(listener, router, shutdown).await {
                error!(error = %e, "HTTP API failed");
            }
        }));

        self.tasks.lock().extend(tasks);
        info!(%local_addr, "All subsystems running");
        Ok(local_addr)
    }

    /// Shutdown the node gracefully.
    pub async fn shutdown(&self) {
        info!("Initiating graceful shutdown...");

        if let Err(e) = self.shutdown_tx.send(true) {
            error!("Failed to send shutdown signal: {}", e);
        }

        let tasks: Vec<_> = self.tasks.lock().drain(..).collect();
        let drained = tokio::time::timeout(DRAIN_TIMEOUT, async {
            for task in tasks {
                if let Err(e) = task.await {
                    warn!(error = %e, "Background task ended abnormally");
                }
            }
        })
        .await;
        if drained.is_err() {
            warn!("Background tasks did not stop within {:?}", DRAIN_TIMEOUT);
        }

        if let Err(e) = self.container.persist_snapshot() {
            error!(error = %e, "Final snapshot failed");
        }

        info!("Shutdown complete");
    }

    /// Get a reference to the subsystem container.
    pub fn container(&self) -> Arc<SubsystemContainer> {
        Arc::clone(&self.container)
    }

    fn app_state(&self) -> AppState {
        let c = &self.container;
        AppState {
            submissions: c.queue.clone(),
            watcher: c.watcher.clone(),
            reads: c.cache.clone(),
            pinning: Arc::clone(&c.pinning),
            contract: Arc::clone(&c.contract),
            store: c.store.clone(),
            time: Arc::clone(&c.time),
            config: Arc::new(c.config.gateway.clone()),
            started_at: Instant::now(),
        }
    }

    fn spawn_snapshot_task(&self) -> JoinHandle<()> {
        let container = Arc::clone(&self.container);
        let mut shutdown = self.shutdown_rx.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(container.config.persistence.snapshot_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = container.persist_snapshot() {
                            error!(error = %e, "Periodic snapshot failed");
                        }
                    }
                }
            }
        })
    }
}
