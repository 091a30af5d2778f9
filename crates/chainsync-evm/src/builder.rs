//! Fluent builder API for sync schedulers.
//!
//! # Example
//!
//! ```rust,no_run
//! use chainsync_evm::{HttpRpcClient, SyncBuilder};
//!
//! # async fn run() -> chainsync_core::SyncResult<()> {
//! let rpc = HttpRpcClient::new("http://localhost:8545", None)?;
//! let scheduler = SyncBuilder::new("http://localhost:8545")
//!     .contract("0x5FbDB2315678afecb367f032d93F642f64180aa3", "token")
//!     .start_block(0)
//!     .max_block_range(500)
//!     .checkpoint_path("data/checkpoint.json")
//!     .build(rpc)?;
//! scheduler.init().await?;
//! let handle = scheduler.start();
//! # Ok(()) }
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::RwLock;

use chainsync_core::buffer::EventBuffer;
use chainsync_core::checkpoint::{CheckpointStore, JsonFileCheckpointStore};
use chainsync_core::config::{CheckpointPolicy, SyncConfig};
use chainsync_core::error::{SyncError, SyncResult};
use chainsync_core::hub::SubscriptionHub;
use chainsync_core::types::ContractWatch;

use crate::client::EvmRpcClient;
use crate::scheduler::SyncScheduler;

/// Fluent builder for `SyncConfig` and [`SyncScheduler`].
pub struct SyncBuilder {
    config: SyncConfig,
    store: Option<Box<dyn CheckpointStore>>,
    buffer: Option<Arc<RwLock<EventBuffer>>>,
    hub: Option<SubscriptionHub>,
}

impl SyncBuilder {
    pub fn new(rpc_url: impl Into<String>) -> Self {
        Self::from_config(SyncConfig::new(rpc_url, vec![]))
    }

    /// Start from a loaded config.
    pub fn from_config(config: SyncConfig) -> Self {
        Self {
            config,
            store: None,
            buffer: None,
            hub: None,
        }
    }

    /// Watch a contract.
    pub fn contract(mut self, address: impl Into<String>, tag: impl Into<String>) -> Self {
        self.config.contracts.push(ContractWatch::new(address, tag));
        self
    }

    /// Watch a contract with extra event signatures.
    pub fn watch(mut self, watch: ContractWatch) -> Self {
        self.config.contracts.push(watch);
        self
    }

    pub fn chain_id(mut self, id: u64) -> Self {
        self.config.chain_id = id;
        self
    }

    /// First block to scan when no checkpoint exists.
    pub fn start_block(mut self, block: u64) -> Self {
        self.config.start_block = Some(block);
        self
    }

    pub fn initial_lookback_blocks(mut self, blocks: u64) -> Self {
        self.config.initial_lookback_blocks = blocks;
        self
    }

    /// Set the number of blocks per `eth_getLogs` window.
    pub fn max_block_range(mut self, blocks: u64) -> Self {
        self.config.max_block_range = blocks;
        self
    }

    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.poll_interval_ms = ms;
        self
    }

    pub fn request_delay_ms(mut self, ms: u64) -> Self {
        self.config.request_delay_ms = ms;
        self
    }

    /// Total attempts per rate-limited window, and the first backoff delay.
    pub fn retries(mut self, max_attempts: u32, base_delay_ms: u64) -> Self {
        self.config.max_log_retries = max_attempts;
        self.config.retry_base_delay_ms = base_delay_ms;
        self
    }

    pub fn max_stored_events(mut self, n: usize) -> Self {
        self.config.max_stored_events = n;
        self
    }

    pub fn checkpoint_policy(mut self, policy: CheckpointPolicy) -> Self {
        self.config.checkpoint_policy = policy;
        self
    }

    /// Persist the checkpoint as JSON at `path`.
    pub fn checkpoint_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.checkpoint_path = path.into();
        self
    }

    /// Use a custom checkpoint store instead of the JSON file.
    pub fn checkpoint_store(mut self, store: Box<dyn CheckpointStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Share an existing buffer.
    pub fn buffer(mut self, buffer: Arc<RwLock<EventBuffer>>) -> Self {
        self.buffer = Some(buffer);
        self
    }

    /// Share an existing hub.
    pub fn hub(mut self, hub: SubscriptionHub) -> Self {
        self.hub = Some(hub);
        self
    }

    /// Build the `SyncConfig`.
    pub fn build_config(self) -> SyncConfig {
        self.config
    }

    /// Validate the config and build the scheduler around `client`.
    pub fn build<C: EvmRpcClient + 'static>(self, client: C) -> SyncResult<SyncScheduler<C>> {
        self.config
            .validate()
            .map_err(|e| SyncError::Config(e.to_string()))?;
        let store = self
            .store
            .unwrap_or_else(|| Box::new(JsonFileCheckpointStore::new(self.config.checkpoint_path.clone())));
        let buffer = self
            .buffer
            .unwrap_or_else(|| Arc::new(RwLock::new(EventBuffer::new(self.config.max_stored_events))));
        let hub = self
            .hub
            .unwrap_or_else(|| SubscriptionHub::new(self.config.subscriber_queue_capacity));
        SyncScheduler::from_parts(self.config, client, store, buffer, hub)
    }
}
