//! Shared handler state.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{broadcast, RwLock};

use chainsync_core::buffer::EventBuffer;
use chainsync_core::config::SyncConfig;
use chainsync_core::hub::{SubscriptionHandle, SubscriptionHub, Topic};
use chainsync_core::status::SyncStatus;
use chainsync_evm::client::EvmRpcClient;
use chainsync_evm::scheduler::SyncScheduler;

/// Anything that can report the sync status.
pub trait StatusSource: Send + Sync {
    fn status(&self) -> SyncStatus;
}

impl<C: EvmRpcClient + 'static> StatusSource for SyncScheduler<C> {
    fn status(&self) -> SyncStatus {
        SyncScheduler::status(self)
    }
}

/// A watched contract as reported by `/health`.
#[derive(Debug, Clone, Serialize)]
pub struct TrackedContract {
    pub address: String,
    pub tag: String,
}

/// Static facts about this indexer, captured from config.
#[derive(Debug, Clone)]
pub struct NodeInfo {
    pub chain_id: u64,
    pub rpc_url: String,
    pub tracked_contracts: Vec<TrackedContract>,
    pub poll_interval_ms: u64,
    pub max_stored_events: usize,
    pub default_query_limit: usize,
}

impl NodeInfo {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            chain_id: config.chain_id,
            rpc_url: config.rpc_url.clone(),
            tracked_contracts: config
                .contracts
                .iter()
                .map(|c| TrackedContract {
                    address: c.address.clone(),
                    tag: c.tag.clone(),
                })
                .collect(),
            poll_interval_ms: config.poll_interval_ms,
            max_stored_events: config.max_stored_events,
            default_query_limit: config.server.default_query_limit,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub info: Arc<NodeInfo>,
    pub buffer: Arc<RwLock<EventBuffer>>,
    pub status: Arc<dyn StatusSource>,
    /// Serialized events for every open WebSocket.
    pub stream: broadcast::Sender<Arc<str>>,
}

impl AppState {
    pub fn new(
        info: NodeInfo,
        buffer: Arc<RwLock<EventBuffer>>,
        status: Arc<dyn StatusSource>,
        stream_capacity: usize,
    ) -> Self {
        let (stream, _) = broadcast::channel(stream_capacity.max(1));
        Self {
            info: Arc::new(info),
            buffer,
            status,
            stream,
        }
    }

    /// Forward every event published on `hub` to the WebSocket broadcast.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn attach(&self, hub: &SubscriptionHub) -> SubscriptionHandle {
        let stream = self.stream.clone();
        hub.subscribe_with(Topic::All, move |event| match serde_json::to_string(&*event) {
            // No open sockets is not an error
            Ok(json) => {
                let _ = stream.send(Arc::from(json));
            }
            Err(e) => tracing::warn!(event_id = %event.id, error = %e, "failed to serialize event"),
        })
    }

    /// Number of connected WebSocket clients.
    pub fn stream_clients(&self) -> usize {
        self.stream.receiver_count()
    }
}
