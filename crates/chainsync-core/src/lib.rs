//! chainsync-core: data model and in-process state for the event sync engine.
//!
//! # Architecture
//!
//! ```text
//! SyncScheduler (chainsync-evm)
//!        ├── CheckpointManager  (resume rule, best-effort persistence)
//!        ├── EventBuffer        (bounded, deduplicated, newest first)
//!        └── SubscriptionHub    (per-type + ALL fan-out, bounded queues)
//!                 └── HTTP / WebSocket transport (chainsync-server)
//! ```

pub mod buffer;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod hub;
pub mod status;
pub mod types;

pub use buffer::{EventBuffer, EventQuery};
pub use checkpoint::{
    Checkpoint, CheckpointManager, CheckpointStore, JsonFileCheckpointStore, MemoryCheckpointStore,
};
pub use config::{CheckpointPolicy, ConfigError, LogConfig, ServerConfig, SyncConfig};
pub use error::{looks_rate_limited, SyncError, SyncResult};
pub use hub::{Subscription, SubscriptionHandle, SubscriptionHub, Topic};
pub use status::{SchedulerState, SyncStatus};
pub use types::{BlockchainEvent, ContractWatch, EventType};
