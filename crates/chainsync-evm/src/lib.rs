//! chainsync-evm: JSON-RPC transport, resilient log fetcher, event
//! classifier and the sync scheduler for EVM chains.

pub mod builder;
pub mod classifier;
pub mod client;
pub mod fetcher;
pub mod normalizer;
pub mod retry;
pub mod rpc;
pub mod scheduler;
pub mod signature;

#[cfg(test)]
mod testing;

pub use builder::SyncBuilder;
pub use classifier::{classify, DecodedLog, EventClassifier, SkipReason};
pub use client::{ChainClient, EvmRpcClient, RawLog};
pub use fetcher::{ResilientLogFetcher, ScanReport};
pub use retry::{RetryConfig, RetryPolicy};
pub use rpc::HttpRpcClient;
pub use scheduler::{CycleOutcome, CycleReport, SyncScheduler};
pub use signature::{EventSignature, BUILTIN_SIGNATURES};
