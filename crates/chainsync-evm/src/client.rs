//! Chain client adapter.
//!
//! [`EvmRpcClient`] is the seam between the sync pipeline and a JSON-RPC
//! provider; [`ChainClient`] wraps one and memoizes block timestamps.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chainsync_core::error::SyncResult;

/// A raw EVM log as returned by `eth_getLogs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawLog {
    pub address: String,
    pub topics: Vec<String>,
    pub data: String,
    #[serde(rename = "blockNumber")]
    pub block_number: String,
    #[serde(rename = "blockHash", default)]
    pub block_hash: Option<String>,
    #[serde(rename = "transactionHash")]
    pub tx_hash: String,
    #[serde(rename = "logIndex")]
    pub log_index: String,
    #[serde(default)]
    pub removed: Option<bool>,
}

impl RawLog {
    pub fn block_number_u64(&self) -> Option<u64> {
        parse_hex_u64(&self.block_number)
    }

    pub fn log_index_u32(&self) -> Option<u32> {
        parse_hex_u64(&self.log_index).and_then(|i| u32::try_from(i).ok())
    }

    /// Returns `true` if this log was removed by a reorg.
    pub fn is_removed(&self) -> bool {
        self.removed.unwrap_or(false)
    }
}

/// Trait for fetching EVM data from a JSON-RPC provider.
///
/// Implementations report rate-limit rejections as
/// [`SyncError::RateLimited`](chainsync_core::SyncError::RateLimited) and
/// every other failure as `SyncError::Rpc`; retry policy belongs to the caller.
#[async_trait]
pub trait EvmRpcClient: Send + Sync {
    /// `eth_blockNumber`
    async fn get_block_number(&self) -> SyncResult<u64>;

    /// `eth_getLogs` for every address in `addresses` over `[from, to]`.
    async fn get_logs(&self, addresses: &[String], from: u64, to: u64) -> SyncResult<Vec<RawLog>>;

    /// Timestamp (Unix seconds) of block `number`, via `eth_getBlockByNumber`.
    async fn get_block_timestamp(&self, number: u64) -> SyncResult<i64>;
}

#[async_trait]
impl<T: EvmRpcClient + ?Sized> EvmRpcClient for Arc<T> {
    async fn get_block_number(&self) -> SyncResult<u64> {
        (**self).get_block_number().await
    }

    async fn get_logs(&self, addresses: &[String], from: u64, to: u64) -> SyncResult<Vec<RawLog>> {
        (**self).get_logs(addresses, from, to).await
    }

    async fn get_block_timestamp(&self, number: u64) -> SyncResult<i64> {
        (**self).get_block_timestamp(number).await
    }
}

/// Wraps an [`EvmRpcClient`] with a block-timestamp cache.
pub struct ChainClient<C> {
    rpc: C,
    timestamps: Mutex<BTreeMap<u64, i64>>,
}

impl<C: EvmRpcClient> ChainClient<C> {
    pub fn new(rpc: C) -> Self {
        Self {
            rpc,
            timestamps: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn rpc(&self) -> &C {
        &self.rpc
    }

    fn cache(&self) -> MutexGuard<'_, BTreeMap<u64, i64>> {
        self.timestamps.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Current chain height.
    pub async fn current_height(&self) -> SyncResult<u64> {
        self.rpc.get_block_number().await
    }

    /// Logs for `addresses` in `[from, to]`, unretried.
    pub async fn fetch_logs(&self, addresses: &[String], from: u64, to: u64) -> SyncResult<Vec<RawLog>> {
        self.rpc.get_logs(addresses, from, to).await
    }

    /// Block timestamp, memoized per block number.
    pub async fn block_timestamp(&self, number: u64) -> SyncResult<i64> {
        if let Some(ts) = self.cache().get(&number) {
            return Ok(*ts);
        }
        let ts = self.rpc.get_block_timestamp(number).await?;
        self.cache().insert(number, ts);
        Ok(ts)
    }

    /// Evict cached timestamps for blocks below `block`. Returns how many were dropped.
    pub fn prune_timestamps(&self, block: u64) -> usize {
        let mut cache = self.cache();
        let kept = cache.split_off(&block);
        let dropped = cache.len();
        *cache = kept;
        dropped
    }

    pub fn cached_timestamps(&self) -> usize {
        self.cache().len()
    }
}

/// Parse a hex-encoded string (with or without `0x`) to u64.
pub fn parse_hex_u64(s: &str) -> Option<u64> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    u64::from_str_radix(s, 16).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingRpc {
        timestamp_calls: AtomicUsize,
    }

    #[async_trait]
    impl EvmRpcClient for CountingRpc {
        async fn get_block_number(&self) -> SyncResult<u64> {
            Ok(100)
        }
        async fn get_logs(&self, _: &[String], _: u64, _: u64) -> SyncResult<Vec<RawLog>> {
            Ok(vec![])
        }
        async fn get_block_timestamp(&self, number: u64) -> SyncResult<i64> {
            self.timestamp_calls.fetch_add(1, Ordering::SeqCst);
            Ok(1_700_000_000 + number as i64)
        }
    }

    #[test]
    fn parse_hex_u64_basic() {
        assert_eq!(parse_hex_u64("0x1"), Some(1));
        assert_eq!(parse_hex_u64("0xff"), Some(255));
        assert_eq!(parse_hex_u64("1234"), Some(0x1234));
        assert_eq!(parse_hex_u64("0xzz"), None);
    }

    #[test]
    fn raw_log_parses_rpc_shape() {
        let log: RawLog = serde_json::from_value(serde_json::json!({
            "address": "0x5fbdb2315678afecb367f032d93f642f64180aa3",
            "topics": [],
            "data": "0x",
            "blockNumber": "0x12a05f200",
            "blockHash": null,
            "transactionHash": "0xabc",
            "logIndex": "0x5"
        }))
        .unwrap();
        assert_eq!(log.block_number_u64(), Some(5_000_000_000));
        assert_eq!(log.log_index_u32(), Some(5));
        assert!(!log.is_removed());
    }

    #[tokio::test]
    async fn timestamps_are_cached_and_pruned() {
        let client = ChainClient::new(CountingRpc::default());
        assert_eq!(client.block_timestamp(10).await.unwrap(), 1_700_000_010);
        assert_eq!(client.block_timestamp(10).await.unwrap(), 1_700_000_010);
        client.block_timestamp(20).await.unwrap();
        client.block_timestamp(30).await.unwrap();
        assert_eq!(client.rpc().timestamp_calls.load(Ordering::SeqCst), 3);

        assert_eq!(client.prune_timestamps(20), 1);
        assert_eq!(client.cached_timestamps(), 2);
        client.block_timestamp(10).await.unwrap();
        assert_eq!(client.rpc().timestamp_calls.load(Ordering::SeqCst), 4);
    }
}
