//! Shared fixtures for unit tests: an in-memory RPC and log builders.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use chainsync_core::error::{SyncError, SyncResult};

use crate::client::{EvmRpcClient, RawLog};

pub(crate) const TOKEN: &str = "0x5FbDB2315678afecb367f032d93F642f64180aa3";
pub(crate) const POOL: &str = "0xe7f1725E7734CE288F8367e1Bb143E90bb3F0512";
pub(crate) const ALICE: &str = "0x70997970C51812dc3A010C7d01b50e0d17dc79C8";
pub(crate) const BOB: &str = "0x3C44CdDdB6a900fa2b585dd299e03d12FA4293BC";
pub(crate) const ZERO: &str = "0x0000000000000000000000000000000000000000";

pub(crate) const TRANSFER_TOPIC: &str =
    "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef";

/// Left-pad an address into a 32-byte topic.
pub(crate) fn topic_addr(addr: &str) -> String {
    format!("0x{:0>64}", addr.trim_start_matches("0x").to_lowercase())
}

pub(crate) fn word(value: u128) -> String {
    format!("{value:064x}")
}

pub(crate) fn raw_log(address: &str, topics: Vec<String>, data: String, block: u64, log_index: u32) -> RawLog {
    RawLog {
        address: address.to_lowercase(),
        topics,
        data,
        block_number: format!("{block:#x}"),
        block_hash: Some(format!("0x{block:064x}")),
        tx_hash: format!("0x{:064x}", block * 1_000 + log_index as u64),
        log_index: format!("{log_index:#x}"),
        removed: None,
    }
}

pub(crate) fn transfer_log(block: u64, log_index: u32, from: &str, to: &str, value: u128) -> RawLog {
    raw_log(
        TOKEN,
        vec![TRANSFER_TOPIC.to_string(), topic_addr(from), topic_addr(to)],
        format!("0x{}", word(value)),
        block,
        log_index,
    )
}

/// Scriptable in-memory provider.
pub(crate) struct MockRpc {
    head: AtomicU64,
    logs: Mutex<Vec<RawLog>>,
    /// Window start → remaining rate-limited attempts.
    rate_limited: Mutex<HashMap<u64, u32>>,
    fail_logs: AtomicBool,
    fail_head: AtomicBool,
    calls: Mutex<Vec<(u64, u64)>>,
}

impl MockRpc {
    pub(crate) fn new(head: u64) -> Self {
        Self {
            head: AtomicU64::new(head),
            logs: Mutex::new(vec![]),
            rate_limited: Mutex::new(HashMap::new()),
            fail_logs: AtomicBool::new(false),
            fail_head: AtomicBool::new(false),
            calls: Mutex::new(vec![]),
        }
    }

    pub(crate) fn set_head(&self, head: u64) {
        self.head.store(head, Ordering::SeqCst);
    }

    pub(crate) fn push_log(&self, log: RawLog) {
        self.logs.lock().unwrap().push(log);
    }

    /// Rate-limit the window starting at `from` for the next `times` attempts.
    pub(crate) fn rate_limit_window(&self, from: u64, times: u32) {
        self.rate_limited.lock().unwrap().insert(from, times);
    }

    pub(crate) fn fail_logs(&self, fail: bool) {
        self.fail_logs.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn fail_head(&self, fail: bool) {
        self.fail_head.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn calls(&self) -> Vec<(u64, u64)> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn calls_for(&self, from: u64) -> usize {
        self.calls().iter().filter(|(f, _)| *f == from).count()
    }
}

#[async_trait]
impl EvmRpcClient for MockRpc {
    async fn get_block_number(&self) -> SyncResult<u64> {
        if self.fail_head.load(Ordering::SeqCst) {
            return Err(SyncError::Rpc("connection refused".into()));
        }
        Ok(self.head.load(Ordering::SeqCst))
    }

    async fn get_logs(&self, addresses: &[String], from: u64, to: u64) -> SyncResult<Vec<RawLog>> {
        self.calls.lock().unwrap().push((from, to));
        if self.fail_logs.load(Ordering::SeqCst) {
            return Err(SyncError::Rpc("connection reset".into()));
        }
        if let Some(remaining) = self.rate_limited.lock().unwrap().get_mut(&from) {
            if *remaining > 0 {
                *remaining = remaining.saturating_sub(1);
                return Err(SyncError::RateLimited("HTTP 429".into()));
            }
        }
        Ok(self
            .logs
            .lock()
            .unwrap()
            .iter()
            .filter(|l| {
                let block = l.block_number_u64().unwrap_or(0);
                block >= from
                    && block <= to
                    && addresses.iter().any(|a| a.eq_ignore_ascii_case(&l.address))
            })
            .cloned()
            .collect())
    }

    async fn get_block_timestamp(&self, number: u64) -> SyncResult<i64> {
        Ok(1_700_000_000 + number as i64 * 12)
    }
}
