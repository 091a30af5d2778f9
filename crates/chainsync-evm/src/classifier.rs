//! Event classifier: decodes raw logs and maps them onto the event model.
//!
//! Every classifier owns its own signature registry and contract map, built
//! from config, so several indexers can live in one process.

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;

use chainsync_core::error::{SyncError, SyncResult};
use chainsync_core::types::{BlockchainEvent, ContractWatch, EventType};

use crate::client::RawLog;
use crate::normalizer::normalize_args;
use crate::signature::{builtin_signatures, fingerprint_from_topics, EventSignature};

const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

/// Argument names tried, in order, for the canonical `from` participant.
const FROM_KEYS: &[&str] = &["from", "owner", "provider", "trader", "user"];
/// Argument names tried, in order, for the canonical `to` participant.
const TO_KEYS: &[&str] = &["to", "spender", "recipient", "admin", "tokenOut"];

/// Why a log did not become an event. Never an error condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Flagged `removed` by a reorg.
    Removed,
    /// Emitted by an address outside the watch set.
    UnknownContract(String),
    /// `topics[0]` matches no known signature.
    UnknownSignature(Option<String>),
    /// Known signature, but topics or data did not decode.
    Malformed(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Removed => write!(f, "removed by reorg"),
            Self::UnknownContract(addr) => write!(f, "unwatched contract {addr}"),
            Self::UnknownSignature(Some(t)) => write!(f, "unknown signature {t}"),
            Self::UnknownSignature(None) => write!(f, "no signature topic"),
            Self::Malformed(reason) => write!(f, "malformed log: {reason}"),
        }
    }
}

/// A log decoded against a known signature, not yet timestamped.
#[derive(Debug, Clone)]
pub struct DecodedLog {
    pub block_number: u64,
    pub log_index: u32,
    pub tx_hash: String,
    pub contract_address: String,
    pub contract_tag: String,
    pub event_name: String,
    pub args: Map<String, Value>,
}

impl DecodedLog {
    pub fn position(&self) -> (u64, u32) {
        (self.block_number, self.log_index)
    }

    pub fn id(&self) -> String {
        BlockchainEvent::make_id(&self.tx_hash, self.log_index)
    }
}

struct WatchedContract {
    watch: ContractWatch,
    /// topic0 (lowercase) → contract-specific signature.
    extra: HashMap<String, EventSignature>,
}

/// Decodes and classifies logs for a fixed set of contracts.
pub struct EventClassifier {
    builtin: HashMap<String, EventSignature>,
    /// Lowercase address → contract.
    contracts: HashMap<String, WatchedContract>,
}

impl EventClassifier {
    /// Build the registry: built-in signatures plus each contract's extras.
    pub fn new(contracts: &[ContractWatch]) -> SyncResult<Self> {
        let builtin = builtin_signatures()?
            .into_iter()
            .map(|s| (s.topic0.clone(), s))
            .collect();

        let mut map = HashMap::new();
        for watch in contracts {
            let mut extra = HashMap::new();
            for raw in &watch.events {
                let sig = EventSignature::parse(raw).map_err(|e| {
                    SyncError::Config(format!("contract '{}': {e}", watch.tag))
                })?;
                extra.insert(sig.topic0.clone(), sig);
            }
            map.insert(
                watch.address.to_lowercase(),
                WatchedContract {
                    watch: watch.clone(),
                    extra,
                },
            );
        }
        Ok(Self {
            builtin,
            contracts: map,
        })
    }

    /// Number of distinct signatures known, built-in plus per-contract.
    pub fn signature_count(&self) -> usize {
        self.builtin.len() + self.contracts.values().map(|c| c.extra.len()).sum::<usize>()
    }

    /// Decode one log against the registry.
    pub fn decode(&self, log: &RawLog) -> Result<DecodedLog, SkipReason> {
        if log.is_removed() {
            return Err(SkipReason::Removed);
        }
        let contract = self
            .contracts
            .get(&log.address.to_lowercase())
            .ok_or_else(|| SkipReason::UnknownContract(log.address.clone()))?;
        let topic0 = fingerprint_from_topics(&log.topics)
            .ok_or(SkipReason::UnknownSignature(None))?
            .to_lowercase();
        let sig = contract
            .extra
            .get(&topic0)
            .or_else(|| self.builtin.get(&topic0))
            .ok_or_else(|| SkipReason::UnknownSignature(Some(topic0.clone())))?;

        let block_number = log
            .block_number_u64()
            .ok_or_else(|| SkipReason::Malformed(format!("blockNumber {}", log.block_number)))?;
        let log_index = log
            .log_index_u32()
            .ok_or_else(|| SkipReason::Malformed(format!("logIndex {}", log.log_index)))?;
        let values = sig
            .decode(&log.topics, &log.data)
            .map_err(|e| SkipReason::Malformed(e.to_string()))?;

        Ok(DecodedLog {
            block_number,
            log_index,
            tx_hash: log.tx_hash.clone(),
            contract_address: contract.watch.address.clone(),
            contract_tag: contract.watch.tag.clone(),
            event_name: sig.name.clone(),
            args: normalize_args(values),
        })
    }

    /// Derive the event type and canonical fields, producing the final event.
    pub fn into_event(&self, decoded: DecodedLog, timestamp: i64) -> BlockchainEvent {
        let args = &decoded.args;
        let from = first_str(args, FROM_KEYS);
        let to = first_str(args, TO_KEYS);
        let event_type = classify(&decoded.event_name, from.as_deref(), to.as_deref());

        let (mut amount, mut amount0, mut amount1) = (None, None, None);
        match &event_type {
            EventType::Swap => {
                amount0 = first_str(args, &["amountIn"]);
                amount1 = first_str(args, &["amountOut"]);
            }
            EventType::Transfer | EventType::Mint | EventType::Burn | EventType::Approval => {
                amount = first_str(args, &["value"]);
            }
            EventType::LiquidityAdd | EventType::LiquidityRemove => {
                amount0 = first_str(args, &["amount0", "amountA"]);
                amount1 = first_str(args, &["amount1", "amountB"]);
            }
            EventType::Other(_) => {
                amount = first_str(args, &["amount", "value"]);
            }
        }

        BlockchainEvent {
            id: decoded.id(),
            block_number: decoded.block_number,
            log_index: decoded.log_index,
            transaction_hash: decoded.tx_hash,
            contract_address: decoded.contract_address,
            contract_tag: decoded.contract_tag,
            event_name: decoded.event_name,
            event_type,
            timestamp,
            from,
            to,
            amount,
            amount0,
            amount1,
            args: decoded.args,
        }
    }
}

/// Map a raw event name onto its semantic type.
pub fn classify(event_name: &str, from: Option<&str>, to: Option<&str>) -> EventType {
    let is_zero = |a: Option<&str>| a.is_some_and(|a| a.eq_ignore_ascii_case(ZERO_ADDRESS));
    match event_name {
        "Transfer" if is_zero(from) => EventType::Mint,
        "Transfer" if is_zero(to) => EventType::Burn,
        "Transfer" => EventType::Transfer,
        "Approval" => EventType::Approval,
        "Swap" | "SwapExecuted" => EventType::Swap,
        "LiquidityAdded" => EventType::LiquidityAdd,
        "LiquidityRemoved" => EventType::LiquidityRemove,
        other => EventType::Other(other.to_string()),
    }
}

fn first_str(args: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| args.get(*k).and_then(Value::as_str))
        .map(str::to_string)
}
