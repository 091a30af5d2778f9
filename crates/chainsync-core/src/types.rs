//! Shared types for the sync pipeline.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

// ─── ContractWatch ────────────────────────────────────────────────────────────

/// A contract the indexer watches, supplied at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractWatch {
    /// Contract address (`0x…`).
    pub address: String,
    /// Human-readable label attached to every event from this contract.
    pub tag: String,
    /// Extra event signatures decodable for this contract only,
    /// e.g. `"Paused(address indexed account)"`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<String>,
}

impl ContractWatch {
    pub fn new(address: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            tag: tag.into(),
            events: vec![],
        }
    }

    /// Add an extra event signature for this contract.
    pub fn with_event(mut self, signature: impl Into<String>) -> Self {
        self.events.push(signature.into());
        self
    }

    /// Returns `true` if `address` is this contract (case-insensitive).
    pub fn matches(&self, address: &str) -> bool {
        self.address.eq_ignore_ascii_case(address)
    }
}

// ─── EventType ────────────────────────────────────────────────────────────────

/// Semantic classification of a decoded event.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventType {
    Mint,
    Burn,
    Transfer,
    Approval,
    Swap,
    LiquidityAdd,
    LiquidityRemove,
    /// Any other event: the type is the raw event name.
    Other(String),
}

impl EventType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Mint => "Mint",
            Self::Burn => "Burn",
            Self::Transfer => "Transfer",
            Self::Approval => "Approval",
            Self::Swap => "Swap",
            Self::LiquidityAdd => "LiquidityAdd",
            Self::LiquidityRemove => "LiquidityRemove",
            Self::Other(name) => name,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for EventType {
    fn from(s: &str) -> Self {
        match s {
            "Mint" => Self::Mint,
            "Burn" => Self::Burn,
            "Transfer" => Self::Transfer,
            "Approval" => Self::Approval,
            "Swap" => Self::Swap,
            "LiquidityAdd" => Self::LiquidityAdd,
            "LiquidityRemove" => Self::LiquidityRemove,
            other => Self::Other(other.to_string()),
        }
    }
}

impl Serialize for EventType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::from(s.as_str()))
    }
}

// ─── BlockchainEvent ──────────────────────────────────────────────────────────

/// A normalized on-chain event. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockchainEvent {
    /// `"{transactionHash}-{logIndex}"`, the dedup key.
    pub id: String,
    pub block_number: u64,
    pub log_index: u32,
    pub transaction_hash: String,
    pub contract_address: String,
    pub contract_tag: String,
    /// Raw decoded event name, e.g. `"Transfer"`.
    pub event_name: String,
    /// Derived classification, e.g. `Mint` for a transfer from the zero address.
    pub event_type: EventType,
    /// Block timestamp (Unix seconds).
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount0: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount1: Option<String>,
    /// Every decoded argument, integers as decimal strings.
    pub args: serde_json::Map<String, serde_json::Value>,
}

impl BlockchainEvent {
    /// Build the deterministic event id.
    pub fn make_id(tx_hash: &str, log_index: u32) -> String {
        format!("{tx_hash}-{log_index}")
    }

    /// The `(blockNumber, logIndex)` position that totally orders events.
    pub fn position(&self) -> (u64, u32) {
        (self.block_number, self.log_index)
    }

    /// Chain-order comparison, oldest first.
    pub fn cmp_position(&self, other: &Self) -> Ordering {
        self.position().cmp(&other.position())
    }

    /// Returns `true` if `address` appears as `from`, `to`, or any string argument.
    pub fn involves(&self, address: &str) -> bool {
        let hit = |v: &Option<String>| v.as_deref().is_some_and(|s| s.eq_ignore_ascii_case(address));
        hit(&self.from)
            || hit(&self.to)
            || self
                .args
                .values()
                .filter_map(|v| v.as_str())
                .any(|s| s.eq_ignore_ascii_case(address))
    }

    /// Returns `true` if `ty` matches the event type or raw name (case-insensitive).
    pub fn is_type(&self, ty: &str) -> bool {
        self.event_type.as_str().eq_ignore_ascii_case(ty) || self.event_name.eq_ignore_ascii_case(ty)
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    pub(crate) fn event(block: u64, log_index: u32, name: &str) -> BlockchainEvent {
        let tx = format!("0x{block:x}{log_index:x}");
        BlockchainEvent {
            id: BlockchainEvent::make_id(&tx, log_index),
            block_number: block,
            log_index,
            transaction_hash: tx,
            contract_address: "0x1111111111111111111111111111111111111111".into(),
            contract_tag: "token".into(),
            event_name: name.into(),
            event_type: EventType::from(name),
            timestamp: 1_700_000_000 + block as i64,
            from: None,
            to: None,
            amount: None,
            amount0: None,
            amount1: None,
            args: serde_json::Map::new(),
        }
    }

    #[test]
    fn event_type_round_trips_through_strings() {
        assert_eq!(EventType::from("LiquidityAdd"), EventType::LiquidityAdd);
        assert_eq!(EventType::from("PriceUpdated"), EventType::Other("PriceUpdated".into()));
        assert_eq!(EventType::Other("AssetCreated".into()).to_string(), "AssetCreated");
    }

    #[test]
    fn event_serializes_camel_case() {
        let mut ev = event(10, 2, "Transfer");
        ev.amount = Some("100".into());
        let v = serde_json::to_value(&ev).unwrap();
        assert_eq!(v["blockNumber"], json!(10));
        assert_eq!(v["logIndex"], json!(2));
        assert_eq!(v["eventType"], json!("Transfer"));
        assert_eq!(v["amount"], json!("100"));
        assert!(v.get("amount0").is_none());
    }

    #[test]
    fn involves_checks_participants_and_args() {
        let mut ev = event(1, 0, "Swap");
        ev.from = Some("0xAbC".into());
        ev.args.insert("tokenIn".into(), json!("0xDEF"));
        ev.args.insert("amountIn".into(), json!("5"));
        assert!(ev.involves("0xabc"));
        assert!(ev.involves("0xdef"));
        assert!(!ev.involves("0x123"));
    }

    #[test]
    fn position_orders_by_block_then_log_index() {
        let a = event(5, 9, "Transfer");
        let b = event(6, 0, "Transfer");
        let c = event(6, 1, "Transfer");
        assert_eq!(a.cmp_position(&b), Ordering::Less);
        assert_eq!(c.cmp_position(&b), Ordering::Greater);
    }
}
