//! Human-readable event signatures and their topic0 fingerprints.
//!
//! A signature such as
//! `Transfer(address indexed from, address indexed to, uint256 value)` is
//! parsed into a decoding schema. Its fingerprint is the keccak256 of the
//! canonical form `Transfer(address,address,uint256)`; for raw logs,
//! `topics[0]` IS the fingerprint.

use alloy_core::dyn_abi::{DynSolType, DynSolValue};
use alloy_primitives::B256;
use tiny_keccak::{Hasher, Keccak};

use chainsync_core::error::{SyncError, SyncResult};

/// Event signatures every classifier knows.
pub const BUILTIN_SIGNATURES: &[&str] = &[
    // ERC-20
    "Transfer(address indexed from, address indexed to, uint256 value)",
    "Approval(address indexed owner, address indexed spender, uint256 value)",
    // AMM pools
    "Swap(address indexed trader, address indexed tokenIn, address indexed tokenOut, uint256 amountIn, uint256 amountOut)",
    "SwapExecuted(address indexed user, address indexed tokenIn, address indexed tokenOut, uint256 amountIn, uint256 amountOut)",
    "LiquidityAdded(address indexed provider, uint256 amount0, uint256 amount1, uint256 liquidity)",
    "LiquidityRemoved(address indexed provider, uint256 amount0, uint256 amount1, uint256 liquidity)",
    // Price oracle and asset factory
    "PriceUpdated(address indexed asset, uint256 price, uint256 timestamp)",
    "AssetCreated(address indexed assetAddress, string name, string symbol, uint256 initialSupply, address indexed owner)",
    // Compliance registry
    "AddressWhitelisted(address indexed account)",
    "AddressRemovedFromWhitelist(address indexed account)",
    "AddressBlacklisted(address indexed account)",
    "AddressRemovedFromBlacklist(address indexed account)",
    "KYCStatusUpdated(address indexed account, bool status)",
];

/// One event parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct EventParam {
    pub name: String,
    pub ty: DynSolType,
    pub indexed: bool,
}

/// A parsed event signature.
#[derive(Debug, Clone, PartialEq)]
pub struct EventSignature {
    pub name: String,
    pub params: Vec<EventParam>,
    /// `Name(type1,type2,...)`
    pub canonical: String,
    /// `0x`-prefixed lowercase keccak256 of `canonical`.
    pub topic0: String,
}

impl EventSignature {
    /// Parse `Name(type [indexed] [name], ...)`. Unnamed parameters are
    /// called `arg0`, `arg1`, …
    pub fn parse(signature: &str) -> SyncResult<Self> {
        let sig = signature.trim();
        let sig = sig.strip_prefix("event ").unwrap_or(sig).trim();
        let open = sig
            .find('(')
            .ok_or_else(|| SyncError::Decode(format!("missing '(' in event signature: {signature}")))?;
        let inner = sig[open + 1..]
            .strip_suffix(')')
            .ok_or_else(|| SyncError::Decode(format!("missing ')' in event signature: {signature}")))?;
        let name = sig[..open].trim();
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(SyncError::Decode(format!("invalid event name in signature: {signature}")));
        }

        let mut params = Vec::new();
        for (i, part) in split_top_level(inner).into_iter().enumerate() {
            let mut tokens = part.split_whitespace();
            let ty_str = tokens
                .next()
                .ok_or_else(|| SyncError::Decode(format!("empty parameter in event signature: {signature}")))?;
            let ty = DynSolType::parse(ty_str)
                .map_err(|e| SyncError::Decode(format!("bad type '{ty_str}' in {signature}: {e}")))?;
            let mut indexed = false;
            let mut param_name = None;
            for tok in tokens {
                match tok {
                    "indexed" if !indexed && param_name.is_none() => indexed = true,
                    _ if param_name.is_none() => param_name = Some(tok.to_string()),
                    _ => {
                        return Err(SyncError::Decode(format!(
                            "unexpected token '{tok}' in event signature: {signature}"
                        )))
                    }
                }
            }
            params.push(EventParam {
                name: param_name.unwrap_or_else(|| format!("arg{i}")),
                ty,
                indexed,
            });
        }
        if params.iter().filter(|p| p.indexed).count() > 3 {
            return Err(SyncError::Decode(format!(
                "more than three indexed parameters: {signature}"
            )));
        }

        let types: Vec<String> = params.iter().map(|p| p.ty.sol_type_name().into_owned()).collect();
        let canonical = format!("{name}({})", types.join(","));
        let topic0 = keccak256_signature(&canonical);
        Ok(Self {
            name: name.to_string(),
            params,
            canonical,
            topic0,
        })
    }

    /// Returns `true` if `topic` is this event's fingerprint (case-insensitive).
    pub fn matches_topic(&self, topic: &str) -> bool {
        self.topic0.eq_ignore_ascii_case(topic)
    }

    fn indexed_count(&self) -> usize {
        self.params.iter().filter(|p| p.indexed).count()
    }

    /// Decode a log's topics and data into `(name, value)` pairs, in
    /// declaration order.
    pub fn decode(&self, topics: &[String], data: &str) -> SyncResult<Vec<(String, DynSolValue)>> {
        if topics.len() != self.indexed_count() + 1 {
            return Err(SyncError::Decode(format!(
                "{}: expected {} topics, got {}",
                self.name,
                self.indexed_count() + 1,
                topics.len()
            )));
        }

        let mut indexed_values = Vec::new();
        for (param, topic) in self.params.iter().filter(|p| p.indexed).zip(&topics[1..]) {
            indexed_values.push(decode_topic(topic, &param.ty)?);
        }

        let data_types: Vec<DynSolType> = self
            .params
            .iter()
            .filter(|p| !p.indexed)
            .map(|p| p.ty.clone())
            .collect();
        let data_values = if data_types.is_empty() {
            vec![]
        } else {
            let bytes = decode_hex(data)?;
            match DynSolType::Tuple(data_types)
                .abi_decode_params(&bytes)
                .map_err(|e| SyncError::Decode(format!("{}: log data: {e}", self.name)))?
            {
                DynSolValue::Tuple(values) => values,
                other => vec![other],
            }
        };

        let mut indexed_iter = indexed_values.into_iter();
        let mut data_iter = data_values.into_iter();
        self.params
            .iter()
            .map(|p| {
                let value = if p.indexed { indexed_iter.next() } else { data_iter.next() };
                value
                    .map(|v| (p.name.clone(), v))
                    .ok_or_else(|| SyncError::Decode(format!("{}: missing value for {}", self.name, p.name)))
            })
            .collect()
    }
}

/// Split on commas that are not nested in parentheses.
fn split_top_level(s: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(s[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    let last = s[start..].trim();
    if !last.is_empty() || !parts.is_empty() {
        parts.push(last);
    }
    parts
}

fn decode_hex(s: &str) -> SyncResult<Vec<u8>> {
    hex::decode(s.strip_prefix("0x").unwrap_or(s)).map_err(|e| SyncError::Decode(format!("invalid hex: {e}")))
}

/// Decode one indexed topic.
///
/// Reference types (string, bytes, arrays, tuples) are stored as the keccak256
/// of their encoding, so the original value is unrecoverable and the raw hash
/// is returned as `bytes32`.
fn decode_topic(topic: &str, ty: &DynSolType) -> SyncResult<DynSolValue> {
    let bytes = decode_hex(topic)?;
    if bytes.len() != 32 {
        return Err(SyncError::Decode(format!("topic is {} bytes, expected 32", bytes.len())));
    }
    match ty {
        DynSolType::String
        | DynSolType::Bytes
        | DynSolType::Array(_)
        | DynSolType::FixedArray(..)
        | DynSolType::Tuple(_) => Ok(DynSolValue::FixedBytes(B256::from_slice(&bytes), 32)),
        _ => ty
            .abi_decode(&bytes)
            .map_err(|e| SyncError::Decode(format!("topic decode: {e}"))),
    }
}

/// keccak256 of a canonical signature, `0x`-prefixed.
pub fn keccak256_signature(signature: &str) -> String {
    let mut hasher = Keccak::v256();
    let mut output = [0u8; 32];
    hasher.update(signature.as_bytes());
    hasher.finalize(&mut output);
    format!("0x{}", hex::encode(output))
}

/// `topics[0]`, if it looks like a 32-byte hash.
pub fn fingerprint_from_topics(topics: &[String]) -> Option<&str> {
    let first = topics.first()?;
    let hex = first.strip_prefix("0x").unwrap_or(first);
    (hex.len() == 64 && hex.chars().all(|c| c.is_ascii_hexdigit())).then_some(first.as_str())
}

/// Parse every built-in signature.
pub fn builtin_signatures() -> SyncResult<Vec<EventSignature>> {
    BUILTIN_SIGNATURES.iter().map(|s| EventSignature::parse(s)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{topic_addr, word, ALICE, BOB, TRANSFER_TOPIC};

    #[test]
    fn erc20_transfer_fingerprint() {
        let sig = EventSignature::parse(BUILTIN_SIGNATURES[0]).unwrap();
        assert_eq!(sig.canonical, "Transfer(address,address,uint256)");
        assert_eq!(sig.topic0, TRANSFER_TOPIC);
        assert!(sig.params[0].indexed && !sig.params[2].indexed);
        assert_eq!(sig.params[2].name, "value");
    }

    #[test]
    fn approval_fingerprint() {
        let sig = EventSignature::parse(BUILTIN_SIGNATURES[1]).unwrap();
        assert_eq!(
            sig.topic0,
            "0x8c5be1e5ebec7d5bd14f71427d1e84f3dd0314c0f7b2291e5b200ac8c7c3b925"
        );
    }

    #[test]
    fn parse_normalizes_aliases_and_unnamed_params() {
        let sig = EventSignature::parse("event Paused(address indexed, uint amount)").unwrap();
        assert_eq!(sig.canonical, "Paused(address,uint256)");
        assert_eq!(sig.params[0].name, "arg0");
        assert_eq!(sig.params[1].name, "amount");

        let empty = EventSignature::parse("Ping()").unwrap();
        assert!(empty.params.is_empty());
        assert_eq!(empty.canonical, "Ping()");
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(EventSignature::parse("Transfer").is_err());
        assert!(EventSignature::parse("Transfer(address").is_err());
        assert!(EventSignature::parse("Transfer(notatype x)").is_err());
        assert!(EventSignature::parse("X(uint a, uint b, uint c extra)").is_err());
        assert!(EventSignature::parse(
            "X(uint indexed a, uint indexed b, uint indexed c, uint indexed d)"
        )
        .is_err());
    }

    #[test]
    fn builtins_all_parse() {
        let sigs = builtin_signatures().unwrap();
        assert_eq!(sigs.len(), BUILTIN_SIGNATURES.len());
        let mut topics: Vec<_> = sigs.iter().map(|s| s.topic0.clone()).collect();
        topics.sort();
        topics.dedup();
        assert_eq!(topics.len(), sigs.len());
    }

    #[test]
    fn decode_transfer() {
        let sig = EventSignature::parse(BUILTIN_SIGNATURES[0]).unwrap();
        let topics = vec![TRANSFER_TOPIC.to_string(), topic_addr(ALICE), topic_addr(BOB)];
        let values = sig.decode(&topics, &format!("0x{}", word(100))).unwrap();
        let names: Vec<_> = values.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, ["from", "to", "value"]);
        match &values[0].1 {
            DynSolValue::Address(a) => assert_eq!(a.to_checksum(None), ALICE),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn decode_rejects_wrong_topic_count_and_bad_data() {
        let sig = EventSignature::parse(BUILTIN_SIGNATURES[0]).unwrap();
        let topics = vec![TRANSFER_TOPIC.to_string(), topic_addr(ALICE)];
        assert!(sig.decode(&topics, "0x").is_err());

        let topics = vec![TRANSFER_TOPIC.to_string(), topic_addr(ALICE), topic_addr(BOB)];
        assert!(sig.decode(&topics, "0x1234").is_err());
    }

    #[test]
    fn fingerprint_from_topics_validates_shape() {
        assert!(fingerprint_from_topics(&[TRANSFER_TOPIC.to_string()]).is_some());
        assert!(fingerprint_from_topics(&["0x12".to_string()]).is_none());
        assert!(fingerprint_from_topics(&[]).is_none());
    }
}
