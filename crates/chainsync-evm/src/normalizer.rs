//! Converts alloy-core `DynSolValue` → JSON argument values.
//!
//! Integers become decimal strings (no precision loss for 256-bit values),
//! addresses EIP-55 checksummed hex, byte strings `0x` hex.

use alloy_core::dyn_abi::DynSolValue;
use serde_json::{Map, Value};

/// Convert a decoded `DynSolValue` into a JSON value.
pub fn normalize(val: DynSolValue) -> Value {
    match val {
        DynSolValue::Bool(b) => Value::Bool(b),
        DynSolValue::Int(i, _) => Value::String(i.to_string()),
        DynSolValue::Uint(u, _) => Value::String(u.to_string()),
        DynSolValue::FixedBytes(word, size) => {
            Value::String(format!("0x{}", hex::encode(&word[..size.min(32)])))
        }
        DynSolValue::Bytes(b) => Value::String(format!("0x{}", hex::encode(b))),
        DynSolValue::String(s) => Value::String(s),
        DynSolValue::Address(a) => Value::String(a.to_checksum(None)),
        DynSolValue::Array(vals) | DynSolValue::FixedArray(vals) | DynSolValue::Tuple(vals) => {
            Value::Array(vals.into_iter().map(normalize).collect())
        }
        DynSolValue::Function(f) => Value::String(format!("0x{}", hex::encode(f.as_slice()))),
    }
}

/// Normalize decoded `(name, value)` pairs into an argument map.
pub fn normalize_args(values: Vec<(String, DynSolValue)>) -> Map<String, Value> {
    values.into_iter().map(|(name, v)| (name, normalize(v))).collect()
}
