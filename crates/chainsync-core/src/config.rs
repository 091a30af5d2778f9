//! Process-wide configuration, loaded once at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::types::ContractWatch;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid JSON config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// How far the checkpoint advances when a window's retries were exhausted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointPolicy {
    /// Advance to the scanned head even if some windows came back empty after
    /// exhausting retries. Events the provider refused to serve are skipped.
    #[default]
    Optimistic,
    /// Stop at the first exhausted window and advance only to the end of the
    /// last window that succeeded; the failed window is retried next cycle.
    Conservative,
}

/// HTTP/WebSocket listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// Socket address to bind, e.g. `"0.0.0.0:4000"`.
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Default `limit` for `/events` when the caller gives none.
    #[serde(default = "default_query_limit")]
    pub default_query_limit: usize,
    /// Capacity of the WebSocket broadcast channel.
    #[serde(default = "default_stream_capacity")]
    pub stream_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            default_query_limit: default_query_limit(),
            stream_capacity: default_stream_capacity(),
        }
    }
}

/// Log level per component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Default filter level, e.g. `info`.
    #[serde(default = "default_level")]
    pub level: String,
    /// Per-crate levels, e.g. `chainsync-evm: debug`.
    #[serde(default)]
    pub components: HashMap<String, String>,
    /// One JSON object per line instead of text.
    #[serde(default)]
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            components: HashMap::new(),
            json: false,
        }
    }
}

/// Top-level indexer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConfig {
    /// JSON-RPC endpoint of an Ethereum-compatible node.
    pub rpc_url: String,
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,
    /// Contracts whose logs are indexed.
    pub contracts: Vec<ContractWatch>,
    /// First block to scan when no checkpoint exists (inclusive).
    #[serde(default)]
    pub start_block: Option<u64>,
    /// With neither checkpoint nor `start_block`, start this many blocks behind head.
    #[serde(default = "default_lookback")]
    pub initial_lookback_blocks: u64,
    /// Maximum blocks per `eth_getLogs` window.
    #[serde(default = "default_max_block_range")]
    pub max_block_range: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Fixed pause between windows, regardless of errors.
    #[serde(default)]
    pub request_delay_ms: u64,
    /// Total attempts per window when the provider rate-limits.
    #[serde(default = "default_max_log_retries")]
    pub max_log_retries: u32,
    /// First backoff delay; doubles per attempt, capped at 10 s.
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    /// Event buffer capacity.
    #[serde(default = "default_max_stored_events")]
    pub max_stored_events: usize,
    #[serde(default = "default_checkpoint_path")]
    pub checkpoint_path: PathBuf,
    #[serde(default)]
    pub checkpoint_policy: CheckpointPolicy,
    /// Seen-set and timestamp-cache entries older than `checkpoint - this` are evicted.
    #[serde(default = "default_seen_retention_blocks")]
    pub seen_retention_blocks: u64,
    /// Per-subscriber queue depth in the subscription hub.
    #[serde(default = "default_subscriber_queue_capacity")]
    pub subscriber_queue_capacity: usize,
    /// Optional per-request HTTP timeout for RPC calls.
    #[serde(default)]
    pub request_timeout_ms: Option<u64>,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub log: LogConfig,
}

fn default_listen() -> String { "0.0.0.0:4000".into() }
fn default_query_limit() -> usize { 100 }
fn default_stream_capacity() -> usize { 1_024 }
fn default_level() -> String { "info".into() }
fn default_chain_id() -> u64 { 1 }
fn default_lookback() -> u64 { 1_000 }
fn default_max_block_range() -> u64 { 500 }
fn default_poll_interval_ms() -> u64 { 5_000 }
fn default_max_log_retries() -> u32 { 5 }
fn default_retry_base_delay_ms() -> u64 { 500 }
fn default_max_stored_events() -> usize { 1_000 }
fn default_checkpoint_path() -> PathBuf { PathBuf::from("data/checkpoint.json") }
fn default_seen_retention_blocks() -> u64 { 50_000 }
fn default_subscriber_queue_capacity() -> usize { 1_024 }

impl SyncConfig {
    /// A config with every default applied, for the given endpoint and contracts.
    pub fn new(rpc_url: impl Into<String>, contracts: Vec<ContractWatch>) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            chain_id: default_chain_id(),
            contracts,
            start_block: None,
            initial_lookback_blocks: default_lookback(),
            max_block_range: default_max_block_range(),
            poll_interval_ms: default_poll_interval_ms(),
            request_delay_ms: 0,
            max_log_retries: default_max_log_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            max_stored_events: default_max_stored_events(),
            checkpoint_path: default_checkpoint_path(),
            checkpoint_policy: CheckpointPolicy::default(),
            seen_retention_blocks: default_seen_retention_blocks(),
            subscriber_queue_capacity: default_subscriber_queue_capacity(),
            request_timeout_ms: None,
            server: ServerConfig::default(),
            log: LogConfig::default(),
        }
    }

    /// Load from a YAML or JSON file (chosen by extension), apply environment
    /// overrides, then validate.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&raw)?,
            _ => Self::from_yaml(&raw)?,
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(raw)?)
    }

    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Override selected fields from the environment.
    ///
    /// Recognised: `CHAINSYNC_RPC_URL`, `CHAINSYNC_CHECKPOINT_PATH`, `CHAINSYNC_LISTEN`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("CHAINSYNC_RPC_URL") {
            self.rpc_url = url;
        }
        if let Some(path) = lookup("CHAINSYNC_CHECKPOINT_PATH") {
            self.checkpoint_path = PathBuf::from(path);
        }
        if let Some(listen) = lookup("CHAINSYNC_LISTEN") {
            self.server.listen = listen;
        }
    }

    /// Reject configurations the scheduler cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rpc_url.trim().is_empty() {
            return Err(ConfigError::Invalid("rpcUrl must not be empty".into()));
        }
        if self.contracts.is_empty() {
            return Err(ConfigError::Invalid("at least one contract must be watched".into()));
        }
        for c in &self.contracts {
            if !is_hex_address(&c.address) {
                return Err(ConfigError::Invalid(format!(
                    "contract '{}' has malformed address {}",
                    c.tag, c.address
                )));
            }
        }
        if self.max_block_range == 0 {
            return Err(ConfigError::Invalid("maxBlockRange must be at least 1".into()));
        }
        if self.max_log_retries == 0 {
            return Err(ConfigError::Invalid("maxLogRetries must be at least 1".into()));
        }
        if self.max_stored_events == 0 {
            return Err(ConfigError::Invalid("maxStoredEvents must be at least 1".into()));
        }
        if self.subscriber_queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "subscriberQueueCapacity must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Addresses of every watched contract, in config order.
    pub fn addresses(&self) -> Vec<String> {
        self.contracts.iter().map(|c| c.address.clone()).collect()
    }
}

fn is_hex_address(s: &str) -> bool {
    s.strip_prefix("0x")
        .is_some_and(|h| h.len() == 40 && h.chars().all(|c| c.is_ascii_hexdigit()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
rpcUrl: http://localhost:8545
chainId: 31337
contracts:
  - address: "0x5FbDB2315678afecb367f032d93F642f64180aa3"
    tag: token
  - address: "0xe7f1725E7734CE288F8367e1Bb143E90bb3F0512"
    tag: pool
    events:
      - "Paused(address indexed account)"
startBlock: 120
maxBlockRange: 50
checkpointPolicy: conservative
server:
  listen: "127.0.0.1:9000"
"#;

    #[test]
    fn yaml_applies_defaults() {
        let cfg = SyncConfig::from_yaml(YAML).unwrap();
        assert_eq!(cfg.chain_id, 31337);
        assert_eq!(cfg.contracts.len(), 2);
        assert_eq!(cfg.contracts[1].events.len(), 1);
        assert_eq!(cfg.start_block, Some(120));
        assert_eq!(cfg.max_block_range, 50);
        assert_eq!(cfg.max_log_retries, 5);
        assert_eq!(cfg.max_stored_events, 1_000);
        assert_eq!(cfg.checkpoint_policy, CheckpointPolicy::Conservative);
        assert_eq!(cfg.server.listen, "127.0.0.1:9000");
        assert_eq!(cfg.server.default_query_limit, 100);
        assert_eq!(cfg.log.level, "info");
        cfg.validate().unwrap();
    }

    #[test]
    fn json_config_parses() {
        let raw = r#"{
            "rpcUrl": "https://rpc.example",
            "contracts": [{"address": "0x5FbDB2315678afecb367f032d93F642f64180aa3", "tag": "t"}],
            "pollIntervalMs": 1000
        }"#;
        let cfg = SyncConfig::from_json(raw).unwrap();
        assert_eq!(cfg.poll_interval_ms, 1000);
        assert_eq!(cfg.checkpoint_policy, CheckpointPolicy::Optimistic);
    }

    #[test]
    fn env_overrides_take_precedence() {
        let mut cfg = SyncConfig::from_yaml(YAML).unwrap();
        cfg.apply_env_overrides(|key| match key {
            "CHAINSYNC_RPC_URL" => Some("https://override".into()),
            "CHAINSYNC_CHECKPOINT_PATH" => Some("/tmp/cp.json".into()),
            _ => None,
        });
        assert_eq!(cfg.rpc_url, "https://override");
        assert_eq!(cfg.checkpoint_path, PathBuf::from("/tmp/cp.json"));
        assert_eq!(cfg.server.listen, "127.0.0.1:9000");
    }

    #[test]
    fn validate_rejects_bad_values() {
        let good = SyncConfig::from_yaml(YAML).unwrap();

        let mut cfg = good.clone();
        cfg.contracts.clear();
        assert!(cfg.validate().is_err());

        let mut cfg = good.clone();
        cfg.contracts[0].address = "0x1234".into();
        assert!(cfg.validate().is_err());

        let mut cfg = good.clone();
        cfg.max_block_range = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = good;
        cfg.max_log_retries = 0;
        assert!(cfg.validate().is_err());
    }
}
