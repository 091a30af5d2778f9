//! Error types for the chainsync pipeline.

use thiserror::Error;

/// Errors that can occur while syncing.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("RPC error: {0}")]
    Rpc(String),

    /// The provider refused the request because of rate or compute-unit limits.
    #[error("Rate limited by provider: {0}")]
    RateLimited(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl SyncError {
    /// Returns `true` if the error is a provider-side rate limit (retryable with backoff).
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited(_))
    }
}

/// Convenience alias used across the workspace.
pub type SyncResult<T> = Result<T, SyncError>;

/// Returns `true` if a provider error message looks like a rate or quota rejection.
///
/// Providers word these differently: Alchemy reports exceeded compute units,
/// Infura "project ID request rate exceeded", QuickNode "throughput limit".
pub fn looks_rate_limited(message: &str) -> bool {
    let msg = message.to_ascii_lowercase();
    msg.contains("429")
        || msg.contains("rate limit")
        || msg.contains("rate-limit")
        || msg.contains("request rate")
        || msg.contains("too many requests")
        || msg.contains("throughput")
        || msg.contains("compute unit")
        || msg.contains("exceeded its compute")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_markers() {
        assert!(looks_rate_limited("HTTP 429: Too Many Requests"));
        assert!(looks_rate_limited(
            "Your app has exceeded its compute units per second capacity"
        ));
        assert!(looks_rate_limited("project ID request rate exceeded"));
        assert!(looks_rate_limited("Throughput limit reached"));
        assert!(!looks_rate_limited("execution reverted"));
        assert!(!looks_rate_limited("connection refused"));
    }

    #[test]
    fn is_rate_limited_only_for_rate_variant() {
        assert!(SyncError::RateLimited("x".into()).is_rate_limited());
        assert!(!SyncError::Rpc("rate limit".into()).is_rate_limited());
    }
}
