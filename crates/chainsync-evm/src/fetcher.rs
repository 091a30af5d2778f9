//! Resilient log fetcher.
//!
//! Splits a block range into windows of at most `max_block_range` blocks and
//! fetches them one after another. A rate-limited window is retried with
//! exponential backoff; once its attempts are exhausted it contributes no logs
//! and is recorded in the [`ScanReport`]. Any other RPC error aborts the scan.

use std::time::Duration;

use chainsync_core::config::{CheckpointPolicy, SyncConfig};
use chainsync_core::error::SyncResult;

use crate::client::{ChainClient, EvmRpcClient, RawLog};
use crate::retry::{RetryConfig, RetryPolicy};

/// Outcome of one [`ResilientLogFetcher::scan`].
#[derive(Debug, Default)]
pub struct ScanReport {
    /// Logs from every window that succeeded, in window order.
    pub logs: Vec<RawLog>,
    /// Windows attempted.
    pub windows: usize,
    /// Windows that yielded nothing because every attempt was rate-limited.
    pub exhausted: Vec<(u64, u64)>,
    /// Last block of the contiguous run of successful windows from the scan
    /// start; `None` if the first window was exhausted.
    pub scanned_to: Option<u64>,
}

impl ScanReport {
    pub fn is_complete(&self) -> bool {
        self.exhausted.is_empty()
    }
}

/// Sequential windowed `eth_getLogs` with rate-limit backoff.
#[derive(Debug, Clone)]
pub struct ResilientLogFetcher {
    max_block_range: u64,
    request_delay: Duration,
    retry: RetryPolicy,
    stop_on_exhausted: bool,
}

impl ResilientLogFetcher {
    pub fn new(max_block_range: u64, retry: RetryPolicy) -> Self {
        Self {
            max_block_range: max_block_range.max(1),
            request_delay: Duration::ZERO,
            retry,
            stop_on_exhausted: false,
        }
    }

    /// Build from config: window size, throttle delay, retry budget and
    /// whether the checkpoint policy needs the scan to stop early.
    pub fn from_config(config: &SyncConfig) -> Self {
        let retry = RetryPolicy::new(RetryConfig {
            max_attempts: config.max_log_retries,
            initial_backoff: Duration::from_millis(config.retry_base_delay_ms),
            ..Default::default()
        });
        Self::new(config.max_block_range, retry)
            .with_request_delay(Duration::from_millis(config.request_delay_ms))
            .stop_on_exhausted(config.checkpoint_policy == CheckpointPolicy::Conservative)
    }

    /// Fixed pause between consecutive windows.
    pub fn with_request_delay(mut self, delay: Duration) -> Self {
        self.request_delay = delay;
        self
    }

    /// End the scan at the first exhausted window instead of skipping it.
    pub fn stop_on_exhausted(mut self, stop: bool) -> Self {
        self.stop_on_exhausted = stop;
        self
    }

    /// Consecutive inclusive windows covering `[from, to]`.
    pub fn windows(&self, from: u64, to: u64) -> Vec<(u64, u64)> {
        let mut out = Vec::new();
        if to < from {
            return out;
        }
        let mut start = from;
        loop {
            let end = start.saturating_add(self.max_block_range - 1).min(to);
            out.push((start, end));
            if end >= to {
                break;
            }
            start = end + 1;
        }
        out
    }

    /// Fetch all logs for `addresses` in `[from, to]`.
    pub async fn scan<C: EvmRpcClient>(
        &self,
        client: &ChainClient<C>,
        addresses: &[String],
        from: u64,
        to: u64,
    ) -> SyncResult<ScanReport> {
        let mut report = ScanReport::default();
        let mut contiguous = true;

        for (i, (start, end)) in self.windows(from, to).into_iter().enumerate() {
            if i > 0 && !self.request_delay.is_zero() {
                tokio::time::sleep(self.request_delay).await;
            }
            report.windows += 1;

            match self.fetch_window(client, addresses, start, end).await? {
                Some(logs) => {
                    tracing::debug!(from = start, to = end, logs = logs.len(), "window fetched");
                    report.logs.extend(logs);
                    if contiguous {
                        report.scanned_to = Some(end);
                    }
                }
                None => {
                    report.exhausted.push((start, end));
                    contiguous = false;
                    if self.stop_on_exhausted {
                        tracing::warn!(from = start, to = end, "stopping scan at exhausted window");
                        break;
                    }
                }
            }
        }
        Ok(report)
    }

    /// `Ok(None)` when every attempt was rate-limited.
    async fn fetch_window<C: EvmRpcClient>(
        &self,
        client: &ChainClient<C>,
        addresses: &[String],
        from: u64,
        to: u64,
    ) -> SyncResult<Option<Vec<RawLog>>> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match client.fetch_logs(addresses, from, to).await {
                Ok(logs) => return Ok(Some(logs)),
                Err(e) if e.is_rate_limited() => match self.retry.next_delay(attempt) {
                    Some(delay) => {
                        tracing::warn!(
                            from,
                            to,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "rate limited, backing off"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        tracing::error!(
                            from,
                            to,
                            attempts = attempt,
                            error = %e,
                            "giving up on window after repeated rate limiting"
                        );
                        return Ok(None);
                    }
                },
                Err(e) => return Err(e),
            }
        }
    }
}
