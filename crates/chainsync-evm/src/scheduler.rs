//! The sync scheduler: single-flight periodic loop.
//!
//! # One cycle
//! 1. `from = checkpoint + 1` (or the resume rule if there is none)
//! 2. Stop early if the chain head is below `from`
//! 3. Fetch every window up to the head, decode and classify
//! 4. Sort by `(blockNumber, logIndex)`
//! 5. Dedup, append to the buffer and publish to the hub, in order
//! 6. Enforce buffer capacity
//! 7. Advance and persist the checkpoint per [`CheckpointPolicy`]
//! 8. Prune the seen-set and timestamp cache below `checkpoint - retention`
//!
//! A cycle that hits a connectivity error aborts before touching the buffer
//! or the checkpoint; the next tick retries the same range.

use std::sync::{Arc, Mutex as StdMutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use chainsync_core::buffer::EventBuffer;
use chainsync_core::checkpoint::{CheckpointManager, CheckpointStore};
use chainsync_core::config::{CheckpointPolicy, SyncConfig};
use chainsync_core::error::SyncResult;
use chainsync_core::hub::SubscriptionHub;
use chainsync_core::status::{SchedulerState, SyncStatus};
use chainsync_core::types::BlockchainEvent;

use crate::classifier::EventClassifier;
use crate::client::{ChainClient, EvmRpcClient};
use crate::fetcher::ResilientLogFetcher;

/// What a call to [`SyncScheduler::run_cycle`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Another cycle was in flight, or the scheduler is stopped.
    Skipped,
    /// Nothing new: the head is below the next block to scan.
    UpToDate { head: u64 },
    Synced(CycleReport),
}

/// Counters for one completed cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub from_block: u64,
    pub head: u64,
    /// Checkpoint after the cycle.
    pub checkpoint: Option<u64>,
    pub windows: usize,
    pub exhausted_windows: usize,
    pub logs: usize,
    /// Logs that did not decode into an event.
    pub skipped: usize,
    /// Events appended and published.
    pub emitted: usize,
    /// Events already seen.
    pub duplicates: usize,
    /// Events evicted by capacity.
    pub evicted: usize,
}

struct CycleState {
    checkpoint: Option<u64>,
}

struct Inner<C> {
    config: SyncConfig,
    addresses: Vec<String>,
    client: ChainClient<C>,
    fetcher: ResilientLogFetcher,
    classifier: EventClassifier,
    checkpoints: CheckpointManager,
    buffer: Arc<RwLock<EventBuffer>>,
    hub: SubscriptionHub,
    cycle: Mutex<CycleState>,
    status: StdMutex<SyncStatus>,
    shutdown: watch::Sender<bool>,
}

/// Orchestrates fetcher, classifier, buffer, hub and checkpoint.
///
/// Cheap to clone; clones share all state.
pub struct SyncScheduler<C> {
    inner: Arc<Inner<C>>,
}

impl<C> Clone for SyncScheduler<C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<C: EvmRpcClient + 'static> SyncScheduler<C> {
    /// Build a scheduler with a fresh buffer and hub.
    pub fn new(config: SyncConfig, client: C, store: Box<dyn CheckpointStore>) -> SyncResult<Self> {
        let buffer = Arc::new(RwLock::new(EventBuffer::new(config.max_stored_events)));
        let hub = SubscriptionHub::new(config.subscriber_queue_capacity);
        Self::from_parts(config, client, store, buffer, hub)
    }

    /// Build a scheduler that writes into an existing buffer and hub.
    pub fn from_parts(
        config: SyncConfig,
        client: C,
        store: Box<dyn CheckpointStore>,
        buffer: Arc<RwLock<EventBuffer>>,
        hub: SubscriptionHub,
    ) -> SyncResult<Self> {
        let classifier = EventClassifier::new(&config.contracts)?;
        let fetcher = ResilientLogFetcher::from_config(&config);
        let checkpoints = CheckpointManager::new(store, config.start_block, config.initial_lookback_blocks);
        let (shutdown, _) = watch::channel(false);
        Ok(Self {
            inner: Arc::new(Inner {
                addresses: config.addresses(),
                client: ChainClient::new(client),
                fetcher,
                classifier,
                checkpoints,
                buffer,
                hub,
                cycle: Mutex::new(CycleState { checkpoint: None }),
                status: StdMutex::new(SyncStatus::default()),
                shutdown,
                config,
            }),
        })
    }

    /// Load the persisted checkpoint. A malformed checkpoint is an error.
    pub async fn init(&self) -> SyncResult<Option<u64>> {
        let checkpoint = self.inner.checkpoints.load().await?;
        self.inner.cycle.lock().await.checkpoint = checkpoint;
        self.status_mut().last_synced_block = checkpoint;
        match checkpoint {
            Some(block) => tracing::info!(block, "resuming from checkpoint"),
            None => tracing::info!(
                start_block = ?self.inner.config.start_block,
                lookback = self.inner.config.initial_lookback_blocks,
                "no checkpoint, starting fresh"
            ),
        }
        Ok(checkpoint)
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    pub fn buffer(&self) -> Arc<RwLock<EventBuffer>> {
        self.inner.buffer.clone()
    }

    pub fn hub(&self) -> SubscriptionHub {
        self.inner.hub.clone()
    }

    pub fn client(&self) -> &ChainClient<C> {
        &self.inner.client
    }

    pub fn status(&self) -> SyncStatus {
        self.status_mut().clone()
    }

    fn status_mut(&self) -> MutexGuard<'_, SyncStatus> {
        self.inner.status.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn is_stopped(&self) -> bool {
        *self.inner.shutdown.borrow()
    }

    /// Run one cycle unless one is already running.
    pub async fn run_cycle(&self) -> SyncResult<CycleOutcome> {
        if self.is_stopped() {
            return Ok(CycleOutcome::Skipped);
        }
        let Ok(mut state) = self.inner.cycle.try_lock() else {
            tracing::debug!("cycle already in flight, skipping tick");
            return Ok(CycleOutcome::Skipped);
        };
        self.status_mut().state = SchedulerState::Running;

        let result = self.sync_once(&mut state).await;

        let mut status = self.status_mut();
        status.state = if self.is_stopped() {
            SchedulerState::Stopped
        } else {
            SchedulerState::Idle
        };
        status.last_synced_block = state.checkpoint;
        status.last_cycle_at = Some(Utc::now());
        match &result {
            Ok(outcome) => {
                status.cycles += 1;
                status.last_error = None;
                match outcome {
                    CycleOutcome::Synced(report) => {
                        status.last_head = Some(report.head);
                        status.events_emitted += report.emitted as u64;
                        status.exhausted_windows += report.exhausted_windows as u64;
                    }
                    CycleOutcome::UpToDate { head } => status.last_head = Some(*head),
                    CycleOutcome::Skipped => {}
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, checkpoint = ?state.checkpoint, "sync cycle aborted");
                status.last_error = Some(e.to_string());
            }
        }
        result
    }

    async fn sync_once(&self, state: &mut CycleState) -> SyncResult<CycleOutcome> {
        let inner = &*self.inner;
        let head = inner.client.current_height().await?;
        let from = inner.checkpoints.resume_block(state.checkpoint, head);
        if head < from {
            tracing::debug!(head, from, "up to date");
            return Ok(CycleOutcome::UpToDate { head });
        }

        let scan = inner.fetcher.scan(&inner.client, &inner.addresses, from, head).await?;
        let mut report = CycleReport {
            from_block: from,
            head,
            windows: scan.windows,
            exhausted_windows: scan.exhausted.len(),
            logs: scan.logs.len(),
            ..Default::default()
        };

        let mut decoded = Vec::with_capacity(scan.logs.len());
        for log in &scan.logs {
            match inner.classifier.decode(log) {
                Ok(d) => decoded.push(d),
                Err(reason) => {
                    report.skipped += 1;
                    tracing::debug!(tx = %log.tx_hash, log_index = %log.log_index, %reason, "skipping log");
                }
            }
        }
        decoded.sort_by_key(|d| d.position());

        // Resolve timestamps before touching the buffer so an abort leaves no partial batch.
        let fresh: Vec<_> = {
            let buffer = inner.buffer.read().await;
            decoded.into_iter().filter(|d| !buffer.contains(&d.id())).collect()
        };
        report.duplicates = report.logs - report.skipped - fresh.len();
        let mut events: Vec<BlockchainEvent> = Vec::with_capacity(fresh.len());
        for d in fresh {
            let timestamp = inner.client.block_timestamp(d.block_number).await?;
            events.push(inner.classifier.into_event(d, timestamp));
        }

        {
            let mut buffer = inner.buffer.write().await;
            for event in events {
                if buffer.append(event.clone()) {
                    inner.hub.publish(event);
                    report.emitted += 1;
                } else {
                    report.duplicates += 1;
                }
            }
            report.evicted = buffer.enforce_capacity();
        }

        let advance_to = match inner.config.checkpoint_policy {
            CheckpointPolicy::Optimistic => Some(head),
            CheckpointPolicy::Conservative => scan.scanned_to,
        };
        if let Some(block) = advance_to.filter(|b| state.checkpoint.map_or(true, |cp| *b > cp)) {
            state.checkpoint = Some(block);
            inner.checkpoints.save_best_effort(block).await;
        }
        report.checkpoint = state.checkpoint;

        if let Some(cp) = state.checkpoint {
            let below = cp.saturating_sub(inner.config.seen_retention_blocks);
            let pruned_ids = inner.buffer.write().await.prune_seen(below);
            let pruned_ts = inner.client.prune_timestamps(below);
            if pruned_ids + pruned_ts > 0 {
                tracing::debug!(below, pruned_ids, pruned_ts, "pruned caches");
            }
        }

        tracing::info!(
            from,
            head,
            checkpoint = ?report.checkpoint,
            windows = report.windows,
            exhausted = report.exhausted_windows,
            emitted = report.emitted,
            skipped = report.skipped,
            "sync cycle complete"
        );
        Ok(CycleOutcome::Synced(report))
    }

    /// Spawn the periodic loop. The first cycle runs immediately.
    pub fn start(&self) -> JoinHandle<()> {
        let this = self.clone();
        let mut shutdown = self.inner.shutdown.subscribe();
        let period = Duration::from_millis(self.inner.config.poll_interval_ms.max(1));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            tracing::info!(poll_ms = period.as_millis() as u64, "sync scheduler started");
            loop {
                tokio::select! {
                    _ = interval.tick() => {}
                    _ = shutdown.changed() => break,
                }
                if *shutdown.borrow() {
                    break;
                }
                // Errors are recorded in the status; the next tick retries.
                let _ = this.run_cycle().await;
            }
            tracing::info!("sync scheduler stopped");
        })
    }

    /// Prevent future cycles. An in-flight cycle finishes normally.
    pub fn stop(&self) {
        self.inner.shutdown.send_replace(true);
        let mut status = self.status_mut();
        if status.state != SchedulerState::Running {
            status.state = SchedulerState::Stopped;
        }
    }

    /// Forget the checkpoint, in memory and on disk.
    pub async fn reset_checkpoint(&self) -> SyncResult<()> {
        let mut state = self.inner.cycle.lock().await;
        self.inner.checkpoints.reset().await?;
        state.checkpoint = None;
        self.status_mut().last_synced_block = None;
        Ok(())
    }
}
