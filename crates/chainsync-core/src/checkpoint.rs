//! Checkpoint store: persists the last synced block for crash recovery.
//!
//! The checkpoint is a single JSON object, `{"lastSyncedBlock": <n>}`. On
//! restart the scheduler resumes from `lastSyncedBlock + 1` rather than
//! re-scanning from the configured start.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::SyncError;

/// The persisted sync position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    /// Last block whose logs have been scanned.
    pub last_synced_block: u64,
}

/// Trait for storing and loading the checkpoint.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Load the checkpoint; `None` if nothing was ever saved.
    async fn load(&self) -> Result<Option<Checkpoint>, SyncError>;

    /// Save (overwrite) the checkpoint.
    async fn save(&self, checkpoint: Checkpoint) -> Result<(), SyncError>;

    /// Delete the checkpoint (resetting the indexer).
    async fn delete(&self) -> Result<(), SyncError>;
}

// ─── JSON file store ──────────────────────────────────────────────────────────

/// Checkpoint persisted as a JSON file at a fixed path.
///
/// Writes go to a sibling temp file that is renamed over the target, so a
/// crash mid-write leaves the previous checkpoint intact.
#[derive(Debug, Clone)]
pub struct JsonFileCheckpointStore {
    path: PathBuf,
}

impl JsonFileCheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "checkpoint".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl CheckpointStore for JsonFileCheckpointStore {
    async fn load(&self) -> Result<Option<Checkpoint>, SyncError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(SyncError::Io(e)),
        };
        let cp = serde_json::from_str(&raw).map_err(|e| {
            SyncError::Checkpoint(format!("malformed checkpoint {}: {e}", self.path.display()))
        })?;
        Ok(Some(cp))
    }

    async fn save(&self, checkpoint: Checkpoint) -> Result<(), SyncError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.temp_path();
        let body = serde_json::to_vec_pretty(&checkpoint)?;
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    async fn delete(&self) -> Result<(), SyncError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SyncError::Io(e)),
        }
    }
}

// ─── In-memory store (for testing) ────────────────────────────────────────────

/// In-memory checkpoint store for tests and ephemeral indexers.
#[derive(Default)]
pub struct MemoryCheckpointStore {
    data: Mutex<Option<Checkpoint>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that already holds `block` as its checkpoint.
    pub fn at(block: u64) -> Self {
        Self {
            data: Mutex::new(Some(Checkpoint { last_synced_block: block })),
        }
    }

    fn slot(&self) -> Result<std::sync::MutexGuard<'_, Option<Checkpoint>>, SyncError> {
        self.data
            .lock()
            .map_err(|_| SyncError::Checkpoint("checkpoint lock poisoned".into()))
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn load(&self) -> Result<Option<Checkpoint>, SyncError> {
        Ok(*self.slot()?)
    }

    async fn save(&self, checkpoint: Checkpoint) -> Result<(), SyncError> {
        *self.slot()? = Some(checkpoint);
        Ok(())
    }

    async fn delete(&self) -> Result<(), SyncError> {
        *self.slot()? = None;
        Ok(())
    }
}

// ─── Manager ──────────────────────────────────────────────────────────────────

/// Applies the resume rule and best-effort persistence on top of a store.
pub struct CheckpointManager {
    store: Box<dyn CheckpointStore>,
    start_block: Option<u64>,
    lookback_blocks: u64,
}

impl CheckpointManager {
    pub fn new(
        store: Box<dyn CheckpointStore>,
        start_block: Option<u64>,
        lookback_blocks: u64,
    ) -> Self {
        Self {
            store,
            start_block,
            lookback_blocks,
        }
    }

    /// Load the saved checkpoint height (returns `None` if none exists).
    pub async fn load(&self) -> Result<Option<u64>, SyncError> {
        Ok(self.store.load().await?.map(|cp| cp.last_synced_block))
    }

    /// First block the next scan should cover.
    ///
    /// `checkpoint + 1` if one exists, else the configured start block,
    /// else `head - lookback` (saturating).
    pub fn resume_block(&self, checkpoint: Option<u64>, head: u64) -> u64 {
        match (checkpoint, self.start_block) {
            (Some(cp), _) => cp + 1,
            (None, Some(start)) => start,
            (None, None) => head.saturating_sub(self.lookback_blocks),
        }
    }

    /// Persist `block`; failures are logged and swallowed.
    ///
    /// Returns `true` if the write succeeded.
    pub async fn save_best_effort(&self, block: u64) -> bool {
        match self.store.save(Checkpoint { last_synced_block: block }).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(block, error = %e, "failed to persist checkpoint");
                false
            }
        }
    }

    /// Remove the persisted checkpoint.
    pub async fn reset(&self) -> Result<(), SyncError> {
        self.store.delete().await
    }
}
