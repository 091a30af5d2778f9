//! Scheduler state and status snapshot types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Runtime state of the sync scheduler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerState {
    /// Waiting for the next tick.
    #[default]
    Idle,
    /// A sync cycle is in flight.
    Running,
    /// `stop()` was called; no further cycles will start.
    Stopped,
}

impl std::fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Running => write!(f, "running"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Point-in-time view of the scheduler, served by `/health`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub state: SchedulerState,
    /// Checkpoint held in memory; authoritative until restart.
    pub last_synced_block: Option<u64>,
    /// Chain head observed by the most recent cycle.
    pub last_head: Option<u64>,
    /// Completed cycles, including up-to-date ones.
    pub cycles: u64,
    /// Events appended to the buffer since startup.
    pub events_emitted: u64,
    /// Windows that gave up after exhausting retries, since startup.
    pub exhausted_windows: u64,
    /// Message of the last aborted cycle, cleared by the next success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_cycle_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_camel_case() {
        let status = SyncStatus {
            state: SchedulerState::Running,
            last_synced_block: Some(99),
            cycles: 3,
            ..Default::default()
        };
        let v = serde_json::to_value(&status).unwrap();
        assert_eq!(v["state"], "running");
        assert_eq!(v["lastSyncedBlock"], 99);
        assert!(v.get("lastError").is_none());
        assert_eq!(SchedulerState::Stopped.to_string(), "stopped");
    }
}
