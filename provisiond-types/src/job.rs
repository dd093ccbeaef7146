//! Durable per-deployment job records (spec §4.1).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The action a job asks a primitive manager to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobAction {
    Provision,
    Update,
    Deprovision,
    Pause,
    Resume,
}

/// A durable FIFO entry: an action to perform on one named workload
/// inside one deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub sequence: u64,
    pub workload_name: String,
    pub action: JobAction,
    /// Incremented on each transient-failure re-enqueue; drives the
    /// exponential backoff delay (spec §7).
    pub attempt: u32,
    /// The job is not dequeued for execution before this instant;
    /// used to implement the decorrelated-jitter backoff.
    pub not_before: DateTime<Utc>,
}

impl Job {
    pub fn new(sequence: u64, workload_name: impl Into<String>, action: JobAction, now: DateTime<Utc>) -> Self {
        Job {
            sequence,
            workload_name: workload_name.into(),
            action,
            attempt: 0,
            not_before: now,
        }
    }
}

/// The classification a manager call returns, driving re-enqueue vs.
/// terminal recording (spec §7 propagation policy).
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Ok(serde_json::Value),
    Unchanged,
    /// May be retried; job is re-enqueued at the tail with backoff.
    Transient(String),
    /// Finalizes the workload as `error` and frees any claimed capacity.
    Permanent(String),
    NotSupported,
}
