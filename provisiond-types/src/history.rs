//! Per-deployment result history (spec §4.4 `changes`).

use crate::workload::WorkloadResult;
use serde::{Deserialize, Serialize};

/// One recorded transition of a single workload's result, in the
/// order committed to the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub workload_name: String,
    pub result: WorkloadResult,
}
