//! `statistics.get` surface (spec §6, SPEC_FULL §2.1): totals plus a
//! breakdown of workload counts by `(type, state)`, grounded on the
//! original daemon's `ProvisionCounters`
//! (`examples/original_source/pkg/provision.go`).

use provisiond_types::{Capacity, WorkloadResultState, WorkloadType};
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize)]
pub struct UsersStats {
    pub deployments: u64,
    pub workloads: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkloadCount {
    pub type_: WorkloadType,
    pub state: WorkloadResultState,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Statistics {
    pub total: Capacity,
    pub used: Capacity,
    pub system: Capacity,
    pub users: UsersStats,
    pub workload_counts: Vec<WorkloadCount>,
}

#[derive(Default)]
pub(crate) struct CounterBuilder {
    counts: HashMap<(WorkloadType, WorkloadResultState), u64>,
}

impl CounterBuilder {
    pub(crate) fn record(&mut self, type_: WorkloadType, state: WorkloadResultState) {
        *self.counts.entry((type_, state)).or_insert(0) += 1;
    }

    pub(crate) fn into_sorted(self) -> Vec<WorkloadCount> {
        let mut out: Vec<WorkloadCount> = self
            .counts
            .into_iter()
            .map(|((type_, state), count)| WorkloadCount { type_, state, count })
            .collect();
        out.sort_by(|a, b| format!("{:?}{:?}", a.type_, a.state).cmp(&format!("{:?}{:?}", b.type_, b.state)));
        out
    }
}
