//! The deployment context handed to every manager call.

use provisiond_types::{DeploymentId, TwinId, Workload};
use std::collections::HashMap;

/// Read-only view of a deployment's sibling workloads plus its
/// address, handed to a manager so it can resolve references (e.g. a
/// VM looking up the disk it mounts by name).
pub struct DeployContext<'a> {
    pub twin: TwinId,
    pub deployment_id: DeploymentId,
    siblings: HashMap<&'a str, &'a Workload>,
}

impl<'a> DeployContext<'a> {
    pub fn new(twin: TwinId, deployment_id: DeploymentId, workloads: &'a [Workload]) -> Self {
        let siblings = workloads.iter().map(|w| (w.name.as_str(), w)).collect();
        DeployContext { twin, deployment_id, siblings }
    }

    pub fn sibling(&self, name: &str) -> Option<&Workload> {
        self.siblings.get(name).copied()
    }
}
