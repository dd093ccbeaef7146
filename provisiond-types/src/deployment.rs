//! Deployments: tenant-submitted, signed bundles of workloads (spec §3).

use crate::workload::Workload;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub type TwinId = u32;
pub type DeploymentId = u64;

/// Threshold signature requirement carried by a deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignatureRequirement {
    pub threshold: u32,
    pub signers: Vec<TwinId>,
}

/// A tenant-submitted bundle, addressed by `(twin, id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deployment {
    pub twin: TwinId,
    pub id: DeploymentId,
    pub version: u32,
    pub signature_requirement: SignatureRequirement,
    pub workloads: Vec<Workload>,
    pub expiration: Option<DateTime<Utc>>,
    /// Set once a delete has been accepted; workloads continue to
    /// deprovision but the record is not removed from the store until
    /// every workload reaches a terminal deprovisioned state.
    #[serde(default)]
    pub to_delete: bool,
    /// Set by an admin-authorized force-delete (a supplemented
    /// feature distinct from the tenant-initiated `delete`, grounded
    /// in the original daemon's `DecommissionCached`); records why an
    /// admin bypassed tenant signature checks to tear this deployment
    /// down.
    #[serde(default)]
    pub delete_reason: Option<String>,
}

impl Deployment {
    /// Names of workloads currently present (irrespective of result
    /// state) used for reference-integrity checks (spec §3 invariant 4).
    pub fn workload_names(&self) -> HashSet<&str> {
        self.workloads.iter().map(|w| w.name.as_str()).collect()
    }

    pub fn workload(&self, name: &str) -> Option<&Workload> {
        self.workloads.iter().find(|w| w.name == name)
    }

    pub fn workload_mut(&mut self, name: &str) -> Option<&mut Workload> {
        self.workloads.iter_mut().find(|w| w.name == name)
    }

    /// Validates the reference graph named by workloads' `data` is a
    /// DAG over names present in this same deployment (spec §3
    /// invariant 4, spec §9 cyclic-reference ban).
    pub fn validate_references(&self) -> Result<(), String> {
        let names = self.workload_names();
        for wl in &self.workloads {
            for reference in wl.references() {
                if !names.contains(reference.as_str()) {
                    return Err(format!(
                        "workload '{}' references unknown workload '{}'",
                        wl.name, reference
                    ));
                }
                if reference == wl.name {
                    return Err(format!("workload '{}' references itself", wl.name));
                }
            }
        }
        if let Some(cycle) = self.find_cycle() {
            return Err(format!("reference cycle detected: {}", cycle.join(" -> ")));
        }
        Ok(())
    }

    fn find_cycle(&self) -> Option<Vec<String>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Visiting,
            Done,
        }
        use std::collections::HashMap;

        fn visit<'a>(
            name: &'a str,
            dep: &'a Deployment,
            marks: &mut HashMap<&'a str, Mark>,
            stack: &mut Vec<String>,
        ) -> Option<Vec<String>> {
            match marks.get(name) {
                Some(Mark::Done) => return None,
                Some(Mark::Visiting) => {
                    stack.push(name.to_string());
                    return Some(stack.clone());
                }
                None => {}
            }
            marks.insert(name, Mark::Visiting);
            stack.push(name.to_string());
            if let Some(wl) = dep.workload(name) {
                for reference in wl.references() {
                    if let Some(cycle) = visit(&reference, dep, marks, stack) {
                        return Some(cycle);
                    }
                }
            }
            stack.pop();
            marks.insert(name, Mark::Done);
            None
        }

        let mut marks = HashMap::new();
        for wl in &self.workloads {
            let mut stack = Vec::new();
            if let Some(cycle) = visit(&wl.name, self, &mut marks, &mut stack) {
                return Some(cycle);
            }
        }
        None
    }

    /// A canonical byte serialization suitable for signature verification.
    /// Deterministic because `serde_json` field order is preserved by
    /// construction and this is used only for verifying against the
    /// bytes the tenant actually signed, not for storage.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("Deployment always serializes")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workload::{WorkloadType};
    use chrono::Utc;

    fn dep_with(workloads: Vec<Workload>) -> Deployment {
        Deployment {
            twin: 1,
            id: 1,
            version: 1,
            signature_requirement: SignatureRequirement { threshold: 1, signers: vec![1] },
            workloads,
            expiration: None,
            to_delete: false,
            delete_reason: None,
        }
    }

    #[test]
    fn unknown_reference_rejected() {
        let now = Utc::now();
        let vm = Workload::new(
            "vm-0",
            WorkloadType::VirtualMachine,
            1,
            serde_json::json!({"mounts": ["missing-disk"]}),
            now,
        );
        let dep = dep_with(vec![vm]);
        assert!(dep.validate_references().is_err());
    }

    #[test]
    fn dag_reference_accepted() {
        let now = Utc::now();
        let disk = Workload::new("disk-0", WorkloadType::PersistentDisk, 1, serde_json::json!({"size_gib": 10}), now);
        let vm = Workload::new("vm-0", WorkloadType::VirtualMachine, 1, serde_json::json!({"mounts": ["disk-0"]}), now);
        let dep = dep_with(vec![disk, vm]);
        assert!(dep.validate_references().is_ok());
    }

    #[test]
    fn cycle_rejected() {
        let now = Utc::now();
        let a = Workload::new("a", WorkloadType::VirtualMachine, 1, serde_json::json!({"mounts": ["b"]}), now);
        let b = Workload::new("b", WorkloadType::VirtualMachine, 1, serde_json::json!({"mounts": ["a"]}), now);
        let dep = dep_with(vec![a, b]);
        assert!(dep.validate_references().is_err());
    }
}
