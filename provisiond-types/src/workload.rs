//! Workloads: typed, named units inside a deployment (spec §3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The enumerated set of workload types a deployment may bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkloadType {
    PersistentDisk,
    ContentFs,
    OverlayNetwork,
    PublicIpv4,
    PublicIp,
    ObjectStoreNamespace,
    VirtualMachine,
    NamedGateway,
    FqdnGateway,
    LogStream,
}

impl WorkloadType {
    /// Start-up provision ordering (spec §4.4): dependencies before
    /// dependents. Lower rank is dispatched first; workloads with
    /// equal rank may run in any relative order.
    pub fn startup_rank(&self) -> u8 {
        match self {
            WorkloadType::PersistentDisk
            | WorkloadType::ContentFs
            | WorkloadType::OverlayNetwork
            | WorkloadType::PublicIpv4
            | WorkloadType::PublicIp => 0,
            WorkloadType::VirtualMachine
            | WorkloadType::ObjectStoreNamespace
            | WorkloadType::NamedGateway
            | WorkloadType::FqdnGateway
            | WorkloadType::LogStream => 1,
        }
    }

    /// Whether this type's own `ok` contribution counts towards
    /// measured capacity. Networks consume no measured capacity
    /// (spec §3, invariant 2).
    pub fn consumes_capacity(&self) -> bool {
        !matches!(self, WorkloadType::OverlayNetwork)
    }
}

/// Last attempted outcome of a workload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkloadResultState {
    Init,
    Ok,
    Error,
    Deleted,
    Paused,
    Unchanged,
}

impl WorkloadResultState {
    /// Whether `self -> next` is a legal transition per the state
    /// machine drawn in spec §4.4. Illegal transitions are refused by
    /// the store with `invalid-transition` (folded into
    /// [`provisiond_types::error::EngineError::Invalid`] at the
    /// engine's public boundary).
    pub fn can_transition_to(&self, next: WorkloadResultState) -> bool {
        use WorkloadResultState::*;
        match (*self, next) {
            // init can go anywhere a first attempt lands, or straight
            // to deleted if the deployment is torn down before the
            // workload ever ran.
            (Init, Ok) | (Init, Error) | (Init, Deleted) => true,
            // ok can be re-confirmed, updated, error out, be deleted,
            // or paused.
            (Ok, Ok) | (Ok, Unchanged) | (Ok, Error) | (Ok, Deleted) | (Ok, Paused) => true,
            // error is terminal except for deletion (deprovision of a
            // workload that never successfully claimed capacity).
            (Error, Deleted) => true,
            // paused can resume back to ok, be deprovisioned, or error out.
            (Paused, Ok) | (Paused, Deleted) | (Paused, Error) => true,
            // unchanged behaves like ok: it can be re-confirmed, updated,
            // error out, be deleted, or paused.
            (Unchanged, Ok) | (Unchanged, Unchanged) | (Unchanged, Error) | (Unchanged, Deleted) | (Unchanged, Paused) => true,
            // deleted is terminal.
            _ => false,
        }
    }
}

/// The recorded outcome of the last attempted action on a workload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkloadResult {
    pub state: WorkloadResultState,
    pub data: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl WorkloadResult {
    pub fn init(now: DateTime<Utc>) -> Self {
        WorkloadResult {
            state: WorkloadResultState::Init,
            data: None,
            error_message: None,
            timestamp: now,
        }
    }

    pub fn ok(data: serde_json::Value, now: DateTime<Utc>) -> Self {
        WorkloadResult {
            state: WorkloadResultState::Ok,
            data: Some(data),
            error_message: None,
            timestamp: now,
        }
    }

    pub fn error(message: impl Into<String>, now: DateTime<Utc>) -> Self {
        WorkloadResult {
            state: WorkloadResultState::Error,
            data: None,
            error_message: Some(message.into()),
            timestamp: now,
        }
    }

    pub fn deleted(now: DateTime<Utc>) -> Self {
        WorkloadResult {
            state: WorkloadResultState::Deleted,
            data: None,
            error_message: None,
            timestamp: now,
        }
    }

    pub fn paused(data: Option<serde_json::Value>, now: DateTime<Utc>) -> Self {
        WorkloadResult {
            state: WorkloadResultState::Paused,
            data,
            error_message: None,
            timestamp: now,
        }
    }

    pub fn unchanged(now: DateTime<Utc>) -> Self {
        WorkloadResult {
            state: WorkloadResultState::Unchanged,
            data: None,
            error_message: None,
            timestamp: now,
        }
    }
}

/// A typed, named unit of work inside a deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workload {
    pub name: String,
    #[serde(rename = "type")]
    pub type_: WorkloadType,
    pub version: u32,
    pub data: serde_json::Value,
    pub result: WorkloadResult,
}

impl Workload {
    pub fn new(name: impl Into<String>, type_: WorkloadType, version: u32, data: serde_json::Value, now: DateTime<Utc>) -> Self {
        Workload {
            name: name.into(),
            type_,
            version,
            data,
            result: WorkloadResult::init(now),
        }
    }

    /// Whether this workload's `data` references another workload by
    /// name, as declared by convention in well-known payload fields
    /// (`mounts`, `network`, `vm`, `ip`). Reference integrity (spec §3
    /// invariant 4) is enforced against these.
    pub fn references(&self) -> Vec<String> {
        const REF_FIELDS: &[&str] = &["mounts", "network", "vm", "ip", "gateway"];
        let mut out = Vec::new();
        if let serde_json::Value::Object(map) = &self.data {
            for field in REF_FIELDS {
                match map.get(*field) {
                    Some(serde_json::Value::String(s)) => out.push(s.clone()),
                    Some(serde_json::Value::Array(items)) => {
                        for item in items {
                            if let serde_json::Value::String(s) = item {
                                out.push(s.clone());
                            }
                        }
                    }
                    _ => {}
                }
            }
        }
        out
    }
}
