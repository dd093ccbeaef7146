//! Shared data model for the provisiond node-local provisioning engine.
//!
//! This crate is the dependency-free foundation every other
//! `provisiond-*` crate builds on: the workload/deployment/capacity
//! shapes, the job-queue record, and the error taxonomy of spec §7.

pub mod capacity;
pub mod deployment;
pub mod error;
pub mod history;
pub mod job;
pub mod workload;

pub use capacity::{Axis, Capacity};
pub use deployment::{Deployment, DeploymentId, SignatureRequirement, TwinId};
pub use error::{EngineError, EngineResult, ManagerError};
pub use history::HistoryEntry;
pub use job::{Job, JobAction, JobOutcome};
pub use workload::{Workload, WorkloadResult, WorkloadResultState, WorkloadType};
