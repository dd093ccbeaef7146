//! Manager registry (spec §4.3).
//!
//! Resolves a workload type to its capability object: optional
//! `provision`/`deprovision`/`update`/`pause`/`resume` entry points.
//! The registry is immutable after construction — the teacher's
//! `Primitives` type builds exactly this kind of fixed
//! type-to-handler map at start-up
//! (`examples/original_source/pkg/primitives/provisioner.go`'s
//! `NewMapProvisioner`); this is the Rust-native trait-object version
//! of that map.
//!
//! The actual primitive managers — how a VM is booted, how a disk is
//! carved out of a pool, how an overlay network is wired — are out of
//! scope for this engine (spec §1); the managers shipped here are
//! accounting-only placeholders that a node wires in at construction
//! time in their place.

pub mod context;
pub mod managers;

use async_trait::async_trait;
use provisiond_types::{Capacity, ManagerError, Workload, WorkloadType};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub use context::DeployContext;

/// The capability object for one workload type. Default entry points
/// return `NotSupported`; a type opts in by overriding the method.
#[async_trait]
pub trait Manager: Send + Sync {
    /// The capacity this workload's `data` implies, used by the
    /// engine to compute admission deltas (spec §4.4) independent of
    /// whether the workload has actually been provisioned yet.
    fn declared_capacity(&self, data: &serde_json::Value) -> Capacity;

    async fn provision(
        &self,
        ctx: &DeployContext,
        workload: &Workload,
        cancel: CancellationToken,
    ) -> Result<serde_json::Value, ManagerError>;

    async fn deprovision(
        &self,
        _ctx: &DeployContext,
        _workload: &Workload,
        _cancel: CancellationToken,
    ) -> Result<(), ManagerError> {
        Ok(())
    }

    async fn update(
        &self,
        _ctx: &DeployContext,
        _workload: &Workload,
        _cancel: CancellationToken,
    ) -> Result<serde_json::Value, ManagerError> {
        Err(ManagerError::NotSupported)
    }

    async fn pause(
        &self,
        _ctx: &DeployContext,
        _workload: &Workload,
        _cancel: CancellationToken,
    ) -> Result<(), ManagerError> {
        Err(ManagerError::NotSupported)
    }

    async fn resume(
        &self,
        _ctx: &DeployContext,
        _workload: &Workload,
        _cancel: CancellationToken,
    ) -> Result<serde_json::Value, ManagerError> {
        Err(ManagerError::NotSupported)
    }

    /// Whether this type's manager implements [`Manager::pause`]. The
    /// engine consults this before enqueueing pause jobs so
    /// unsupported types are skipped at the filtering stage rather
    /// than by calling through to the default `not-supported` error
    /// (spec §4.4: "others silently skip").
    fn supports_pause(&self) -> bool {
        false
    }

    /// Whether this type's manager implements [`Manager::resume`].
    fn supports_resume(&self) -> bool {
        false
    }
}

/// Fixed type-to-handler map, built once at engine construction.
#[derive(Clone)]
pub struct Registry {
    managers: HashMap<WorkloadType, Arc<dyn Manager>>,
}

impl Registry {
    pub fn new(managers: HashMap<WorkloadType, Arc<dyn Manager>>) -> Self {
        Registry { managers }
    }

    /// The registry a bare node boots with: accounting-only
    /// placeholders for every workload type, real managers are
    /// expected to be substituted by whatever wires the primitive
    /// layer in (out of scope for this crate; see spec §1).
    pub fn with_builtin_managers() -> Self {
        managers::builtin_registry()
    }

    pub fn get(&self, type_: WorkloadType) -> Option<&Arc<dyn Manager>> {
        self.managers.get(&type_)
    }

    pub fn declared_capacity(&self, type_: WorkloadType, data: &serde_json::Value) -> Capacity {
        if !type_.consumes_capacity() {
            return Capacity::ZERO;
        }
        self.managers
            .get(&type_)
            .map(|m| m.declared_capacity(data))
            .unwrap_or(Capacity::ZERO)
    }

    pub fn supports_pause(&self, type_: WorkloadType) -> bool {
        self.managers.get(&type_).map(|m| m.supports_pause()).unwrap_or(false)
    }

    pub fn supports_resume(&self, type_: WorkloadType) -> bool {
        self.managers.get(&type_).map(|m| m.supports_resume()).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use provisiond_types::WorkloadType;

    #[tokio::test]
    async fn gateway_update_is_not_supported() {
        let registry = Registry::with_builtin_managers();
        let manager = registry.get(WorkloadType::NamedGateway).expect("registered");
        let workload = Workload::new(
            "gw-0",
            WorkloadType::NamedGateway,
            2,
            serde_json::json!({"name": "gw-0"}),
            chrono::Utc::now(),
        );
        let ctx = DeployContext::new(1, 1, std::slice::from_ref(&workload));
        let result = manager
            .update(&ctx, &workload, CancellationToken::new())
            .await;
        assert_eq!(result, Err(ManagerError::NotSupported));
    }

    #[test]
    fn network_declares_zero_capacity_regardless_of_payload() {
        let registry = Registry::with_builtin_managers();
        let cap = registry.declared_capacity(
            WorkloadType::OverlayNetwork,
            &serde_json::json!({"cidr": "10.1.0.0/16"}),
        );
        assert_eq!(cap, Capacity::ZERO);
    }

    #[test]
    fn vm_declares_cpu_and_memory() {
        let registry = Registry::with_builtin_managers();
        let cap = registry.declared_capacity(
            WorkloadType::VirtualMachine,
            &serde_json::json!({"cpu": 2, "memory_gib": 4}),
        );
        assert_eq!(cap.cpu, 2);
        assert_eq!(cap.memory, 4 * 1024 * 1024 * 1024);
    }
}
