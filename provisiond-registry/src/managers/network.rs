use crate::{context::DeployContext, Manager};
use async_trait::async_trait;
use provisiond_types::{Capacity, ManagerError, Workload};
use tokio_util::sync::CancellationToken;

/// Handles `overlay-network` workloads. Networks consume no measured
/// capacity (spec §3 invariant 2) and, unlike the other primitives,
/// support in-place `update` — matching the original daemon, where
/// "only network support update atm"
/// (`examples/original_source/pkg/primitives/provisioner.go`).
pub struct NetworkManager;

#[async_trait]
impl Manager for NetworkManager {
    fn declared_capacity(&self, _data: &serde_json::Value) -> Capacity {
        Capacity::ZERO
    }

    async fn provision(
        &self,
        _ctx: &DeployContext,
        workload: &Workload,
        _cancel: CancellationToken,
    ) -> Result<serde_json::Value, ManagerError> {
        Ok(workload.data.clone())
    }

    async fn update(
        &self,
        _ctx: &DeployContext,
        workload: &Workload,
        _cancel: CancellationToken,
    ) -> Result<serde_json::Value, ManagerError> {
        Ok(workload.data.clone())
    }
}
