use crate::{context::DeployContext, Manager};
use async_trait::async_trait;
use provisiond_types::{Capacity, ManagerError, Workload};
use tokio_util::sync::CancellationToken;

/// Handles `virtual-machine` workloads. Payload shape:
/// `{"cpu": u64, "memory_gib": u64, "mounts": [names...]}`. Supports
/// pause/resume; the paused state is preserved in the workload's
/// result so a post-crash resume is equivalent to a fresh one (spec §9).
pub struct VmManager;

#[async_trait]
impl Manager for VmManager {
    fn declared_capacity(&self, data: &serde_json::Value) -> Capacity {
        let cpu = data.get("cpu").and_then(|v| v.as_u64()).unwrap_or(0);
        let memory = data
            .get("memory_gib")
            .and_then(|v| v.as_u64())
            .unwrap_or(0)
            .saturating_mul(1024 * 1024 * 1024);
        Capacity { cpu, memory, ..Capacity::ZERO }
    }

    async fn provision(
        &self,
        ctx: &DeployContext,
        workload: &Workload,
        _cancel: CancellationToken,
    ) -> Result<serde_json::Value, ManagerError> {
        for mount in workload.references() {
            if ctx.sibling(&mount).is_none() {
                return Err(ManagerError::Permanent(format!(
                    "referenced workload '{mount}' not found in deployment"
                )));
            }
        }
        Ok(workload.data.clone())
    }

    async fn pause(
        &self,
        _ctx: &DeployContext,
        _workload: &Workload,
        _cancel: CancellationToken,
    ) -> Result<(), ManagerError> {
        Ok(())
    }

    async fn resume(
        &self,
        _ctx: &DeployContext,
        workload: &Workload,
        _cancel: CancellationToken,
    ) -> Result<serde_json::Value, ManagerError> {
        Ok(workload.data.clone())
    }

    fn supports_pause(&self) -> bool {
        true
    }

    fn supports_resume(&self) -> bool {
        true
    }
}
