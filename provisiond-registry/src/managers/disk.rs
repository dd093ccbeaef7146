use crate::{context::DeployContext, Manager};
use async_trait::async_trait;
use provisiond_types::{Capacity, ManagerError, Workload};
use tokio_util::sync::CancellationToken;

/// Handles `persistent-disk` and `content-fs` workloads. Payload shape:
/// `{"size_gib": u64, "kind": "ssd" | "hdd"}`.
pub struct DiskManager;

#[async_trait]
impl Manager for DiskManager {
    fn declared_capacity(&self, data: &serde_json::Value) -> Capacity {
        let size_bytes = data
            .get("size_gib")
            .and_then(|v| v.as_u64())
            .unwrap_or(0)
            .saturating_mul(1024 * 1024 * 1024);
        let is_hdd = data.get("kind").and_then(|v| v.as_str()) == Some("hdd");
        if is_hdd {
            Capacity { hdd: size_bytes, ..Capacity::ZERO }
        } else {
            Capacity { ssd: size_bytes, ..Capacity::ZERO }
        }
    }

    async fn provision(
        &self,
        _ctx: &DeployContext,
        workload: &Workload,
        _cancel: CancellationToken,
    ) -> Result<serde_json::Value, ManagerError> {
        Ok(workload.data.clone())
    }

    async fn deprovision(
        &self,
        _ctx: &DeployContext,
        _workload: &Workload,
        _cancel: CancellationToken,
    ) -> Result<(), ManagerError> {
        Ok(())
    }
}
