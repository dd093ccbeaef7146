use crate::{context::DeployContext, Manager};
use async_trait::async_trait;
use provisiond_types::{Capacity, ManagerError, Workload};
use tokio_util::sync::CancellationToken;

/// Handles `object-store-namespace` workloads. Payload shape:
/// `{"quota_gib": u64}`, billed against SSD.
pub struct ObjectStoreManager;

#[async_trait]
impl Manager for ObjectStoreManager {
    fn declared_capacity(&self, data: &serde_json::Value) -> Capacity {
        let ssd = data
            .get("quota_gib")
            .and_then(|v| v.as_u64())
            .unwrap_or(0)
            .saturating_mul(1024 * 1024 * 1024);
        Capacity { ssd, ..Capacity::ZERO }
    }

    async fn provision(
        &self,
        _ctx: &DeployContext,
        workload: &Workload,
        _cancel: CancellationToken,
    ) -> Result<serde_json::Value, ManagerError> {
        Ok(workload.data.clone())
    }
}
