use crate::{context::DeployContext, Manager};
use async_trait::async_trait;
use provisiond_types::{Capacity, ManagerError, Workload};
use tokio_util::sync::CancellationToken;

/// Handles `named-gateway` and `fqdn-gateway` workloads. No `update`
/// entry point: an update attempt on a gateway ends with
/// `error:not-supported`, the old instance left untouched (spec §8
/// scenario S5).
pub struct GatewayManager;

#[async_trait]
impl Manager for GatewayManager {
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
}
