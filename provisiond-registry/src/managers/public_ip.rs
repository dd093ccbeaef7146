use crate::{context::DeployContext, Manager};
use async_trait::async_trait;
use provisiond_types::{Capacity, ManagerError, Workload};
use tokio_util::sync::CancellationToken;

/// Handles `public-ipv4` and `public-ip` workloads; these attach an
/// address and consume no measured node capacity.
pub struct PublicIpManager;

#[async_trait]
impl Manager for PublicIpManager {
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
