use crate::{context::DeployContext, Manager};
use async_trait::async_trait;
use provisiond_types::{Capacity, ManagerError, Workload};
use tokio_util::sync::CancellationToken;

/// Handles `log-stream` workloads, which name the VM they tail.
pub struct LogStreamManager;

#[async_trait]
impl Manager for LogStreamManager {
    fn declared_capacity(&self, _data: &serde_json::Value) -> Capacity {
        Capacity::ZERO
    }

    async fn provision(
        &self,
        ctx: &DeployContext,
        workload: &Workload,
        _cancel: CancellationToken,
    ) -> Result<serde_json::Value, ManagerError> {
        for target in workload.references() {
            if ctx.sibling(&target).is_none() {
                return Err(ManagerError::Permanent(format!(
                    "referenced workload '{target}' not found in deployment"
                )));
            }
        }
        Ok(workload.data.clone())
    }
}
