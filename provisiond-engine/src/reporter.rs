//! Reporter (spec §4.6): subscribes to the accountant's coalesced
//! `live` stream and, on a fixed interval *or* whenever a terminal
//! transition is committed, emits a per-deployment consumption report
//! to a pluggable sink. Emission is at-least-once — consumers dedupe
//! by `(twin, id, version, timestamp)`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use provisiond_registry::Registry;
use provisiond_store::Store;
use provisiond_types::{Capacity, DeploymentId, TwinId, WorkloadResultState};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// A single deployment's currently-`ok` capacity consumption at a
/// point in time, the unit the billing/consensus layer bills against
/// (spec §1 item 5, §4.6).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsumptionReport {
    pub twin: TwinId,
    pub id: DeploymentId,
    pub version: u32,
    pub consumption: Capacity,
    pub timestamp: DateTime<Utc>,
}

/// The minimal external collaborator this module depends on (spec §6:
/// `emit(report)`). A real billing/consensus sink lives outside this
/// engine; out of scope here.
#[async_trait]
pub trait ReportSink: Send + Sync {
    async fn emit(&self, report: ConsumptionReport);
}

/// A terminal (or otherwise result-bearing) commit the engine observed,
/// used to trigger an out-of-band emission in addition to the timer.
#[derive(Debug, Clone, Copy)]
pub struct TerminalEvent {
    pub twin: TwinId,
    pub id: DeploymentId,
    pub timestamp: DateTime<Utc>,
}

pub type TerminalEventSender = mpsc::UnboundedSender<TerminalEvent>;
pub type TerminalEventReceiver = mpsc::UnboundedReceiver<TerminalEvent>;

/// Spawns the reporter task. Returns its `JoinHandle` so the binary
/// can await it during shutdown.
pub fn spawn(
    store: Arc<Store>,
    registry: Arc<Registry>,
    sink: Arc<dyn ReportSink>,
    report_interval: Duration,
    mut terminal_rx: TerminalEventReceiver,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(report_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    emit_all(&store, &registry, &*sink).await;
                }
                event = terminal_rx.recv() => {
                    match event {
                        Some(event) => emit_one(&store, &registry, &*sink, event.twin, event.id).await,
                        None => break,
                    }
                }
                _ = shutdown.cancelled() => break,
            }
        }
        debug!("reporter stopped");
    })
}

async fn emit_all(store: &Store, registry: &Registry, sink: &dyn ReportSink) {
    let deployments = match store.list_all() {
        Ok(deps) => deps,
        Err(e) => {
            warn!(error = %e, "reporter failed to list deployments");
            return;
        }
    };
    let now = Utc::now();
    for dep in deployments {
        let consumption = consumption_of(&dep, registry);
        sink.emit(ConsumptionReport { twin: dep.twin, id: dep.id, version: dep.version, consumption, timestamp: now }).await;
    }
}

async fn emit_one(store: &Store, registry: &Registry, sink: &dyn ReportSink, twin: TwinId, id: DeploymentId) {
    let Ok(dep) = store.get(twin, id) else { return };
    let consumption = consumption_of(&dep, registry);
    sink.emit(ConsumptionReport { twin, id, version: dep.version, consumption, timestamp: Utc::now() }).await;
}

fn consumption_of(dep: &provisiond_types::Deployment, registry: &Registry) -> Capacity {
    let mut total = Capacity::ZERO;
    for workload in &dep.workloads {
        if !matches!(workload.result.state, WorkloadResultState::Ok | WorkloadResultState::Unchanged) {
            continue;
        }
        total = total.saturating_add(&registry.declared_capacity(workload.type_, &workload.data));
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use provisiond_types::{Deployment, SignatureRequirement, Workload, WorkloadType};
    use tempfile::tempdir;

    struct CollectingSink(Mutex<Vec<ConsumptionReport>>);

    #[async_trait]
    impl ReportSink for CollectingSink {
        async fn emit(&self, report: ConsumptionReport) {
            self.0.lock().push(report);
        }
    }

    #[tokio::test]
    async fn timer_tick_emits_a_report_per_deployment() {
        let dir = tempdir().unwrap();
        let store = Arc::new(Store::open(dir.path().join("db")).unwrap());
        let registry = Arc::new(Registry::with_builtin_managers());
        let now = Utc::now();
        let mut vm = Workload::new("vm-0", WorkloadType::VirtualMachine, 1, serde_json::json!({"cpu": 2, "memory_gib": 1}), now);
        vm.result = provisiond_types::WorkloadResult::ok(vm.data.clone(), now);
        let dep = Deployment {
            twin: 1,
            id: 1,
            version: 1,
            signature_requirement: SignatureRequirement { threshold: 1, signers: vec![1] },
            workloads: vec![vm],
            expiration: None,
            to_delete: false,
            delete_reason: None,
        };
        store.create(dep, now).unwrap();

        let sink = Arc::new(CollectingSink(Mutex::new(Vec::new())));
        let (_tx, rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let handle = spawn(store.clone(), registry.clone(), sink.clone(), Duration::from_millis(20), rx, shutdown.clone());

        tokio::time::sleep(Duration::from_millis(60)).await;
        shutdown.cancel();
        let _ = handle.await;

        let reports = sink.0.lock();
        assert!(!reports.is_empty());
        assert_eq!(reports[0].twin, 1);
        assert_eq!(reports[0].consumption.cpu, 2);
    }
}
