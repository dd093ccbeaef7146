//! The provision engine (spec §4.4): orchestrates deploy/update/delete/
//! pause/resume, the per-deployment worker pool, the retry policy, and
//! wires the [`reporter`] to the accountant's live stream.

mod backoff;
mod dispatch;
pub mod reporter;
pub mod stats;

pub use reporter::{ConsumptionReport, ReportSink, TerminalEvent, TerminalEventReceiver, TerminalEventSender};
pub use stats::Statistics;

use chrono::Utc;
use dashmap::DashMap;
use provisiond_accountant::Accountant;
use provisiond_auth::{Authorizer, SignedRequest};
use provisiond_registry::Registry;
use provisiond_store::{Store, StoreError};
use provisiond_types::{
    Capacity, Deployment, DeploymentId, EngineError, EngineResult, HistoryEntry, JobAction, TwinId,
    Workload, WorkloadResult, WorkloadResultState,
};
use std::sync::Arc;
use std::time::Duration;
use stats::CounterBuilder;
use tokio::sync::{mpsc, Notify, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Configuration the engine itself needs (spec §6's configuration
/// table, minus the parts `provisiond-config` owns that never reach
/// this crate, like `root-dir` and the bus listen address).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Cap on concurrently-*executing* per-deployment dispatchers
    /// (spec §5 default 8). Idle dispatchers waiting on an empty queue
    /// do not hold a permit.
    pub workers: usize,
    /// Cancellation grace on shutdown (spec §5 default 30s).
    pub drain_timeout: Duration,
    /// Reporter emission period (spec §4.6 default 5 minutes).
    pub report_interval: Duration,
    /// Soft bound on a deployment's job queue depth past which
    /// update/delete are refused with `busy` (spec §5 default 1024).
    pub queue_soft_bound: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            workers: 8,
            drain_timeout: Duration::from_secs(30),
            report_interval: Duration::from_secs(300),
            queue_soft_bound: 1024,
        }
    }
}

pub(crate) struct Inner {
    store: Arc<Store>,
    accountant: Accountant,
    registry: Arc<Registry>,
    authorizer: Arc<Authorizer>,
    dispatchers: DashMap<(TwinId, DeploymentId), Arc<Notify>>,
    semaphore: Arc<Semaphore>,
    terminal_tx: TerminalEventSender,
    config: EngineConfig,
    shutdown: CancellationToken,
}

/// The provision engine. Cheap to clone; every clone shares the same
/// store, accountant, registry, dispatcher map, and shutdown token.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<Inner>,
}

impl Engine {
    /// Constructs the engine and runs start-up rehydration (spec §4.4
    /// "rerun-all on boot"): seeds the accountant's `live` value from
    /// the store's boot-time snapshot, then enqueues a fresh `provision`
    /// for every stored workload in start-up order. Returns the engine
    /// plus the receiver end of its terminal-event channel, which the
    /// caller hands to [`reporter::spawn`].
    pub fn start(
        store: Arc<Store>,
        accountant: Accountant,
        registry: Arc<Registry>,
        authorizer: Arc<Authorizer>,
        config: EngineConfig,
    ) -> EngineResult<(Engine, TerminalEventReceiver)> {
        let (terminal_tx, terminal_rx) = mpsc::unbounded_channel();
        let inner = Arc::new(Inner {
            store,
            accountant,
            registry,
            authorizer,
            dispatchers: DashMap::new(),
            semaphore: Arc::new(Semaphore::new(config.workers.max(1))),
            terminal_tx,
            config,
            shutdown: CancellationToken::new(),
        });
        let engine = Engine { inner };

        let declare = {
            let registry = engine.inner.registry.clone();
            move |type_, data: &serde_json::Value| registry.declared_capacity(type_, data)
        };
        let live = engine.inner.store.capacity(declare)?;
        engine.inner.accountant.set_live(live);

        let now = Utc::now();
        engine.inner.store.rehydrate(now)?;
        for dep in engine.inner.store.list_all()? {
            if !dep.workloads.is_empty() {
                engine.spawn_dispatcher_if_needed(dep.twin, dep.id);
            }
        }

        info!(live_cpu = live.cpu, live_memory = live.memory, "provision engine started");
        Ok((engine, terminal_rx))
    }

    /// Begins graceful shutdown: cancels the shared token (in-flight
    /// manager calls see it through their cancellation handle) and
    /// waits up to `drain_timeout` for dispatchers to finish their
    /// current job (spec §5).
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();
        tokio::time::sleep(self.inner.config.drain_timeout).await;
    }

    fn spawn_dispatcher_if_needed(&self, twin: TwinId, id: DeploymentId) {
        let key = (twin, id);
        if let Some(notify) = self.inner.dispatchers.get(&key) {
            notify.notify_one();
            return;
        }
        let notify = Arc::new(Notify::new());
        self.inner.dispatchers.insert(key, notify.clone());
        dispatch::spawn(self.inner.clone(), twin, id, notify);
    }

    /// `deployment.deploy` (spec §4.4 item 1, §6).
    pub async fn deploy(&self, request: SignedRequest<Deployment>) -> EngineResult<()> {
        let canonical = request.payload.canonical_bytes();
        self.inner
            .authorizer
            .authorize_tenant(&request.payload.signature_requirement, &request, &canonical)
            .await?;

        let mut dep = request.payload;
        dep.validate_references().map_err(|reason| EngineError::Invalid { reason })?;

        let now = Utc::now();
        for workload in &mut dep.workloads {
            workload.result = WorkloadResult::init(now);
        }
        dep.to_delete = false;
        dep.delete_reason = None;

        let delta = total_capacity(&dep.workloads, &self.inner.registry);
        self.inner.accountant.admit(&delta).map_err(|axis| EngineError::InsufficientCapacity { axis })?;

        self.inner.store.create(dep.clone(), now)?;
        self.spawn_dispatcher_if_needed(dep.twin, dep.id);
        info!(twin = dep.twin, id = dep.id, "deployment deployed");
        Ok(())
    }

    /// `deployment.update` (spec §4.4 item 2, §6). Admits only the
    /// capacity of workloads newly *added* by this bundle (spec §9's
    /// resolved open question): removed workloads free capacity when
    /// their deprovision completes, and updated-in-place workloads keep
    /// their existing claim until the update job itself succeeds.
    pub async fn update(&self, request: SignedRequest<Deployment>) -> EngineResult<()> {
        let existing = self.inner.store.get(request.payload.twin, request.payload.id)?;
        self.check_not_busy(request.payload.twin, request.payload.id)?;

        let canonical = request.payload.canonical_bytes();
        self.inner
            .authorizer
            .authorize_tenant(&existing.signature_requirement, &request, &canonical)
            .await?;

        let mut new_dep = request.payload;
        if new_dep.version <= existing.version {
            return Err(EngineError::VersionNotMonotone);
        }
        new_dep.validate_references().map_err(|reason| EngineError::Invalid { reason })?;

        let now = Utc::now();
        let mut added = Vec::new();
        for workload in &mut new_dep.workloads {
            if existing.workload(&workload.name).is_none() {
                workload.result = WorkloadResult::init(now);
                added.push(workload.clone());
            }
        }
        let delta = total_capacity(&added, &self.inner.registry);
        self.inner.accountant.admit(&delta).map_err(|axis| EngineError::InsufficientCapacity { axis })?;

        self.inner.store.update(new_dep.clone(), now)?;
        self.spawn_dispatcher_if_needed(new_dep.twin, new_dep.id);
        info!(twin = new_dep.twin, id = new_dep.id, version = new_dep.version, "deployment updated");
        Ok(())
    }

    /// `deployment.delete` (spec §4.4 item 3, §6): tenant-owner or
    /// admin. Enqueues deprovision for every live workload; the record
    /// is removed once every workload reaches a terminal state.
    pub async fn delete(&self, twin: TwinId, id: DeploymentId, caller: TwinId) -> EngineResult<()> {
        let existing = self.inner.store.get(twin, id)?;
        self.check_not_busy(twin, id)?;
        self.inner.authorizer.authorize_owner_or_admin(existing.twin, caller, id).await?;

        let now = Utc::now();
        self.inner.store.delete(twin, id, now)?;
        self.spawn_dispatcher_if_needed(twin, id);
        info!(twin, id, "deployment delete accepted");
        Ok(())
    }

    /// Admin-authorized force-delete (SPEC_FULL §2.2, grounded in the
    /// original daemon's `DecommissionCached`): bypasses tenant
    /// signature checks, records `reason`.
    pub async fn force_delete(&self, twin: TwinId, id: DeploymentId, reason: impl Into<String>, caller: TwinId) -> EngineResult<()> {
        self.inner.authorizer.authorize_admin(caller).await?;
        let now = Utc::now();
        self.inner.store.force_delete(twin, id, reason, now)?;
        self.spawn_dispatcher_if_needed(twin, id);
        info!(twin, id, "deployment force-deleted by admin");
        Ok(())
    }

    /// `deployment.pause`-equivalent surface (spec §4.4 item 4): only
    /// workload types whose manager advertises pause support and whose
    /// workload is currently `ok` are enqueued; everything else is
    /// silently skipped, per spec.
    pub async fn pause(&self, twin: TwinId, id: DeploymentId, caller: TwinId) -> EngineResult<()> {
        let dep = self.inner.store.get(twin, id)?;
        self.inner.authorizer.authorize_owner_or_admin(dep.twin, caller, id).await?;
        let names = pausable_workload_names(&dep, &self.inner.registry);
        if names.is_empty() {
            return Ok(());
        }
        let now = Utc::now();
        self.inner.store.enqueue_lifecycle(twin, id, JobAction::Pause, &names, now)?;
        self.spawn_dispatcher_if_needed(twin, id);
        Ok(())
    }

    /// `deployment.resume`-equivalent surface (spec §4.4 item 4).
    pub async fn resume(&self, twin: TwinId, id: DeploymentId, caller: TwinId) -> EngineResult<()> {
        let dep = self.inner.store.get(twin, id)?;
        self.inner.authorizer.authorize_owner_or_admin(dep.twin, caller, id).await?;
        let names = resumable_workload_names(&dep, &self.inner.registry);
        if names.is_empty() {
            return Ok(());
        }
        let now = Utc::now();
        self.inner.store.enqueue_lifecycle(twin, id, JobAction::Resume, &names, now)?;
        self.spawn_dispatcher_if_needed(twin, id);
        Ok(())
    }

    /// `deployment.get` (spec §6). Read path: spec §9's open question
    /// on admin-gating reads is resolved as "mutate-only" (no admin
    /// check here); ownership filtering for a tenant-scoped caller is
    /// left to the transport layer (spec §1, out of scope).
    pub fn get(&self, twin: TwinId, id: DeploymentId) -> EngineResult<Deployment> {
        Ok(self.inner.store.get(twin, id)?)
    }

    /// `deployment.list` (spec §6).
    pub fn list_by_twin(&self, twin: TwinId) -> EngineResult<Vec<Deployment>> {
        Ok(self.inner.store.list_by_twin(twin)?)
    }

    /// `deployment.changes` (spec §4.4 item 6, §6): full result history
    /// in commit order.
    pub fn changes(&self, twin: TwinId, id: DeploymentId) -> EngineResult<Vec<HistoryEntry>> {
        match self.inner.store.history(twin, id) {
            Ok(history) => Ok(history),
            Err(StoreError::NotFound) => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// `statistics.get` (spec §6, SPEC_FULL §2.1).
    pub fn statistics(&self) -> EngineResult<Statistics> {
        let deployments = self.inner.store.list_all()?;
        let mut counters = CounterBuilder::default();
        let mut workload_total: u64 = 0;
        for dep in &deployments {
            for workload in &dep.workloads {
                counters.record(workload.type_, workload.result.state);
                workload_total += 1;
            }
        }
        Ok(Statistics {
            total: self.inner.accountant.total(),
            used: self.inner.accountant.live(),
            system: self.inner.accountant.system_reserved(),
            users: stats::UsersStats { deployments: deployments.len() as u64, workloads: workload_total },
            workload_counts: counters.into_sorted(),
        })
    }

    fn check_not_busy(&self, twin: TwinId, id: DeploymentId) -> EngineResult<()> {
        let depth = self.inner.store.job_count(twin, id)?;
        if depth > self.inner.config.queue_soft_bound {
            return Err(EngineError::Busy);
        }
        Ok(())
    }
}

fn total_capacity(workloads: &[Workload], registry: &Registry) -> Capacity {
    workloads
        .iter()
        .fold(Capacity::ZERO, |acc, w| acc.saturating_add(&registry.declared_capacity(w.type_, &w.data)))
}

fn pausable_workload_names(dep: &Deployment, registry: &Registry) -> Vec<String> {
    dep.workloads
        .iter()
        .filter(|w| w.result.state == WorkloadResultState::Ok && registry.supports_pause(w.type_))
        .map(|w| w.name.clone())
        .collect()
}

fn resumable_workload_names(dep: &Deployment, registry: &Registry) -> Vec<String> {
    dep.workloads
        .iter()
        .filter(|w| w.result.state == WorkloadResultState::Paused && registry.supports_resume(w.type_))
        .map(|w| w.name.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signer, SigningKey};
    use provisiond_auth::{FarmDirectory, KeyDirectory};
    use provisiond_types::{SignatureRequirement, WorkloadType};
    use std::collections::HashMap;
    use tempfile::tempdir;

    struct FixedKeys(HashMap<TwinId, [u8; 32]>);
    #[async_trait::async_trait]
    impl KeyDirectory for FixedKeys {
        async fn key_for(&self, twin: TwinId) -> Option<[u8; 32]> {
            self.0.get(&twin).copied()
        }
    }
    struct NoFarms;
    #[async_trait::async_trait]
    impl FarmDirectory for NoFarms {
        async fn twin_for_farm(&self, _farm_id: u32) -> Option<TwinId> {
            None
        }
    }

    fn harness(total: Capacity) -> (Engine, TerminalEventReceiver, SigningKey, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let store = Arc::new(Store::open(dir.path().join("db")).unwrap());
        let accountant = Accountant::new(total);
        let registry = Arc::new(Registry::with_builtin_managers());
        let key = SigningKey::from_bytes(&[9u8; 32]);
        let mut keys = HashMap::new();
        keys.insert(1u32, key.verifying_key().to_bytes());
        let authorizer = Arc::new(Authorizer::new(Arc::new(FixedKeys(keys)), Arc::new(NoFarms), 999));
        let (engine, rx) = Engine::start(store, accountant, registry, authorizer, EngineConfig::default()).unwrap();
        (engine, rx, key, dir)
    }

    fn sign(key: &SigningKey, dep: &Deployment) -> SignedRequest<Deployment> {
        let bytes = dep.canonical_bytes();
        let sig = key.sign(&bytes);
        SignedRequest::new(dep.clone()).signed_by(1, sig.to_bytes().to_vec())
    }

    fn base_dep(id: DeploymentId, version: u32, workloads: Vec<Workload>) -> Deployment {
        Deployment {
            twin: 1,
            id,
            version,
            signature_requirement: SignatureRequirement { threshold: 1, signers: vec![1] },
            workloads,
            expiration: None,
            to_delete: false,
            delete_reason: None,
        }
    }

    #[tokio::test]
    async fn s1_admission_refused_when_memory_exceeded() {
        let total = Capacity::new(4, 8 * 1024 * 1024 * 1024, 200 * 1024 * 1024 * 1024, 0);
        let (engine, _rx, key, _dir) = harness(total);
        let now = Utc::now();
        let vm = Workload::new("vm-0", WorkloadType::VirtualMachine, 1, serde_json::json!({"cpu": 4, "memory_gib": 7}), now);
        let dep = base_dep(1, 1, vec![vm]);
        let request = sign(&key, &dep);
        let err = engine.deploy(request).await.unwrap_err();
        assert!(matches!(err, EngineError::InsufficientCapacity { .. }));
        assert!(matches!(engine.get(1, 1), Err(EngineError::NotFound)));
    }

    #[tokio::test]
    async fn s6_reference_integrity_rejects_unknown_sibling() {
        let total = Capacity::new(8, 16 * 1024 * 1024 * 1024, 500 * 1024 * 1024 * 1024, 0);
        let (engine, _rx, key, _dir) = harness(total);
        let now = Utc::now();
        let log = Workload::new("log-0", WorkloadType::LogStream, 1, serde_json::json!({"vm": "vm-foo"}), now);
        let dep = base_dep(2, 1, vec![log]);
        let request = sign(&key, &dep);
        let err = engine.deploy(request).await.unwrap_err();
        assert!(matches!(err, EngineError::Invalid { .. }));
        assert!(matches!(engine.get(1, 2), Err(EngineError::NotFound)));
    }

    #[tokio::test]
    async fn s2_happy_path_claims_expected_capacity() {
        let total = Capacity::new(4, 8 * 1024 * 1024 * 1024, 200 * 1024 * 1024 * 1024, 0);
        let (engine, _rx, key, _dir) = harness(total);
        let now = Utc::now();
        let disk = Workload::new("disk-0", WorkloadType::PersistentDisk, 1, serde_json::json!({"size_gib": 50}), now);
        let net = Workload::new("net-0", WorkloadType::OverlayNetwork, 1, serde_json::json!({}), now);
        let vm = Workload::new(
            "vm-0",
            WorkloadType::VirtualMachine,
            1,
            serde_json::json!({"cpu": 2, "memory_gib": 4, "mounts": ["disk-0"]}),
            now,
        );
        let dep = base_dep(3, 1, vec![disk, net, vm]);
        let request = sign(&key, &dep);
        engine.deploy(request).await.unwrap();

        for _ in 0..50 {
            let dep = engine.get(1, 3).unwrap();
            if dep.workloads.iter().all(|w| w.result.state == WorkloadResultState::Ok) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        let dep = engine.get(1, 3).unwrap();
        assert!(dep.workloads.iter().all(|w| w.result.state == WorkloadResultState::Ok));
        let live = engine.statistics().unwrap().used;
        assert_eq!(live.cpu, 2);
        assert_eq!(live.memory, 4 * 1024 * 1024 * 1024);
        assert_eq!(live.ssd, 50 * 1024 * 1024 * 1024);
    }

    #[tokio::test]
    async fn deploy_twice_conflicts() {
        let (engine, _rx, key, _dir) = harness(Capacity::new(8, 16 * 1024 * 1024 * 1024, 0, 0));
        let dep = base_dep(4, 1, vec![]);
        engine.deploy(sign(&key, &dep)).await.unwrap();
        let err = engine.deploy(sign(&key, &dep)).await.unwrap_err();
        assert_eq!(err, EngineError::Conflict);
    }
}
