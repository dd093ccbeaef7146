//! Transactional deployment store (spec §4.1).
//!
//! A single embedded `rocksdb` database backs three logical
//! namespaces under one keyspace (see [`keys`]): deployments, each
//! deployment's durable job FIFO, and a schema-version marker. Every
//! public mutation here maps to exactly one [`rocksdb::WriteBatch`],
//! which `rocksdb` applies atomically — this is what "one write
//! transaction of the underlying key-value engine" (spec §4.1) means
//! in this implementation, the same guarantee the teacher's
//! `RocksDBStore` leans on for its batched writes.
//!
//! Store does not itself serialize concurrent callers working on
//! different deployments — the engine's per-deployment dispatcher
//! model (spec §5) already guarantees at most one in-flight mutation
//! per `(twin, id)`. A single [`parking_lot::Mutex`] here only
//! protects the shared sequence counters and schema marker from
//! cross-deployment interleaving, matching the "hold times are O(1)"
//! discipline spec §5 asks of the accountant.

pub mod error;
mod keys;
mod migration;

pub use error::{StoreError, StoreResult};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use provisiond_types::{
    Capacity, Deployment, DeploymentId, HistoryEntry, Job, JobAction, TwinId, Workload,
    WorkloadResult, WorkloadResultState, WorkloadType,
};
use rocksdb::{Options, WriteBatch, DB};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Returned by [`Store::commit_result`] so the engine knows whether to
/// free the deployment's capacity bookkeeping and stop dispatching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The deployment record still exists.
    Retained,
    /// `to_delete` was set and every workload reached a terminal
    /// state; the record was physically removed.
    Removed,
}

pub struct Store {
    db: Arc<DB>,
    write_lock: Mutex<()>,
}

impl Store {
    /// Opens (creating if absent) the database at `path` and runs any
    /// pending migration (spec §4.1).
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "opening provisiond store");
        let mut options = Options::default();
        options.create_if_missing(true);
        options.create_missing_column_families(true);
        options.set_compression_type(rocksdb::DBCompressionType::Lz4);
        options.set_level_compaction_dynamic_level_bytes(true);
        let db = DB::open(&options, path)?;
        migration::migrate(&db)?;
        Ok(Store { db: Arc::new(db), write_lock: Mutex::new(()) })
    }

    /// `create(dep)` (spec §4.1): fails with `conflict` if `(twin, id)`
    /// already exists; otherwise commits the bundle and fans out one
    /// `provision` job per workload in start-up order.
    pub fn create(&self, dep: Deployment, now: DateTime<Utc>) -> StoreResult<()> {
        let _guard = self.write_lock.lock();
        let key = keys::deployment_key(dep.twin, dep.id);
        if self.db.get(&key)?.is_some() {
            return Err(StoreError::Conflict);
        }
        let mut batch = WriteBatch::default();
        let mut sequence = self.load_sequence(dep.twin, dep.id)?;
        let mut ordered: Vec<&Workload> = dep.workloads.iter().collect();
        ordered.sort_by_key(|w| w.type_.startup_rank());
        for workload in ordered {
            sequence = self.append_job(
                &mut batch,
                dep.twin,
                dep.id,
                sequence,
                &workload.name,
                JobAction::Provision,
                now,
            )?;
        }
        self.store_sequence(&mut batch, dep.twin, dep.id, sequence);
        batch.put(&key, bincode::serialize(&dep)?);
        self.db.write(batch)?;
        info!(twin = dep.twin, id = dep.id, workloads = dep.workloads.len(), "deployment created");
        Ok(())
    }

    /// `update(dep)` (spec §4.1): requires a strictly higher version
    /// than the stored record; diffs workloads by name and enqueues
    /// provision/deprovision/update jobs accordingly. Equal-version
    /// workloads are left untouched (no-op); their prior `result` is
    /// preserved.
    pub fn update(&self, new_dep: Deployment, now: DateTime<Utc>) -> StoreResult<()> {
        let _guard = self.write_lock.lock();
        let key = keys::deployment_key(new_dep.twin, new_dep.id);
        let raw = self.db.get(&key)?.ok_or(StoreError::NotFound)?;
        let old_dep: Deployment = bincode::deserialize(&raw)?;
        if new_dep.version <= old_dep.version {
            return Err(StoreError::VersionNotMonotone);
        }

        let mut merged = new_dep.clone();
        let mut batch = WriteBatch::default();
        let mut sequence = self.load_sequence(new_dep.twin, new_dep.id)?;

        let mut new_by_rank: Vec<&Workload> = new_dep.workloads.iter().collect();
        new_by_rank.sort_by_key(|w| w.type_.startup_rank());
        for new_workload in new_by_rank {
            match old_dep.workload(&new_workload.name) {
                None => {
                    sequence = self.append_job(
                        &mut batch,
                        new_dep.twin,
                        new_dep.id,
                        sequence,
                        &new_workload.name,
                        JobAction::Provision,
                        now,
                    )?;
                }
                Some(old_workload) if old_workload.version == new_workload.version => {
                    if let Some(slot) = merged.workload_mut(&new_workload.name) {
                        slot.result = old_workload.result.clone();
                    }
                }
                Some(old_workload) => {
                    // The new payload lands in `data`/`version` immediately, but
                    // the workload's `result` (and the capacity it represents)
                    // stays the old one until the enqueued update job actually
                    // commits a new result — "updates of existing workloads
                    // reuse the old slot until the new payload succeeds" (spec §4.4).
                    if let Some(slot) = merged.workload_mut(&new_workload.name) {
                        slot.result = old_workload.result.clone();
                    }
                    sequence = self.append_job(
                        &mut batch,
                        new_dep.twin,
                        new_dep.id,
                        sequence,
                        &new_workload.name,
                        JobAction::Update,
                        now,
                    )?;
                }
            }
        }
        for old_workload in &old_dep.workloads {
            if new_dep.workload(&old_workload.name).is_none() {
                sequence = self.append_job(
                    &mut batch,
                    new_dep.twin,
                    new_dep.id,
                    sequence,
                    &old_workload.name,
                    JobAction::Deprovision,
                    now,
                )?;
            }
        }

        self.store_sequence(&mut batch, new_dep.twin, new_dep.id, sequence);
        batch.put(&key, bincode::serialize(&merged)?);
        self.db.write(batch)?;
        info!(twin = new_dep.twin, id = new_dep.id, version = new_dep.version, "deployment updated");
        Ok(())
    }

    /// `delete(twin, id)` (spec §4.1): marks the deployment to-delete
    /// and enqueues `deprovision` for every non-deleted workload. The
    /// record is removed only once [`Store::commit_result`] observes
    /// every workload has reached a terminal state.
    pub fn delete(&self, twin: TwinId, id: DeploymentId, now: DateTime<Utc>) -> StoreResult<()> {
        self.delete_with_reason(twin, id, None, now)
    }

    /// Admin-authorized force-delete (SPEC_FULL §2.2, grounded in the
    /// original daemon's `DecommissionCached`): identical mechanics to
    /// [`Store::delete`] but records `reason` in the deployment's
    /// audit trail. Authorization is the caller's responsibility.
    pub fn force_delete(
        &self,
        twin: TwinId,
        id: DeploymentId,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        self.delete_with_reason(twin, id, Some(reason.into()), now)
    }

    fn delete_with_reason(
        &self,
        twin: TwinId,
        id: DeploymentId,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        let _guard = self.write_lock.lock();
        let key = keys::deployment_key(twin, id);
        let raw = self.db.get(&key)?.ok_or(StoreError::NotFound)?;
        let mut dep: Deployment = bincode::deserialize(&raw)?;
        if dep.to_delete {
            return Ok(());
        }
        dep.to_delete = true;
        if reason.is_some() {
            dep.delete_reason = reason;
        }

        let mut batch = WriteBatch::default();
        let mut sequence = self.load_sequence(twin, id)?;
        for workload in &dep.workloads {
            if workload.result.state == WorkloadResultState::Deleted {
                continue;
            }
            sequence = self.append_job(
                &mut batch,
                twin,
                id,
                sequence,
                &workload.name,
                JobAction::Deprovision,
                now,
            )?;
        }
        self.store_sequence(&mut batch, twin, id, sequence);
        batch.put(&key, bincode::serialize(&dep)?);
        self.db.write(batch)?;
        info!(twin, id, "deployment marked to-delete");
        Ok(())
    }

    /// Enqueues pause/resume jobs for every workload of a type whose
    /// manager supports the operation; the engine filters by
    /// capability before calling this (spec §4.4 item 4), so the
    /// store itself stays capability-agnostic and simply fans out.
    pub fn enqueue_lifecycle(
        &self,
        twin: TwinId,
        id: DeploymentId,
        action: JobAction,
        workload_names: &[String],
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        let _guard = self.write_lock.lock();
        let key = keys::deployment_key(twin, id);
        if self.db.get(&key)?.is_none() {
            return Err(StoreError::NotFound);
        }
        let mut batch = WriteBatch::default();
        let mut sequence = self.load_sequence(twin, id)?;
        for name in workload_names {
            sequence = self.append_job(&mut batch, twin, id, sequence, name, action, now)?;
        }
        self.store_sequence(&mut batch, twin, id, sequence);
        self.db.write(batch)?;
        Ok(())
    }

    pub fn get(&self, twin: TwinId, id: DeploymentId) -> StoreResult<Deployment> {
        let key = keys::deployment_key(twin, id);
        let raw = self.db.get(&key)?.ok_or(StoreError::NotFound)?;
        Ok(bincode::deserialize(&raw)?)
    }

    pub fn list_by_twin(&self, twin: TwinId) -> StoreResult<Vec<Deployment>> {
        let prefix = keys::deployment_twin_prefix(twin);
        let mut out = Vec::new();
        for item in self.db.prefix_iterator(&prefix) {
            let (key, value) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            out.push(bincode::deserialize(&value)?);
        }
        Ok(out)
    }

    pub fn list_all(&self) -> StoreResult<Vec<Deployment>> {
        let prefix = keys::deployment_prefix();
        let mut out = Vec::new();
        for item in self.db.prefix_iterator(&prefix) {
            let (key, value) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            out.push(bincode::deserialize(&value)?);
        }
        Ok(out)
    }

    /// Pops the earliest-sequence job for `(twin, id)`, if any. The job
    /// row is removed as part of this call — the per-deployment
    /// dispatcher that owns this queue (spec §5) is the only caller,
    /// so there is never a second reader racing to re-pop the same
    /// row. If the deployment is flagged `to-delete` and the popped
    /// job is not itself a `deprovision`, it is dropped instead of
    /// returned (spec §4.4: "delete supersedes pending provision/
    /// update"); if the named workload no longer exists in the
    /// deployment (a concurrent update removed it), the job is
    /// likewise dropped as stale. Both drop cases continue scanning
    /// for the next viable job within the same call.
    pub fn dequeue(&self, twin: TwinId, id: DeploymentId) -> StoreResult<Option<Job>> {
        let _guard = self.write_lock.lock();
        let dep_key = keys::deployment_key(twin, id);
        let Some(raw) = self.db.get(&dep_key)? else {
            self.drain_jobs(twin, id)?;
            return Ok(None);
        };
        let dep: Deployment = bincode::deserialize(&raw)?;

        let prefix = keys::job_prefix(twin, id);
        let mut stale_keys = Vec::new();
        let mut found = None;
        for item in self.db.prefix_iterator(&prefix) {
            let (key, value) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            let job: Job = bincode::deserialize(&value)?;
            let superseded_by_delete = dep.to_delete && job.action != JobAction::Deprovision;
            let workload_gone = dep.workload(&job.workload_name).is_none();
            if superseded_by_delete || workload_gone {
                stale_keys.push(key);
                continue;
            }
            found = Some((key, job));
            break;
        }

        let mut batch = WriteBatch::default();
        for key in &stale_keys {
            batch.delete(key);
        }
        if let Some((key, _)) = &found {
            batch.delete(key);
        }
        if !stale_keys.is_empty() || found.is_some() {
            self.db.write(batch)?;
        }
        if !stale_keys.is_empty() {
            debug!(twin, id, dropped = stale_keys.len(), "dropped stale jobs at dequeue");
        }
        Ok(found.map(|(_, job)| job))
    }

    /// Re-enqueues a job at the tail with an incremented attempt
    /// counter, used by the engine's retry policy for `transient`
    /// manager failures (spec §7).
    pub fn requeue(&self, twin: TwinId, id: DeploymentId, mut job: Job, not_before: DateTime<Utc>) -> StoreResult<()> {
        let _guard = self.write_lock.lock();
        let mut sequence = self.load_sequence(twin, id)?;
        job.attempt += 1;
        job.not_before = not_before;
        job.sequence = sequence;
        let mut batch = WriteBatch::default();
        batch.put(keys::job_key(twin, id, sequence), bincode::serialize(&job)?);
        sequence += 1;
        self.store_sequence(&mut batch, twin, id, sequence);
        self.db.write(batch)?;
        Ok(())
    }

    /// `commit-result(twin, id, workload-name, result)` (spec §4.1):
    /// atomically updates one workload's `result`. If the enclosing
    /// deployment is `to_delete` and every workload has reached a
    /// terminal state (`deleted` or `error` — an error during
    /// deprovision never claimed capacity and must not block removal
    /// forever, spec §8 property 6), the deployment record and any
    /// leftover job rows are purged and [`CommitOutcome::Removed`] is
    /// returned.
    pub fn commit_result(
        &self,
        twin: TwinId,
        id: DeploymentId,
        workload_name: &str,
        result: WorkloadResult,
    ) -> StoreResult<CommitOutcome> {
        let _guard = self.write_lock.lock();
        let key = keys::deployment_key(twin, id);
        let raw = self.db.get(&key)?.ok_or(StoreError::NotFound)?;
        let mut dep: Deployment = bincode::deserialize(&raw)?;

        let slot = dep
            .workload_mut(workload_name)
            .ok_or_else(|| StoreError::Corrupt(key.clone(), format!("unknown workload {workload_name}")))?;
        if !slot.result.state.can_transition_to(result.state) {
            warn!(
                twin, id, workload_name,
                from = ?slot.result.state, to = ?result.state,
                "refusing illegal workload state transition"
            );
            return Err(StoreError::Corrupt(key, "invalid-transition".into()));
        }
        slot.result = result.clone();

        let mut batch = WriteBatch::default();
        let history_seq = self.load_history_sequence(twin, id)?;
        let entry = HistoryEntry { workload_name: workload_name.to_string(), result };
        batch.put(keys::history_key(twin, id, history_seq), bincode::serialize(&entry)?);
        batch.put(
            keys::history_sequence_key(twin, id),
            bincode::serialize(&(history_seq + 1))?,
        );
        let all_terminal = dep.workloads.iter().all(|w| {
            matches!(w.result.state, WorkloadResultState::Deleted | WorkloadResultState::Error)
        });
        let outcome = if dep.to_delete && all_terminal {
            batch.delete(&key);
            let prefix = keys::job_prefix(twin, id);
            for item in self.db.prefix_iterator(&prefix) {
                let (k, _) = item?;
                if !k.starts_with(&prefix) {
                    break;
                }
                batch.delete(&k);
            }
            batch.delete(keys::sequence_key(twin, id));
            CommitOutcome::Removed
        } else {
            batch.put(&key, bincode::serialize(&dep)?);
            CommitOutcome::Retained
        };
        self.db.write(batch)?;
        Ok(outcome)
    }

    /// `capacity()` (spec §4.2/§4.1): total consumption implied by
    /// every stored workload whose result counts as live — `ok`, or
    /// `unchanged` (an idempotent reconfirm of an already-live
    /// workload is still live) — summed via `declare` (the registry's
    /// `declared_capacity`, injected rather than depended on to keep
    /// this crate free of a dependency on `provisiond-registry`). Used
    /// by the engine at boot to seed the accountant's `live` value.
    ///
    /// Sized off the workload's current `data` field. For a workload
    /// whose update job has been enqueued but not yet committed, `data`
    /// already holds the new, not-yet-applied payload while `result`
    /// still reflects the old one (see [`Store::update`]); a reboot in
    /// that narrow window seeds accounting from the new payload's size
    /// rather than the old one. The update job's own before/after
    /// accounting (computed by the engine from `result.data`) is
    /// unaffected and corrects this on completion.
    pub fn capacity(&self, declare: impl Fn(WorkloadType, &serde_json::Value) -> Capacity) -> StoreResult<Capacity> {
        let mut total = Capacity::ZERO;
        for dep in self.list_all()? {
            for workload in &dep.workloads {
                if !matches!(workload.result.state, WorkloadResultState::Ok | WorkloadResultState::Unchanged) {
                    continue;
                }
                if !workload.type_.consumes_capacity() {
                    continue;
                }
                total = total.saturating_add(&declare(workload.type_, &workload.data));
            }
        }
        Ok(total)
    }

    /// Ordered result history of a deployment (spec §4.4 `changes`).
    pub fn history(&self, twin: TwinId, id: DeploymentId) -> StoreResult<Vec<HistoryEntry>> {
        let prefix = keys::history_prefix(twin, id);
        let mut out = Vec::new();
        for item in self.db.prefix_iterator(&prefix) {
            let (key, value) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            out.push(bincode::deserialize(&value)?);
        }
        Ok(out)
    }

    /// Current depth of a deployment's durable job queue, used by the
    /// engine's backpressure check against the soft bound (spec §5).
    pub fn job_count(&self, twin: TwinId, id: DeploymentId) -> StoreResult<usize> {
        let prefix = keys::job_prefix(twin, id);
        let mut count = 0usize;
        for item in self.db.prefix_iterator(&prefix) {
            let (key, _) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            count += 1;
        }
        Ok(count)
    }

    /// Start-up rehydration (spec §4.4 "rerun-all on boot"): enqueues
    /// a fresh `provision` job, in start-up order, for every workload
    /// of every stored deployment. Managers must treat `provision` on
    /// an already-`ok` workload as idempotent. This daemon has no way
    /// to distinguish "first start after reboot" from "restart with
    /// no intervening reboot" (see `DESIGN.md`), so it is called
    /// unconditionally on every engine start.
    pub fn rehydrate(&self, now: DateTime<Utc>) -> StoreResult<usize> {
        let mut enqueued = 0;
        for dep in self.list_all()? {
            if dep.to_delete {
                continue;
            }
            let mut ordered: Vec<&Workload> = dep.workloads.iter().collect();
            ordered.sort_by_key(|w| w.type_.startup_rank());
            let names: Vec<String> = ordered
                .into_iter()
                .filter(|w| w.result.state != WorkloadResultState::Deleted)
                .map(|w| w.name.clone())
                .collect();
            if names.is_empty() {
                continue;
            }
            self.enqueue_lifecycle(dep.twin, dep.id, JobAction::Provision, &names, now)?;
            enqueued += names.len();
        }
        info!(jobs = enqueued, "rehydration enqueued provision jobs");
        Ok(enqueued)
    }

    fn load_sequence(&self, twin: TwinId, id: DeploymentId) -> StoreResult<u64> {
        match self.db.get(keys::sequence_key(twin, id))? {
            Some(bytes) => Ok(bincode::deserialize(&bytes)?),
            None => Ok(0),
        }
    }

    fn store_sequence(&self, batch: &mut WriteBatch, twin: TwinId, id: DeploymentId, sequence: u64) {
        batch.put(
            keys::sequence_key(twin, id),
            bincode::serialize(&sequence).expect("u64 always serializes"),
        );
    }

    fn append_job(
        &self,
        batch: &mut WriteBatch,
        twin: TwinId,
        id: DeploymentId,
        sequence: u64,
        workload_name: &str,
        action: JobAction,
        now: DateTime<Utc>,
    ) -> StoreResult<u64> {
        let job = Job::new(sequence, workload_name, action, now);
        batch.put(keys::job_key(twin, id, sequence), bincode::serialize(&job)?);
        Ok(sequence + 1)
    }

    fn drain_jobs(&self, twin: TwinId, id: DeploymentId) -> StoreResult<()> {
        let prefix = keys::job_prefix(twin, id);
        let mut batch = WriteBatch::default();
        for item in self.db.prefix_iterator(&prefix) {
            let (key, _) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            batch.delete(&key);
        }
        if !batch.is_empty() {
            self.db.write(batch)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use provisiond_types::{SignatureRequirement, WorkloadType};
    use tempfile::tempdir;

    fn store() -> Store {
        let dir = tempdir().unwrap();
        Store::open(dir.path().join("db")).unwrap()
    }

    fn dep(twin: TwinId, id: DeploymentId, version: u32, workloads: Vec<Workload>) -> Deployment {
        Deployment {
            twin,
            id,
            version,
            signature_requirement: SignatureRequirement { threshold: 1, signers: vec![twin] },
            workloads,
            expiration: None,
            to_delete: false,
            delete_reason: None,
        }
    }

    #[test]
    fn create_then_get_round_trips_with_init_results() {
        let store = store();
        let now = Utc::now();
        let disk = Workload::new("disk-0", WorkloadType::PersistentDisk, 1, serde_json::json!({}), now);
        let d = dep(1, 1, 1, vec![disk]);
        store.create(d.clone(), now).unwrap();
        let fetched = store.get(1, 1).unwrap();
        assert_eq!(fetched.workloads[0].result.state, WorkloadResultState::Init);
        assert_eq!(fetched.version, 1);

        let job = store.dequeue(1, 1).unwrap().expect("provision job enqueued");
        assert_eq!(job.action, JobAction::Provision);
        assert_eq!(job.workload_name, "disk-0");
        assert!(store.dequeue(1, 1).unwrap().is_none());
    }

    #[test]
    fn create_twice_conflicts() {
        let store = store();
        let now = Utc::now();
        let d = dep(1, 1, 1, vec![]);
        store.create(d.clone(), now).unwrap();
        assert!(matches!(store.create(d, now), Err(StoreError::Conflict)));
    }

    #[test]
    fn update_enqueues_startup_ordered_additions_and_deprovisions_removed() {
        let store = store();
        let now = Utc::now();
        let disk = Workload::new("disk-0", WorkloadType::PersistentDisk, 1, serde_json::json!({}), now);
        let vm = Workload::new("vm-0", WorkloadType::VirtualMachine, 1, serde_json::json!({"mounts": ["disk-0"]}), now);
        let d1 = dep(1, 1, 1, vec![disk.clone(), vm.clone()]);
        store.create(d1, now).unwrap();
        store.dequeue(1, 1).unwrap();
        store.dequeue(1, 1).unwrap();

        // v2 drops vm-0, keeps disk-0 unchanged.
        let d2 = dep(1, 1, 2, vec![disk]);
        store.update(d2, now).unwrap();
        let job = store.dequeue(1, 1).unwrap().expect("deprovision enqueued for removed vm");
        assert_eq!(job.action, JobAction::Deprovision);
        assert_eq!(job.workload_name, "vm-0");
    }

    #[test]
    fn update_with_equal_or_lower_version_rejected() {
        let store = store();
        let now = Utc::now();
        let d1 = dep(1, 1, 2, vec![]);
        store.create(d1, now).unwrap();
        let stale = dep(1, 1, 2, vec![]);
        assert!(matches!(store.update(stale, now), Err(StoreError::VersionNotMonotone)));
    }

    #[test]
    fn delete_removes_record_once_all_workloads_terminal() {
        let store = store();
        let now = Utc::now();
        let disk = Workload::new("disk-0", WorkloadType::PersistentDisk, 1, serde_json::json!({}), now);
        let d = dep(1, 1, 1, vec![disk]);
        store.create(d, now).unwrap();
        store.dequeue(1, 1).unwrap();
        store.commit_result(1, 1, "disk-0", WorkloadResult::ok(serde_json::json!({}), now)).unwrap();

        store.delete(1, 1, now).unwrap();
        let job = store.dequeue(1, 1).unwrap().expect("deprovision enqueued");
        assert_eq!(job.action, JobAction::Deprovision);
        let outcome = store
            .commit_result(1, 1, "disk-0", WorkloadResult::deleted(now))
            .unwrap();
        assert_eq!(outcome, CommitOutcome::Removed);
        assert!(matches!(store.get(1, 1), Err(StoreError::NotFound)));
    }

    #[test]
    fn stale_job_dropped_when_workload_removed_by_racing_update() {
        let store = store();
        let now = Utc::now();
        let disk = Workload::new("disk-0", WorkloadType::PersistentDisk, 1, serde_json::json!({}), now);
        let d1 = dep(1, 1, 1, vec![disk]);
        store.create(d1, now).unwrap();
        // simulate the update having already removed disk-0's own
        // provision job via a deprovision-before-provision race by
        // updating out from under the still-queued provision job.
        let d2 = dep(1, 1, 2, vec![]);
        store.update(d2, now).unwrap();
        // Original provision job for disk-0 is stale; the deprovision
        // job enqueued by update should be the only one returned.
        let job = store.dequeue(1, 1).unwrap().expect("deprovision enqueued");
        assert_eq!(job.action, JobAction::Deprovision);
        assert!(store.dequeue(1, 1).unwrap().is_none());
    }

    #[test]
    fn capacity_sums_only_ok_state_and_skips_network() {
        let store = store();
        let now = Utc::now();
        let mut vm = Workload::new("vm-0", WorkloadType::VirtualMachine, 1, serde_json::json!({"cpu": 2, "memory_gib": 1}), now);
        vm.result = WorkloadResult::ok(serde_json::json!({}), now);
        let mut net = Workload::new("net-0", WorkloadType::OverlayNetwork, 1, serde_json::json!({}), now);
        net.result = WorkloadResult::ok(serde_json::json!({}), now);
        let mut pending = Workload::new("vm-1", WorkloadType::VirtualMachine, 1, serde_json::json!({"cpu": 9}), now);
        pending.result = WorkloadResult::init(now);
        let d = dep(1, 1, 1, vec![vm, net, pending]);
        store.create(d, now).unwrap();

        let declare = |t: WorkloadType, data: &serde_json::Value| match t {
            WorkloadType::VirtualMachine => Capacity {
                cpu: data["cpu"].as_u64().unwrap_or(0),
                ..Capacity::ZERO
            },
            _ => Capacity::ZERO,
        };
        let total = store.capacity(declare).unwrap();
        assert_eq!(total.cpu, 2);
    }
}
