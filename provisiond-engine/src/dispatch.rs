//! Per-deployment dispatcher tasks (spec §5): one task per deployment
//! owns that deployment's durable queue and runs jobs strictly
//! serially; a bounded global semaphore caps how many are actually
//! executing a job at any instant, as opposed to merely idling on
//! their queue.

use crate::backoff;
use crate::{Inner, TerminalEvent};
use chrono::Utc;
use provisiond_registry::DeployContext;
use provisiond_store::CommitOutcome;
use provisiond_types::{
    Capacity, DeploymentId, Job, JobAction, ManagerError, TwinId, Workload, WorkloadResult,
    WorkloadResultState, WorkloadType,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, warn};

/// Polling interval used while a dispatcher's queue is empty, so it
/// notices a `not_before`-delayed job becoming ready even without an
/// explicit wake-up.
const IDLE_POLL: Duration = Duration::from_millis(500);

pub(crate) fn spawn(inner: Arc<Inner>, twin: TwinId, id: DeploymentId, notify: Arc<Notify>) {
    tokio::spawn(run(inner, twin, id, notify));
}

async fn run(inner: Arc<Inner>, twin: TwinId, id: DeploymentId, notify: Arc<Notify>) {
    debug!(twin, id, "dispatcher started");
    loop {
        if inner.shutdown.is_cancelled() {
            break;
        }
        match inner.store.dequeue(twin, id) {
            Ok(Some(job)) => {
                let now = Utc::now();
                if job.not_before > now {
                    let wait = (job.not_before - now).to_std().unwrap_or(Duration::ZERO);
                    tokio::select! {
                        _ = tokio::time::sleep(wait) => {}
                        _ = inner.shutdown.cancelled() => break,
                    }
                }
                let permit = tokio::select! {
                    permit = inner.semaphore.clone().acquire_owned() => permit,
                    _ = inner.shutdown.cancelled() => break,
                };
                let Ok(_permit) = permit else { break };
                run_job(&inner, twin, id, job).await;
            }
            Ok(None) => {
                if inner.store.get(twin, id).is_err() {
                    // Deployment fully removed and no jobs remain; this
                    // dispatcher has no further work.
                    break;
                }
                tokio::select! {
                    _ = notify.notified() => {}
                    _ = tokio::time::sleep(IDLE_POLL) => {}
                    _ = inner.shutdown.cancelled() => break,
                }
            }
            Err(e) => {
                warn!(twin, id, error = %e, "dequeue failed, retrying");
                tokio::time::sleep(IDLE_POLL).await;
            }
        }
    }
    inner.dispatchers.remove(&(twin, id));
    debug!(twin, id, "dispatcher stopped");
}

/// Whether a workload's result state counts toward its accountant
/// contribution. `ok` counts per spec invariant 2; `unchanged` also
/// counts — it represents a no-op reconfirm of an already-live
/// workload, not a teardown (SPEC_FULL open-question resolution, see
/// `DESIGN.md`).
fn counts_as_live(state: WorkloadResultState) -> bool {
    matches!(state, WorkloadResultState::Ok | WorkloadResultState::Unchanged)
}

fn contribution(
    inner: &Inner,
    type_: WorkloadType,
    state: WorkloadResultState,
    data: Option<&serde_json::Value>,
) -> Capacity {
    if !counts_as_live(state) {
        return Capacity::ZERO;
    }
    match data {
        Some(data) => inner.registry.declared_capacity(type_, data),
        None => Capacity::ZERO,
    }
}

/// Applies the capacity delta implied by `old_result -> new_result`
/// and commits the new result. This single chokepoint is what keeps
/// claim/release correct across every action: a transition into a
/// non-live state always frees whatever the prior state had claimed,
/// and a transition into a live state always (re-)claims exactly its
/// declared capacity, so e.g. a deprovision of a workload that never
/// reached `ok` releases nothing (spec §8 property 6) and a failed
/// update that downgrades `ok -> error` frees capacity even though the
/// underlying primitive was never actually torn down.
async fn finalize(
    inner: &Arc<Inner>,
    twin: TwinId,
    id: DeploymentId,
    workload: &Workload,
    old_result: &WorkloadResult,
    new_result: WorkloadResult,
) {
    let old_c = contribution(inner, workload.type_, old_result.state, old_result.data.as_ref());
    let new_c = contribution(inner, workload.type_, new_result.state, new_result.data.as_ref());

    match inner.store.commit_result(twin, id, &workload.name, new_result) {
        Ok(CommitOutcome::Removed) => {
            debug!(twin, id, workload = %workload.name, "deployment fully deprovisioned and removed");
        }
        Ok(CommitOutcome::Retained) => {}
        Err(e) => {
            warn!(twin, id, workload = %workload.name, error = %e, "failed to commit workload result");
            return;
        }
    }
    inner.accountant.release(&old_c);
    inner.accountant.claim(&new_c);
    let _ = inner.terminal_tx.send(TerminalEvent { twin, id, timestamp: Utc::now() });
}

async fn requeue(inner: &Arc<Inner>, twin: TwinId, id: DeploymentId, job: Job, reason: &str) {
    let delay = backoff::delay_for_attempt(job.attempt);
    let not_before = Utc::now() + chrono::Duration::from_std(delay).unwrap_or_default();
    debug!(twin, id, workload = %job.workload_name, attempt = job.attempt, delay_secs = delay.as_secs(), reason, "job requeued after transient failure");
    if let Err(e) = inner.store.requeue(twin, id, job, not_before) {
        warn!(twin, id, error = %e, "failed to requeue transient job");
    }
}

async fn run_job(inner: &Arc<Inner>, twin: TwinId, id: DeploymentId, job: Job) {
    let dep = match inner.store.get(twin, id) {
        Ok(dep) => dep,
        Err(_) => return, // deployment vanished out from under a racing delete
    };
    let Some(workload) = dep.workload(&job.workload_name).cloned() else {
        return; // superseded by a racing update, store already dropped this job
    };
    let Some(manager) = inner.registry.get(workload.type_).cloned() else {
        warn!(twin, id, workload = %job.workload_name, "no manager registered for workload type");
        let now = Utc::now();
        finalize(inner, twin, id, &workload, &workload.result.clone(), WorkloadResult::error("no manager registered", now)).await;
        return;
    };
    let ctx = DeployContext::new(twin, id, &dep.workloads);
    let cancel = inner.shutdown.child_token();
    let old_result = workload.result.clone();
    let now = Utc::now();

    match job.action {
        JobAction::Provision => match manager.provision(&ctx, &workload, cancel).await {
            Ok(data) => finalize(inner, twin, id, &workload, &old_result, WorkloadResult::ok(data, now)).await,
            Err(ManagerError::Transient(msg)) => requeue(inner, twin, id, job, &msg).await,
            Err(ManagerError::Permanent(msg)) => {
                finalize(inner, twin, id, &workload, &old_result, WorkloadResult::error(msg, now)).await;
            }
            Err(ManagerError::NotSupported) => {
                finalize(inner, twin, id, &workload, &old_result, WorkloadResult::error("provision not supported", now)).await;
            }
        },

        JobAction::Update => match manager.update(&ctx, &workload, cancel).await {
            Ok(new_data) => {
                let unchanged = old_result.data.as_ref() == Some(&new_data);
                let new_result = if unchanged {
                    WorkloadResult {
                        state: WorkloadResultState::Unchanged,
                        data: old_result.data.clone(),
                        error_message: None,
                        timestamp: now,
                    }
                } else {
                    WorkloadResult::ok(new_data, now)
                };
                finalize(inner, twin, id, &workload, &old_result, new_result).await;
            }
            Err(ManagerError::Transient(msg)) => requeue(inner, twin, id, job, &msg).await,
            Err(ManagerError::Permanent(msg)) => {
                finalize(inner, twin, id, &workload, &old_result, WorkloadResult::error(msg, now)).await;
            }
            Err(ManagerError::NotSupported) => {
                // spec §8 scenario S5: old instance left untouched, the
                // result carries the not-supported failure.
                finalize(
                    inner,
                    twin,
                    id,
                    &workload,
                    &old_result,
                    WorkloadResult::error("update not supported for this workload type", now),
                )
                .await;
            }
        },

        JobAction::Deprovision => match manager.deprovision(&ctx, &workload, cancel).await {
            Ok(()) => finalize(inner, twin, id, &workload, &old_result, WorkloadResult::deleted(now)).await,
            Err(ManagerError::Transient(msg)) => requeue(inner, twin, id, job, &msg).await,
            Err(ManagerError::Permanent(msg)) => {
                // Deprovision itself failed; the workload still counts
                // as terminal (store's to-delete sweep treats `error`
                // the same as `deleted`, spec §8 property 6) but the
                // failure is surfaced rather than silently masked.
                finalize(inner, twin, id, &workload, &old_result, WorkloadResult::error(msg, now)).await;
            }
            Err(ManagerError::NotSupported) => {
                finalize(inner, twin, id, &workload, &old_result, WorkloadResult::error("deprovision not supported", now)).await;
            }
        },

        JobAction::Pause => match manager.pause(&ctx, &workload, cancel).await {
            Ok(()) => {
                finalize(inner, twin, id, &workload, &old_result, WorkloadResult::paused(old_result.data.clone(), now)).await;
            }
            Err(ManagerError::Transient(msg)) => requeue(inner, twin, id, job, &msg).await,
            Err(ManagerError::Permanent(_)) | Err(ManagerError::NotSupported) => {
                // Types without a pauser are filtered out before the
                // engine ever enqueues a pause job (spec §4.4: "others
                // silently skip"); reaching here means a manager
                // advertised support but failed anyway, which we treat
                // the same way — skip, leaving the workload `ok`.
                debug!(twin, id, workload = %workload.name, "pause skipped: not supported or failed");
            }
        },

        JobAction::Resume => match manager.resume(&ctx, &workload, cancel).await {
            Ok(data) => finalize(inner, twin, id, &workload, &old_result, WorkloadResult::ok(data, now)).await,
            Err(ManagerError::Transient(msg)) => requeue(inner, twin, id, job, &msg).await,
            Err(ManagerError::Permanent(msg)) => {
                finalize(inner, twin, id, &workload, &old_result, WorkloadResult::error(msg, now)).await;
            }
            Err(ManagerError::NotSupported) => {
                debug!(twin, id, workload = %workload.name, "resume skipped: not supported");
            }
        },
    }
}

