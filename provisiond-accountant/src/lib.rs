//! In-memory capacity accountant (spec §4.2).
//!
//! Holds `(total, system_reserved, live)` behind a single
//! `parking_lot::RwLock` with O(1) hold times, as the teacher's
//! consensus service guards its stats (`crates/consensus/src/service.rs`).
//! `admit` is the engine's pre-check; `claim`/`release` are the
//! authoritative post-success/post-deprovision accounting operations.

use parking_lot::RwLock;
use provisiond_types::{capacity::system_reserved, Axis, Capacity};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::debug;

/// Minimum interval between `reserved_stream` emissions (spec §4.2: "coalesced at 2 Hz maximum").
const COALESCE_INTERVAL: Duration = Duration::from_millis(500);

struct Inner {
    total: Capacity,
    system_reserved: Capacity,
    live: Capacity,
}

/// The node's capacity gate. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct Accountant {
    inner: Arc<RwLock<Inner>>,
    live_tx: Arc<watch::Sender<Capacity>>,
    last_emit: Arc<RwLock<Instant>>,
}

impl Accountant {
    /// Creates an accountant for a node with `total` capacity. The
    /// system-reserved axis is derived per spec §4.2 (memory reserve
    /// is `max(total.memory * 10%, 2 GiB)`; other axes reserve nothing
    /// by default).
    pub fn new(total: Capacity) -> Self {
        let reserved = system_reserved(&total);
        let (live_tx, _rx) = watch::channel(Capacity::ZERO);
        Accountant {
            inner: Arc::new(RwLock::new(Inner {
                total,
                system_reserved: reserved,
                live: Capacity::ZERO,
            })),
            live_tx: Arc::new(live_tx),
            last_emit: Arc::new(RwLock::new(Instant::now() - COALESCE_INTERVAL)),
        }
    }

    /// Rehydrates `live` from the store's boot-time capacity snapshot
    /// (spec §4.1 `capacity()`), used once at start-up.
    pub fn set_live(&self, live: Capacity) {
        self.inner.write().live = live;
        self.emit();
    }

    pub fn total(&self) -> Capacity {
        self.inner.read().total
    }

    pub fn system_reserved(&self) -> Capacity {
        self.inner.read().system_reserved
    }

    pub fn live(&self) -> Capacity {
        self.inner.read().live
    }

    /// Pre-check: would `live + system_reserved + delta` stay within
    /// `total` on every axis? Returns the first exceeded axis if not.
    /// Performs no mutation — a provision that admits but then fails
    /// at the primitive layer must not have claimed anything.
    pub fn admit(&self, delta: &Capacity) -> Result<(), Axis> {
        let guard = self.inner.read();
        let reserved_plus_live = guard.live.saturating_add(&guard.system_reserved);
        match reserved_plus_live.first_exceeded_axis(delta, &guard.total) {
            Some(axis) => Err(axis),
            None => Ok(()),
        }
    }

    /// Unconditional add, used by a worker after a successful provision.
    pub fn claim(&self, delta: &Capacity) {
        {
            let mut guard = self.inner.write();
            guard.live = guard.live.saturating_add(delta);
        }
        self.emit();
    }

    /// Saturating subtract, used on deprovision or failed-provision rollback.
    pub fn release(&self, delta: &Capacity) {
        {
            let mut guard = self.inner.write();
            guard.live = guard.live.saturating_sub(delta);
        }
        self.emit();
    }

    /// A lazy sequence of `live` snapshots, coalesced at 2 Hz maximum.
    /// Subscribers see only the latest value at the time they poll;
    /// bursts of claims/releases inside one 500ms window collapse to
    /// a single emission.
    pub fn reserved_stream(&self) -> watch::Receiver<Capacity> {
        self.live_tx.subscribe()
    }

    fn emit(&self) {
        let mut last = self.last_emit.write();
        if last.elapsed() < COALESCE_INTERVAL {
            return;
        }
        *last = Instant::now();
        let live = self.live();
        debug!(cpu = live.cpu, memory = live.memory, ssd = live.ssd, hdd = live.hdd, "accountant live capacity changed");
        let _ = self.live_tx.send(live);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admit_refuses_when_memory_exceeded() {
        // S1 — Admission refusal.
        let total = Capacity::new(4, 8 * 1024 * 1024 * 1024, 200 * 1024 * 1024 * 1024, 0);
        let accountant = Accountant::new(total);
        let delta = Capacity::new(4, 7 * 1024 * 1024 * 1024, 20 * 1024 * 1024 * 1024, 0);
        assert_eq!(accountant.admit(&delta), Err(Axis::Memory));
        assert_eq!(accountant.live(), Capacity::ZERO);
    }

    #[test]
    fn claim_then_release_is_saturating() {
        let accountant = Accountant::new(Capacity::new(8, 16 * 1024 * 1024 * 1024, 0, 0));
        let delta = Capacity::new(2, 1024, 0, 0);
        accountant.claim(&delta);
        assert_eq!(accountant.live(), delta);
        accountant.release(&delta);
        assert_eq!(accountant.live(), Capacity::ZERO);
    }

    #[test]
    fn release_on_never_claimed_workload_does_not_underflow() {
        // A deprovision of a workload that errored before claiming
        // must not decrement live capacity below zero nor affect
        // other workloads' claims.
        let accountant = Accountant::new(Capacity::new(8, 16 * 1024 * 1024 * 1024, 0, 0));
        accountant.claim(&Capacity::new(2, 0, 0, 0));
        accountant.release(&Capacity::new(5, 0, 0, 0));
        assert_eq!(accountant.live(), Capacity::ZERO);
    }

    #[test]
    fn admit_accounts_for_system_reserved() {
        let total = Capacity::new(4, 8 * 1024 * 1024 * 1024, 0, 0);
        let accountant = Accountant::new(total);
        // reserved = max(800MiB, 2GiB) = 2GiB, leaving 6GiB free.
        let delta = Capacity::new(0, 6 * 1024 * 1024 * 1024 + 1, 0, 0);
        assert_eq!(accountant.admit(&delta), Err(Axis::Memory));
    }
}
