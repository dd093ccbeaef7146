//! Literal scenarios from spec §8 not already covered by
//! `provisiond-engine/src/lib.rs`'s inline `#[tokio::test]`s (S1, S2,
//! S6 live there): S3 (version gate), S4 (crash consistency via
//! rehydration), S5 (update against a manager with no `update` entry
//! point).

use ed25519_dalek::{Signer, SigningKey};
use provisiond_accountant::Accountant;
use provisiond_auth::{Authorizer, FarmDirectory, KeyDirectory, SignedRequest};
use provisiond_engine::{Engine, EngineConfig};
use provisiond_registry::Registry;
use provisiond_store::Store;
use provisiond_types::{
    Capacity, Deployment, DeploymentId, EngineError, SignatureRequirement, TwinId, Workload,
    WorkloadResultState, WorkloadType,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

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

fn signing_key() -> SigningKey {
    SigningKey::from_bytes(&[7u8; 32])
}

fn authorizer(key: &SigningKey) -> Arc<Authorizer> {
    let mut keys = HashMap::new();
    keys.insert(1u32, key.verifying_key().to_bytes());
    Arc::new(Authorizer::new(Arc::new(FixedKeys(keys)), Arc::new(NoFarms), 999))
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

async fn wait_for<F: Fn() -> bool>(pred: F) {
    for _ in 0..100 {
        if pred() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition never became true within the wait budget");
}

const TOTAL: Capacity = Capacity { cpu: 8, memory: 16 * 1024 * 1024 * 1024, ssd: 500 * 1024 * 1024 * 1024, hdd: 0 };

/// S3 — version gate: a resubmission at the stored version is
/// rejected; a higher version that drops a workload deprovisions it
/// and returns its claimed capacity.
#[tokio::test]
async fn s3_version_gate_and_workload_removal_releases_capacity() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(Store::open(dir.path().join("db")).unwrap());
    let key = signing_key();
    let (engine, _rx) = Engine::start(
        store,
        Accountant::new(TOTAL),
        Arc::new(Registry::with_builtin_managers()),
        authorizer(&key),
        EngineConfig::default(),
    )
    .unwrap();

    let now = chrono::Utc::now();
    let disk = Workload::new("disk-0", WorkloadType::PersistentDisk, 1, serde_json::json!({"size_gib": 50}), now);
    let net = Workload::new("net-0", WorkloadType::OverlayNetwork, 1, serde_json::json!({}), now);
    let vm = Workload::new(
        "vm-0",
        WorkloadType::VirtualMachine,
        1,
        serde_json::json!({"cpu": 2, "memory_gib": 4, "mounts": ["disk-0"]}),
        now,
    );
    let v1 = base_dep(1, 1, vec![disk, net, vm]);
    engine.deploy(sign(&key, &v1)).await.unwrap();
    wait_for(|| {
        engine.get(1, 1).unwrap().workloads.iter().all(|w| w.result.state == WorkloadResultState::Ok)
    })
    .await;

    // Resubmitting at the stored version is rejected.
    let resubmit = base_dep(1, 1, v1.workloads.clone());
    let err = engine.update(sign(&key, &resubmit)).await.unwrap_err();
    assert_eq!(err, EngineError::VersionNotMonotone);

    // Version 2 drops the VM; its capacity returns to the accountant.
    let v2_workloads: Vec<Workload> = v1.workloads.iter().filter(|w| w.name != "vm-0").cloned().collect();
    let v2 = base_dep(1, 2, v2_workloads);
    engine.update(sign(&key, &v2)).await.unwrap();

    wait_for(|| engine.statistics().unwrap().used.cpu == 0).await;
    let used = engine.statistics().unwrap().used;
    assert_eq!(used.cpu, 0);
    assert_eq!(used.memory, 0);
    assert_eq!(used.ssd, 50 * 1024 * 1024 * 1024);
}

/// S4 — crash consistency: a fresh `Engine::start` against the same
/// store rehydrates every non-terminal workload and drives them to
/// the same final state a continuously-running engine would reach.
#[tokio::test]
async fn s4_rehydration_completes_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("db");
    let key = signing_key();

    {
        let store = Arc::new(Store::open(&db_path).unwrap());
        let (engine, _rx) = Engine::start(
            store,
            Accountant::new(TOTAL),
            Arc::new(Registry::with_builtin_managers()),
            authorizer(&key),
            EngineConfig::default(),
        )
        .unwrap();

        let now = chrono::Utc::now();
        let disk = Workload::new("disk-0", WorkloadType::PersistentDisk, 1, serde_json::json!({"size_gib": 10}), now);
        let net = Workload::new("net-0", WorkloadType::OverlayNetwork, 1, serde_json::json!({}), now);
        let dep = base_dep(2, 1, vec![disk, net]);
        engine.deploy(sign(&key, &dep)).await.unwrap();
        // Deliberately don't wait for completion: the "crash" happens
        // with jobs potentially still queued.
        engine.shutdown().await;
    }

    // Reopen against the same on-disk state: no live engine survives
    // a process restart, so this models the crash-and-restart case.
    let store = Arc::new(Store::open(&db_path).unwrap());
    let (engine, _rx) = Engine::start(
        store,
        Accountant::new(TOTAL),
        Arc::new(Registry::with_builtin_managers()),
        authorizer(&key),
        EngineConfig::default(),
    )
    .unwrap();

    wait_for(|| {
        engine.get(1, 2).unwrap().workloads.iter().all(|w| w.result.state == WorkloadResultState::Ok)
    })
    .await;
    let dep = engine.get(1, 2).unwrap();
    assert!(dep.workloads.iter().all(|w| w.result.state == WorkloadResultState::Ok));
}

/// S5 — update against a manager with no `update` entry point ends
/// in `error:not-supported`; the prior instance is left untouched.
#[tokio::test]
async fn s5_update_not_supported_leaves_old_instance() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(Store::open(dir.path().join("db")).unwrap());
    let key = signing_key();
    let (engine, _rx) = Engine::start(
        store,
        Accountant::new(TOTAL),
        Arc::new(Registry::with_builtin_managers()),
        authorizer(&key),
        EngineConfig::default(),
    )
    .unwrap();

    let now = chrono::Utc::now();
    let gateway =
        Workload::new("gw-0", WorkloadType::NamedGateway, 1, serde_json::json!({"name": "foo"}), now);
    let dep = base_dep(3, 1, vec![gateway]);
    engine.deploy(sign(&key, &dep)).await.unwrap();
    wait_for(|| engine.get(1, 3).unwrap().workloads[0].result.state == WorkloadResultState::Ok).await;

    let updated_gateway =
        Workload::new("gw-0", WorkloadType::NamedGateway, 2, serde_json::json!({"name": "bar"}), now);
    let v2 = base_dep(3, 2, vec![updated_gateway]);
    engine.update(sign(&key, &v2)).await.unwrap();

    wait_for(|| engine.get(1, 3).unwrap().workloads[0].result.state == WorkloadResultState::Error).await;
    let dep = engine.get(1, 3).unwrap();
    assert_eq!(dep.workloads[0].result.state, WorkloadResultState::Error);
    assert_eq!(dep.workloads[0].result.error_message.as_deref(), Some("update not supported for this workload type"));
}
