//! Key layout for the single on-disk database (spec §6: "persisted
//! state layout"). Three logical namespaces share one keyspace,
//! distinguished by a one-byte prefix so prefix iteration stays cheap:
//!
//! - `d` deployments, keyed by `(twin, id)` big-endian.
//! - `j` per-deployment job queue, keyed by `(twin, id, sequence)`.
//! - `h` per-deployment result history, keyed by `(twin, id, sequence)`.
//! - `n` next-sequence counter per deployment.
//! - `m` meta (schema version).

use provisiond_types::{DeploymentId, TwinId};

const DEPLOYMENT_PREFIX: u8 = b'd';
const JOB_PREFIX: u8 = b'j';
const HISTORY_PREFIX: u8 = b'h';
const SEQUENCE_PREFIX: u8 = b'n';
const SCHEMA_VERSION_KEY: &[u8] = b"m:schema_version";

pub fn deployment_key(twin: TwinId, id: DeploymentId) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + 4 + 8);
    key.push(DEPLOYMENT_PREFIX);
    key.extend_from_slice(&twin.to_be_bytes());
    key.extend_from_slice(&id.to_be_bytes());
    key
}

pub fn deployment_twin_prefix(twin: TwinId) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + 4);
    key.push(DEPLOYMENT_PREFIX);
    key.extend_from_slice(&twin.to_be_bytes());
    key
}

pub fn deployment_prefix() -> Vec<u8> {
    vec![DEPLOYMENT_PREFIX]
}

pub fn job_key(twin: TwinId, id: DeploymentId, sequence: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + 4 + 8 + 8);
    key.push(JOB_PREFIX);
    key.extend_from_slice(&twin.to_be_bytes());
    key.extend_from_slice(&id.to_be_bytes());
    key.extend_from_slice(&sequence.to_be_bytes());
    key
}

pub fn job_prefix(twin: TwinId, id: DeploymentId) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + 4 + 8);
    key.push(JOB_PREFIX);
    key.extend_from_slice(&twin.to_be_bytes());
    key.extend_from_slice(&id.to_be_bytes());
    key
}

pub fn history_key(twin: TwinId, id: DeploymentId, sequence: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + 4 + 8 + 8);
    key.push(HISTORY_PREFIX);
    key.extend_from_slice(&twin.to_be_bytes());
    key.extend_from_slice(&id.to_be_bytes());
    key.extend_from_slice(&sequence.to_be_bytes());
    key
}

pub fn history_prefix(twin: TwinId, id: DeploymentId) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + 4 + 8);
    key.push(HISTORY_PREFIX);
    key.extend_from_slice(&twin.to_be_bytes());
    key.extend_from_slice(&id.to_be_bytes());
    key
}

/// A distinct counter namespace from the job-sequence one, so history
/// entries keep accumulating even though job rows are deleted once
/// popped.
pub fn history_sequence_key(twin: TwinId, id: DeploymentId) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + 1 + 4 + 8);
    key.push(SEQUENCE_PREFIX);
    key.push(b'h');
    key.extend_from_slice(&twin.to_be_bytes());
    key.extend_from_slice(&id.to_be_bytes());
    key
}

pub fn sequence_key(twin: TwinId, id: DeploymentId) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + 4 + 8);
    key.push(SEQUENCE_PREFIX);
    key.extend_from_slice(&twin.to_be_bytes());
    key.extend_from_slice(&id.to_be_bytes());
    key
}

pub fn schema_version_key() -> &'static [u8] {
    SCHEMA_VERSION_KEY
}

pub fn decode_twin_id(key: &[u8]) -> Option<(TwinId, DeploymentId)> {
    if key.len() < 1 + 4 + 8 || key[0] != DEPLOYMENT_PREFIX {
        return None;
    }
    let twin = TwinId::from_be_bytes(key[1..5].try_into().ok()?);
    let id = DeploymentId::from_be_bytes(key[5..13].try_into().ok()?);
    Some((twin, id))
}
