//! Schema migration (spec §4.1): the `meta` namespace carries a schema
//! integer; opening an older on-disk format walks every deployment,
//! rewrites it, and bumps the marker. Re-running on an already current
//! store is a no-op.

use crate::error::StoreResult;
use crate::keys;
use provisiond_types::Deployment;
use rocksdb::{IteratorMode, WriteBatch, DB};
use tracing::{debug, info};

/// Current on-disk schema version this binary understands.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Runs any migrations needed to bring `db` up to
/// [`CURRENT_SCHEMA_VERSION`]. Idempotent: calling this twice in a row
/// on an already-migrated store performs no writes on the second call.
pub fn migrate(db: &DB) -> StoreResult<()> {
    let on_disk = read_schema_version(db)?;
    if on_disk == CURRENT_SCHEMA_VERSION {
        debug!(version = on_disk, "store schema already current");
        return Ok(());
    }
    if on_disk == 0 {
        // Fresh database: nothing to rewrite, just stamp the version.
        info!(version = CURRENT_SCHEMA_VERSION, "initializing fresh store schema");
        write_schema_version(db, CURRENT_SCHEMA_VERSION)?;
        return Ok(());
    }
    info!(from = on_disk, to = CURRENT_SCHEMA_VERSION, "migrating store schema");
    for v in (on_disk + 1)..=CURRENT_SCHEMA_VERSION {
        run_step(db, v)?;
    }
    write_schema_version(db, CURRENT_SCHEMA_VERSION)?;
    Ok(())
}

/// A single version-to-version step. There is only one schema version
/// so far; this exists so a future bump has a natural home.
fn run_step(db: &DB, to_version: u32) -> StoreResult<()> {
    let mut batch = WriteBatch::default();
    let prefix = keys::deployment_prefix();
    let iter = db.prefix_iterator(&prefix);
    for item in iter {
        let (key, value) = item?;
        if !key.starts_with(&prefix) {
            break;
        }
        let dep: Deployment = bincode::deserialize(&value)?;
        // Rewriting unconditionally keeps this step idempotent even if
        // a future migration changes the wire shape of `Deployment`.
        batch.put(&key, bincode::serialize(&dep)?);
    }
    db.write(batch)?;
    debug!(to_version, "migration step applied");
    Ok(())
}

fn read_schema_version(db: &DB) -> StoreResult<u32> {
    match db.get(keys::schema_version_key())? {
        Some(bytes) => Ok(bincode::deserialize(&bytes)?),
        None => Ok(0),
    }
}

fn write_schema_version(db: &DB, version: u32) -> StoreResult<()> {
    db.put(keys::schema_version_key(), bincode::serialize(&version)?)?;
    Ok(())
}
