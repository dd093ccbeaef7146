//! Error kinds produced at the engine's public entry points (spec §7).

use crate::capacity::Axis;
use thiserror::Error;

/// Errors the engine surfaces directly to callers. Worker-level
/// failures are recorded in a workload's `result`, not raised here;
/// see [`crate::job::JobOutcome`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("unauthorized")]
    Unauthorized,

    #[error("invalid: {reason}")]
    Invalid { reason: String },

    #[error("conflict: deployment already exists")]
    Conflict,

    #[error("not found")]
    NotFound,

    #[error("insufficient capacity on {axis}")]
    InsufficientCapacity { axis: Axis },

    #[error("busy: queue depth exceeds soft bound")]
    Busy,

    #[error("not supported for this workload type")]
    NotSupported,

    #[error("version not monotone")]
    VersionNotMonotone,

    #[error("store error: {0}")]
    Store(String),
}

/// Classification a primitive manager call returns on failure, used by
/// the engine's retry policy (spec §7).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ManagerError {
    #[error("transient: {0}")]
    Transient(String),

    #[error("permanent: {0}")]
    Permanent(String),

    #[error("not supported")]
    NotSupported,
}

pub type EngineResult<T> = Result<T, EngineError>;
