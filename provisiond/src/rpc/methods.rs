//! Dispatches inbound RPC calls to [`provisiond_engine::Engine`]
//! (spec §6's inbound request surface table).

use super::types::{DeploymentRefParams, RpcResponse, SignedDeploymentParams};
use provisiond_auth::SignedRequest;
use provisiond_engine::Engine;
use provisiond_types::EngineError;
use serde_json::{json, Value};

/// JSON-RPC error codes for engine error kinds, following the
/// `-32000`-and-below "server error" range JSON-RPC reserves for
/// application-defined errors.
fn error_code(err: &EngineError) -> i32 {
    match err {
        EngineError::Unauthorized => -32001,
        EngineError::Invalid { .. } => -32002,
        EngineError::Conflict => -32003,
        EngineError::NotFound => -32004,
        EngineError::InsufficientCapacity { .. } => -32005,
        EngineError::Busy => -32006,
        EngineError::NotSupported => -32007,
        EngineError::VersionNotMonotone => -32008,
        EngineError::Store(_) => -32000,
    }
}

fn engine_error_response(err: EngineError, id: Option<Value>) -> RpcResponse {
    let code = error_code(&err);
    RpcResponse::error(code, err.to_string(), id)
}

fn invalid_params(id: Option<Value>, reason: impl Into<String>) -> RpcResponse {
    RpcResponse::error(-32602, reason.into(), id)
}

fn decode_signed_request(
    params: Option<Value>,
) -> Result<SignedRequest<provisiond_types::Deployment>, String> {
    let params: SignedDeploymentParams =
        serde_json::from_value(params.ok_or("missing params")?).map_err(|e| e.to_string())?;
    let mut request = SignedRequest::new(params.deployment);
    for sig in params.signatures {
        let bytes = hex::decode(&sig.signature_hex).map_err(|e| e.to_string())?;
        request = request.signed_by(sig.twin, bytes);
    }
    Ok(request)
}

pub async fn dispatch(engine: &Engine, method: &str, params: Option<Value>, id: Option<Value>) -> RpcResponse {
    match method {
        "deployment.deploy" => {
            let request = match decode_signed_request(params) {
                Ok(r) => r,
                Err(reason) => return invalid_params(id, reason),
            };
            match engine.deploy(request).await {
                Ok(()) => RpcResponse::success(json!({}), id),
                Err(e) => engine_error_response(e, id),
            }
        }

        "deployment.update" => {
            let request = match decode_signed_request(params) {
                Ok(r) => r,
                Err(reason) => return invalid_params(id, reason),
            };
            match engine.update(request).await {
                Ok(()) => RpcResponse::success(json!({}), id),
                Err(e) => engine_error_response(e, id),
            }
        }

        "deployment.get" => {
            let Some(params) = params else { return invalid_params(id, "missing params") };
            let refs: DeploymentRefParams = match serde_json::from_value(params) {
                Ok(r) => r,
                Err(e) => return invalid_params(id, e.to_string()),
            };
            let Some(dep_id) = refs.id else { return invalid_params(id, "missing id") };
            match engine.get(refs.twin, dep_id) {
                Ok(dep) => RpcResponse::success(serde_json::to_value(dep).unwrap(), id),
                Err(e) => engine_error_response(e, id),
            }
        }

        "deployment.list" => {
            let Some(params) = params else { return invalid_params(id, "missing params") };
            let refs: DeploymentRefParams = match serde_json::from_value(params) {
                Ok(r) => r,
                Err(e) => return invalid_params(id, e.to_string()),
            };
            match engine.list_by_twin(refs.twin) {
                Ok(deps) => RpcResponse::success(serde_json::to_value(deps).unwrap(), id),
                Err(e) => engine_error_response(e, id),
            }
        }

        "deployment.changes" => {
            let Some(params) = params else { return invalid_params(id, "missing params") };
            let refs: DeploymentRefParams = match serde_json::from_value(params) {
                Ok(r) => r,
                Err(e) => return invalid_params(id, e.to_string()),
            };
            let Some(dep_id) = refs.id else { return invalid_params(id, "missing id") };
            match engine.changes(refs.twin, dep_id) {
                Ok(history) => RpcResponse::success(serde_json::to_value(history).unwrap(), id),
                Err(e) => engine_error_response(e, id),
            }
        }

        "deployment.delete" => {
            let Some(params) = params else { return invalid_params(id, "missing params") };
            let refs: DeploymentRefParams = match serde_json::from_value(params) {
                Ok(r) => r,
                Err(e) => return invalid_params(id, e.to_string()),
            };
            let Some(dep_id) = refs.id else { return invalid_params(id, "missing id") };
            let caller = refs.caller.unwrap_or(refs.twin);
            match engine.delete(refs.twin, dep_id, caller).await {
                Ok(()) => RpcResponse::success(json!({}), id),
                Err(e) => engine_error_response(e, id),
            }
        }

        "statistics.get" => match engine.statistics() {
            Ok(stats) => RpcResponse::success(serde_json::to_value(stats).unwrap(), id),
            Err(e) => engine_error_response(e, id),
        },

        other => RpcResponse::error(-32601, format!("method not found: {other}"), id),
    }
}
