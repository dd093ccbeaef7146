//! JSON-RPC 2.0 request/response envelopes for the inbound bus-facing
//! surface (spec §6), patterned on `crates/rpc_server/src/types.rs`.

use provisiond_types::{Deployment, DeploymentId, TwinId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub method: String,
    pub params: Option<Value>,
    pub id: Option<Value>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
    pub id: Option<Value>,
}

impl RpcResponse {
    pub fn success(result: Value, id: Option<Value>) -> Self {
        RpcResponse { jsonrpc: "2.0".to_string(), result: Some(result), error: None, id }
    }

    pub fn error(code: i32, message: impl Into<String>, id: Option<Value>) -> Self {
        RpcResponse {
            jsonrpc: "2.0".to_string(),
            result: None,
            error: Some(RpcError { code, message: message.into(), data: None }),
            id,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// One signature over the deployment's canonical bytes, hex-encoded.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SignatureParam {
    pub twin: TwinId,
    pub signature_hex: String,
}

/// Params shape for `deployment.deploy` / `deployment.update`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SignedDeploymentParams {
    pub deployment: Deployment,
    pub signatures: Vec<SignatureParam>,
}

/// Params shape for `deployment.get` / `deployment.list` /
/// `deployment.changes` / `deployment.delete`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeploymentRefParams {
    pub twin: TwinId,
    pub id: Option<DeploymentId>,
    /// Caller twin for operations that distinguish owner vs. admin
    /// (spec §4.5); defaults to `twin` for the common tenant-acting-
    /// on-their-own-deployment case.
    pub caller: Option<TwinId>,
}
