//! Inbound bus-facing RPC surface (spec §6: "delivered over a message
//! bus; encoding is a self-describing binary/JSON-ish object
//! container"). The actual bus transport is an external collaborator
//! (spec §1); this crate stands in with a JSON-RPC-over-HTTP listener
//! in the style of `crates/rpc_server`, which a real deployment
//! replaces with whatever bus client the grid actually uses.

pub mod methods;
pub mod types;

use provisiond_engine::Engine;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::warn;
use types::RpcRequest;
use warp::Filter;

pub fn serve(engine: Arc<Engine>, addr: SocketAddr) -> (SocketAddr, impl std::future::Future<Output = ()>) {
    let engine_filter = warp::any().map(move || engine.clone());

    let route = warp::path("rpc")
        .and(warp::post())
        .and(warp::body::json())
        .and(engine_filter)
        .and_then(|request: RpcRequest, engine: Arc<Engine>| async move {
            let response = methods::dispatch(&engine, &request.method, request.params, request.id).await;
            Ok::<_, std::convert::Infallible>(warp::reply::json(&response))
        })
        .recover(handle_rejection);

    warp::serve(route).bind_ephemeral(addr)
}

async fn handle_rejection(err: warp::Rejection) -> Result<impl warp::Reply, std::convert::Infallible> {
    warn!(?err, "rpc request rejected");
    let body = types::RpcResponse::error(-32700, "parse error", None);
    Ok(warp::reply::with_status(warp::reply::json(&body), warp::http::StatusCode::BAD_REQUEST))
}
