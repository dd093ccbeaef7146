//! provisiond: the node-local workload provisioning daemon.
//!
//! Wires the store, accountant, manager registry, authorizer and
//! engine together, starts the reporter and the inbound RPC listener,
//! and runs until a shutdown signal is received (spec §1, §5).

mod directory;
mod rpc;
mod sink;

use anyhow::{Context, Result};
use clap::Parser;
use provisiond_accountant::Accountant;
use provisiond_auth::Authorizer;
use provisiond_config::{Cli, NodeConfig};
use provisiond_engine::{Engine, EngineConfig};
use provisiond_registry::Registry;
use provisiond_store::Store;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = NodeConfig::load(&cli.config, &cli).context("loading configuration")?;
    init_tracing(&config.logging)?;

    info!(target: "provisiond", root_dir = %config.root_dir.display(), workers = config.workers, "starting provisiond");

    std::fs::create_dir_all(&config.root_dir)
        .with_context(|| format!("creating root dir {}", config.root_dir.display()))?;
    let db_path = config.root_dir.join("db");
    let store = Arc::new(Store::open(&db_path).with_context(|| format!("opening store at {}", db_path.display()))?);

    let total_capacity = config.capacity.resolve();
    let accountant = Accountant::new(total_capacity);
    let registry = Arc::new(Registry::with_builtin_managers());

    let directory = Arc::new(
        directory::FileDirectory::load(&config.twin_keys_path)
            .with_context(|| format!("loading twin-key directory {}", config.twin_keys_path.display()))?,
    );
    let authorizer = Arc::new(Authorizer::new(directory.clone(), directory, config.admin_farm));

    let engine_config = EngineConfig {
        workers: config.workers,
        drain_timeout: config.drain_timeout(),
        report_interval: config.report_interval(),
        queue_soft_bound: config.queue_soft_bound,
    };
    let (engine, terminal_rx) = Engine::start(store.clone(), accountant, registry.clone(), authorizer, engine_config)
        .context("starting provision engine")?;
    let engine = Arc::new(engine);

    let report_sink = Arc::new(sink::LoggingReportSink);
    let shutdown = tokio_util::sync::CancellationToken::new();
    let reporter_handle = provisiond_engine::reporter::spawn(
        store,
        registry,
        report_sink,
        config.report_interval(),
        terminal_rx,
        shutdown.child_token(),
    );

    let listen_addr: std::net::SocketAddr = config
        .listen
        .parse()
        .with_context(|| format!("invalid --listen address {}", config.listen))?;
    let (bound_addr, rpc_server) = rpc::serve(engine.clone(), listen_addr);
    info!(target: "provisiond", addr = %bound_addr, "bus-facing RPC listener bound");
    let rpc_handle = tokio::spawn(rpc_server);

    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(target: "provisiond", error = %err, "failed to wait for shutdown signal");
    } else {
        info!(target: "provisiond", "shutdown signal received");
    }

    shutdown.cancel();
    rpc_handle.abort();
    engine.shutdown().await;
    let _ = reporter_handle.await;
    info!(target: "provisiond", "shutdown complete");
    Ok(())
}

fn init_tracing(logging: &provisiond_config::LoggingSection) -> Result<()> {
    let filter_spec = format!("{level},provisiond={level}", level = logging.level);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter_spec));
    let subscriber = tracing_subscriber::fmt().with_env_filter(env_filter);
    if logging.format == "json" {
        subscriber.json().try_init().map_err(|e| anyhow::anyhow!(e.to_string()))?;
    } else {
        subscriber.try_init().map_err(|e| anyhow::anyhow!(e.to_string()))?;
    }
    Ok(())
}
