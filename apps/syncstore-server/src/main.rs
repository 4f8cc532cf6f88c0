//! HTTP server for the sync storage engine.
//!
//! Wires configuration, snapshot loading, the maintenance runtime and the
//! HTTP API together, and shuts down gracefully on Ctrl+C.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use anyhow::Context;
use clap::Parser;
use syncstore_api::{Router, Server};
use syncstore_core::persistence::PersistenceManager;
use syncstore_core::{StorageError, Store, StoreConfig};
use syncstore_runtime::{MaintenanceCommand, Runtime};
use tokio::signal;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

/// Command-line arguments for the storage server.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value_t = 5000)]
    port: u16,

    /// Host address to bind to
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Data directory for persistence
    #[arg(long, default_value = "./data")]
    data_dir: PathBuf,

    /// Keep everything in memory and never touch the data directory
    #[arg(long)]
    in_memory: bool,

    /// Tick rate for the maintenance loop (Hz)
    #[arg(long, default_value_t = 10)]
    tickrate: u32,

    /// Request body read timeout in milliseconds
    #[arg(long, default_value_t = 5000)]
    request_timeout_ms: u64,

    /// Maximum payload size per object in bytes
    #[arg(long, default_value_t = 256 * 1024)]
    max_payload_bytes: usize,

    /// Maximum objects applied per batch upload
    #[arg(long, default_value_t = 100)]
    max_batch_records: usize,
}

impl Args {
    fn store_config(&self) -> StoreConfig {
        StoreConfig {
            tickrate: self.tickrate,
            data_dir: self.data_dir.clone(),
            persist: !self.in_memory,
            max_payload_bytes: self.max_payload_bytes,
            max_batch_records: self.max_batch_records,
            request_timeout_ms: self.request_timeout_ms,
            ..StoreConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = args.store_config();
    let store = Arc::new(Store::new(config.clone()));

    let persistence = if config.persist {
        let persistence = PersistenceManager::new(&config);
        match persistence.load(&store) {
            Ok(owners) => tracing::info!(owners, data_dir = %config.data_dir.display(), "loaded snapshots"),
            Err(StorageError::DataCorruption(msg)) => {
                tracing::error!("Snapshot corruption detected: {}", msg);
                tracing::error!("Server cannot start. Restore the data directory from backup or run `syncstore-tool verify`.");
                std::process::exit(1);
            }
            Err(e) => return Err(e).context("failed to load snapshots"),
        }
        Some(persistence)
    } else {
        tracing::info!("running in memory, nothing will be persisted");
        None
    };

    // Maintenance runtime on its own thread
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let runtime_store = store.clone();
    let runtime_handle = thread::Builder::new()
        .name("syncstore-runtime".to_string())
        .spawn(move || {
            let mut runtime = Runtime::new(runtime_store, persistence, command_rx);
            runtime.run()
        })
        .context("failed to spawn runtime thread")?;

    let addr: SocketAddr = format!("{}:{}", args.host, args.port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", args.host, args.port))?;
    let server = Server::new(addr, Router::new(store));

    tracing::info!(
        %addr,
        tickrate = args.tickrate,
        in_memory = args.in_memory,
        request_timeout_ms = args.request_timeout_ms,
        max_payload_bytes = args.max_payload_bytes,
        max_batch_records = args.max_batch_records,
        "starting sync storage server"
    );

    let served = server
        .serve_with_shutdown(async {
            if let Err(e) = signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl_c");
                std::future::pending::<()>().await;
            }
            tracing::info!("shutting down server");
        })
        .await;

    // The runtime also stops once every sender is dropped
    let _ = command_tx.send(MaintenanceCommand::Shutdown);
    let runtime_result = tokio::task::spawn_blocking(move || runtime_handle.join())
        .await
        .context("failed to join runtime thread")?;
    match runtime_result {
        Ok(Ok(())) => tracing::info!("runtime stopped cleanly"),
        Ok(Err(e)) => tracing::error!(error = %e, "runtime stopped with error"),
        Err(_) => tracing::error!("runtime thread panicked"),
    }

    served.context("server error")
}
