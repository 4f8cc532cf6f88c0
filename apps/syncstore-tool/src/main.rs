//! Offline maintenance for a sync storage data directory.
//!
//! Provides commands for:
//! - Listing owners and their collections
//! - Verifying data file checksums
//! - Purging expired objects and rewriting the affected snapshots
//!
//! Run it against a data directory no server is currently using.

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use syncstore_core::persistence::PersistenceManager;
use syncstore_core::{Store, StoreConfig};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Data directory to operate on
    #[arg(long, global = true, default_value = "./data")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List owners with per-collection counts, usage and last-modified
    Inspect {
        /// Only show this owner
        #[arg(short, long)]
        owner: Option<String>,
    },

    /// Check every data file against the manifest checksums
    Verify,

    /// Drop expired objects and rewrite the owners that changed
    Purge,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let config = StoreConfig {
        data_dir: cli.data_dir.clone(),
        ..StoreConfig::default()
    };
    let persistence = PersistenceManager::new(&config);

    match cli.command {
        Commands::Inspect { owner } => inspect(&config, &persistence, owner.as_deref()),
        Commands::Verify => verify(&persistence),
        Commands::Purge => purge(&config, &persistence),
    }
}

fn load(config: &StoreConfig, persistence: &PersistenceManager) -> anyhow::Result<Store> {
    let store = Store::new(config.clone());
    let owners = persistence
        .load(&store)
        .with_context(|| format!("failed to load {}", config.data_dir.display()))?;
    tracing::info!(owners, "loaded data directory");
    Ok(store)
}

fn inspect(
    config: &StoreConfig,
    persistence: &PersistenceManager,
    only: Option<&str>,
) -> anyhow::Result<()> {
    let store = load(config, persistence)?;
    let owners: Vec<String> = store
        .owners()?
        .into_iter()
        .filter(|owner| only.map_or(true, |only| owner == only))
        .collect();

    if owners.is_empty() {
        println!("no owners in {}", config.data_dir.display());
        return Ok(());
    }

    for owner in owners {
        let index = store.collection_index(&owner)?;
        println!("{} ({} collections)", owner, index.collections().len());
        for (name, info) in index.collections() {
            println!(
                "  {:<24} count={:<8} usage={:<10} last_modified={}",
                name, info.count, info.usage, info.last_modified
            );
        }
    }
    Ok(())
}

fn verify(persistence: &PersistenceManager) -> anyhow::Result<()> {
    let entries = persistence.verify()?;
    let mut failures = 0;
    for entry in &entries {
        match &entry.error {
            None => println!("ok      {} ({})", entry.owner, entry.file),
            Some(error) => {
                failures += 1;
                println!("FAILED  {} ({}): {}", entry.owner, entry.file, error);
            }
        }
    }

    if failures > 0 {
        bail!("{} of {} data files failed verification", failures, entries.len());
    }
    println!("{} data files verified", entries.len());
    Ok(())
}

fn purge(config: &StoreConfig, persistence: &PersistenceManager) -> anyhow::Result<()> {
    let store = load(config, persistence)?;
    let purged = store.purge_expired()?;
    let report = persistence.flush_dirty(&store)?;

    println!(
        "purged {} expired objects, rewrote {} owners",
        purged, report.flushed
    );
    if report.failed > 0 {
        bail!("{} owners could not be written", report.failed);
    }
    Ok(())
}
