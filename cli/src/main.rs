//! ChainSync CLI: run the event sync daemon and manage its state.
//!
//! # Commands
//! ```text
//! chainsync run        --config <path>
//! chainsync checkpoint show  --config <path>
//! chainsync checkpoint reset --config <path>
//! chainsync signatures
//! chainsync info
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use chainsync_core::checkpoint::{CheckpointStore, JsonFileCheckpointStore};
use chainsync_core::config::SyncConfig;
use chainsync_evm::signature::builtin_signatures;
use chainsync_evm::{HttpRpcClient, SyncBuilder};

mod cmd_run;
mod telemetry;

#[derive(Parser)]
#[command(
    name = "chainsync",
    about = "On-chain event sync engine: index contract events and serve them over HTTP",
    long_about = "
ChainSync polls an EVM JSON-RPC endpoint for logs emitted by configured
contracts, decodes and classifies them, and serves the most recent events
over HTTP and a WebSocket stream.

ENVIRONMENT VARIABLES:
  CHAINSYNC_RPC_URL          Override rpcUrl from the config file
  CHAINSYNC_CHECKPOINT_PATH  Override checkpointPath
  CHAINSYNC_LISTEN           Override server.listen
  RUST_LOG                   Log filter (overrides log.level)
",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the sync loop and the API server until ctrl-c
    Run {
        /// YAML or JSON config file
        #[arg(short, long, default_value = "chainsync.yaml")]
        config: PathBuf,
    },

    /// Inspect or reset the persisted checkpoint
    Checkpoint {
        #[command(subcommand)]
        action: CheckpointAction,
    },

    /// List built-in event signatures and their topic0 hashes
    Signatures {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show build and default configuration info
    Info,
}

#[derive(Subcommand)]
enum CheckpointAction {
    /// Print the last synced block
    Show {
        #[arg(short, long, default_value = "chainsync.yaml")]
        config: PathBuf,
    },
    /// Delete the checkpoint so the next run starts fresh
    Reset {
        #[arg(short, long, default_value = "chainsync.yaml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config } => cmd_run::run(&config).await,
        Commands::Checkpoint { action } => match action {
            CheckpointAction::Show { config } => cmd_checkpoint_show(&config).await,
            CheckpointAction::Reset { config } => cmd_checkpoint_reset(&config).await,
        },
        Commands::Signatures { json } => cmd_signatures(json),
        Commands::Info => {
            cmd_info();
            Ok(())
        }
    }
}

fn load_config(path: &Path) -> Result<SyncConfig> {
    SyncConfig::load(path).with_context(|| format!("failed to load config {}", path.display()))
}

fn checkpoint_store(config: &Path) -> Result<JsonFileCheckpointStore> {
    Ok(JsonFileCheckpointStore::new(load_config(config)?.checkpoint_path))
}

async fn cmd_checkpoint_show(config: &Path) -> Result<()> {
    let store = checkpoint_store(config)?;
    match store
        .load()
        .await
        .with_context(|| format!("cannot read {}", store.path().display()))?
    {
        Some(cp) => println!("lastSyncedBlock: {}", cp.last_synced_block),
        None => println!("no checkpoint at {}", store.path().display()),
    }
    Ok(())
}

async fn cmd_checkpoint_reset(config: &Path) -> Result<()> {
    let config = load_config(config)?;
    let path = config.checkpoint_path.clone();
    // No RPC call is made; the client only satisfies the scheduler's type.
    let rpc = HttpRpcClient::new(config.rpc_url.clone(), None).context("failed to create RPC client")?;
    let scheduler = SyncBuilder::from_config(config)
        .build(rpc)
        .context("invalid sync configuration")?;
    scheduler
        .reset_checkpoint()
        .await
        .with_context(|| format!("failed to delete checkpoint {}", path.display()))?;
    println!("checkpoint reset: {}", path.display());
    Ok(())
}

fn cmd_signatures(json: bool) -> Result<()> {
    let sigs = builtin_signatures()?;
    if json {
        let out: Vec<_> = sigs
            .iter()
            .map(|s| serde_json::json!({ "name": s.name, "signature": s.canonical, "topic0": s.topic0 }))
            .collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        for s in &sigs {
            println!("{:<28} {}  {}", s.name, s.topic0, s.canonical);
        }
    }
    Ok(())
}

fn cmd_info() {
    let defaults = SyncConfig::new("", vec![]);
    println!("ChainSync v{}", env!("CARGO_PKG_VERSION"));
    println!("  Default block range: {} blocks/call", defaults.max_block_range);
    println!("  Default poll interval: {} ms", defaults.poll_interval_ms);
    println!("  Default log retries: {} attempts", defaults.max_log_retries);
    println!("  Default stored events: {}", defaults.max_stored_events);
    println!("  Default checkpoint: {}", defaults.checkpoint_path.display());
    println!("  Default listen address: {}", defaults.server.listen);
    println!("  Routes: GET /events, GET /health, GET /ws");
}
