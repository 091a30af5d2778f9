//! `chainsync run`: the long-running indexer daemon.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::oneshot;

use chainsync_core::config::SyncConfig;
use chainsync_evm::{HttpRpcClient, SyncBuilder};
use chainsync_server::{AppState, NodeInfo};

use crate::telemetry;

pub async fn run(config_path: &Path) -> Result<()> {
    let config = SyncConfig::load(config_path)
        .with_context(|| format!("failed to load config {}", config_path.display()))?;
    telemetry::init_tracing(&config.log);

    let rpc = HttpRpcClient::new(
        config.rpc_url.clone(),
        config.request_timeout_ms.map(Duration::from_millis),
    )
    .context("failed to create RPC client")?;

    let scheduler = SyncBuilder::from_config(config.clone())
        .build(rpc)
        .context("invalid sync configuration")?;
    scheduler
        .init()
        .await
        .with_context(|| format!("cannot read checkpoint {}", config.checkpoint_path.display()))?;

    let state = AppState::new(
        NodeInfo::from_config(&config),
        scheduler.buffer(),
        Arc::new(scheduler.clone()),
        config.server.stream_capacity,
    );
    let bridge = state.attach(&scheduler.hub());

    let listener = chainsync_server::bind(&config.server.listen).await?;
    tracing::info!(
        chain_id = config.chain_id,
        contracts = config.contracts.len(),
        rpc = %config.rpc_url,
        "chainsync starting"
    );

    let sync = scheduler.start();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let mut server = tokio::spawn(chainsync_server::serve(listener, state, async move {
        let _ = stop_rx.await;
    }));

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for ctrl-c")?;
            tracing::info!("shutdown requested");
        }
        res = &mut server => {
            // Server exited on its own; surface why.
            scheduler.stop();
            let _ = sync.await;
            res.context("server task panicked")??;
            return Ok(());
        }
    }

    scheduler.stop();
    if let Err(e) = sync.await {
        tracing::warn!(error = %e, "sync task ended abnormally");
    }
    let _ = bridge.unsubscribe().await;
    let _ = stop_tx.send(());
    server.await.context("server task panicked")??;

    let status = scheduler.status();
    tracing::info!(
        last_synced_block = ?status.last_synced_block,
        events = status.events_emitted,
        "chainsync stopped"
    );
    Ok(())
}
