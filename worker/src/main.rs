use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use worker::{WorkerArgs, WorkerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("worker=debug,reqwest=info")),
        )
        .init();

    let config = WorkerConfig::from_args(WorkerArgs::parse())?;
    info!(
        "worker {} contra {} (pool_size={})",
        config.address, config.master_url, config.pool_size
    );

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("señal de apagado recibida");
            signal_token.cancel();
        }
    });

    worker::worker::run(config, shutdown).await?;
    Ok(())
}
