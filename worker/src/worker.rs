use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::WorkerConfig;
use crate::error::WorkerError;
use crate::heartbeat::{HeartbeatLoop, MasterClient};
use crate::pool::WorkerPool;
use crate::registry::JobRegistry;
use crate::tracker::TaskTracker;

const REGISTER_RETRY: Duration = Duration::from_secs(2);

/// Loop principal del worker.
/// - Arma el pool y el tracker.
/// - Se registra en el master (reintentando hasta que conteste).
/// - Hace heartbeats periódicos hasta que se cancele `shutdown`.
/// - Al apagar, cierra el pool para no arrancar tareas encoladas.
pub async fn run(config: WorkerConfig, shutdown: CancellationToken) -> Result<(), WorkerError> {
    let registry = Arc::new(JobRegistry::with_builtin());
    info!("jobs disponibles: {:?}", registry.names());

    let pool = WorkerPool::with_current_runtime(config.pool_size)?;
    let tracker = TaskTracker::new(pool, registry, config.address.clone());

    let mut heartbeat = HeartbeatLoop::new(
        Arc::clone(&tracker),
        MasterClient::new(config.master_url.clone()),
        config.run_context(),
        config.heartbeat_interval,
    );

    if heartbeat
        .register_until_ok(REGISTER_RETRY, &shutdown)
        .await
        .is_none()
    {
        info!("apagado pedido antes de registrarse en el master");
        return Ok(());
    }

    heartbeat.run(shutdown).await;

    tracker.pool().close();
    info!(
        "pool cerrado; {} tareas siguen corriendo hasta terminar",
        tracker.pool().active_tasks()
    );
    Ok(())
}
