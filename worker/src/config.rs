use clap::Parser;
use common::WorkerNetAddress;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::WorkerError;
use crate::runner::RunTaskContext;

const DEFAULT_POOL_SIZE: usize = 2;

/// Flags del worker. Todos se pueden pasar también por variable de entorno
/// (en Docker usamos MASTER_URL=http://master:8080).
#[derive(Parser, Debug, Clone)]
#[command(name = "worker")]
#[command(about = "Worker: ejecuta tareas y reporta su estado al master")]
pub struct WorkerArgs {
    /// URL base del master
    #[arg(long, env = "MASTER_URL", default_value = "http://localhost:8080")]
    pub master_url: String,

    /// Tareas en paralelo
    #[arg(short = 'n', long, env = "WORKER_POOL_SIZE", default_value_t = DEFAULT_POOL_SIZE)]
    pub pool_size: usize,

    /// Host con el que se anuncia el worker (por defecto, el hostname)
    #[arg(long, env = "WORKER_HOST")]
    pub host: Option<String>,

    #[arg(long, env = "WORKER_RPC_PORT", default_value_t = 29998)]
    pub rpc_port: u16,

    #[arg(long, env = "WORKER_DATA_PORT", default_value_t = 29999)]
    pub data_port: u16,

    /// Intervalo entre heartbeats, en milisegundos
    #[arg(long, env = "HEARTBEAT_INTERVAL_MS", default_value_t = 1000)]
    pub heartbeat_interval_ms: u64,

    /// Directorio de trabajo para las tareas
    #[arg(long, env = "WORKER_SCRATCH_DIR", default_value = "/data/tmp")]
    pub scratch_dir: PathBuf,
}

/// Configuración ya validada del worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub master_url: String,
    pub pool_size: usize,
    pub address: WorkerNetAddress,
    pub heartbeat_interval: Duration,
    pub scratch_dir: PathBuf,
}

impl WorkerConfig {
    pub fn from_args(args: WorkerArgs) -> Result<Self, WorkerError> {
        if args.pool_size == 0 {
            return Err(WorkerError::config("pool_size", "debe ser al menos 1"));
        }
        if args.heartbeat_interval_ms == 0 {
            return Err(WorkerError::config(
                "heartbeat_interval_ms",
                "debe ser mayor a 0",
            ));
        }

        let master_url = args.master_url.trim_end_matches('/').to_string();
        if !master_url.starts_with("http://") && !master_url.starts_with("https://") {
            return Err(WorkerError::config(
                "master_url",
                format!("'{}' no es una URL http(s)", master_url),
            ));
        }

        let host = match args.host {
            Some(h) if !h.trim().is_empty() => h,
            _ => hostname::get()
                .unwrap_or_default()
                .to_string_lossy()
                .to_string(),
        };
        if host.is_empty() {
            return Err(WorkerError::config("host", "no se pudo determinar el hostname"));
        }

        Ok(Self {
            master_url,
            pool_size: args.pool_size,
            address: WorkerNetAddress::new(host, args.rpc_port, args.data_port),
            heartbeat_interval: Duration::from_millis(args.heartbeat_interval_ms),
            scratch_dir: args.scratch_dir,
        })
    }

    pub fn run_context(&self) -> RunTaskContext {
        RunTaskContext::new(self.scratch_dir.clone())
    }
}
