//! Worker: ejecuta las tareas que despacha el master y le reporta su estado.
//!
//! - `tracker`: estado autoritativo de las tareas del worker
//! - `runner` / `pool`: ejecución concurrente con interrupción cooperativa
//! - `heartbeat`: reconciliación periódica con el master

pub mod config;
pub mod error;
pub mod heartbeat;
pub mod jobs;
pub mod pool;
pub mod registry;
pub mod runner;
pub mod tracker;
pub mod worker;

pub use config::{WorkerArgs, WorkerConfig};
pub use error::WorkerError;
pub use heartbeat::{HeartbeatLoop, HeartbeatOutcome, MasterClient};
pub use pool::WorkerPool;
pub use registry::{JobDefinition, JobRegistry};
pub use runner::{ExecutionHandle, InterruptOutcome, RunTaskContext, TaskContext, TaskRunner};
pub use tracker::{TaskTracker, CANCEL_FAILED_MESSAGE};
