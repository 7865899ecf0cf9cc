//! Pool de ejecución de tareas del worker

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::error::WorkerError;
use crate::runner::{ExecutionHandle, InterruptSignal, TaskRunner};

/// Pool de capacidad fija. Cada tarea espera un permiso del semáforo antes de
/// correr, así que nunca hay más de `pool_size` cómputos en paralelo y el
/// resto queda encolado.
pub struct WorkerPool {
    /// Cantidad de slots
    pool_size: usize,

    /// Control de concurrencia local
    semaphore: Arc<Semaphore>,

    /// Tareas enviadas que todavía no tomaron slot
    queued: Arc<AtomicUsize>,

    /// Runtime donde se lanzan los runners
    runtime: Handle,
}

impl WorkerPool {
    pub fn new(pool_size: usize, runtime: Handle) -> Self {
        let pool_size = pool_size.max(1);
        Self {
            pool_size,
            semaphore: Arc::new(Semaphore::new(pool_size)),
            queued: Arc::new(AtomicUsize::new(0)),
            runtime,
        }
    }

    /// Crea el pool sobre el runtime de tokio actual.
    pub fn with_current_runtime(pool_size: usize) -> Result<Self, WorkerError> {
        Ok(Self::new(pool_size, Handle::try_current()?))
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Tareas ocupando un slot en este momento.
    pub fn active_tasks(&self) -> usize {
        self.pool_size - self.semaphore.available_permits()
    }

    pub fn queued_tasks(&self) -> usize {
        self.queued.load(Ordering::Relaxed)
    }

    /// Cierra el pool: las tareas encoladas (y las que lleguen después) no
    /// corren y quedan FAILED. Las que ya tienen slot terminan normalmente.
    pub fn close(&self) {
        self.semaphore.close();
    }

    pub fn is_closed(&self) -> bool {
        self.semaphore.is_closed()
    }

    /// Encola un runner y devuelve enseguida el handle para interrumpirlo.
    pub fn submit(&self, runner: TaskRunner) -> ExecutionHandle {
        let signal = Arc::new(InterruptSignal::new());
        let handle = ExecutionHandle::new(Arc::clone(&signal));

        let semaphore = Arc::clone(&self.semaphore);
        let queued = Arc::clone(&self.queued);
        queued.fetch_add(1, Ordering::Relaxed);

        self.runtime.spawn(async move {
            let permit = semaphore.acquire_owned().await;
            queued.fetch_sub(1, Ordering::Relaxed);

            let permit = match permit {
                Ok(p) => p,
                Err(_) => {
                    warn!(task = %runner.key(), "semáforo del pool cerrado, no se puede correr la tarea");
                    runner.reject(signal, "el pool de ejecución está cerrado");
                    return;
                }
            };

            debug!(task = %runner.key(), "tarea tomó un slot del pool");
            runner.run(signal).await;

            // liberar el slot al terminar
            drop(permit);
        });

        handle
    }
}
