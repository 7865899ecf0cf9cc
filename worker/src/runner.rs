//! Ejecución de una tarea sobre un slot del pool y su handshake de interrupción.
//!
//! El runner y el tracker comparten un `InterruptSignal`. Quien gana la
//! transición atómica sobre la señal es el único que reporta el estado
//! terminal de la tarea:
//! - si el runner termina primero, "compromete" su reporte y un `cancel`
//!   posterior no hace nada;
//! - si el `cancel` llega primero, el runner descarta lo que haya calculado.

use common::{JobConfig, TaskArgs, TaskKey};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::WorkerError;
use crate::registry::JobRegistry;
use crate::tracker::TaskTracker;

// Estados de la señal compartida runner <-> tracker
const QUEUED: u8 = 0;
const RUNNING: u8 = 1;
const SHIELDED: u8 = 2;
const INTERRUPTED: u8 = 3;
const ABANDONED: u8 = 4;
const REPORTED: u8 = 5;

/// Resultado inmediato de pedir la interrupción de una tarea.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptOutcome {
    /// La interrupción fue aceptada; la tarea no va a reportar nada más.
    Interrupted,
    /// La tarea está en una sección no interrumpible.
    Refused,
    /// El runner ya comprometió su propio reporte.
    AlreadyFinished,
}

#[derive(Debug)]
pub(crate) struct InterruptSignal {
    state: AtomicU8,
    token: CancellationToken,
}

impl InterruptSignal {
    pub(crate) fn new() -> Self {
        Self {
            state: AtomicU8::new(QUEUED),
            token: CancellationToken::new(),
        }
    }

    /// QUEUED -> RUNNING. Falla si la tarea se canceló mientras esperaba slot.
    fn start(&self) -> bool {
        self.state
            .compare_exchange(QUEUED, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn interrupt(&self) -> InterruptOutcome {
        let prev = self
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |s| match s {
                QUEUED | RUNNING => Some(INTERRUPTED),
                SHIELDED => Some(ABANDONED),
                _ => None,
            });

        match prev {
            Ok(SHIELDED) => {
                // avisamos igual: al salir de la sección el cómputo puede cortar
                self.token.cancel();
                InterruptOutcome::Refused
            }
            Ok(_) => {
                self.token.cancel();
                InterruptOutcome::Interrupted
            }
            Err(_) => InterruptOutcome::AlreadyFinished,
        }
    }

    /// RUNNING|SHIELDED -> REPORTED. Sólo quien gana esto reporta al tracker.
    fn commit_report(&self) -> bool {
        self.state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |s| match s {
                RUNNING | SHIELDED => Some(REPORTED),
                _ => None,
            })
            .is_ok()
    }

    fn is_interrupted(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Token de propiedad sobre una tarea en vuelo. Sólo sirve para interrumpirla.
#[derive(Debug, Clone)]
pub struct ExecutionHandle {
    signal: Arc<InterruptSignal>,
}

impl ExecutionHandle {
    pub(crate) fn new(signal: Arc<InterruptSignal>) -> Self {
        Self { signal }
    }

    /// Pide la interrupción cooperativa. No espera a que el cómputo se detenga.
    pub fn interrupt(&self) -> InterruptOutcome {
        self.signal.interrupt()
    }
}

/// Contexto del worker que se entrega a cada tarea al hacer submit.
#[derive(Debug, Clone)]
pub struct RunTaskContext {
    scratch_dir: PathBuf,
}

impl RunTaskContext {
    pub fn new(scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            scratch_dir: scratch_dir.into(),
        }
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }
}

impl Default for RunTaskContext {
    fn default() -> Self {
        Self::new(std::env::temp_dir().join("worker-scratch"))
    }
}

/// Lo que ve una definición de job mientras corre.
pub struct TaskContext {
    key: TaskKey,
    run: RunTaskContext,
    signal: Arc<InterruptSignal>,
    runtime: Handle,
}

impl TaskContext {
    fn new(key: TaskKey, run: RunTaskContext, signal: Arc<InterruptSignal>, runtime: Handle) -> Self {
        Self {
            key,
            run,
            signal,
            runtime,
        }
    }

    pub fn job_id(&self) -> i64 {
        self.key.job_id
    }

    pub fn task_id(&self) -> i64 {
        self.key.task_id
    }

    pub fn scratch_dir(&self) -> &Path {
        self.run.scratch_dir()
    }

    pub fn is_interrupted(&self) -> bool {
        self.signal.is_interrupted()
    }

    pub fn check_interrupted(&self) -> Result<(), WorkerError> {
        if self.is_interrupted() {
            Err(WorkerError::Interrupted)
        } else {
            Ok(())
        }
    }

    /// Duerme `duration` o hasta que llegue una interrupción.
    pub fn sleep(&self, duration: Duration) -> Result<(), WorkerError> {
        let token = self.signal.token.clone();
        self.runtime.block_on(async move {
            tokio::select! {
                _ = token.cancelled() => Err(WorkerError::Interrupted),
                _ = tokio::time::sleep(duration) => Ok(()),
            }
        })
    }

    /// Corre `f` en una sección donde los pedidos de interrupción se rechazan.
    /// Un `cancel` que llegue mientras tanto termina la tarea como FAILED.
    pub fn uninterruptible<R>(&self, f: impl FnOnce() -> R) -> Result<R, WorkerError> {
        let state = &self.signal.state;
        match state.compare_exchange(RUNNING, SHIELDED, Ordering::AcqRel, Ordering::Acquire) {
            Ok(_) => {
                let out = f();
                // si nos abandonaron durante la sección, el estado queda en ABANDONED
                let _ = state.compare_exchange(SHIELDED, RUNNING, Ordering::AcqRel, Ordering::Acquire);
                Ok(out)
            }
            Err(SHIELDED) => Ok(f()),
            Err(_) => Err(WorkerError::Interrupted),
        }
    }
}

/// Unidad de trabajo: ejecuta una tarea y reporta su resultado al tracker una sola vez.
pub struct TaskRunner {
    key: TaskKey,
    job_config: JobConfig,
    args: TaskArgs,
    context: RunTaskContext,
    registry: Arc<JobRegistry>,
    tracker: Arc<TaskTracker>,
}

impl TaskRunner {
    pub(crate) fn new(
        key: TaskKey,
        job_config: JobConfig,
        args: TaskArgs,
        context: RunTaskContext,
        registry: Arc<JobRegistry>,
        tracker: Arc<TaskTracker>,
    ) -> Self {
        Self {
            key,
            job_config,
            args,
            context,
            registry,
            tracker,
        }
    }

    pub fn key(&self) -> TaskKey {
        self.key
    }

    /// Corre la tarea. Se llama ya con el slot del pool tomado.
    pub(crate) async fn run(self, signal: Arc<InterruptSignal>) {
        if !signal.start() {
            debug!(task = %self.key, "tarea interrumpida antes de arrancar");
            return;
        }

        let Some(definition) = self.registry.get(&self.job_config.name) else {
            let msg = format!(
                "no hay definición registrada para el job '{}'",
                self.job_config.name
            );
            self.report(&signal, Err(msg));
            return;
        };

        let ctx = TaskContext::new(
            self.key,
            self.context.clone(),
            Arc::clone(&signal),
            Handle::current(),
        );
        let config = self.job_config.clone();
        let args = self.args.clone();

        // el cómputo es bloqueante: lo sacamos del executor async
        let handle =
            tokio::task::spawn_blocking(move || definition.run_task(&config, &args, &ctx));

        let outcome = match handle.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(format!("{:#}", e)),
            Err(e) => {
                warn!(task = %self.key, "panic o join error en la tarea: {:?}", e);
                Err(format!("la tarea terminó de forma inesperada: {}", e))
            }
        };

        self.report(&signal, outcome);
    }

    /// El pool no pudo darle un slot a la tarea.
    pub(crate) fn reject(self, signal: Arc<InterruptSignal>, reason: &str) {
        if signal.start() {
            self.report(&signal, Err(reason.to_string()));
        }
    }

    fn report(&self, signal: &InterruptSignal, outcome: Result<Value, String>) {
        if !signal.commit_report() {
            debug!(task = %self.key, "la interrupción ya fue aplicada, se descarta el resultado");
            return;
        }

        match outcome {
            Ok(result) => self
                .tracker
                .complete(self.key.job_id, self.key.task_id, result),
            Err(message) => self.tracker.fail(self.key.job_id, self.key.task_id, message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interrupt_en_cola_impide_arrancar() {
        let signal = InterruptSignal::new();

        assert_eq!(signal.interrupt(), InterruptOutcome::Interrupted);
        assert!(signal.is_interrupted());
        assert!(!signal.start());
        assert!(!signal.commit_report());
    }

    #[test]
    fn interrupt_despues_del_reporte_no_aplica() {
        let signal = InterruptSignal::new();
        assert!(signal.start());
        assert!(signal.commit_report());

        assert_eq!(signal.interrupt(), InterruptOutcome::AlreadyFinished);
        assert!(!signal.is_interrupted());
    }

    #[test]
    fn interrupt_en_seccion_protegida_se_rechaza() {
        let signal = Arc::new(InterruptSignal::new());
        assert!(signal.start());
        signal.state.store(SHIELDED, Ordering::SeqCst);

        assert_eq!(signal.interrupt(), InterruptOutcome::Refused);
        // el token se dispara igual, pero el runner ya no puede reportar
        assert!(signal.is_interrupted());
        assert!(!signal.commit_report());
    }

    #[test]
    fn segundo_interrupt_no_hace_nada() {
        let signal = InterruptSignal::new();
        assert!(signal.start());

        assert_eq!(signal.interrupt(), InterruptOutcome::Interrupted);
        assert_eq!(signal.interrupt(), InterruptOutcome::AlreadyFinished);
    }
}
