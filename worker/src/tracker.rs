//! Estado de las tareas del worker.
//!
//! `TaskTracker` es el registro autoritativo de "qué está haciendo este worker
//! y qué cambió desde el último heartbeat". Los tres mapas viven bajo un mismo
//! lock, así que submit/complete/fail/cancel/drain/restore quedan totalmente
//! serializados entre sí; los cómputos corren afuera del lock.

use common::{JobConfig, JobId, TaskArgs, TaskId, TaskInfo, TaskKey, TaskStatus, WorkerNetAddress};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::pool::WorkerPool;
use crate::registry::JobRegistry;
use crate::runner::{ExecutionHandle, InterruptOutcome, RunTaskContext, TaskRunner};

/// Mensaje que se reporta cuando un cancel no logra interrumpir la tarea.
pub const CANCEL_FAILED_MESSAGE: &str = "Failed to cancel the task";

#[derive(Default)]
struct TrackerState {
    /// handles de las tareas en vuelo
    handles: HashMap<TaskKey, ExecutionHandle>,
    /// registros de las tareas sin terminar (siempre en RUNNING)
    unfinished: HashMap<TaskKey, TaskInfo>,
    /// cambios pendientes de entregar al master
    updates: HashMap<TaskKey, TaskInfo>,
}

impl TrackerState {
    /// Única salida de "en vuelo": saca handle y registro sin terminar y deja
    /// el registro terminal en el buffer de updates (pisando el RUNNING viejo).
    fn finish(&mut self, key: TaskKey, info: TaskInfo) {
        debug_assert!(info.status.is_finished());
        self.handles.remove(&key);
        self.unfinished.remove(&key);
        self.updates.insert(key, info);
    }
}

pub struct TaskTracker {
    state: Mutex<TrackerState>,
    pool: WorkerPool,
    registry: Arc<JobRegistry>,
    address: WorkerNetAddress,
}

impl TaskTracker {
    pub fn new(pool: WorkerPool, registry: Arc<JobRegistry>, address: WorkerNetAddress) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(TrackerState::default()),
            pool,
            registry,
            address,
        })
    }

    pub fn address(&self) -> &WorkerNetAddress {
        &self.address
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /* ---------------- ciclo de vida ---------------- */

    /// Arranca una tarea: la manda al pool y la registra como RUNNING.
    ///
    /// El master garantiza que no despacha dos veces la misma identidad a la
    /// vez; si igual llega un duplicado de una tarea en vuelo, se ignora.
    pub fn submit(
        self: &Arc<Self>,
        job_id: JobId,
        task_id: TaskId,
        job_config: JobConfig,
        args: TaskArgs,
        context: RunTaskContext,
    ) {
        let key = TaskKey::new(job_id, task_id);
        let mut state = self.state.lock();

        if state.unfinished.contains_key(&key) {
            warn!(task = %key, "la tarea ya está en vuelo, se ignora el submit duplicado");
            return;
        }

        let job_name = job_config.name.clone();
        let runner = TaskRunner::new(
            key,
            job_config,
            args,
            context,
            Arc::clone(&self.registry),
            Arc::clone(self),
        );
        let handle = self.pool.submit(runner);
        let info = TaskInfo::running(key, self.address.clone());

        state.handles.insert(key, handle);
        state.unfinished.insert(key, info.clone());
        state.updates.insert(key, info);
        info!(task = %key, job = %job_name, "tarea iniciada");
    }

    /// El runner terminó bien.
    ///
    /// # Panics
    ///
    /// Si la tarea no está sin terminar: un runner reportando una tarea ya
    /// retirada es un bug del handshake runner/tracker.
    pub fn complete(&self, job_id: JobId, task_id: TaskId, result: Value) {
        let key = TaskKey::new(job_id, task_id);
        let mut state = self.state.lock();

        let Some(mut info) = state.unfinished.get(&key).cloned() else {
            drop(state);
            panic!("complete para {} que no está en vuelo", key);
        };
        info.status = TaskStatus::Completed;
        info.result = Some(result);
        state.finish(key, info);
        info!(task = %key, "tarea completada");
    }

    /// El runner terminó con error.
    ///
    /// # Panics
    ///
    /// Igual que [`TaskTracker::complete`].
    pub fn fail(&self, job_id: JobId, task_id: TaskId, error_message: impl Into<String>) {
        let key = TaskKey::new(job_id, task_id);
        let error_message = error_message.into();
        let mut state = self.state.lock();

        let Some(mut info) = state.unfinished.get(&key).cloned() else {
            drop(state);
            panic!("fail para {} que no está en vuelo", key);
        };
        info.status = TaskStatus::Failed;
        if !error_message.is_empty() {
            info.error_message = Some(error_message.clone());
        }
        state.finish(key, info);
        info!(task = %key, "tarea fallida: {}", error_message);
    }

    /// Cancela una tarea. Idempotente y best-effort: si la tarea ya terminó
    /// o ya se canceló no pasa nada. Si la tarea no acepta la interrupción
    /// queda FAILED, así que siempre llega a un estado terminal.
    pub fn cancel(&self, job_id: JobId, task_id: TaskId) {
        let key = TaskKey::new(job_id, task_id);
        let mut state = self.state.lock();

        let Some(handle) = state.handles.get(&key) else {
            debug!(task = %key, "cancel de una tarea que ya no está en vuelo");
            return;
        };
        let Some(mut info) = state.unfinished.get(&key).cloned() else {
            return;
        };
        if info.status == TaskStatus::Canceled {
            return;
        }

        match handle.interrupt() {
            InterruptOutcome::Interrupted => {
                info.status = TaskStatus::Canceled;
                state.finish(key, info);
                info!(task = %key, "tarea cancelada");
            }
            InterruptOutcome::Refused => {
                info.status = TaskStatus::Failed;
                info.error_message = Some(CANCEL_FAILED_MESSAGE.to_string());
                state.finish(key, info);
                warn!(task = %key, "la tarea no aceptó la interrupción, se marca FAILED");
            }
            InterruptOutcome::AlreadyFinished => {
                // el runner ya ganó la carrera; su reporte está por llegar
                debug!(task = %key, "cancel llegó tarde, la tarea ya terminó");
            }
        }
    }

    /* ---------------- heartbeat ---------------- */

    /// Devuelve y limpia, en un mismo paso, los cambios pendientes.
    pub fn drain_updates(&self) -> Vec<TaskInfo> {
        let mut state = self.state.lock();
        state.updates.drain().map(|(_, info)| info).collect()
    }

    /// Vuelve a cargar updates que no llegaron al master. Nunca pisa un
    /// update que ya esté en el buffer: lo local siempre es más nuevo.
    pub fn restore_updates(&self, tasks: Vec<TaskInfo>) {
        let mut state = self.state.lock();
        for info in tasks {
            state.updates.entry(info.key()).or_insert(info);
        }
    }

    /* ---------------- consultas ---------------- */

    pub fn unfinished_count(&self) -> usize {
        self.state.lock().unfinished.len()
    }

    /// Copia de los registros en vuelo, ordenada por identidad.
    pub fn unfinished_tasks(&self) -> Vec<TaskInfo> {
        let state = self.state.lock();
        let mut tasks: Vec<TaskInfo> = state.unfinished.values().cloned().collect();
        tasks.sort_by_key(TaskInfo::key);
        tasks
    }

    pub fn pending_update_count(&self) -> usize {
        self.state.lock().updates.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // El pool necesita un runtime, pero estas pruebas no llegan a correr tareas
    // que reporten: usan un job inexistente o llaman al tracker a mano.
    fn tracker(rt: &tokio::runtime::Runtime) -> Arc<TaskTracker> {
        let pool = WorkerPool::new(1, rt.handle().clone());
        TaskTracker::new(
            pool,
            Arc::new(JobRegistry::new()),
            WorkerNetAddress::new("localhost", 1, 2),
        )
    }

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
    }

    #[test]
    fn restore_no_pisa_update_mas_nuevo() {
        let rt = runtime();
        let tracker = tracker(&rt);
        let address = tracker.address().clone();

        let mut fresh = TaskInfo::running(TaskKey::new(1, 1), address.clone());
        fresh.status = TaskStatus::Failed;
        tracker.restore_updates(vec![fresh.clone()]);

        let mut stale = TaskInfo::running(TaskKey::new(1, 1), address.clone());
        stale.status = TaskStatus::Completed;
        stale.result = Some(json!("viejo"));
        let other = TaskInfo::running(TaskKey::new(1, 2), address);
        tracker.restore_updates(vec![stale, other.clone()]);

        let mut drained = tracker.drain_updates();
        drained.sort_by_key(TaskInfo::key);
        assert_eq!(drained, vec![fresh, other]);
        assert!(tracker.drain_updates().is_empty());
    }

    #[test]
    fn cancel_de_tarea_desconocida_no_hace_nada() {
        let rt = runtime();
        let tracker = tracker(&rt);

        tracker.cancel(9, 9);
        assert!(tracker.drain_updates().is_empty());
    }

    #[test]
    #[should_panic(expected = "no está en vuelo")]
    fn complete_sin_submit_es_violacion_de_contrato() {
        let rt = runtime();
        let tracker = tracker(&rt);

        tracker.complete(1, 1, json!("ok"));
    }

    #[test]
    #[should_panic(expected = "no está en vuelo")]
    fn fail_sin_submit_es_violacion_de_contrato() {
        let rt = runtime();
        let tracker = tracker(&rt);

        tracker.fail(1, 1, "boom");
    }

    #[test]
    fn submit_queda_running_hasta_que_corre_el_runtime() {
        let rt = runtime();
        let tracker = tracker(&rt);

        // el runtime current_thread no avanza hasta que lo bloqueemos
        tracker.submit(3, 4, JobConfig::new("noop"), json!(null), RunTaskContext::default());

        assert_eq!(tracker.unfinished_count(), 1);
        let drained = tracker.drain_updates();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].key(), TaskKey::new(3, 4));
        assert_eq!(drained[0].status, TaskStatus::Running);
        assert_eq!(drained[0].worker_address, WorkerNetAddress::new("localhost", 1, 2));
    }

    #[test]
    fn submit_duplicado_en_vuelo_se_ignora() {
        let rt = runtime();
        let tracker = tracker(&rt);

        tracker.submit(3, 4, JobConfig::new("noop"), json!(null), RunTaskContext::default());
        tracker.drain_updates();
        tracker.submit(3, 4, JobConfig::new("noop"), json!(null), RunTaskContext::default());

        assert_eq!(tracker.unfinished_count(), 1);
        assert!(tracker.drain_updates().is_empty());
    }

    #[test]
    fn cancel_en_cola_marca_canceled_una_sola_vez() {
        let rt = runtime();
        let tracker = tracker(&rt);

        tracker.submit(1, 1, JobConfig::new("noop"), json!(null), RunTaskContext::default());
        tracker.cancel(1, 1);
        tracker.cancel(1, 1);

        let drained = tracker.drain_updates();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].status, TaskStatus::Canceled);
        assert_eq!(tracker.unfinished_count(), 0);

        // el runner arranca, ve la interrupción y no reporta nada
        rt.block_on(async { tokio::task::yield_now().await });
        assert!(tracker.drain_updates().is_empty());
    }
}
