//! Reconciliación con el master vía heartbeat.
//!
//! Cada latido vacía el buffer de updates del tracker y lo manda al master.
//! Si el envío falla, esos updates se devuelven al buffer con
//! `restore_updates`, así que nada se pierde aunque el master desaparezca.

use common::{
    JobCommand, TaskInfo, WorkerHealth, WorkerHeartbeatRequest, WorkerHeartbeatResponse,
    WorkerId, WorkerRegisterRequest, WorkerRegisterResponse,
};
use reqwest::{Client, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use sysinfo::{CpuExt, System, SystemExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::WorkerError;
use crate::runner::RunTaskContext;
use crate::tracker::TaskTracker;

/// Respuesta del master a un heartbeat.
#[derive(Debug)]
pub enum HeartbeatOutcome {
    Accepted(WorkerHeartbeatResponse),
    /// El master no conoce este worker_id (se reinició o nos dio por muertos)
    UnknownWorker,
}

/// Cliente HTTP hacia el master.
#[derive(Clone)]
pub struct MasterClient {
    client: Client,
    base_url: String,
}

impl MasterClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
        }
    }

    pub async fn register(&self, req: &WorkerRegisterRequest) -> Result<WorkerId, WorkerError> {
        let url = format!("{}/api/v1/workers/register", self.base_url);
        let res = self.client.post(&url).json(req).send().await?;
        if !res.status().is_success() {
            return Err(WorkerError::MasterStatus(res.status()));
        }
        let WorkerRegisterResponse { worker_id } = res.json().await?;
        Ok(worker_id)
    }

    pub async fn heartbeat(
        &self,
        req: &WorkerHeartbeatRequest,
    ) -> Result<HeartbeatOutcome, WorkerError> {
        let url = format!("{}/api/v1/workers/heartbeat", self.base_url);
        let res = self.client.post(&url).json(req).send().await?;

        match res.status() {
            StatusCode::NOT_FOUND => Ok(HeartbeatOutcome::UnknownWorker),
            s if s.is_success() => Ok(HeartbeatOutcome::Accepted(res.json().await?)),
            s => Err(WorkerError::MasterStatus(s)),
        }
    }
}

/// Lazo de heartbeat de un worker.
pub struct HeartbeatLoop {
    tracker: Arc<TaskTracker>,
    master: MasterClient,
    context: RunTaskContext,
    interval: Duration,
    worker_id: Option<WorkerId>,
    // System para leer CPU y memoria
    sys: System,
}

impl HeartbeatLoop {
    pub fn new(
        tracker: Arc<TaskTracker>,
        master: MasterClient,
        context: RunTaskContext,
        interval: Duration,
    ) -> Self {
        Self {
            tracker,
            master,
            context,
            interval,
            worker_id: None,
            sys: System::new(),
        }
    }

    pub fn worker_id(&self) -> Option<WorkerId> {
        self.worker_id
    }

    /// Registro (o re-registro) del worker en el master.
    pub async fn register(&mut self) -> Result<WorkerId, WorkerError> {
        let req = WorkerRegisterRequest {
            address: self.tracker.address().clone(),
            pool_size: self.tracker.pool().pool_size() as u32,
        };
        let worker_id = self.master.register(&req).await?;
        info!(
            "worker {} registrado con pool_size={} como {}",
            req.address, req.pool_size, worker_id
        );
        self.worker_id = Some(worker_id);
        Ok(worker_id)
    }

    /// Reintenta el registro hasta lograrlo o hasta que pidan apagar.
    pub async fn register_until_ok(
        &mut self,
        retry: Duration,
        shutdown: &CancellationToken,
    ) -> Option<WorkerId> {
        loop {
            match self.register().await {
                Ok(id) => return Some(id),
                Err(e) => warn!("no se pudo registrar en el master: {}", e),
            }
            tokio::select! {
                _ = shutdown.cancelled() => return None,
                _ = tokio::time::sleep(retry) => {}
            }
        }
    }

    fn health(&mut self) -> WorkerHealth {
        self.sys.refresh_cpu();
        self.sys.refresh_memory();

        let load = self.sys.load_average();
        let pool = self.tracker.pool();
        WorkerHealth {
            cpu_percent: self.sys.global_cpu_info().cpu_usage(),
            mem_bytes: self.sys.used_memory(),
            load_average: [load.one, load.five, load.fifteen],
            pool_size: pool.pool_size() as u32,
            active_tasks: pool.active_tasks() as u32,
            unfinished_tasks: self.tracker.unfinished_count() as u32,
        }
    }

    /// Un latido completo: drain -> envío -> (restore si falla) -> comandos.
    pub async fn beat_once(&mut self) -> Result<(), WorkerError> {
        let worker_id = match self.worker_id {
            Some(id) => id,
            None => self.register().await?,
        };

        let task_infos = self.tracker.drain_updates();
        let req = WorkerHeartbeatRequest {
            worker_id,
            health: self.health(),
            task_infos,
        };

        match self.master.heartbeat(&req).await {
            Ok(HeartbeatOutcome::Accepted(resp)) => {
                debug!(
                    "heartbeat entregado con {} updates, {} comandos",
                    req.task_infos.len(),
                    resp.commands.len()
                );
                self.apply_commands(resp.commands).await
            }
            Ok(HeartbeatOutcome::UnknownWorker) => {
                warn!("el master no conoce al worker {}, re-registrando", worker_id);
                self.restore(req.task_infos);
                self.worker_id = None;
                self.register().await.map(|_| ())
            }
            Err(e) => {
                self.restore(req.task_infos);
                Err(e)
            }
        }
    }

    fn restore(&self, task_infos: Vec<TaskInfo>) {
        if !task_infos.is_empty() {
            info!("restaurando {} updates no entregados", task_infos.len());
            self.tracker.restore_updates(task_infos);
        }
    }

    /// Aplica todos los comandos; el re-registro se hace al final para que
    /// un registro fallido no deje tareas sin arrancar.
    async fn apply_commands(&mut self, commands: Vec<JobCommand>) -> Result<(), WorkerError> {
        let mut re_register = false;
        for command in commands {
            match command {
                JobCommand::RunTask {
                    job_id,
                    task_id,
                    job_config,
                    task_args,
                } => {
                    self.tracker
                        .submit(job_id, task_id, job_config, task_args, self.context.clone());
                }
                JobCommand::CancelTask { job_id, task_id } => {
                    self.tracker.cancel(job_id, task_id);
                }
                JobCommand::Register => re_register = true,
            }
        }

        if re_register {
            self.worker_id = None;
            self.register().await?;
        }
        Ok(())
    }

    /// Late cada `interval` hasta que se cancele `shutdown`.
    pub async fn run(mut self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            if let Err(e) = self.beat_once().await {
                warn!("error en heartbeat: {}", e);
            }
        }

        info!(
            "heartbeat detenido; quedan {} tareas en vuelo y {} updates sin entregar",
            self.tracker.unfinished_count(),
            self.tracker.pending_update_count()
        );
    }
}
