use serde::{Deserialize, Serialize};
use std::fmt;

use crate::job::{JobConfig, JobId, TaskArgs};
use crate::task::{TaskId, TaskInfo};

pub type WorkerId = i64;

/// Identidad de red de un worker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkerNetAddress {
    pub host: String,
    pub rpc_port: u16,
    pub data_port: u16,
}

impl WorkerNetAddress {
    pub fn new(host: impl Into<String>, rpc_port: u16, data_port: u16) -> Self {
        Self {
            host: host.into(),
            rpc_port,
            data_port,
        }
    }
}

impl fmt::Display for WorkerNetAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}", self.host, self.rpc_port, self.data_port)
    }
}

/* --------- Registro --------- */

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerRegisterRequest {
    pub address: WorkerNetAddress,
    pub pool_size: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerRegisterResponse {
    pub worker_id: WorkerId,
}

/* --------- Heartbeat --------- */

/// Salud del worker que acompaña cada heartbeat.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkerHealth {
    pub cpu_percent: f32,
    pub mem_bytes: u64,
    /// Carga promedio del sistema a 1, 5 y 15 minutos
    pub load_average: [f64; 3],
    pub pool_size: u32,
    pub active_tasks: u32,
    pub unfinished_tasks: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerHeartbeatRequest {
    pub worker_id: WorkerId,
    pub health: WorkerHealth,
    /// Cambios de estado desde el último heartbeat entregado
    pub task_infos: Vec<TaskInfo>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkerHeartbeatResponse {
    #[serde(default)]
    pub commands: Vec<JobCommand>,
}

/// Órdenes que el master devuelve en la respuesta del heartbeat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobCommand {
    RunTask {
        job_id: JobId,
        task_id: TaskId,
        job_config: JobConfig,
        #[serde(default)]
        task_args: TaskArgs,
    },
    CancelTask {
        job_id: JobId,
        task_id: TaskId,
    },
    /// El master no conoce a este worker (p.ej. se reinició): volver a registrarse
    Register,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn job_command_se_deserializa_por_tag() {
        let raw = json!([
            {
                "type": "RUN_TASK",
                "job_id": 1,
                "task_id": 2,
                "job_config": { "name": "sleep" },
                "task_args": { "ms": 10 }
            },
            { "type": "CANCEL_TASK", "job_id": 1, "task_id": 2 },
            { "type": "REGISTER" }
        ]);

        let cmds: Vec<JobCommand> = serde_json::from_value(raw).unwrap();
        assert_eq!(cmds.len(), 3);

        match &cmds[0] {
            JobCommand::RunTask { job_config, task_args, .. } => {
                assert_eq!(job_config.name, "sleep");
                assert_eq!(task_args["ms"], 10);
            }
            other => panic!("esperaba RunTask, llegó {:?}", other),
        }
        assert_eq!(cmds[1], JobCommand::CancelTask { job_id: 1, task_id: 2 });
        assert_eq!(cmds[2], JobCommand::Register);
    }

    #[test]
    fn heartbeat_response_sin_commands() {
        let resp: WorkerHeartbeatResponse = serde_json::from_str("{}").unwrap();
        assert!(resp.commands.is_empty());
    }
}
