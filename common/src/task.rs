use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::job::JobId;
use crate::worker::WorkerNetAddress;

pub type TaskId = i64;

/// Identidad de una tarea: (job, tarea). Es la clave de todos los mapas del worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskKey {
    pub job_id: JobId,
    pub task_id: TaskId,
}

impl TaskKey {
    pub fn new(job_id: JobId, task_id: TaskId) -> Self {
        Self { job_id, task_id }
    }
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tarea {} del job {}", self.task_id, self.job_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Running,
    Completed,
    Failed,
    Canceled,
}

impl TaskStatus {
    /// RUNNING es el único estado no terminal.
    pub fn is_finished(self) -> bool {
        !matches!(self, TaskStatus::Running)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Running => "RUNNING",
            TaskStatus::Completed => "COMPLETED",
            TaskStatus::Failed => "FAILED",
            TaskStatus::Canceled => "CANCELED",
        };
        f.write_str(s)
    }
}

/// Registro de estado de una tarea, tal como viaja en el heartbeat al master.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskInfo {
    pub job_id: JobId,
    pub task_id: TaskId,
    pub status: TaskStatus,

    /// Resultado opaco; sólo presente cuando status = COMPLETED
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    /// Mensaje de error; sólo presente cuando status = FAILED
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// Worker que reporta la tarea
    pub worker_address: WorkerNetAddress,
}

impl TaskInfo {
    /// Registro recién creado al arrancar una tarea.
    pub fn running(key: TaskKey, worker_address: WorkerNetAddress) -> Self {
        Self {
            job_id: key.job_id,
            task_id: key.task_id,
            status: TaskStatus::Running,
            result: None,
            error_message: None,
            worker_address,
        }
    }

    pub fn key(&self) -> TaskKey {
        TaskKey::new(self.job_id, self.task_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn address() -> WorkerNetAddress {
        WorkerNetAddress::new("worker-1", 29998, 29999)
    }

    #[test]
    fn task_info_running_omite_result_y_error() {
        let info = TaskInfo::running(TaskKey::new(7, 3), address());
        let value = serde_json::to_value(&info).unwrap();

        assert_eq!(
            value,
            json!({
                "job_id": 7,
                "task_id": 3,
                "status": "RUNNING",
                "worker_address": { "host": "worker-1", "rpc_port": 29998, "data_port": 29999 }
            })
        );
    }

    #[test]
    fn task_info_completed_incluye_result() {
        let mut info = TaskInfo::running(TaskKey::new(1, 1), address());
        info.status = TaskStatus::Completed;
        info.result = Some(json!("ok"));

        let value = serde_json::to_value(&info).unwrap();
        assert_eq!(value["status"], "COMPLETED");
        assert_eq!(value["result"], "ok");
        assert!(value.get("error_message").is_none());
    }

    #[test]
    fn solo_running_no_es_terminal() {
        assert!(!TaskStatus::Running.is_finished());
        assert!(TaskStatus::Completed.is_finished());
        assert!(TaskStatus::Failed.is_finished());
        assert!(TaskStatus::Canceled.is_finished());
    }
}
