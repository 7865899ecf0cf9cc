pub mod job;
pub mod task;
pub mod worker;

pub use job::{JobConfig, JobId, TaskArgs};
pub use task::{TaskId, TaskInfo, TaskKey, TaskStatus};
pub use worker::{
    JobCommand, WorkerHealth, WorkerHeartbeatRequest, WorkerHeartbeatResponse, WorkerId,
    WorkerNetAddress, WorkerRegisterRequest, WorkerRegisterResponse,
};
