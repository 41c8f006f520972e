//! Domain event bus for the Transfer Manager, as a tagged enum. Internal
//! only: these events have no external client, they exist for logging and
//! tests. The external interface is a synchronous REST surface, not a
//! broadcast feed.

use serde::{Deserialize, Serialize};

use super::task::TaskId;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum TransferEvent {
    #[serde(rename = "taskCreated")]
    TaskCreated { task_id: TaskId },
    #[serde(rename = "taskStarted")]
    TaskStarted { task_id: TaskId },
    #[serde(rename = "taskProgress")]
    TaskProgress { task_id: TaskId, transferred: u64, total: u64, speed: u64 },
    #[serde(rename = "taskPaused")]
    TaskPaused { task_id: TaskId },
    #[serde(rename = "taskResumed")]
    TaskResumed { task_id: TaskId },
    #[serde(rename = "taskCancelled")]
    TaskCancelled { task_id: TaskId },
    #[serde(rename = "taskFailed")]
    TaskFailed { task_id: TaskId, error: String },
    #[serde(rename = "taskCompleted")]
    TaskCompleted { task_id: TaskId },
    #[serde(rename = "taskRestarted")]
    TaskRestarted { task_id: TaskId },
}

pub const EVENT_BUS_CAPACITY: usize = 256;
