//! Data model: `TransferTask`, `WorkerTask`, `WorkerProgressSlot`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use uuid::Uuid;

use crate::error::{BridgeError, Result};

pub type TaskId = Uuid;

/// Transfer task status, following the lifecycle state machine below.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled)
    }
}

/// Source-side namespace discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiskType {
    Personal,
    Backup,
    Recycle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerKind {
    File,
    Folder,
}

/// Which direction a task (and its workers) moves bytes in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferDirection {
    /// Rec -> WebDAV
    Transfer,
    /// Rec -> local disk
    Download,
    /// local disk -> Rec
    Upload,
}

/// A user-visible transfer unit: one source path to one destination path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferTask {
    pub id: TaskId,
    pub session_id: String,
    pub src_path: String,
    pub dst_path: String,
    pub direction: TransferDirection,
    pub status: TaskStatus,
    pub total_size: u64,
    pub transferred_size: u64,
    /// Thousandths (0..=1000), avoids floating-point drift in the UI.
    pub progress: u16,
    pub speed: u64,
    #[serde(skip)]
    pub speed_history: VecDeque<u64>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

const MAX_SPEED_HISTORY: usize = 10;

impl TransferTask {
    pub fn new(session_id: String, src_path: String, dst_path: String, direction: TransferDirection) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            src_path,
            dst_path,
            direction,
            status: TaskStatus::Pending,
            total_size: 0,
            transferred_size: 0,
            progress: 0,
            speed: 0,
            speed_history: VecDeque::with_capacity(MAX_SPEED_HISTORY),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error: None,
        }
    }

    /// Validate and apply a status transition, rejecting any pair not
    /// listed in the state machine below.
    pub fn transition(&mut self, to: TaskStatus) -> Result<()> {
        use TaskStatus::*;
        let legal = matches!(
            (self.status, to),
            (Pending, Running)
                | (Running, Paused)
                | (Paused, Running)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Cancelled)
                | (Paused, Cancelled)
                | (Pending, Cancelled)
                | (Completed, Pending)
                | (Failed, Pending)
                | (Cancelled, Pending)
        );
        if !legal {
            return Err(BridgeError::InvalidTransition(
                format!("{:?}", self.status),
                format!("{:?}", to),
            ));
        }

        match to {
            Running if self.started_at.is_none() => self.started_at = Some(Utc::now()),
            Completed | Failed | Cancelled => self.completed_at = Some(Utc::now()),
            _ => {}
        }
        if to != TaskStatus::Running {
            self.speed = 0;
        }
        self.status = to;
        Ok(())
    }

    /// Reset fields for `restart`, legal from any terminal state.
    pub fn reset_for_restart(&mut self) {
        self.progress = 0;
        self.transferred_size = 0;
        self.error = None;
        self.started_at = None;
        self.completed_at = None;
        self.speed = 0;
        self.speed_history.clear();
        self.status = TaskStatus::Pending;
    }

    /// Apply a transferred-bytes update, maintaining the `0 <= transferred <=
    /// total` and `progress = floor(transferred/total * 1000)` invariants.
    pub fn apply_progress(&mut self, transferred_size: u64) {
        if self.total_size > 0 {
            let clamped = transferred_size.min(self.total_size);
            self.transferred_size = clamped;
            self.progress = ((clamped as u128 * 1000) / self.total_size as u128) as u16;
        } else {
            self.transferred_size = transferred_size;
        }
    }

    /// Mark completed; only legal while still `Running`, so a prior
    /// pause/cancel is never overwritten by a late resolution.
    pub fn mark_completed(&mut self) -> Result<()> {
        if self.status != TaskStatus::Running {
            return Ok(());
        }
        if self.total_size > 0 {
            self.transferred_size = self.total_size;
            self.progress = 1000;
        }
        self.transition(TaskStatus::Completed)
    }

    /// Mark failed; only legal while still `Running`.
    pub fn mark_failed(&mut self, error: String) -> Result<()> {
        if self.status != TaskStatus::Running {
            return Ok(());
        }
        self.error = Some(error);
        self.transition(TaskStatus::Failed)
    }

    /// Append a raw instantaneous rate sample and recompute the EMA speed
    /// (α = 0.3).
    pub fn push_speed_sample(&mut self, rate: u64) {
        if self.speed_history.len() == MAX_SPEED_HISTORY {
            self.speed_history.pop_front();
        }
        self.speed_history.push_back(rate);

        const ALPHA: f64 = 0.3;
        let mut ema = *self.speed_history.front().unwrap() as f64;
        for &sample in self.speed_history.iter().skip(1) {
            ema = ALPHA * sample as f64 + (1.0 - ALPHA) * ema;
        }
        self.speed = ema.floor() as u64;
    }
}

/// An ephemeral unit of work inside the executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerTask {
    /// Remote object identifier in the source system.
    pub id: String,
    pub disk_type: DiskType,
    pub group_id: Option<String>,
    pub kind: WorkerKind,
    /// Destination path (WebDAV for transfer, local for download, remote for upload).
    pub path: String,
}

/// One per worker index, owned by the executor.
#[derive(Debug, Clone, Default)]
pub struct WorkerProgressSlot {
    pub path: Option<String>,
    pub transferred: u64,
    pub rate: u64,
    pub completed_size: u64,
}

impl WorkerProgressSlot {
    /// Roll a finished file's `transferred` bytes into `completed_size`,
    /// resetting `transferred`/`rate` to zero.
    pub fn roll_finish(&mut self) {
        self.completed_size += self.transferred;
        self.transferred = 0;
        self.rate = 0;
        self.path = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task() -> TransferTask {
        TransferTask::new("sess".into(), "/src".into(), "/dst".into(), TransferDirection::Transfer)
    }

    #[test]
    fn pending_to_running_is_legal() {
        let mut t = task();
        t.transition(TaskStatus::Running).unwrap();
        assert_eq!(t.status, TaskStatus::Running);
        assert!(t.started_at.is_some());
    }

    #[test]
    fn pending_to_completed_is_illegal() {
        let mut t = task();
        assert!(t.transition(TaskStatus::Completed).is_err());
    }

    #[test]
    fn restart_legal_from_terminal_states() {
        let mut t = task();
        t.transition(TaskStatus::Running).unwrap();
        t.transition(TaskStatus::Completed).unwrap();
        t.transition(TaskStatus::Pending).unwrap();
        assert_eq!(t.status, TaskStatus::Pending);
    }

    #[test]
    fn apply_progress_respects_invariants() {
        let mut t = task();
        t.total_size = 1000;
        t.apply_progress(250);
        assert_eq!(t.progress, 250);
        t.apply_progress(2000); // clamp
        assert_eq!(t.transferred_size, 1000);
        assert_eq!(t.progress, 1000);
    }

    #[test]
    fn mark_completed_sets_progress_and_transferred() {
        let mut t = task();
        t.total_size = 500;
        t.transition(TaskStatus::Running).unwrap();
        t.mark_completed().unwrap();
        assert_eq!(t.status, TaskStatus::Completed);
        assert_eq!(t.progress, 1000);
        assert_eq!(t.transferred_size, 500);
    }

    #[test]
    fn mark_completed_is_noop_if_not_running() {
        let mut t = task();
        t.transition(TaskStatus::Running).unwrap();
        t.transition(TaskStatus::Cancelled).unwrap();
        t.mark_completed().unwrap();
        assert_eq!(t.status, TaskStatus::Cancelled);
    }

    #[test]
    fn speed_history_bounded_at_ten() {
        let mut t = task();
        for i in 0..20 {
            t.push_speed_sample(i);
        }
        assert_eq!(t.speed_history.len(), 10);
    }

    #[test]
    fn worker_progress_slot_roll_finish() {
        let mut slot = WorkerProgressSlot { path: Some("a".into()), transferred: 42, rate: 7, completed_size: 100 };
        slot.roll_finish();
        assert_eq!(slot.completed_size, 142);
        assert_eq!(slot.transferred, 0);
        assert_eq!(slot.rate, 0);
        assert!(slot.path.is_none());
    }
}
