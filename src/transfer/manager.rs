//! Transfer manager: task registry, lifecycle state machine enforcement,
//! progress smoothing, domain events. Generalizes a simple running-task
//! set into a full per-task registry, since this needs more than
//! membership -- it needs create/pause/resume/restart/progress.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{broadcast, Mutex};
use tokio_util::sync::CancellationToken;

use crate::contracts::{RecApiClient, RecFs, WebDavClient};
use crate::error::{BridgeError, Result};

use super::events::{TransferEvent, EVENT_BUS_CAPACITY};
use super::executor::{self, AggregateCallback};
use super::pause::PauseSignal;
use super::task::{DiskType, TaskId, TaskStatus, TransferDirection, TransferTask, WorkerKind, WorkerTask};
use super::worker::WorkerContext;

const MAX_CONCURRENT_TASKS: usize = 8;

/// Per-task executor handles, kept only while a task is actively running.
struct RunningHandle {
    pause: PauseSignal,
    abort: CancellationToken,
}

pub struct TransferManager {
    tasks: DashMap<TaskId, TransferTask>,
    running: Arc<Mutex<HashSet<TaskId>>>,
    handles: DashMap<TaskId, RunningHandle>,
    events_tx: broadcast::Sender<TransferEvent>,
    rec_api: Arc<dyn RecApiClient>,
    webdav: Arc<dyn WebDavClient>,
    rec_fs: Arc<dyn RecFs>,
    http: reqwest::Client,
}

impl TransferManager {
    pub fn new(
        rec_api: Arc<dyn RecApiClient>,
        webdav: Arc<dyn WebDavClient>,
        rec_fs: Arc<dyn RecFs>,
        http: reqwest::Client,
    ) -> Self {
        let (events_tx, _rx) = broadcast::channel(EVENT_BUS_CAPACITY);
        Self {
            tasks: DashMap::new(),
            running: Arc::new(Mutex::new(HashSet::new())),
            handles: DashMap::new(),
            events_tx,
            rec_api,
            webdav,
            rec_fs,
            http,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TransferEvent> {
        self.events_tx.subscribe()
    }

    fn emit(&self, event: TransferEvent) {
        let _ = self.events_tx.send(event);
    }

    pub fn create(&self, session_id: String, src_path: String, dst_path: String, direction: TransferDirection) -> TaskId {
        let task = TransferTask::new(session_id, src_path, dst_path, direction);
        let id = task.id;
        self.tasks.insert(id, task);
        self.emit(TransferEvent::TaskCreated { task_id: id });
        id
    }

    pub fn get(&self, id: TaskId) -> Option<TransferTask> {
        self.tasks.get(&id).map(|t| t.clone())
    }

    pub fn get_by_session(&self, session_id: &str) -> Vec<TransferTask> {
        self.tasks.iter().filter(|e| e.session_id == session_id).map(|e| e.clone()).collect()
    }

    pub fn get_all(&self) -> Vec<TransferTask> {
        self.tasks.iter().map(|e| e.clone()).collect()
    }

    /// Pre-transfer validation and size probe.
    /// Destination validation is direction-specific: Transfer checks the
    /// WebDAV side, Download checks a local directory, Upload checks a
    /// local source directory and resolves the remote destination folder.
    async fn prepare(&self, task: &TransferTask) -> Result<(WorkerTask, u64, Option<PathBuf>)> {
        match task.direction {
            TransferDirection::Transfer => {
                if !self.webdav.exists(&task.dst_path).await.unwrap_or(false) {
                    return Err(BridgeError::Validation(format!("{} not found", task.dst_path)));
                }
                let stat = self.webdav.stat(&task.dst_path).await?;
                if stat.kind != crate::contracts::EntryKind::Directory {
                    return Err(BridgeError::Validation(format!("{} is not a folder", task.dst_path)));
                }

                let resolved = self.rec_fs.resolve(&task.session_id, &task.src_path).await?;
                let root = WorkerTask {
                    id: resolved.id.clone(),
                    disk_type: resolved.disk_type,
                    group_id: resolved.group_id.clone(),
                    kind: WorkerKind::Folder,
                    path: task.dst_path.clone(),
                };
                let total = probe_size(&self.rec_api, &resolved.id, resolved.disk_type, resolved.group_id.as_deref())
                    .await
                    .unwrap_or(0);
                Ok((root, total, None))
            }
            TransferDirection::Download => {
                let dst_root = PathBuf::from(&task.dst_path);
                let meta = tokio::fs::metadata(&dst_root)
                    .await
                    .map_err(|_| BridgeError::Validation(format!("{} not found", task.dst_path)))?;
                if !meta.is_dir() {
                    return Err(BridgeError::Validation(format!("{} is not a folder", task.dst_path)));
                }

                let resolved = self.rec_fs.resolve(&task.session_id, &task.src_path).await?;
                let root = WorkerTask {
                    id: resolved.id.clone(),
                    disk_type: resolved.disk_type,
                    group_id: resolved.group_id.clone(),
                    kind: WorkerKind::Folder,
                    path: String::new(),
                };
                let total = probe_size(&self.rec_api, &resolved.id, resolved.disk_type, resolved.group_id.as_deref())
                    .await
                    .unwrap_or(0);
                Ok((root, total, Some(dst_root)))
            }
            TransferDirection::Upload => {
                let src_root = PathBuf::from(&task.src_path);
                let meta = tokio::fs::metadata(&src_root)
                    .await
                    .map_err(|_| BridgeError::Validation(format!("{} not found", task.src_path)))?;
                if !meta.is_dir() {
                    return Err(BridgeError::Validation(format!("{} is not a folder", task.src_path)));
                }

                let resolved = self.rec_fs.resolve(&task.session_id, &task.dst_path).await?;
                let root = WorkerTask {
                    id: resolved.id.clone(),
                    disk_type: resolved.disk_type,
                    group_id: resolved.group_id.clone(),
                    kind: WorkerKind::Folder,
                    path: String::new(),
                };
                // No remote-side `du` for a not-yet-uploaded local tree; the
                // local directory walk this would need has no contract
                // collaborator, so totalSize stays 0 for uploads.
                Ok((root, 0, Some(src_root)))
            }
        }
    }

    pub async fn start(self: &Arc<Self>, id: TaskId) -> Result<()> {
        {
            let mut running = self.running.lock().await;
            if running.len() >= MAX_CONCURRENT_TASKS {
                return Err(BridgeError::ConcurrencyLimit);
            }
            let mut entry = self.tasks.get_mut(&id).ok_or_else(|| BridgeError::NotFound(id.to_string()))?;
            entry.transition(TaskStatus::Running)?;
            running.insert(id);
        }

        let task = self.get(id).unwrap();
        let (root, total, local_root) = match self.prepare(&task).await {
            Ok(v) => v,
            Err(e) => {
                self.running.lock().await.remove(&id);
                if let Some(mut entry) = self.tasks.get_mut(&id) {
                    let _ = entry.mark_failed(e.to_string());
                }
                return Err(e);
            }
        };

        if let Some(mut entry) = self.tasks.get_mut(&id) {
            entry.total_size = total;
        }

        let pause = PauseSignal::new();
        let abort = CancellationToken::new();
        self.handles.insert(id, RunningHandle { pause: pause.clone(), abort: abort.clone() });
        self.emit(TransferEvent::TaskStarted { task_id: id });

        let manager = self.clone();
        let pool_size = executor::worker_count(task.direction);
        let ctx = Arc::new(WorkerContext {
            direction: task.direction,
            rec_api: self.rec_api.clone(),
            webdav: self.webdav.clone(),
            local_root,
            http: self.http.clone(),
        });

        tokio::spawn(async move {
            let progress_manager = manager.clone();
            let cb: AggregateCallback = Box::new(move |_path, transferred, rate| {
                progress_manager.on_progress(id, transferred, rate);
            });

            let outcome = executor::run(ctx, root, pool_size, pause, abort, cb).await;
            manager.on_executor_done(id, outcome).await;
        });

        Ok(())
    }

    fn on_progress(&self, id: TaskId, transferred: u64, rate: u64) {
        if let Some(mut entry) = self.tasks.get_mut(&id) {
            if entry.status != TaskStatus::Running {
                return;
            }
            entry.apply_progress(transferred);
            entry.push_speed_sample(rate);
            self.emit(TransferEvent::TaskProgress {
                task_id: id,
                transferred: entry.transferred_size,
                total: entry.total_size,
                speed: entry.speed,
            });
        }
    }

    /// Only mark completed/failed if still `running`: a prior pause/cancel
    /// must not be overwritten by a late executor resolution.
    async fn on_executor_done(&self, id: TaskId, outcome: Result<super::executor::ExecutorOutcome>) {
        self.running.lock().await.remove(&id);
        self.handles.remove(&id);

        let Some(mut entry) = self.tasks.get_mut(&id) else { return };
        match outcome {
            Ok(o) => {
                entry.apply_progress(o.transferred);
                if entry.mark_completed().is_ok() && entry.status == TaskStatus::Completed {
                    drop(entry);
                    self.emit(TransferEvent::TaskCompleted { task_id: id });
                }
            }
            Err(BridgeError::Cancelled) => {
                // cancel() already transitioned the task; nothing to do.
            }
            Err(e) => {
                let msg = e.to_string();
                if entry.mark_failed(msg.clone()).is_ok() && entry.status == TaskStatus::Failed {
                    drop(entry);
                    self.emit(TransferEvent::TaskFailed { task_id: id, error: msg });
                }
            }
        }
    }

    pub fn pause(&self, id: TaskId) -> Result<()> {
        let mut entry = self.tasks.get_mut(&id).ok_or_else(|| BridgeError::NotFound(id.to_string()))?;
        entry.transition(TaskStatus::Paused)?;
        if let Some(handle) = self.handles.get(&id) {
            handle.pause.pause();
        }
        drop(entry);
        self.emit(TransferEvent::TaskPaused { task_id: id });
        Ok(())
    }

    pub async fn resume(self: &Arc<Self>, id: TaskId) -> Result<()> {
        {
            let mut entry = self.tasks.get_mut(&id).ok_or_else(|| BridgeError::NotFound(id.to_string()))?;
            entry.transition(TaskStatus::Running)?;
        }
        if let Some(handle) = self.handles.get(&id) {
            handle.pause.resume();
            self.emit(TransferEvent::TaskResumed { task_id: id });
            Ok(())
        } else {
            // Executor gone (process restarted or was reaped): treat as restart.
            if let Some(mut entry) = self.tasks.get_mut(&id) {
                entry.status = TaskStatus::Pending;
            }
            self.start(id).await
        }
    }

    pub async fn cancel(&self, id: TaskId) -> Result<()> {
        let status = self.get(id).ok_or_else(|| BridgeError::NotFound(id.to_string()))?.status;
        if status.is_terminal() {
            return Ok(()); // cancelling a terminal task is a no-op
        }
        if let Some(mut entry) = self.tasks.get_mut(&id) {
            entry.transition(TaskStatus::Cancelled)?;
        }
        if let Some((_, handle)) = self.handles.remove(&id) {
            handle.abort.cancel();
        }
        self.running.lock().await.remove(&id);
        self.emit(TransferEvent::TaskCancelled { task_id: id });
        Ok(())
    }

    pub async fn restart(self: &Arc<Self>, id: TaskId) -> Result<()> {
        {
            let mut entry = self.tasks.get_mut(&id).ok_or_else(|| BridgeError::NotFound(id.to_string()))?;
            entry.reset_for_restart();
        }
        self.emit(TransferEvent::TaskRestarted { task_id: id });
        self.start(id).await
    }

    pub async fn remove(&self, id: TaskId) -> Result<()> {
        if let Some(task) = self.get(id) {
            if !task.status.is_terminal() {
                self.cancel(id).await?;
            }
        }
        self.tasks.remove(&id);
        Ok(())
    }

    /// autogc: schedule removal of a terminal task shortly after its
    /// status was fetched, never before the response is sent.
    pub fn schedule_autogc(self: &Arc<Self>, id: TaskId) {
        let manager = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            if let Some(task) = manager.get(id) {
                if task.status.is_terminal() {
                    manager.tasks.remove(&id);
                }
            }
        });
    }
}

async fn probe_size(
    rec_api: &Arc<dyn RecApiClient>,
    id: &str,
    disk_type: DiskType,
    group_id: Option<&str>,
) -> Result<u64> {
    let mut total = 0u64;
    let mut stack = vec![id.to_string()];
    while let Some(current) = stack.pop() {
        let children = rec_api.list_children(&current, disk_type, group_id).await?;
        for child in children {
            match child.kind {
                crate::contracts::EntryKind::Directory => stack.push(child.id),
                crate::contracts::EntryKind::File => total += child.size,
            }
        }
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::{EntryKind, NormalizedEntry, RecFileInfo, ResolvedSource};
    use async_trait::async_trait;

    struct FakeRecApi;

    #[async_trait]
    impl RecApiClient for FakeRecApi {
        async fn list_children(&self, _id: &str, _disk_type: DiskType, _group_id: Option<&str>) -> Result<Vec<NormalizedEntry>> {
            Ok(vec![])
        }
        async fn get_download_url(&self, _id: &str, _group_id: Option<&str>) -> Result<String> {
            Ok("http://example.invalid/x".into())
        }
        async fn get_file_info(&self, _id: &str, _group_id: Option<&str>) -> Result<RecFileInfo> {
            Ok(RecFileInfo { id: "x".into(), name: "x".into(), bytes: 0 })
        }
        async fn upload(&self, _folder_id: &str, _name: &str, _size: u64, _body: reqwest::Body) -> Result<()> {
            Ok(())
        }
        async fn mkdir(&self, _parent_id: &str, names: &[String]) -> Result<Vec<String>> {
            Ok(names.iter().map(|_| "new-id".to_string()).collect())
        }
    }

    struct FakeWebDav { has_dst: bool }

    #[async_trait]
    impl WebDavClient for FakeWebDav {
        async fn exists(&self, _path: &str) -> Result<bool> {
            Ok(self.has_dst)
        }
        async fn stat(&self, path: &str) -> Result<NormalizedEntry> {
            Ok(NormalizedEntry { id: path.into(), name: path.into(), size: 0, kind: EntryKind::Directory, creator: None, last_modified: None })
        }
        async fn mkdir(&self, _path: &str) -> Result<()> {
            Ok(())
        }
        async fn put_stream(&self, _path: &str, _size: u64, _body: reqwest::Body) -> Result<()> {
            Ok(())
        }
        async fn delete(&self, _path: &str) -> Result<()> {
            Ok(())
        }
    }

    struct FakeRecFs;

    #[async_trait]
    impl RecFs for FakeRecFs {
        async fn resolve(&self, _session_id: &str, _path: &str) -> Result<ResolvedSource> {
            Ok(ResolvedSource { id: "root".into(), disk_type: DiskType::Personal, group_id: None })
        }
    }

    fn manager(has_dst: bool) -> Arc<TransferManager> {
        Arc::new(TransferManager::new(
            Arc::new(FakeRecApi),
            Arc::new(FakeWebDav { has_dst }),
            Arc::new(FakeRecFs),
            reqwest::Client::new(),
        ))
    }

    #[tokio::test]
    async fn create_produces_pending_task() {
        let m = manager(true);
        let id = m.create("s".into(), "/src".into(), "/dst".into(), TransferDirection::Transfer);
        let task = m.get(id).unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
    }

    #[tokio::test]
    async fn start_rejects_missing_destination() {
        let m = manager(false);
        let id = m.create("s".into(), "/src".into(), "/missing".into(), TransferDirection::Transfer);
        let err = m.start(id).await.unwrap_err();
        assert!(matches!(err, BridgeError::Validation(_)));
        let task = m.get(id).unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
    }

    #[tokio::test]
    async fn cancel_on_terminal_task_is_noop() {
        let m = manager(true);
        let id = m.create("s".into(), "/src".into(), "/missing".into(), TransferDirection::Transfer);
        let _ = m.start(id).await; // fails, task -> Failed
        m.cancel(id).await.unwrap();
        assert_eq!(m.get(id).unwrap().status, TaskStatus::Failed);
    }

    #[tokio::test]
    async fn remove_evicts_from_registry() {
        let m = manager(true);
        let id = m.create("s".into(), "/src".into(), "/dst".into(), TransferDirection::Transfer);
        m.remove(id).await.unwrap();
        assert!(m.get(id).is_none());
    }

    #[tokio::test]
    async fn concurrency_cap_rejects_ninth_task() {
        let m = manager(true);
        for _ in 0..MAX_CONCURRENT_TASKS {
            m.running.lock().await.insert(TaskId::new_v4());
        }
        let id = m.create("s".into(), "/src".into(), "/dst".into(), TransferDirection::Transfer);
        let err = m.start(id).await.unwrap_err();
        assert!(matches!(err, BridgeError::ConcurrencyLimit));
    }

    /// End-to-end happy path, driven entirely offline: an upload task
    /// walks one local file through create -> start -> executor -> worker
    /// -> completion with no real network I/O.
    #[tokio::test]
    async fn upload_direction_completes_full_local_tree() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("a.txt"), b"hello world").await.unwrap();

        let m = manager(true);
        let id = m.create(
            "s".into(),
            dir.path().to_string_lossy().to_string(),
            "/remote-dest".into(),
            TransferDirection::Upload,
        );
        m.start(id).await.unwrap();

        for _ in 0..100 {
            if m.get(id).unwrap().status.is_terminal() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }

        let task = m.get(id).unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
    }

    /// Download direction rejects a destination that isn't a local
    /// directory, mirroring the Transfer-direction WebDAV check.
    #[tokio::test]
    async fn download_rejects_missing_local_destination() {
        let m = manager(true);
        let id = m.create("s".into(), "/src".into(), "/no/such/local/dir".into(), TransferDirection::Download);
        let err = m.start(id).await.unwrap_err();
        assert!(matches!(err, BridgeError::Validation(_)));
        assert_eq!(m.get(id).unwrap().status, TaskStatus::Failed);
    }
}
