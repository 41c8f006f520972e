//! Worker: the leaf unit of execution inside the pool.
//!
//! Three variants (`Transfer`, `Download`, `Upload`) share the same mailbox
//! loop and retry policy; only `process_folder`/`process_file` differ by
//! direction. Each worker owns a per-worker mailbox rather than pulling
//! from a shared pool, so pause/resume/exit can target one worker without
//! disturbing the others.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::contracts::{EntryKind, RecApiClient, WebDavClient};
use crate::error::BridgeError;
use crate::transfer::pause::PauseSignal;
use crate::transfer::progress::ProgressRateMeter;
use crate::transfer::stream::PausableRangedStream;
use crate::transfer::task::{DiskType, TransferDirection, WorkerKind, WorkerTask};

const MAX_RETRIES: u32 = 5;
const BACKOFF_BASE_MS: u64 = 1000;
const BACKOFF_CAP_MS: u64 = 5000;

pub enum WorkerMsg {
    Task(WorkerTask),
    Pause,
    Resume,
    Exit,
}

pub enum WorkerEvent {
    Finished { index: usize, children: Vec<WorkerTask> },
    Progress { index: usize, path: String, transferred: u64, rate: u64 },
    Failed { index: usize, error: String, path: Option<String> },
}

/// Shared collaborators a worker needs, direction-agnostic.
pub struct WorkerContext {
    pub direction: TransferDirection,
    pub rec_api: Arc<dyn RecApiClient>,
    pub webdav: Arc<dyn WebDavClient>,
    pub local_root: Option<PathBuf>,
    pub http: reqwest::Client,
}

/// Drives one worker's mailbox until `Exit` or the channel closes.
pub async fn run_worker(
    index: usize,
    ctx: Arc<WorkerContext>,
    mut mailbox: mpsc::Receiver<WorkerMsg>,
    events: mpsc::Sender<WorkerEvent>,
    abort: CancellationToken,
) {
    let pause = PauseSignal::new();

    while let Some(msg) = mailbox.recv().await {
        match msg {
            WorkerMsg::Exit => return,
            WorkerMsg::Pause => pause.pause(),
            WorkerMsg::Resume => pause.resume(),
            WorkerMsg::Task(task) => {
                if abort.is_cancelled() {
                    return;
                }
                let result = run_with_retry(index, &ctx, &task, &pause, &abort, &events).await;
                match result {
                    Ok(children) => {
                        let _ = events.send(WorkerEvent::Finished { index, children }).await;
                    }
                    Err(e) => {
                        if matches!(e, BridgeError::Cancelled) {
                            return;
                        }
                        let _ = events
                            .send(WorkerEvent::Failed {
                                index,
                                error: e.to_string(),
                                path: Some(task.path.clone()),
                            })
                            .await;
                        return;
                    }
                }
            }
        }
    }
}

/// Retry wrapper: up to `MAX_RETRIES` attempts, exponential backoff
/// between, pause-aware waiting before counting a retry.
async fn run_with_retry(
    index: usize,
    ctx: &WorkerContext,
    task: &WorkerTask,
    pause: &PauseSignal,
    abort: &CancellationToken,
    events: &mpsc::Sender<WorkerEvent>,
) -> crate::error::Result<Vec<WorkerTask>> {
    let mut attempt: u32 = 0;
    loop {
        pause.wait_for_resume().await;
        if abort.is_cancelled() {
            return Err(BridgeError::Cancelled);
        }

        let outcome = match task.kind {
            WorkerKind::Folder => process_folder(ctx, task).await,
            WorkerKind::File => process_file(index, ctx, task, pause, abort, events).await,
        };

        match outcome {
            Ok(children) => return Ok(children),
            Err(e) if is_transient(&e) && attempt < MAX_RETRIES => {
                attempt += 1;
                let backoff = (BACKOFF_BASE_MS.saturating_mul(1u64 << (attempt - 1))).min(BACKOFF_CAP_MS);
                warn!("worker {index} retrying {} after {backoff}ms (attempt {attempt}): {e}", task.path);
                tokio::select! {
                    _ = abort.cancelled() => return Err(BridgeError::Cancelled),
                    _ = tokio::time::sleep(Duration::from_millis(backoff)) => {}
                }
            }
            Err(e) => return Err(e),
        }
    }
}

fn is_transient(e: &BridgeError) -> bool {
    matches!(e, BridgeError::Transient(_) | BridgeError::RemoteLogical(_) | BridgeError::Http(_))
}

/// Ensure the destination exists, list children, and emit them sorted
/// folders-first, then lexicographic.
async fn process_folder(ctx: &WorkerContext, task: &WorkerTask) -> crate::error::Result<Vec<WorkerTask>> {
    match ctx.direction {
        TransferDirection::Transfer => {
            ensure_webdav_dir(ctx, &task.path).await?;
            let children = ctx
                .rec_api
                .list_children(&task.id, task.disk_type, task.group_id.as_deref())
                .await?;
            Ok(sorted_children(children, task, &task.path))
        }
        TransferDirection::Download => {
            let local_dir = local_path(ctx, &task.path)?;
            tokio::fs::create_dir_all(&local_dir).await.map_err(BridgeError::LocalFilesystem)?;
            let children = ctx
                .rec_api
                .list_children(&task.id, task.disk_type, task.group_id.as_deref())
                .await?;
            Ok(sorted_children(children, task, &task.path))
        }
        TransferDirection::Upload => {
            let local_dir = local_path(ctx, &task.path)?;
            let folder_id = ensure_remote_folder(ctx, &task.id, &local_dir).await?;
            let mut children = Vec::new();
            let mut entries = tokio::fs::read_dir(&local_dir).await.map_err(BridgeError::LocalFilesystem)?;
            while let Some(entry) = entries.next_entry().await.map_err(BridgeError::LocalFilesystem)? {
                let meta = entry.metadata().await.map_err(BridgeError::LocalFilesystem)?;
                let name = entry.file_name().to_string_lossy().to_string();
                children.push(WorkerTask {
                    id: folder_id.clone(),
                    disk_type: task.disk_type,
                    group_id: task.group_id.clone(),
                    kind: if meta.is_dir() { WorkerKind::Folder } else { WorkerKind::File },
                    path: format!("{}/{}", task.path, name),
                });
            }
            children.sort_by(|a, b| folder_first_then_name(a, b));
            Ok(children)
        }
    }
}

fn folder_first_then_name(a: &WorkerTask, b: &WorkerTask) -> std::cmp::Ordering {
    match (a.kind, b.kind) {
        (WorkerKind::Folder, WorkerKind::File) => std::cmp::Ordering::Less,
        (WorkerKind::File, WorkerKind::Folder) => std::cmp::Ordering::Greater,
        _ => a.path.cmp(&b.path),
    }
}

fn sorted_children(
    entries: Vec<crate::contracts::NormalizedEntry>,
    parent: &WorkerTask,
    parent_path: &str,
) -> Vec<WorkerTask> {
    let mut children: Vec<WorkerTask> = entries
        .into_iter()
        .map(|e| WorkerTask {
            id: e.id,
            disk_type: parent.disk_type,
            group_id: parent.group_id.clone(),
            kind: if e.kind == EntryKind::Directory { WorkerKind::Folder } else { WorkerKind::File },
            path: format!("{parent_path}/{}", e.name),
        })
        .collect();
    children.sort_by(folder_first_then_name);
    children
}

async fn ensure_webdav_dir(ctx: &WorkerContext, path: &str) -> crate::error::Result<()> {
    if !ctx.webdav.exists(path).await? {
        ctx.webdav.mkdir(path).await?;
    }
    Ok(())
}

/// Reuse a remote folder with the same name at the same level if one
/// exists; otherwise create it.
async fn ensure_remote_folder(ctx: &WorkerContext, parent_id: &str, local_dir: &std::path::Path) -> crate::error::Result<String> {
    let name = local_dir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let siblings = ctx.rec_api.list_children(parent_id, DiskType::Personal, None).await?;
    if let Some(existing) = siblings
        .iter()
        .find(|e| e.name == name && e.kind == EntryKind::Directory)
    {
        return Ok(existing.id.clone());
    }
    let ids = ctx.rec_api.mkdir(parent_id, &[name]).await?;
    ids.into_iter()
        .next()
        .ok_or_else(|| BridgeError::RemoteLogical("mkdir returned no id".into()))
}

fn local_path(ctx: &WorkerContext, path: &str) -> crate::error::Result<PathBuf> {
    let root = ctx
        .local_root
        .as_ref()
        .ok_or_else(|| BridgeError::Validation("no local root configured".into()))?;
    Ok(root.join(path.trim_start_matches('/')))
}

/// Skip-if-same-size, otherwise pipe the ranged stream through the
/// progress meter into the destination writer.
async fn process_file(
    index: usize,
    ctx: &WorkerContext,
    task: &WorkerTask,
    pause: &PauseSignal,
    abort: &CancellationToken,
    events: &mpsc::Sender<WorkerEvent>,
) -> crate::error::Result<Vec<WorkerTask>> {
    match ctx.direction {
        TransferDirection::Transfer => {
            let info = ctx.rec_api.get_file_info(&task.id, task.group_id.as_deref()).await?;
            if ctx.webdav.exists(&task.path).await? {
                let stat = ctx.webdav.stat(&task.path).await?;
                if stat.size == info.bytes {
                    let _ = events
                        .send(WorkerEvent::Progress { index, path: task.path.clone(), transferred: stat.size, rate: 0 })
                        .await;
                    return Ok(Vec::new());
                }
            }
            let url = ctx.rec_api.get_download_url(&task.id, task.group_id.as_deref()).await?;
            pipe_remote_to_webdav(index, ctx, task, &url, info.bytes, pause, abort, events).await?;
            Ok(Vec::new())
        }
        TransferDirection::Download => {
            let info = ctx.rec_api.get_file_info(&task.id, task.group_id.as_deref()).await?;
            let dest = local_path(ctx, &task.path)?;
            if let Ok(meta) = tokio::fs::metadata(&dest).await {
                if meta.len() == info.bytes {
                    let _ = events
                        .send(WorkerEvent::Progress { index, path: task.path.clone(), transferred: meta.len(), rate: 0 })
                        .await;
                    return Ok(Vec::new());
                }
                // partial/mismatched file: drop and restart
                let _ = tokio::fs::remove_file(&dest).await;
            }
            let url = ctx.rec_api.get_download_url(&task.id, task.group_id.as_deref()).await?;
            pipe_remote_to_local(index, ctx, task, &url, info.bytes, pause, abort, &dest, events).await?;
            Ok(Vec::new())
        }
        TransferDirection::Upload => {
            let src = local_path(ctx, &task.path)?;
            let meta = tokio::fs::metadata(&src).await.map_err(BridgeError::LocalFilesystem)?;
            if meta.len() == 0 {
                debug!("skipping empty local file {}", src.display());
                return Ok(Vec::new());
            }
            let name = src.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
            let siblings = ctx.rec_api.list_children(&task.id, task.disk_type, task.group_id.as_deref()).await?;
            if let Some(existing) = siblings.iter().find(|e| e.name == name && e.kind == EntryKind::File) {
                if existing.size == meta.len() {
                    let _ = events
                        .send(WorkerEvent::Progress { index, path: task.path.clone(), transferred: meta.len(), rate: 0 })
                        .await;
                    return Ok(Vec::new());
                }
            }
            upload_local_to_remote(index, ctx, task, &src, meta.len(), events).await?;
            Ok(Vec::new())
        }
    }
}

async fn pipe_remote_to_webdav(
    index: usize,
    ctx: &WorkerContext,
    task: &WorkerTask,
    url: &str,
    total: u64,
    pause: &PauseSignal,
    abort: &CancellationToken,
    events: &mpsc::Sender<WorkerEvent>,
) -> crate::error::Result<()> {
    let stream = PausableRangedStream::new(ctx.http.clone(), url.to_string(), 0, pause.clone(), abort.clone());
    let path = task.path.clone();
    let events_clone = events.clone();
    let metered = ProgressRateMeter::new(
        stream,
        Box::new(move |transferred, rate| {
            let _ = events_clone.try_send(WorkerEvent::Progress {
                index,
                path: path.clone(),
                transferred,
                rate,
            });
        }),
    );
    let body = reqwest::Body::wrap_stream(metered.map(|r| r.map(Bytes::from)));
    ctx.webdav.put_stream(&task.path, total, body).await
}

async fn pipe_remote_to_local(
    index: usize,
    ctx: &WorkerContext,
    task: &WorkerTask,
    url: &str,
    _total: u64,
    pause: &PauseSignal,
    abort: &CancellationToken,
    dest: &std::path::Path,
    events: &mpsc::Sender<WorkerEvent>,
) -> crate::error::Result<()> {
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(BridgeError::LocalFilesystem)?;
    }
    let stream = PausableRangedStream::new(ctx.http.clone(), url.to_string(), 0, pause.clone(), abort.clone());
    let path = task.path.clone();
    let events_clone = events.clone();
    let mut metered = ProgressRateMeter::new(
        stream,
        Box::new(move |transferred, rate| {
            let _ = events_clone.try_send(WorkerEvent::Progress {
                index,
                path: path.clone(),
                transferred,
                rate,
            });
        }),
    );

    use tokio::io::AsyncWriteExt;
    let mut file = tokio::fs::File::create(dest).await.map_err(BridgeError::LocalFilesystem)?;
    while let Some(chunk) = metered.next().await {
        let bytes = chunk.map_err(BridgeError::LocalFilesystem)?;
        file.write_all(&bytes).await.map_err(BridgeError::LocalFilesystem)?;
    }
    Ok(())
}

async fn upload_local_to_remote(
    index: usize,
    ctx: &WorkerContext,
    task: &WorkerTask,
    src: &std::path::Path,
    size: u64,
    events: &mpsc::Sender<WorkerEvent>,
) -> crate::error::Result<()> {
    let file = tokio::fs::File::open(src).await.map_err(BridgeError::LocalFilesystem)?;
    let raw = tokio_util::io::ReaderStream::new(file).map(|r| r.map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e)));
    let path = task.path.clone();
    let events_clone = events.clone();
    let metered = ProgressRateMeter::new(
        raw,
        Box::new(move |transferred, rate| {
            let _ = events_clone.try_send(WorkerEvent::Progress {
                index,
                path: path.clone(),
                transferred,
                rate,
            });
        }),
    );
    let body = reqwest::Body::wrap_stream(metered);
    let name = src.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
    ctx.rec_api.upload(&task.id, &name, size, body).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::task::WorkerKind;

    fn task(kind: WorkerKind, path: &str) -> WorkerTask {
        WorkerTask { id: "x".into(), disk_type: DiskType::Personal, group_id: None, kind, path: path.into() }
    }

    #[test]
    fn folders_sort_before_files_then_lexicographic() {
        let mut tasks = vec![
            task(WorkerKind::File, "/b.txt"),
            task(WorkerKind::Folder, "/z"),
            task(WorkerKind::File, "/a.txt"),
            task(WorkerKind::Folder, "/a"),
        ];
        tasks.sort_by(folder_first_then_name);
        let paths: Vec<_> = tasks.iter().map(|t| t.path.as_str()).collect();
        assert_eq!(paths, vec!["/a", "/z", "/a.txt", "/b.txt"]);
    }

    #[test]
    fn transient_errors_are_retryable() {
        assert!(is_transient(&BridgeError::Transient("x".into())));
        assert!(is_transient(&BridgeError::RemoteLogical("x".into())));
        assert!(!is_transient(&BridgeError::Validation("x".into())));
        assert!(!is_transient(&BridgeError::Cancelled));
    }

    #[test]
    fn backoff_caps_at_5000ms() {
        let backoffs: Vec<u64> = (1..=6)
            .map(|attempt: u32| BACKOFF_BASE_MS.saturating_mul(1u64 << (attempt - 1)).min(BACKOFF_CAP_MS))
            .collect();
        assert_eq!(backoffs, vec![1000, 2000, 4000, 5000, 5000, 5000]);
    }

    #[test]
    fn retry_bound_allows_five_retries_after_initial_attempt() {
        // Mirrors the loop condition in `run_with_retry`: a failing task is
        // tried once, then retried while `attempt < MAX_RETRIES`.
        let mut attempt = 0u32;
        let mut tries = 0u32;
        loop {
            tries += 1;
            if attempt < MAX_RETRIES {
                attempt += 1;
            } else {
                break;
            }
        }
        assert_eq!(attempt, MAX_RETRIES);
        assert_eq!(tries, MAX_RETRIES + 1);
    }
}
