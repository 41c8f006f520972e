//! Multi-worker executor.
//!
//! Spawns a fixed worker pool for one task's recursive tree, drives a FIFO
//! queue of pending leaf tasks, and aggregates per-worker progress slots
//! into one throttled callback. Message-driven: the dispatch loop never
//! busy-waits, it only reacts to worker events delivered over a per-worker
//! mailbox.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::pause::PauseSignal;
use super::task::{TransferDirection, WorkerProgressSlot, WorkerTask};
use super::worker::{run_worker, WorkerContext, WorkerEvent, WorkerMsg};

const AGGREGATION_THROTTLE: Duration = Duration::from_millis(100);

pub fn worker_count(direction: TransferDirection) -> usize {
    match direction {
        TransferDirection::Transfer => 2,
        TransferDirection::Download | TransferDirection::Upload => 4,
    }
}

/// Aggregated progress callback: `(path, total_transferred, total_rate)`.
pub type AggregateCallback = Box<dyn FnMut(Option<String>, u64, u64) + Send>;

pub struct ExecutorOutcome {
    pub transferred: u64,
}

/// Drive `root` and its recursive expansion to completion.
pub async fn run(
    ctx: Arc<WorkerContext>,
    root: WorkerTask,
    pool_size: usize,
    pause: PauseSignal,
    abort: CancellationToken,
    mut on_progress: AggregateCallback,
) -> crate::error::Result<ExecutorOutcome> {
    let pool_size = pool_size.max(1);
    let (event_tx, mut event_rx) = mpsc::channel::<WorkerEvent>(pool_size * 4);
    let mut mailboxes = Vec::with_capacity(pool_size);
    let mut handles = Vec::with_capacity(pool_size);

    for i in 0..pool_size {
        let (tx, rx) = mpsc::channel::<WorkerMsg>(4);
        let ctx = ctx.clone();
        let events = event_tx.clone();
        let abort_c = abort.clone();
        handles.push(tokio::spawn(run_worker(i, ctx, rx, events, abort_c)));
        mailboxes.push(tx);
    }
    drop(event_tx);

    let mut queue: VecDeque<WorkerTask> = VecDeque::new();
    queue.push_back(root);
    let mut ready = vec![true; pool_size];
    let mut slots: Vec<WorkerProgressSlot> = vec![WorkerProgressSlot::default(); pool_size];
    let mut last_aggregate = Instant::now() - AGGREGATION_THROTTLE;
    let mut paused_rx = pause.subscribe();

    dispatch(&mailboxes, &mut queue, &mut ready, &pause, &abort).await;

    let result = loop {
        if ready.iter().all(|r| *r) && queue.is_empty() {
            break Ok(());
        }

        tokio::select! {
            _ = abort.cancelled() => {
                break Err(crate::error::BridgeError::Cancelled);
            }
            changed = paused_rx.changed() => {
                if changed.is_err() {
                    continue;
                }
                let now_paused = *paused_rx.borrow();
                broadcast_pause(&mailboxes, now_paused).await;
                if !now_paused {
                    dispatch(&mailboxes, &mut queue, &mut ready, &pause, &abort).await;
                }
            }
            event = event_rx.recv() => {
                match event {
                    None => break Ok(()), // all workers exited
                    Some(WorkerEvent::Finished { index, children }) => {
                        slots[index].roll_finish();
                        ready[index] = true;
                        queue.extend(children);
                        dispatch(&mailboxes, &mut queue, &mut ready, &pause, &abort).await;
                    }
                    Some(WorkerEvent::Progress { index, path, transferred, rate }) => {
                        slots[index].path = Some(path);
                        slots[index].transferred = transferred;
                        slots[index].rate = rate;
                        maybe_report(&slots, &mut last_aggregate, &mut on_progress);
                    }
                    Some(WorkerEvent::Failed { error, path, .. }) => {
                        info!("worker failed on {:?}: {error}", path);
                        break Err(crate::error::BridgeError::FatalWorker(error));
                    }
                }
            }
        }
    };

    for mailbox in &mailboxes {
        let _ = mailbox.send(WorkerMsg::Exit).await;
    }
    for handle in handles {
        let _ = handle.await;
    }

    let transferred = slots.iter().map(|s| s.completed_size + s.transferred).sum();
    result.map(|_| ExecutorOutcome { transferred })
}

async fn dispatch(
    mailboxes: &[mpsc::Sender<WorkerMsg>],
    queue: &mut VecDeque<WorkerTask>,
    ready: &mut [bool],
    pause: &PauseSignal,
    abort: &CancellationToken,
) {
    if pause.is_paused() || abort.is_cancelled() {
        return;
    }
    for (i, mailbox) in mailboxes.iter().enumerate() {
        if ready[i] {
            if let Some(task) = queue.pop_front() {
                if mailbox.send(WorkerMsg::Task(task)).await.is_ok() {
                    ready[i] = false;
                }
            } else {
                break;
            }
        }
    }
}

fn maybe_report(slots: &[WorkerProgressSlot], last: &mut Instant, cb: &mut AggregateCallback) {
    let now = Instant::now();
    if now.duration_since(*last) < AGGREGATION_THROTTLE {
        return;
    }
    *last = now;

    let total_transferred: u64 = slots.iter().map(|s| s.completed_size + s.transferred).sum();
    let active: Vec<&WorkerProgressSlot> = slots.iter().filter(|s| s.rate > 0).collect();
    let total_rate: u64 = active.iter().map(|s| s.rate).sum();
    let path = active.first().and_then(|s| s.path.clone());
    cb(path, total_transferred, total_rate);
}

/// Forward `pause`/`resume` to every live worker mailbox.
pub async fn broadcast_pause(mailboxes: &[mpsc::Sender<WorkerMsg>], paused: bool) {
    let msg_fn: fn() -> WorkerMsg = if paused { || WorkerMsg::Pause } else { || WorkerMsg::Resume };
    for mailbox in mailboxes {
        let _ = mailbox.send(msg_fn()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_count_matches_direction_defaults() {
        assert_eq!(worker_count(TransferDirection::Transfer), 2);
        assert_eq!(worker_count(TransferDirection::Download), 4);
        assert_eq!(worker_count(TransferDirection::Upload), 4);
    }

    #[tokio::test]
    async fn maybe_report_throttles_to_100ms() {
        let slots = vec![WorkerProgressSlot { path: Some("a".into()), transferred: 10, rate: 5, completed_size: 0 }];
        let mut last = Instant::now();
        let mut calls = 0u32;
        let mut cb: AggregateCallback = Box::new(|_, _, _| calls += 1);
        maybe_report(&slots, &mut last, &mut cb);
        assert_eq!(calls, 0); // throttled: `last` was just reset to "now"
    }
}
