//! Progress rate meter and human-readable formatting helpers.

use bytes::Bytes;
use futures_util::Stream;
use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::time::{Duration, Instant};

/// `(transferred_so_far, smoothed_rate_bytes_per_second)`
pub type ProgressCallback = Box<dyn FnMut(u64, u64) + Send>;

const SAMPLE_INTERVAL: Duration = Duration::from_millis(200);
const WINDOW: usize = 5;

/// A transparent pass-through byte stage that samples its own byte counter
/// on a fixed cadence and reports a smoothed instantaneous rate.
pub struct ProgressRateMeter<S> {
    inner: S,
    transferred: u64,
    last_sample_bytes: u64,
    last_sample_at: Instant,
    window: VecDeque<u64>,
    callback: ProgressCallback,
    finished: bool,
}

impl<S> ProgressRateMeter<S>
where
    S: Stream<Item = io::Result<Bytes>>,
{
    pub fn new(inner: S, callback: ProgressCallback) -> Self {
        Self {
            inner,
            transferred: 0,
            last_sample_bytes: 0,
            last_sample_at: Instant::now(),
            window: VecDeque::with_capacity(WINDOW),
            callback,
            finished: false,
        }
    }

    fn maybe_sample(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_sample_at);
        if elapsed < SAMPLE_INTERVAL {
            return;
        }
        let delta = self.transferred.saturating_sub(self.last_sample_bytes);
        self.last_sample_at = now;
        self.last_sample_bytes = self.transferred;

        // Skip the window entirely when no bytes moved.
        if delta == 0 {
            return;
        }

        let instantaneous = delta * 5; // elapsed ~= 200ms => *5 to reach bytes/sec
        if self.window.len() == WINDOW {
            self.window.pop_front();
        }
        self.window.push_back(instantaneous);
        let avg = self.window.iter().sum::<u64>() / self.window.len() as u64;
        (self.callback)(self.transferred, avg);
    }
}

impl<S> Stream for ProgressRateMeter<S>
where
    S: Stream<Item = io::Result<Bytes>> + Unpin,
{
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let inner = Pin::new(&mut self.inner);
        match inner.poll_next(cx) {
            Poll::Ready(Some(Ok(bytes))) => {
                self.transferred += bytes.len() as u64;
                self.maybe_sample();
                Poll::Ready(Some(Ok(bytes)))
            }
            Poll::Ready(Some(Err(e))) => Poll::Ready(Some(Err(e))),
            Poll::Ready(None) => {
                if !self.finished {
                    self.finished = true;
                    let transferred = self.transferred;
                    (self.callback)(transferred, 0);
                }
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Format bytes as a human-readable string.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_index])
}

/// Format speed as a human-readable string.
pub fn format_speed(bytes_per_second: u64) -> String {
    format!("{}/s", format_bytes(bytes_per_second))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use std::sync::{Arc, Mutex};

    #[tokio::test]
    async fn final_callback_reports_zero_rate() {
        let calls: Arc<Mutex<Vec<(u64, u64)>>> = Arc::new(Mutex::new(Vec::new()));
        let calls2 = calls.clone();
        let inner = stream::iter(vec![Ok::<_, io::Error>(Bytes::from_static(b"hello"))]);
        let mut meter = ProgressRateMeter::new(
            inner,
            Box::new(move |t, r| calls2.lock().unwrap().push((t, r))),
        );
        use futures_util::StreamExt;
        while meter.next().await.is_some() {}
        let recorded = calls.lock().unwrap();
        let (_, last_rate) = *recorded.last().unwrap();
        assert_eq!(last_rate, 0);
    }

    #[test]
    fn format_bytes_units() {
        assert_eq!(format_bytes(0), "0.00 B");
        assert_eq!(format_bytes(1024), "1.00 KB");
        assert_eq!(format_bytes(1024 * 1024), "1.00 MB");
    }

    #[test]
    fn format_speed_suffix() {
        assert_eq!(format_speed(1024), "1.00 KB/s");
    }
}
