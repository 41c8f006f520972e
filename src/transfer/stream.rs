//! Pausable ranged stream.
//!
//! Produces a lazy byte sequence identical to reading a URL once from
//! offset 0, tolerant to pause/resume and early cancellation. Internally, a
//! driver task performs the actual ranged HTTP reads and pushes chunks into
//! a small bounded channel; the channel's bounded capacity is what gives
//! the outer `Stream` backpressure (the driver blocks on `send` once the
//! consumer stops polling). The read is split across a driver task so
//! pause can tear down and re-establish the inner HTTP read without the
//! consumer noticing anything beyond a stall.

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::pause::PauseSignal;

/// Channel depth between the driver task and the consumer. Small on
/// purpose: this is the backpressure knob that stalls the driver once
/// the consumer stops polling.
const CHANNEL_DEPTH: usize = 4;

pub struct PausableRangedStream {
    rx: mpsc::Receiver<io::Result<Bytes>>,
    _driver: tokio::task::JoinHandle<()>,
}

impl PausableRangedStream {
    /// `url` must serve stable content for its lifetime: a pause/resume
    /// cycle re-requests the same URL with a new `Range` header.
    pub fn new(
        client: reqwest::Client,
        url: String,
        bytes_received: u64,
        pause: PauseSignal,
        abort: CancellationToken,
    ) -> Self {
        let (tx, rx) = mpsc::channel(CHANNEL_DEPTH);
        let driver = tokio::spawn(drive(client, url, bytes_received, pause, abort, tx));
        Self { rx, _driver: driver }
    }
}

impl Stream for PausableRangedStream {
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Parse a `Content-Range: bytes 0-0/TOTAL` header into `TOTAL`.
fn parse_total(header: &str) -> Option<u64> {
    header.rsplit('/').next()?.parse().ok()
}

async fn discover_total(client: &reqwest::Client, url: &str) -> io::Result<u64> {
    let resp = client
        .get(url)
        .header("Range", "bytes=0-0")
        .send()
        .await
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

    let header = resp
        .headers()
        .get("content-range")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    header
        .as_deref()
        .and_then(parse_total)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "no Content-Range in size probe"))
}

/// Drives the ranged reads, tearing the inner stream down on pause and
/// re-establishing it at `bytes_received` on resume.
async fn drive(
    client: reqwest::Client,
    url: String,
    mut bytes_received: u64,
    pause: PauseSignal,
    abort: CancellationToken,
    tx: mpsc::Sender<io::Result<Bytes>>,
) {
    let total = match discover_total(&client, &url).await {
        Ok(t) => t,
        Err(e) => {
            if !abort.is_cancelled() {
                let _ = tx.send(Err(e)).await;
            }
            return;
        }
    };

    'outer: loop {
        if abort.is_cancelled() {
            return;
        }
        if bytes_received >= total {
            return; // end-of-sequence; dropping tx ends the stream cleanly
        }

        // Cooperative pause: block here until resumed, unless aborted first.
        tokio::select! {
            _ = abort.cancelled() => return,
            _ = pause.wait_for_resume() => {}
        }

        let resp = tokio::select! {
            _ = abort.cancelled() => return,
            r = client.get(&url).header("Range", format!("bytes={bytes_received}-")).send() => r,
        };

        let resp = match resp {
            Ok(r) => r,
            Err(e) => {
                warn!("ranged GET failed for {}: {}", url, e);
                if !abort.is_cancelled() {
                    let _ = tx.send(Err(io::Error::new(io::ErrorKind::Other, e))).await;
                }
                return;
            }
        };

        let mut body = resp.bytes_stream();
        let mut paused_rx = pause.subscribe();

        loop {
            tokio::select! {
                _ = abort.cancelled() => return,
                changed = paused_rx.changed(), if !*paused_rx.borrow() => {
                    if changed.is_err() {
                        return;
                    }
                    debug!("pause requested mid-stream for {}, tearing down inner read", url);
                    continue 'outer;
                }
                chunk = body.next() => {
                    match chunk {
                        Some(Ok(bytes)) => {
                            let len = bytes.len() as u64;
                            if tx.send(Ok(bytes)).await.is_err() {
                                return; // consumer dropped
                            }
                            bytes_received += len;
                        }
                        Some(Err(e)) => {
                            if !abort.is_cancelled() {
                                let _ = tx.send(Err(io::Error::new(io::ErrorKind::Other, e))).await;
                            }
                            return;
                        }
                        None => {
                            if bytes_received >= total {
                                return;
                            }
                            // premature end: transient, let the worker's retry
                            // wrapper decide whether to try again.
                            if !abort.is_cancelled() {
                                let _ = tx
                                    .send(Err(io::Error::new(
                                        io::ErrorKind::UnexpectedEof,
                                        "stream ended before total size reached",
                                    )))
                                    .await;
                            }
                            return;
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_content_range_total() {
        assert_eq!(parse_total("bytes 0-0/12345"), Some(12345));
        assert_eq!(parse_total("bytes */*"), None);
        assert_eq!(parse_total("garbage"), None);
    }
}
