//! Pause signal: an observable two-state flag.
//!
//! Built on `tokio::sync::watch`, which already gives "last value wins"
//! semantics; the wrapper adds the idempotence rule (setting the same state
//! is a no-op, no spurious wakeup) by comparing before sending.

use tokio::sync::watch;

#[derive(Clone)]
pub struct PauseSignal {
    tx: watch::Sender<bool>,
}

impl PauseSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    pub fn is_paused(&self) -> bool {
        *self.tx.borrow()
    }

    /// Idempotent: a no-op (no event) if already paused.
    pub fn pause(&self) {
        self.tx.send_if_modified(|paused| {
            if *paused {
                false
            } else {
                *paused = true;
                true
            }
        });
    }

    /// Idempotent: a no-op (no event) if already running.
    pub fn resume(&self) {
        self.tx.send_if_modified(|paused| {
            if *paused {
                *paused = false;
                true
            } else {
                false
            }
        });
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Block until the signal transitions to `running`. Used by workers
    /// between retry attempts: if paused, wait until resumed before
    /// counting the retry.
    pub async fn wait_for_resume(&self) {
        if !self.is_paused() {
            return;
        }
        let mut rx = self.subscribe();
        while *rx.borrow() {
            if rx.changed().await.is_err() {
                break;
            }
        }
    }
}

impl Default for PauseSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pause_resume_round_trip() {
        let sig = PauseSignal::new();
        assert!(!sig.is_paused());
        sig.pause();
        assert!(sig.is_paused());
        sig.resume();
        assert!(!sig.is_paused());
    }

    #[test]
    fn setting_same_state_is_idempotent() {
        let sig = PauseSignal::new();
        let mut rx = sig.subscribe();
        sig.resume(); // already running: no-op
        assert!(rx.has_changed().is_ok_and(|c| !c));
    }

    #[tokio::test]
    async fn wait_for_resume_returns_immediately_when_running() {
        let sig = PauseSignal::new();
        tokio::time::timeout(std::time::Duration::from_millis(50), sig.wait_for_resume())
            .await
            .expect("should not block");
    }

    #[tokio::test]
    async fn wait_for_resume_unblocks_on_resume() {
        let sig = PauseSignal::new();
        sig.pause();
        let sig2 = sig.clone();
        let handle = tokio::spawn(async move { sig2.wait_for_resume().await });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        sig.resume();
        tokio::time::timeout(std::time::Duration::from_millis(200), handle)
            .await
            .expect("should unblock after resume")
            .unwrap();
    }
}
