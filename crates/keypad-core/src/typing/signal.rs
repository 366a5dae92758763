//! Cooperative abort signal with a cancellable sleep.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

/// Requests an abort. Cheap to clone.
#[derive(Debug, Clone)]
pub struct AbortHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl AbortHandle {
    pub fn abort(&self) {
        self.tx.send_replace(true);
    }
}

/// Observes an abort request.
#[derive(Debug, Clone)]
pub struct AbortSignal {
    rx: watch::Receiver<bool>,
}

enum Wake {
    Elapsed,
    Aborted,
    Orphaned,
}

pub fn abort_pair() -> (AbortHandle, AbortSignal) {
    let (tx, rx) = watch::channel(false);
    (AbortHandle { tx: Arc::new(tx) }, AbortSignal { rx })
}

impl AbortSignal {
    pub fn is_aborted(&self) -> bool {
        *self.rx.borrow()
    }

    /// Sleep for `duration` unless aborted first.
    /// Returns `true` if the full duration elapsed without an abort.
    pub async fn sleep(&mut self, duration: Duration) -> bool {
        if self.is_aborted() {
            return false;
        }

        let sleep = tokio::time::sleep(duration);
        tokio::pin!(sleep);

        let wake = tokio::select! {
            _ = &mut sleep => Wake::Elapsed,
            res = self.rx.wait_for(|aborted| *aborted) => {
                if res.is_ok() { Wake::Aborted } else { Wake::Orphaned }
            }
        };

        match wake {
            Wake::Elapsed => !self.is_aborted(),
            Wake::Aborted => false,
            Wake::Orphaned => {
                // Every handle is gone, so no abort can arrive any more.
                sleep.await;
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_sleep_runs_to_completion() {
        let (_handle, mut signal) = abort_pair();
        let start = Instant::now();
        assert!(signal.sleep(Duration::from_millis(500)).await);
        assert!(start.elapsed() >= Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_abort_wakes_sleeper_early() {
        let (handle, mut signal) = abort_pair();
        let start = Instant::now();

        let sleeper = tokio::spawn(async move { signal.sleep(Duration::from_secs(10)).await });
        tokio::time::sleep(Duration::from_millis(300)).await;
        handle.abort();

        assert!(!sleeper.await.unwrap());
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_already_aborted_returns_immediately() {
        let (handle, mut signal) = abort_pair();
        handle.abort();
        assert!(signal.is_aborted());
        assert!(!signal.sleep(Duration::from_secs(10)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_handle_is_not_an_abort() {
        let (handle, mut signal) = abort_pair();
        drop(handle);
        assert!(signal.sleep(Duration::from_millis(100)).await);
    }
}
