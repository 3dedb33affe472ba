use std::sync::Arc;

use tokio::sync::watch;

/// Terminal result of a launch attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Ready,
    Failed(String),
    TimedOut,
}

/// Single-shot, first-write-wins signal shared by the stream readers, the
/// exit watcher and the timer.
///
/// Only the first [`try_set`](Self::try_set) records a value; every later call
/// is a no-op. Clones observe the same slot.
#[derive(Debug, Clone)]
pub struct ReadinessSignal {
    tx: Arc<watch::Sender<Option<Outcome>>>,
}

impl Default for ReadinessSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadinessSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Record `outcome` if nothing was recorded yet. Returns whether this
    /// call won.
    pub fn try_set(&self, outcome: Outcome) -> bool {
        self.tx.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(outcome);
            true
        })
    }

    pub fn get(&self) -> Option<Outcome> {
        self.tx.borrow().clone()
    }

    pub fn is_set(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// Resolves once an outcome is recorded.
    pub async fn wait(&self) -> Outcome {
        let mut rx = self.tx.subscribe();
        loop {
            if let Some(outcome) = rx.borrow_and_update().clone() {
                return outcome;
            }
            // The sender lives in `self`, so the channel cannot close here.
            if rx.changed().await.is_err() {
                return Outcome::Failed("readiness signal dropped".to_string());
            }
        }
    }
}
