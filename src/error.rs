//! Fatal error types and the single-authority failure sink.
//!
//! Workers never retry and never decide the run is over themselves; they
//! escalate to a `FailureSink` shared with the coordinator. The first
//! escalation wins, every worker observes cancellation cooperatively at its
//! next suspension point, and the coordinator is the only place that turns
//! a fatal error into a process exit code.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// A fatal error from any stage of the pipeline. Non-fatal conditions
/// (metadata persist/decode failures) never become one of these.
#[derive(Debug, thiserror::Error)]
pub enum FatalError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("probe failed: {0}")]
    Probe(String),

    #[error("worker {worker_id} I/O error: {source}")]
    WorkerIo {
        worker_id: usize,
        #[source]
        source: anyhow::Error,
    },

    #[error("writer I/O error: {0}")]
    WriterIo(#[source] anyhow::Error),

    #[error("writer timed out waiting for a chunk")]
    QueueTimeout,

    #[error("cleanup failed: {0}")]
    Cleanup(#[source] std::io::Error),

    #[error("run exceeded its overall timeout")]
    OverallTimeout,
}

/// Cooperative cancellation flag, checked by workers at suspension points
/// (socket read loop, `enqueue`, `dequeue`). Cancellation is best-effort: a
/// worker blocked in a syscall cannot always be interrupted promptly.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

/// One-shot latch for the first fatal error reported by any worker.
///
/// The coordinator is the single authority that decides a run is over:
/// `report` is idempotent, the first call wins, and it requests
/// cancellation of the whole pool.
#[derive(Clone)]
pub struct FailureSink {
    first: Arc<Mutex<Option<FatalError>>>,
    cancel: CancelToken,
}

impl FailureSink {
    pub fn new(cancel: CancelToken) -> Self {
        Self {
            first: Arc::new(Mutex::new(None)),
            cancel,
        }
    }

    /// Reports a fatal error. Returns `true` if this call was the one that
    /// latched the error (i.e. the run was not already failed).
    pub fn report(&self, err: FatalError) -> bool {
        let mut slot = self.first.lock().unwrap();
        self.cancel.cancel();
        if slot.is_none() {
            *slot = Some(err);
            true
        } else {
            false
        }
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Takes the first reported error, if any, consuming it.
    pub fn take(&self) -> Option<FatalError> {
        self.first.lock().unwrap().take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_report_wins_and_cancels() {
        let sink = FailureSink::new(CancelToken::new());
        assert!(!sink.cancel_token().is_cancelled());
        assert!(sink.report(FatalError::QueueTimeout));
        assert!(sink.cancel_token().is_cancelled());
        assert!(!sink.report(FatalError::Configuration("second".into())));
        match sink.take() {
            Some(FatalError::QueueTimeout) => {}
            other => panic!("expected the first error to win, got {other:?}"),
        }
    }

    #[test]
    fn cancel_token_shares_state_across_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }
}
