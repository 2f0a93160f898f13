//! Cooperative cancellation for long-running pipeline steps.
//!
//! A [`CancelSignal`] is shared between the caller (who may abort a job, e.g.
//! on Ctrl-C) and the rasteriser (which races the external process against
//! [`CancelSignal::cancelled`]). Clones observe the same flag. A signal may
//! also carry a deadline; reaching it resolves `cancelled()` with
//! [`CancelReason::TimedOut`] without touching the shared flag, so a timeout
//! on one step never cancels the caller's other work.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// Why [`CancelSignal::cancelled`] resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// [`CancelSignal::cancel`] was called on this signal or a clone.
    Aborted,
    /// The signal's deadline passed.
    TimedOut(Duration),
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelReason::Aborted => f.write_str("cancelled by caller"),
            CancelReason::TimedOut(d) => write!(f, "timed out after {}s", d.as_secs_f32()),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Deadline {
    at: Instant,
    budget: Duration,
}

/// Shared cancellation flag with an optional deadline.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    tx: Arc<watch::Sender<bool>>,
    deadline: Option<Deadline>,
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelSignal {
    /// A signal that only resolves when [`cancel`](Self::cancel) is called.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            deadline: None,
        }
    }

    /// A view of this signal that additionally times out after `timeout`.
    ///
    /// The returned signal shares the cancel flag. If this signal already
    /// has an earlier deadline, that one is kept. A timeout too large to
    /// represent as an instant adds no deadline.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let candidate = Instant::now().checked_add(timeout).map(|at| Deadline {
            at,
            budget: timeout,
        });
        let deadline = match (self.deadline, candidate) {
            (Some(existing), Some(c)) if existing.at <= c.at => Some(existing),
            (existing, None) => existing,
            (_, c) => c,
        };
        Self {
            tx: Arc::clone(&self.tx),
            deadline,
        }
    }

    /// Request cancellation. Idempotent; wakes every pending `cancelled()`.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    /// `true` once [`cancel`](Self::cancel) has been called. Deadlines are
    /// not considered.
    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolve when the signal is cancelled or its deadline passes.
    pub async fn cancelled(&self) -> CancelReason {
        let mut rx = self.tx.subscribe();
        let flag = async move {
            // The sender lives as long as `self`, so the channel cannot close
            // while this future is polled.
            let _ = rx.wait_for(|v| *v).await;
            CancelReason::Aborted
        };
        match self.deadline {
            None => flag.await,
            Some(d) => tokio::select! {
                biased;
                reason = flag => reason,
                _ = tokio::time::sleep_until(d.at) => CancelReason::TimedOut(d.budget),
            },
        }
    }
}
