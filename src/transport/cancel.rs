//! Request-scoped cancellation and deadlines.
//!
//! # Responsibilities
//! - Derive per-request scopes from the server's base scope
//! - Bound a scope by a fixed timeout
//! - Cancel a scope on every exit path via a drop guard
//!
//! # Design Decisions
//! - Watch channels carry the cancelled flag (cheap to clone, no polling)
//! - Deadlines are checked lazily; no timer task is spawned per request
//! - Cancellation is cooperative: nothing is aborted, holders observe it

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::Error;

/// Owner side of a cancellation flag. Cancels when dropped.
#[derive(Debug)]
pub struct CancelSource {
    tx: watch::Sender<bool>,
}

impl CancelSource {
    /// Create a new, not yet cancelled source.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    /// A token observing this source.
    pub fn token(&self) -> Cancellation {
        Cancellation {
            flags: vec![self.tx.subscribe()],
            deadline: None,
        }
    }

    /// Fire the flag. Idempotent.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for CancelSource {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for CancelSource {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Cancels the scope it was created with when dropped.
///
/// Held by whoever owns the request for its whole lifetime, so the scope is
/// released on normal return, early return, error, and panic unwind alike.
#[derive(Debug)]
#[must_use = "dropping the guard cancels the scope immediately"]
pub struct CancelGuard {
    source: CancelSource,
}

impl CancelGuard {
    /// Cancel now instead of at drop.
    pub fn cancel(&self) {
        self.source.cancel();
    }
}

/// A cloneable view of a cancellable scope.
#[derive(Debug, Clone)]
pub struct Cancellation {
    flags: Vec<watch::Receiver<bool>>,
    deadline: Option<Instant>,
}

impl Cancellation {
    /// A scope that is never cancelled and has no deadline.
    pub fn background() -> Self {
        Self {
            flags: Vec::new(),
            deadline: None,
        }
    }

    /// Derive a child scope. A zero `timeout` imposes no deadline; otherwise the
    /// child's deadline is the earlier of `now + timeout` and the parent's.
    pub fn child(&self, timeout: Duration) -> (Cancellation, CancelGuard) {
        let source = CancelSource::new();
        let mut flags = self.flags.clone();
        flags.push(source.tx.subscribe());

        let own = (!timeout.is_zero()).then(|| Instant::now() + timeout);
        let deadline = match (self.deadline, own) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };

        (Cancellation { flags, deadline }, CancelGuard { source })
    }

    /// A scope cancelled when either `self` or `other` is.
    pub fn join(&self, other: &Cancellation) -> Cancellation {
        let mut flags = self.flags.clone();
        flags.extend(other.flags.iter().cloned());
        let deadline = match (self.deadline, other.deadline) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        Cancellation { flags, deadline }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    fn flagged(&self) -> bool {
        self.flags.iter().any(|rx| *rx.borrow())
    }

    fn expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    pub fn is_cancelled(&self) -> bool {
        self.flagged() || self.expired()
    }

    /// Why the scope ended, or `None` while it is live.
    pub fn err(&self) -> Option<Error> {
        if self.expired() {
            Some(Error::DeadlineExceeded)
        } else if self.flagged() {
            Some(Error::Canceled)
        } else {
            None
        }
    }

    /// Resolves once the scope is cancelled or its deadline passes.
    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }

        let flags = self.flags.iter().cloned().map(|mut rx| {
            Box::pin(async move {
                // A closed channel means the source is gone; treat as cancelled.
                let _ = rx.wait_for(|cancelled| *cancelled).await;
            })
        });
        let any_flag = async {
            if self.flags.is_empty() {
                std::future::pending::<()>().await;
            } else {
                futures_util::future::select_all(flags).await;
            }
        };
        let timer = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            _ = any_flag => {}
            _ = timer => {}
        }
    }
}

impl Default for Cancellation {
    fn default() -> Self {
        Self::background()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn background_never_cancels() {
        let bg = Cancellation::background();
        assert!(!bg.is_cancelled());
        assert!(bg.err().is_none());
        let res = tokio::time::timeout(Duration::from_millis(20), bg.cancelled()).await;
        assert!(res.is_err());
    }

    #[tokio::test]
    async fn guard_drop_cancels_child() {
        let (child, guard) = Cancellation::background().child(Duration::ZERO);
        assert!(child.deadline().is_none());
        assert!(!child.is_cancelled());
        drop(guard);
        assert!(child.is_cancelled());
        assert!(matches!(child.err(), Some(Error::Canceled)));
        child.cancelled().await;
    }

    #[tokio::test]
    async fn parent_cancellation_propagates() {
        let root = CancelSource::new();
        let (child, _guard) = root.token().child(Duration::ZERO);
        let waiter = tokio::spawn(async move { child.cancelled().await });
        root.cancel();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("child observed parent cancel")
            .unwrap();
    }

    #[tokio::test]
    async fn deadline_fires() {
        let start = Instant::now();
        let (child, _guard) = Cancellation::background().child(Duration::from_millis(50));
        child.cancelled().await;
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(50));
        assert!(elapsed < Duration::from_millis(150));
        assert!(matches!(child.err(), Some(Error::DeadlineExceeded)));
    }

    #[tokio::test]
    async fn child_keeps_earlier_parent_deadline() {
        let (parent, _p) = Cancellation::background().child(Duration::from_millis(10));
        let (child, _c) = parent.child(Duration::from_secs(10));
        assert_eq!(child.deadline(), parent.deadline());
    }

    #[tokio::test]
    async fn join_observes_both_sides() {
        let a = CancelSource::new();
        let b = CancelSource::new();
        let joined = a.token().join(&b.token());
        assert!(!joined.is_cancelled());
        b.cancel();
        assert!(joined.is_cancelled());
    }
}
