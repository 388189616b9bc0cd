//! Cancellation handle passed to every provider operation
//!
//! A `Context` is cheap to clone. Clones share the same cancellation signal,
//! so cancelling the root context (done by `StopProvider`) is observed by every
//! in-flight request derived from it.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time;

/// Context carries cancellation signals and deadlines across async boundaries
/// Pass this as the first parameter to ALL async trait methods
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    deadline: Option<Instant>,
    done: watch::Receiver<bool>,
    done_tx: watch::Sender<bool>,
    parent: Option<Context>,
}

impl Context {
    pub fn new() -> Self {
        let (done_tx, done) = watch::channel(false);
        Self {
            inner: Arc::new(ContextInner {
                deadline: None,
                done,
                done_tx,
                parent: None,
            }),
        }
    }

    /// Derive a child context that is cancelled when the deadline passes or
    /// when this context is cancelled, whichever comes first.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let deadline = Instant::now() + timeout;
        let (done_tx, done) = watch::channel(false);

        let child = Self {
            inner: Arc::new(ContextInner {
                deadline: Some(deadline),
                done,
                done_tx,
                parent: Some(self.clone()),
            }),
        };

        let timer = child.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = time::sleep_until(deadline.into()) => timer.cancel(),
                _ = timer.wait_parent() => timer.cancel(),
            }
        });

        child
    }

    pub fn is_cancelled(&self) -> bool {
        *self.inner.done.borrow()
            || self
                .inner
                .parent
                .as_ref()
                .is_some_and(|parent| parent.is_cancelled())
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    pub fn cancel(&self) {
        let _ = self.inner.done_tx.send(true);
    }

    /// Resolves once this context (or any ancestor) is cancelled
    pub async fn done(&self) {
        let mut own = self.inner.done.clone();
        tokio::select! {
            _ = own.wait_for(|cancelled| *cancelled) => {}
            _ = self.wait_parent() => {}
        }
    }

    async fn wait_parent(&self) {
        match &self.inner.parent {
            Some(parent) => Box::pin(parent.done()).await,
            None => std::future::pending().await,
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
