//! Cooperative cancellation tokens for run- and step-scoped workers.
//!
//! Tokens form a tree: a child created with [`CancelToken::child`] observes
//! its parent's cancellation, so cancelling a run token stops every tail and
//! timer spawned under it. Cancellation is cooperative: workers check the
//! token at their poll boundary and unwind on the next iteration.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A cancellation signal that can be shared across threads.
///
/// Cancelling is idempotent; cancelling an already-cancelled token is a
/// no-op. Cloning produces another handle to the same signal.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    parent: Option<Box<CancelToken>>,
}

impl CancelToken {
    /// Create a new root token (not cancelled).
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a child token. Cancelling the parent cancels the child;
    /// cancelling the child leaves the parent untouched.
    pub fn child(&self) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            parent: Some(Box::new(self.clone())),
        }
    }

    /// Signal cancellation to this token and all of its descendants.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Check whether this token or any of its ancestors has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        if self.flag.load(Ordering::SeqCst) {
            return true;
        }
        self.parent.as_ref().is_some_and(|p| p.is_cancelled())
    }
}
