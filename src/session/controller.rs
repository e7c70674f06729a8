use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::core::config::Config;
use crate::core::error::{Error, ErrorKind, Result};

/// Lock-timeout policy plus cooperative cancellation shared by an
/// `Archiver`/`Retriever` session, spec.md §5: "long-running retrieval
/// scans must be cancellable between index boundaries without
/// corrupting in-progress state."
///
/// A `SessionController` carries no state that outlives one session —
/// archivers and retrievers each own one rather than reaching into
/// shared global state, so two sessions against the same root never
/// observe each other's cancellation.
#[derive(Clone)]
pub struct SessionController {
    lock_timeout: Duration,
    cancelled: Arc<AtomicBool>,
}

impl SessionController {
    pub fn new(lock_timeout: Duration) -> Self {
        SessionController { lock_timeout, cancelled: Arc::new(AtomicBool::new(false)) }
    }

    pub fn from_config(config: &Config) -> Self {
        SessionController::new(config.lock_timeout)
    }

    pub fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }

    /// A clonable handle callers can hand to another thread (e.g. a
    /// UI "cancel" button) to request this session stop early.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Call between index boundaries in a retrieval scan; a cancelled
    /// session surfaces as an ordinary error rather than a panic or a
    /// truncated silent result.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(Error::new(ErrorKind::InvalidState, "session was cancelled"));
        }
        Ok(())
    }
}
