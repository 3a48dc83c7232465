//! Process-lifetime concerns: termination signals and the held process lock.
//!
//! The process lock lives in a [`LockSlot`] shared with the signal handler so
//! that every exit path (normal return, error, SIGINT, SIGTERM, SIGHUP) drops
//! the guard. SIGKILL cannot be handled; the kernel releases the `flock`
//! when the descriptor closes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use log::{debug, warn};

use crate::error::Result;

/// Exit status after a termination signal.
pub const EXIT_SIGNALLED: i32 = 130;

/// Shared, optional home for a lock guard.
pub struct LockSlot<G> {
    inner: Arc<Mutex<Option<G>>>,
}

impl<G> Clone for LockSlot<G> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<G> Default for LockSlot<G> {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(None)),
        }
    }
}

impl<G> LockSlot<G> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `guard`, releasing any guard held before.
    pub fn hold(&self, guard: G) {
        let previous = self.lock().replace(guard);
        drop(previous);
    }

    /// Drops the held guard. Returns whether one was held.
    pub fn release(&self) -> bool {
        let guard = self.lock().take();
        let released = guard.is_some();
        drop(guard);
        released
    }

    pub fn is_held(&self) -> bool {
        self.lock().is_some()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<G>> {
        // A panic while holding the slot leaves the Option intact.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Shutdown flag plus the process-lock slot for one invocation.
pub struct Lifecycle<G> {
    shutdown: Arc<AtomicBool>,
    slot: LockSlot<G>,
}

impl<G> Default for Lifecycle<G> {
    fn default() -> Self {
        Self {
            shutdown: Arc::new(AtomicBool::new(false)),
            slot: LockSlot::new(),
        }
    }
}

impl<G: Send + 'static> Lifecycle<G> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    pub fn slot(&self) -> LockSlot<G> {
        self.slot.clone()
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    /// Installs the handler for SIGINT, SIGTERM and SIGHUP.
    ///
    /// The handler raises the shutdown flag, releases the process lock and
    /// exits with [`EXIT_SIGNALLED`]. Queue state needs no cleanup: the item
    /// in flight was already dequeued and its partial output, named after this
    /// pid, is removed by the next run.
    pub fn install_signal_handlers(&self) -> Result<()> {
        let shutdown = Arc::clone(&self.shutdown);
        let slot = self.slot.clone();

        ctrlc::set_handler(move || {
            shutdown.store(true, Ordering::SeqCst);
            let released = slot.release();
            warn!(
                "Termination signal received, exiting (process lock released: {})",
                released
            );
            log::logger().flush();
            std::process::exit(EXIT_SIGNALLED);
        })?;
        Ok(())
    }
}

impl<G> Drop for Lifecycle<G> {
    fn drop(&mut self) {
        if self.slot.release() {
            debug!("Released process lock on shutdown");
        }
    }
}
