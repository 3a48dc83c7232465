//! Mutual exclusion between invocations.
//!
//! Two independent locks exist. The queue lock guards a single read-modify-write
//! of the queue file and is held for milliseconds. The process lock is held by
//! the one invocation draining the queue, for as long as the drain lasts.
//!
//! Both must be released by the operating system when the holder dies, which
//! rules out "marker file exists" schemes: a SIGKILLed holder would leave the
//! marker behind forever. [`FsLockManager`] uses `flock(2)` on an open
//! descriptor instead.

pub mod file;
pub mod memory;

use std::fmt;
use std::thread;
use std::time::{Duration, Instant};

use crate::error::LockError;

pub use file::{FileLockGuard, FsLockManager};
pub use memory::{MemoryLockGuard, MemoryLockManager};

/// Sleep between non-blocking attempts inside a bounded wait.
pub const POLL_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockKind {
    Queue,
    Process,
}

impl fmt::Display for LockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockKind::Queue => f.write_str("queue"),
            LockKind::Process => f.write_str("process"),
        }
    }
}

/// Source of exclusive locks. Dropping a guard releases its lock.
pub trait LockManager: Send + Sync {
    type Guard: Send + 'static;

    /// Attempts the lock without waiting. `Ok(None)` means another holder
    /// has it.
    fn try_lock(&self, kind: LockKind) -> Result<Option<Self::Guard>, LockError>;

    /// Retries [`try_lock`](Self::try_lock) until `timeout` elapses.
    fn lock_with_timeout(
        &self,
        kind: LockKind,
        timeout: Duration,
    ) -> Result<Self::Guard, LockError> {
        let started = Instant::now();
        loop {
            if let Some(guard) = self.try_lock(kind)? {
                return Ok(guard);
            }
            let waited = started.elapsed();
            if waited >= timeout {
                return Err(LockError::Timeout { kind, waited });
            }
            thread::sleep(POLL_INTERVAL.min(timeout - waited));
        }
    }

    fn try_acquire_process_lock(&self) -> Result<Option<Self::Guard>, LockError> {
        self.try_lock(LockKind::Process)
    }

    fn acquire_queue_lock(&self, timeout: Duration) -> Result<Self::Guard, LockError> {
        self.lock_with_timeout(LockKind::Queue, timeout)
    }

    /// Checks whether some other holder currently has the lock.
    fn is_held_elsewhere(&self, kind: LockKind) -> Result<bool, LockError> {
        Ok(self.try_lock(kind)?.is_none())
    }
}
