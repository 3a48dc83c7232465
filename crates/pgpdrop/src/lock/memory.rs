use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use super::{LockKind, LockManager};
use crate::error::LockError;

/// In-process locks for tests that model invocations as threads.
/// Clones share the same lock table.
#[derive(Debug, Clone, Default)]
pub struct MemoryLockManager {
    held: Arc<Mutex<HashSet<LockKind>>>,
}

impl MemoryLockManager {
    pub fn new() -> Self {
        Self::default()
    }
}

fn table(held: &Mutex<HashSet<LockKind>>) -> MutexGuard<'_, HashSet<LockKind>> {
    held.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl LockManager for MemoryLockManager {
    type Guard = MemoryLockGuard;

    fn try_lock(&self, kind: LockKind) -> Result<Option<MemoryLockGuard>, LockError> {
        if table(&self.held).insert(kind) {
            Ok(Some(MemoryLockGuard {
                held: Arc::clone(&self.held),
                kind,
            }))
        } else {
            Ok(None)
        }
    }
}

#[derive(Debug)]
pub struct MemoryLockGuard {
    held: Arc<Mutex<HashSet<LockKind>>>,
    kind: LockKind,
}

impl Drop for MemoryLockGuard {
    fn drop(&mut self) {
        table(&self.held).remove(&self.kind);
    }
}
