use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use super::{QueueStore, WorkItem};
use crate::error::QueueError;

/// Volatile queue for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryQueue {
    items: Mutex<VecDeque<WorkItem>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn items(&self) -> MutexGuard<'_, VecDeque<WorkItem>> {
        self.items
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl QueueStore for MemoryQueue {
    fn enqueue_if_absent(&self, item: &WorkItem) -> Result<bool, QueueError> {
        let mut items = self.items();
        if items.contains(item) {
            return Ok(false);
        }
        items.push_back(item.clone());
        Ok(true)
    }

    fn dequeue_one(&self) -> Result<Option<WorkItem>, QueueError> {
        Ok(self.items().pop_front())
    }

    fn pending(&self) -> Result<Vec<WorkItem>, QueueError> {
        Ok(self.items().iter().cloned().collect())
    }
}
