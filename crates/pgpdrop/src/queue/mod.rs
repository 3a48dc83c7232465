//! The durable FIFO of pending work items.

pub mod file;
pub mod item;
pub mod memory;

pub use file::FileQueue;
pub use item::WorkItem;
pub use memory::MemoryQueue;

use crate::error::QueueError;

/// Ordered, duplicate-free store of pending work items.
///
/// Every mutation is atomic with respect to other callers: two concurrent
/// `dequeue_one` calls never return the same item and concurrent enqueues
/// never lose or duplicate one.
pub trait QueueStore: Send + Sync {
    /// Appends `item` unless it is already queued. Returns whether it was added.
    fn enqueue_if_absent(&self, item: &WorkItem) -> Result<bool, QueueError>;

    /// Appends every item not already queued, in order. Returns how many were
    /// added.
    fn enqueue_all_absent(&self, items: &[WorkItem]) -> Result<usize, QueueError> {
        let mut added = 0;
        for item in items {
            if self.enqueue_if_absent(item)? {
                added += 1;
            }
        }
        Ok(added)
    }

    /// Removes and returns the head of the queue.
    fn dequeue_one(&self) -> Result<Option<WorkItem>, QueueError>;

    /// Snapshot of the queue in order.
    fn pending(&self) -> Result<Vec<WorkItem>, QueueError>;
}

impl<Q: QueueStore + ?Sized> QueueStore for std::sync::Arc<Q> {
    fn enqueue_if_absent(&self, item: &WorkItem) -> Result<bool, QueueError> {
        (**self).enqueue_if_absent(item)
    }

    fn enqueue_all_absent(&self, items: &[WorkItem]) -> Result<usize, QueueError> {
        (**self).enqueue_all_absent(items)
    }

    fn dequeue_one(&self) -> Result<Option<WorkItem>, QueueError> {
        (**self).dequeue_one()
    }

    fn pending(&self) -> Result<Vec<WorkItem>, QueueError> {
        (**self).pending()
    }
}
