use std::collections::HashSet;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use tempfile::NamedTempFile;

use super::{QueueStore, WorkItem};
use crate::error::QueueError;
use crate::lock::LockManager;

/// Queue persisted as a UTF-8 text file, one filename per line.
///
/// Every mutation holds the queue lock for the whole read-modify-write and
/// replaces the file by writing a sibling temp file and renaming it over the
/// original, so readers never observe a partially written queue. A missing
/// file and an empty file both mean "no work".
pub struct FileQueue<L: LockManager> {
    path: PathBuf,
    locks: Arc<L>,
    lock_timeout: Duration,
}

impl<L: LockManager> FileQueue<L> {
    pub fn new<P: AsRef<Path>>(path: P, locks: Arc<L>, lock_timeout: Duration) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            locks,
            lock_timeout,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_items(&self) -> Result<Vec<WorkItem>, QueueError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(QueueError::Read {
                    path: self.path.clone(),
                    source: e,
                })
            }
        };

        let mut items = Vec::new();
        // Lines are taken verbatim: filenames may start or end with spaces.
        for line in content.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match WorkItem::new(line) {
                Ok(item) => items.push(item),
                Err(e) => warn!("Dropping unreadable queue entry: {}", e),
            }
        }
        Ok(items)
    }

    fn write_items(&self, items: &[WorkItem]) -> Result<(), QueueError> {
        let write_err = |e: io::Error| QueueError::Write {
            path: self.path.clone(),
            source: e,
        };

        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        let mut temp = NamedTempFile::new_in(dir).map_err(write_err)?;
        for item in items {
            writeln!(temp, "{}", item).map_err(write_err)?;
        }
        temp.as_file().sync_all().map_err(write_err)?;
        temp.persist(&self.path).map_err(|e| write_err(e.error))?;
        Ok(())
    }
}

impl<L: LockManager> QueueStore for FileQueue<L> {
    fn enqueue_if_absent(&self, item: &WorkItem) -> Result<bool, QueueError> {
        Ok(self.enqueue_all_absent(std::slice::from_ref(item))? == 1)
    }

    fn enqueue_all_absent(&self, items: &[WorkItem]) -> Result<usize, QueueError> {
        if items.is_empty() {
            return Ok(0);
        }

        let _guard = self.locks.acquire_queue_lock(self.lock_timeout)?;

        let mut queued = self.read_items()?;
        let mut seen: HashSet<WorkItem> = queued.iter().cloned().collect();
        let before = queued.len();

        for item in items {
            if seen.insert(item.clone()) {
                debug!("Enqueued {}", item);
                queued.push(item.clone());
            }
        }

        let added = queued.len() - before;
        if added > 0 {
            self.write_items(&queued)?;
        }
        Ok(added)
    }

    fn dequeue_one(&self) -> Result<Option<WorkItem>, QueueError> {
        let _guard = self.locks.acquire_queue_lock(self.lock_timeout)?;

        let mut queued = self.read_items()?;
        if queued.is_empty() {
            return Ok(None);
        }

        let head = queued.remove(0);
        self.write_items(&queued)?;
        debug!("Dequeued {} ({} remaining)", head, queued.len());
        Ok(Some(head))
    }

    fn pending(&self) -> Result<Vec<WorkItem>, QueueError> {
        // Renames are atomic, so an unlocked read sees a whole queue.
        self.read_items()
    }
}
