use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use walkdir::WalkDir;

use crate::decrypt::OutputNaming;
use crate::error::WorkerError;
use crate::queue::{QueueStore, WorkItem};

/// Finds encrypted inputs in the intake directory that have no output yet.
///
/// Completion is derived purely from the filesystem (the output artifact
/// exists), so a lost queue file heals on the next scan.
pub struct DiscoveryScanner {
    intake_directory: PathBuf,
    extensions: Vec<String>,
    naming: OutputNaming,
}

impl DiscoveryScanner {
    pub fn new<P: AsRef<Path>>(
        intake_directory: P,
        extensions: Vec<String>,
        naming: OutputNaming,
    ) -> Self {
        Self {
            intake_directory: intake_directory.as_ref().to_path_buf(),
            extensions,
            naming,
        }
    }

    pub fn intake_directory(&self) -> &Path {
        &self.intake_directory
    }

    /// Whether `path` carries one of the input extensions, in any letter case.
    pub fn is_input(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|ext| self.extensions.iter().any(|want| want.eq_ignore_ascii_case(ext)))
            .unwrap_or(false)
    }

    /// Lists pending inputs in filename order.
    pub fn discover(&self) -> Result<Vec<WorkItem>, WorkerError> {
        let mut items = Vec::new();

        for entry in WalkDir::new(&self.intake_directory)
            .min_depth(1)
            .max_depth(1) // The archive subdirectory is never rescanned
            .sort_by_file_name()
        {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if e.depth() == 0 => {
                    return Err(WorkerError::ScanFailed {
                        path: self.intake_directory.clone(),
                        source: e,
                    })
                }
                Err(e) => {
                    warn!("Skipping unreadable intake entry: {}", e);
                    continue;
                }
            };

            if !entry.file_type().is_file() || !self.is_input(entry.path()) {
                continue;
            }

            let Some(item) = WorkItem::from_path(entry.path()) else {
                warn!("Skipping input with unusable name: {}", entry.path().display());
                continue;
            };

            if self.naming.output_marks_completion() {
                let output = self.intake_directory.join(self.naming.output_name(&item));
                if output.exists() {
                    debug!("Already decrypted: {}", item);
                    continue;
                }
            }

            debug!("Found input: {}", item);
            items.push(item);
        }

        Ok(items)
    }

    /// Discovers pending inputs and enqueues the ones not already queued.
    /// Returns how many were added.
    pub fn scan_and_enqueue<Q: QueueStore + ?Sized>(&self, queue: &Q) -> Result<usize, WorkerError> {
        let found = self.discover()?;
        self.enqueue(queue, &found)
    }

    /// Enqueues `items` under a single queue-lock hold.
    pub fn enqueue<Q: QueueStore + ?Sized>(
        &self,
        queue: &Q,
        items: &[WorkItem],
    ) -> Result<usize, WorkerError> {
        if items.is_empty() {
            return Ok(0);
        }
        let added = queue.enqueue_all_absent(items)?;
        info!(
            "Scanned {} pending inputs in {}, enqueued {}",
            items.len(),
            self.intake_directory.display(),
            added
        );
        Ok(added)
    }
}
