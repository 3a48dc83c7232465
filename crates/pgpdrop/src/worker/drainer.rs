use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{error, info, warn};
use tracing::info_span;

use crate::decrypt::{DecryptStep, Decryptor, StepOutcome};
use crate::error::DecryptError;
use crate::queue::{QueueStore, WorkItem};
use crate::worker::handoff::HandoffSettings;
use crate::worker::scanner::DiscoveryScanner;

/// What one drain did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DrainReport {
    pub completed: Vec<WorkItem>,
    pub skipped: Vec<WorkItem>,
    pub failed: Vec<(WorkItem, String)>,
    /// Decrypted and published, but the input could not be archived. Also
    /// counted in `completed`.
    pub unarchived: Vec<(WorkItem, String)>,
    /// Set when the drain stopped because shutdown was requested.
    pub interrupted: bool,
}

impl DrainReport {
    pub fn attempted(&self) -> usize {
        self.completed.len() + self.skipped.len() + self.failed.len()
    }

    pub fn merge(&mut self, other: DrainReport) {
        self.completed.extend(other.completed);
        self.skipped.extend(other.skipped);
        self.failed.extend(other.failed);
        self.unarchived.extend(other.unarchived);
        self.interrupted |= other.interrupted;
    }
}

/// The worker loop run by the process-lock holder: dequeue one item, decrypt
/// it, repeat until the queue is empty.
///
/// Per-item failures are logged and never stop the loop. Items are removed
/// from the queue before processing, so a failed item is not retried within
/// this drain.
pub struct Drainer<'a, Q: QueueStore + ?Sized, D: Decryptor> {
    queue: &'a Q,
    scanner: &'a DiscoveryScanner,
    step: &'a DecryptStep<D>,
    handoff: Option<HandoffSettings>,
    shutdown: &'a AtomicBool,
}

impl<'a, Q: QueueStore + ?Sized, D: Decryptor> Drainer<'a, Q, D> {
    pub fn new(
        queue: &'a Q,
        scanner: &'a DiscoveryScanner,
        step: &'a DecryptStep<D>,
        handoff: Option<HandoffSettings>,
        shutdown: &'a AtomicBool,
    ) -> Self {
        Self {
            queue,
            scanner,
            step,
            handoff,
            shutdown,
        }
    }

    pub fn drain(&self) -> DrainReport {
        self.drain_excluding(&mut HashSet::new())
    }

    /// Like [`drain`](Self::drain), but rescans never re-enqueue anything in
    /// `attempted`, and every item taken from the queue is added to it.
    pub fn drain_excluding(&self, attempted: &mut HashSet<WorkItem>) -> DrainReport {
        let mut report = DrainReport::default();

        loop {
            if self.shutdown.load(Ordering::Relaxed) {
                warn!("Shutdown requested, stopping drain");
                report.interrupted = true;
                break;
            }

            let item = match self.queue.dequeue_one() {
                Ok(Some(item)) => item,
                Ok(None) => {
                    if self.rescan(attempted) {
                        continue;
                    }
                    break;
                }
                Err(e) if e.is_lock_timeout() => {
                    // Treat as empty for now; the next invocation's scan retries.
                    warn!("queue lock timeout while dequeuing, ending drain: {}", e);
                    break;
                }
                Err(e) => {
                    error!("Failed to dequeue: {}", e);
                    break;
                }
            };

            attempted.insert(item.clone());
            self.process(item, &mut report);
        }

        info!(
            "Drain finished: {} completed, {} skipped, {} failed",
            report.completed.len(),
            report.skipped.len(),
            report.failed.len()
        );
        report
    }

    /// Picks up files that arrived during the drain. Items already attempted
    /// in this drain are left for the next invocation so a poison input can
    /// never loop.
    fn rescan(&self, attempted: &HashSet<WorkItem>) -> bool {
        let fresh: Vec<WorkItem> = match self.scanner.discover() {
            Ok(found) => found
                .into_iter()
                .filter(|item| !attempted.contains(item))
                .collect(),
            Err(e) => {
                warn!("Rescan failed: {}", e);
                return false;
            }
        };

        match self.scanner.enqueue(self.queue, &fresh) {
            Ok(added) => added > 0,
            Err(e) => {
                warn!("Failed to enqueue rescanned inputs: {}", e);
                false
            }
        }
    }

    fn process(&self, item: WorkItem, report: &mut DrainReport) {
        let _span = info_span!("decrypt", item = %item).entered();

        if let Some(handoff) = &self.handoff {
            let output = self.step.output_path(&item);
            if let Err(e) = handoff.wait_for_consumption(&output, self.shutdown) {
                let err = DecryptError::from(e);
                error!("decrypt failed: {}: {}", item, err);
                report.failed.push((item, err.to_string()));
                return;
            }
        }

        match self.step.run(&item) {
            Ok(StepOutcome::Decrypted { output, archived }) => {
                info!(
                    "decrypt completed: {} -> {}",
                    item,
                    crate::sanitize::redact_path(&output)
                );
                if let Some(archived) = archived {
                    info!("Archived {} as {}", item, archived.display());
                }
                report.completed.push(item);
            }
            Ok(StepOutcome::Unarchived { output, reason }) => {
                info!(
                    "decrypt completed: {} -> {}",
                    item,
                    crate::sanitize::redact_path(&output)
                );
                warn!(
                    "Failed to archive {}, it stays in the intake directory and will be decrypted again unless moved: {}",
                    item, reason
                );
                report.unarchived.push((item.clone(), reason));
                report.completed.push(item);
            }
            Ok(StepOutcome::AlreadyDone { output }) => {
                info!(
                    "Skipping {}: {} already exists",
                    item,
                    crate::sanitize::redact_path(&output)
                );
                report.skipped.push(item);
            }
            Err(e) => {
                error!("decrypt failed: {}: {}", item, e);
                report.failed.push((item, e.to_string()));
            }
        }
    }
}
