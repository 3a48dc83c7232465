//! One run of the program: enqueue what is new, then either drain the queue
//! or leave it to the invocation that already holds the process lock.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{info, warn};
use tracing::info_span;

use crate::decrypt::{DecryptStep, Decryptor, GpgDecryptor};
use crate::error::{DecryptError, PgpdropError, Result};
use crate::lifecycle::LockSlot;
use crate::lock::{FsLockManager, LockKind, LockManager};
use crate::queue::{FileQueue, QueueStore, WorkItem};
use crate::worker::{DiscoveryScanner, DrainReport, Drainer, HandoffSettings, WorkerConfig};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Another invocation holds the process lock; this one only enqueued.
    EnqueueOnly { enqueued: usize },
    /// This invocation held the process lock and drained the queue.
    Drained { enqueued: usize, report: DrainReport },
}

impl RunOutcome {
    pub fn enqueued(&self) -> usize {
        match self {
            RunOutcome::EnqueueOnly { enqueued } | RunOutcome::Drained { enqueued, .. } => *enqueued,
        }
    }

    pub fn report(&self) -> Option<&DrainReport> {
        match self {
            RunOutcome::EnqueueOnly { .. } => None,
            RunOutcome::Drained { report, .. } => Some(report),
        }
    }
}

/// Read-only view for the `status` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueStatus {
    pub pending: Vec<WorkItem>,
    pub drainer_running: bool,
}

pub struct Invocation<Q: QueueStore, L: LockManager, D: Decryptor> {
    queue: Q,
    locks: Arc<L>,
    scanner: DiscoveryScanner,
    step: DecryptStep<D>,
    handoff: Option<HandoffSettings>,
    shutdown: Arc<AtomicBool>,
    slot: LockSlot<L::Guard>,
}

impl Invocation<FileQueue<FsLockManager>, FsLockManager, GpgDecryptor> {
    /// Production wiring: file-backed queue, `flock` locks, and gpg.
    pub fn from_worker_config(config: &WorkerConfig) -> Self {
        let locks = Arc::new(FsLockManager::new(
            config.queue_lock_path(),
            config.process_lock_path(),
        ));
        let queue = FileQueue::new(
            config.queue_path(),
            Arc::clone(&locks),
            config.queue_lock_timeout,
        );
        let scanner = DiscoveryScanner::new(
            &config.intake_directory,
            config.input_extensions.clone(),
            config.naming.clone(),
        );
        let step = DecryptStep::new(
            &config.intake_directory,
            config.naming.clone(),
            config.policy,
            config.archive_processed,
            config.gpg_decryptor(),
        );

        Self::new(queue, locks, scanner, step, config.handoff)
    }
}

impl<Q: QueueStore, L: LockManager, D: Decryptor> Invocation<Q, L, D> {
    pub fn new(
        queue: Q,
        locks: Arc<L>,
        scanner: DiscoveryScanner,
        step: DecryptStep<D>,
        handoff: Option<HandoffSettings>,
    ) -> Self {
        Self {
            queue,
            locks,
            scanner,
            step,
            handoff,
            shutdown: Arc::new(AtomicBool::new(false)),
            slot: LockSlot::new(),
        }
    }

    /// Shares the shutdown flag and process-lock slot with a signal handler.
    pub fn with_lifecycle(mut self, shutdown: Arc<AtomicBool>, slot: LockSlot<L::Guard>) -> Self {
        self.shutdown = shutdown;
        self.slot = slot;
        self
    }

    pub fn queue(&self) -> &Q {
        &self.queue
    }

    pub fn scanner(&self) -> &DiscoveryScanner {
        &self.scanner
    }

    /// Scans, enqueues, and drains if no other invocation is draining.
    ///
    /// After releasing the process lock the queue is checked once more: an
    /// invocation that enqueued just before the release saw the lock held
    /// and left, so nobody else would pick its items up.
    pub fn run_once(&self) -> Result<RunOutcome> {
        let _span = info_span!("invocation", pid = std::process::id()).entered();

        let enqueued = self.initial_scan();
        let mut attempted: HashSet<WorkItem> = HashSet::new();
        let mut report: Option<DrainReport> = None;

        loop {
            if self.shutdown.load(Ordering::Relaxed) {
                break;
            }

            let Some(guard) = self.locks.try_acquire_process_lock()? else {
                if report.is_none() {
                    info!(
                        "another instance is running; left {} new item(s) in the queue for it",
                        enqueued
                    );
                }
                break;
            };
            if report.is_none() {
                info!("process lock acquired by pid {}", std::process::id());
            } else {
                info!("process lock reacquired to settle late arrivals");
            }
            self.slot.hold(guard);

            let round = Drainer::new(
                &self.queue,
                &self.scanner,
                &self.step,
                self.handoff,
                &self.shutdown,
            )
            .drain_excluding(&mut attempted);

            self.slot.release();
            info!("process lock released");

            let progressed = round.attempted() > 0;
            let interrupted = round.interrupted;
            report.get_or_insert_with(DrainReport::default).merge(round);

            if interrupted || !progressed || !self.has_pending() {
                break;
            }
        }

        Ok(match report {
            Some(report) => RunOutcome::Drained { enqueued, report },
            None => RunOutcome::EnqueueOnly { enqueued },
        })
    }

    /// Puts named inputs back on the queue. Each must still exist in the
    /// intake directory.
    pub fn requeue(&self, names: &[String]) -> Result<usize> {
        let mut items = Vec::with_capacity(names.len());
        for name in names {
            let item = WorkItem::new(name.as_str())?;
            let input = self.step.input_path(&item);
            if !input.is_file() {
                return Err(PgpdropError::Decrypt(DecryptError::MissingInput(input)));
            }
            items.push(item);
        }

        let added = self.queue.enqueue_all_absent(&items)?;
        info!("Requeued {} of {} item(s)", added, items.len());
        Ok(added)
    }

    pub fn status(&self) -> Result<QueueStatus> {
        Ok(QueueStatus {
            pending: self.queue.pending()?,
            drainer_running: self.locks.is_held_elsewhere(LockKind::Process)?,
        })
    }

    fn initial_scan(&self) -> usize {
        match self.scanner.scan_and_enqueue(&self.queue) {
            Ok(added) => added,
            Err(crate::error::WorkerError::Queue(e)) if e.is_lock_timeout() => {
                warn!("queue lock timeout during scan, continuing: {}", e);
                0
            }
            Err(e) => {
                warn!("Scan failed, continuing with the existing queue: {}", e);
                0
            }
        }
    }

    fn has_pending(&self) -> bool {
        match self.queue.pending() {
            Ok(pending) => !pending.is_empty(),
            Err(e) => {
                warn!("Could not read queue after drain: {}", e);
                false
            }
        }
    }
}
