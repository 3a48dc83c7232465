use std::fs::{File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use log::{debug, warn};

use super::{LockKind, LockManager};
use crate::error::LockError;

/// Kernel-mediated locks on two lock files.
///
/// Lock files are opened (and created) on every attempt and never deleted:
/// removing the file while another process waits on the old inode would give
/// two holders different locks.
#[derive(Debug, Clone)]
pub struct FsLockManager {
    queue_lock_path: PathBuf,
    process_lock_path: PathBuf,
}

impl FsLockManager {
    pub fn new<Q: AsRef<Path>, P: AsRef<Path>>(queue_lock_path: Q, process_lock_path: P) -> Self {
        Self {
            queue_lock_path: queue_lock_path.as_ref().to_path_buf(),
            process_lock_path: process_lock_path.as_ref().to_path_buf(),
        }
    }

    pub fn path_for(&self, kind: LockKind) -> &Path {
        match kind {
            LockKind::Queue => &self.queue_lock_path,
            LockKind::Process => &self.process_lock_path,
        }
    }
}

impl FsLockManager {
    /// Takes the lock without waiting. Only a real acquisition of the
    /// process lock writes the owner pid; a status check leaves it alone.
    fn lock_file(
        &self,
        kind: LockKind,
        record_owner: bool,
    ) -> Result<Option<FileLockGuard>, LockError> {
        let path = self.path_for(kind);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| LockError::Open {
                kind,
                path: path.to_path_buf(),
                source: e,
            })?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                let mut guard = FileLockGuard {
                    file,
                    kind,
                    path: path.to_path_buf(),
                };
                if record_owner && kind == LockKind::Process {
                    guard.record_owner();
                }
                Ok(Some(guard))
            }
            Err(e) if is_contended(&e) => Ok(None),
            Err(e) => Err(LockError::Lock {
                kind,
                path: path.to_path_buf(),
                source: e,
            }),
        }
    }
}

impl LockManager for FsLockManager {
    type Guard = FileLockGuard;

    fn try_lock(&self, kind: LockKind) -> Result<Option<FileLockGuard>, LockError> {
        self.lock_file(kind, true)
    }

    fn is_held_elsewhere(&self, kind: LockKind) -> Result<bool, LockError> {
        Ok(self.lock_file(kind, false)?.is_none())
    }
}

fn is_contended(error: &io::Error) -> bool {
    error.kind() == io::ErrorKind::WouldBlock
        || error.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

/// Holds an exclusive `flock` until dropped. Process death closes the
/// descriptor, which releases the lock even on SIGKILL.
#[derive(Debug)]
pub struct FileLockGuard {
    file: File,
    kind: LockKind,
    path: PathBuf,
}

impl FileLockGuard {
    pub fn kind(&self) -> LockKind {
        self.kind
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes the holder's pid for operators. Content is never read for
    /// correctness.
    fn record_owner(&mut self) {
        let _ = self.file.set_len(0);
        let _ = self.file.seek(SeekFrom::Start(0));
        let _ = writeln!(self.file, "pid={}", std::process::id());
        let _ = self.file.flush();
    }
}

impl Drop for FileLockGuard {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            // Closing the descriptor below still releases it.
            warn!("Failed to unlock {} lock {}: {}", self.kind, self.path.display(), e);
        } else {
            debug!("Released {} lock {}", self.kind, self.path.display());
        }
    }
}
