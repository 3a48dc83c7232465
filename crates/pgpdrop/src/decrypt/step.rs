use std::io;
use std::path::{Path, PathBuf};

use log::{debug, warn};

use super::{Decryptor, OutputNaming, OutputPolicy};
use crate::error::DecryptError;
use crate::queue::WorkItem;
use crate::storage::InputArchive;

/// Suffix of the in-progress file the decryptor writes to. The full name is
/// `<output>.<pid>.partial`, so a decrypt left running by a killed drainer
/// never writes into the file a later drainer publishes.
pub const PARTIAL_SUFFIX: &str = ".partial";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Decrypted {
        output: PathBuf,
        archived: Option<PathBuf>,
    },
    /// The output was published but the input could not be archived and is
    /// still in the intake directory.
    Unarchived { output: PathBuf, reason: String },
    /// The output artifact already existed; nothing was run.
    AlreadyDone { output: PathBuf },
}

/// Decrypts one work item and publishes its output artifact.
pub struct DecryptStep<D: Decryptor> {
    intake_directory: PathBuf,
    naming: OutputNaming,
    policy: OutputPolicy,
    archive: Option<InputArchive>,
    decryptor: D,
}

impl<D: Decryptor> DecryptStep<D> {
    pub fn new<P: AsRef<Path>>(
        intake_directory: P,
        naming: OutputNaming,
        policy: OutputPolicy,
        archive_processed: bool,
        decryptor: D,
    ) -> Self {
        let intake_directory = intake_directory.as_ref().to_path_buf();
        let archive = archive_processed.then(|| InputArchive::new(&intake_directory));
        Self {
            intake_directory,
            naming,
            policy,
            archive,
            decryptor,
        }
    }

    pub fn input_path(&self, item: &WorkItem) -> PathBuf {
        self.intake_directory.join(item.as_str())
    }

    pub fn output_path(&self, item: &WorkItem) -> PathBuf {
        self.intake_directory.join(self.naming.output_name(item))
    }

    pub fn naming(&self) -> &OutputNaming {
        &self.naming
    }

    pub fn decryptor(&self) -> &D {
        &self.decryptor
    }

    pub fn run(&self, item: &WorkItem) -> Result<StepOutcome, DecryptError> {
        let input = self.input_path(item);
        if !input.is_file() {
            return Err(DecryptError::MissingInput(input));
        }

        let output = self.output_path(item);
        if self.naming.output_marks_completion() && output.exists() {
            return Ok(StepOutcome::AlreadyDone { output });
        }

        clear_stale_partials(&output);
        let partial = partial_path(&output, std::process::id());

        if let Err(e) = self.decryptor.decrypt(&input, &partial) {
            remove_if_present(&partial);
            return Err(e);
        }
        if !partial.is_file() {
            return Err(DecryptError::MissingOutput(partial));
        }

        if let Err(e) = self.policy.apply(&partial) {
            remove_if_present(&partial);
            return Err(e);
        }
        publish(&partial, &output)?;

        // The output is already visible, so an archive failure must not turn
        // into an item failure.
        let archived = match &self.archive {
            Some(archive) => match archive.archive(&input) {
                Ok(path) => Some(path),
                Err(e) => {
                    return Ok(StepOutcome::Unarchived {
                        output,
                        reason: e.to_string(),
                    })
                }
            },
            None => None,
        };

        Ok(StepOutcome::Decrypted { output, archived })
    }
}

fn partial_path(output: &Path, pid: u32) -> PathBuf {
    let mut name = output
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(format!(".{}{}", pid, PARTIAL_SUFFIX));
    output.with_file_name(name)
}

/// Removes in-progress files for `output` left by earlier invocations,
/// whatever pid they carry.
fn clear_stale_partials(output: &Path) {
    let (Some(dir), Some(name)) = (output.parent(), output.file_name().and_then(|n| n.to_str()))
    else {
        return;
    };
    let prefix = format!("{}.", name);

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Failed to list {} for stale partials: {}", dir.display(), e);
            return;
        }
    };
    for entry in entries.flatten() {
        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else {
            continue;
        };
        if file_name.starts_with(&prefix) && file_name.ends_with(PARTIAL_SUFFIX) {
            remove_if_present(&entry.path());
        }
    }
}

fn remove_if_present(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!("Removed stale {}", path.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
    }
}

/// Moves `partial` to `output` without ever replacing an existing artifact.
///
/// A hard link fails atomically when `output` exists; filesystems without
/// hard links fall back to a checked rename.
fn publish(partial: &Path, output: &Path) -> Result<(), DecryptError> {
    let publish_err = |e: io::Error| DecryptError::Publish {
        path: output.to_path_buf(),
        source: e,
    };

    match std::fs::hard_link(partial, output) {
        Ok(()) => {
            remove_if_present(partial);
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            remove_if_present(partial);
            Err(publish_err(e))
        }
        Err(e) => {
            debug!("Hard link unavailable ({}), renaming instead", e);
            if output.exists() {
                remove_if_present(partial);
                return Err(publish_err(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    "output artifact already exists",
                )));
            }
            std::fs::rename(partial, output).map_err(publish_err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Copies input to output and counts calls.
    #[derive(Default)]
    struct CopyDecryptor {
        calls: AtomicUsize,
    }

    impl Decryptor for CopyDecryptor {
        fn decrypt(&self, input: &Path, output: &Path) -> Result<(), DecryptError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::fs::copy(input, output).map_err(|e| DecryptError::Spawn {
                program: "copy".to_string(),
                source: e,
            })?;
            Ok(())
        }
    }

    /// Exits "successfully" without writing anything.
    struct SilentDecryptor;

    impl Decryptor for SilentDecryptor {
        fn decrypt(&self, _input: &Path, _output: &Path) -> Result<(), DecryptError> {
            Ok(())
        }
    }

    /// Writes partial output, then fails.
    struct FailingDecryptor;

    impl Decryptor for FailingDecryptor {
        fn decrypt(&self, _input: &Path, output: &Path) -> Result<(), DecryptError> {
            std::fs::write(output, b"half").unwrap();
            Err(DecryptError::ToolFailed {
                status: "exit status: 2".to_string(),
                stderr: "bad packet".to_string(),
            })
        }
    }

    fn per_item() -> OutputNaming {
        OutputNaming::PerItem {
            extension: "txt".to_string(),
        }
    }

    fn item(name: &str) -> WorkItem {
        WorkItem::new(name).unwrap()
    }

    #[test]
    fn test_decrypts_and_publishes_with_mode() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("a.pgp"), b"payload").unwrap();

        let step = DecryptStep::new(
            temp_dir.path(),
            per_item(),
            OutputPolicy::with_mode(0o600),
            false,
            CopyDecryptor::default(),
        );
        let outcome = step.run(&item("a.pgp")).unwrap();

        let output = temp_dir.path().join("a.txt");
        assert_eq!(
            outcome,
            StepOutcome::Decrypted {
                output: output.clone(),
                archived: None
            }
        );
        assert_eq!(std::fs::read(&output).unwrap(), b"payload");
        assert_eq!(
            std::fs::metadata(&output).unwrap().permissions().mode() & 0o777,
            0o600
        );
        assert!(partials_in(temp_dir.path()).is_empty());
        assert!(temp_dir.path().join("a.pgp").exists());
    }

    #[test]
    fn test_existing_output_skips_decryptor() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("a.pgp"), b"payload").unwrap();
        std::fs::write(temp_dir.path().join("a.txt"), b"earlier").unwrap();

        let step = DecryptStep::new(
            temp_dir.path(),
            per_item(),
            OutputPolicy::with_mode(0o640),
            false,
            CopyDecryptor::default(),
        );

        let outcome = step.run(&item("a.pgp")).unwrap();

        assert!(matches!(outcome, StepOutcome::AlreadyDone { .. }));
        assert_eq!(step.decryptor.calls.load(Ordering::SeqCst), 0);
        assert_eq!(std::fs::read(temp_dir.path().join("a.txt")).unwrap(), b"earlier");
    }

    #[test]
    fn test_missing_input_fails_item() {
        let temp_dir = TempDir::new().unwrap();
        let step = DecryptStep::new(
            temp_dir.path(),
            per_item(),
            OutputPolicy::with_mode(0o640),
            false,
            CopyDecryptor::default(),
        );

        let err = step.run(&item("vanished.pgp")).unwrap_err();
        assert!(matches!(err, DecryptError::MissingInput(_)));
    }

    #[test]
    fn test_tool_failure_cleans_partial() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("a.pgp"), b"payload").unwrap();

        let step = DecryptStep::new(
            temp_dir.path(),
            per_item(),
            OutputPolicy::with_mode(0o640),
            false,
            FailingDecryptor,
        );
        let err = step.run(&item("a.pgp")).unwrap_err();

        assert!(matches!(err, DecryptError::ToolFailed { .. }));
        assert!(!temp_dir.path().join("a.txt").exists());
        assert!(partials_in(temp_dir.path()).is_empty());
    }

    #[test]
    fn test_success_without_output_is_missing_output() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("a.pgp"), b"payload").unwrap();

        let step = DecryptStep::new(
            temp_dir.path(),
            per_item(),
            OutputPolicy::with_mode(0o640),
            false,
            SilentDecryptor,
        );

        assert!(matches!(
            step.run(&item("a.pgp")),
            Err(DecryptError::MissingOutput(_))
        ));
    }

    /// Records the path it was asked to write, then copies.
    #[derive(Default)]
    struct PathRecordingDecryptor {
        target: std::sync::Mutex<Option<PathBuf>>,
    }

    impl Decryptor for PathRecordingDecryptor {
        fn decrypt(&self, input: &Path, output: &Path) -> Result<(), DecryptError> {
            *self.target.lock().unwrap() = Some(output.to_path_buf());
            std::fs::copy(input, output).unwrap();
            Ok(())
        }
    }

    fn partials_in(dir: &Path) -> Vec<String> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .filter(|n| n.ends_with(PARTIAL_SUFFIX))
            .collect()
    }

    #[test]
    fn test_partial_name_carries_pid() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("a.pgp"), b"payload").unwrap();

        let step = DecryptStep::new(
            temp_dir.path(),
            per_item(),
            OutputPolicy::with_mode(0o640),
            false,
            PathRecordingDecryptor::default(),
        );
        step.run(&item("a.pgp")).unwrap();

        let target = step.decryptor.target.lock().unwrap().clone().unwrap();
        assert_eq!(
            target,
            temp_dir
                .path()
                .join(format!("a.txt.{}.partial", std::process::id()))
        );
        assert!(partials_in(temp_dir.path()).is_empty());
    }

    #[test]
    fn test_late_write_from_orphaned_decrypt_does_not_reach_output() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("a.pgp"), b"fresh").unwrap();
        let orphan_partial = temp_dir.path().join("a.txt.4194303.partial");
        std::fs::write(&orphan_partial, b"orphan-early").unwrap();

        let step = DecryptStep::new(
            temp_dir.path(),
            per_item(),
            OutputPolicy::with_mode(0o640),
            false,
            CopyDecryptor::default(),
        );
        step.run(&item("a.pgp")).unwrap();

        // A decrypt left behind by a killed drainer finishes after the new
        // run published.
        std::fs::write(&orphan_partial, b"orphan-late").unwrap();

        assert_eq!(std::fs::read(temp_dir.path().join("a.txt")).unwrap(), b"fresh");
    }

    #[test]
    fn test_stale_partials_are_cleared_only_for_their_output() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("a.pgp"), b"fresh").unwrap();
        std::fs::write(temp_dir.path().join("a.txt.partial"), b"old").unwrap();
        std::fs::write(temp_dir.path().join("a.txt.12345.partial"), b"old").unwrap();
        std::fs::write(temp_dir.path().join("b.txt.12345.partial"), b"other").unwrap();

        let step = DecryptStep::new(
            temp_dir.path(),
            per_item(),
            OutputPolicy::with_mode(0o640),
            false,
            CopyDecryptor::default(),
        );
        step.run(&item("a.pgp")).unwrap();

        assert_eq!(partials_in(temp_dir.path()), vec!["b.txt.12345.partial"]);
    }

    #[test]
    fn test_archive_failure_after_publish_is_not_a_decrypt_failure() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("a.pgp"), b"payload").unwrap();
        // A plain file where the archive directory should be.
        std::fs::write(temp_dir.path().join("processed"), b"").unwrap();

        let step = DecryptStep::new(
            temp_dir.path(),
            OutputNaming::Singleton {
                filename: "latest.csv".to_string(),
            },
            OutputPolicy::with_mode(0o640),
            true,
            CopyDecryptor::default(),
        );

        match step.run(&item("a.pgp")).unwrap() {
            StepOutcome::Unarchived { output, reason } => {
                assert_eq!(output, temp_dir.path().join("latest.csv"));
                assert!(reason.contains("move"), "{}", reason);
            }
            other => panic!("Expected Unarchived, got {:?}", other),
        }
        assert_eq!(std::fs::read(temp_dir.path().join("latest.csv")).unwrap(), b"payload");
        assert!(temp_dir.path().join("a.pgp").exists());
    }

    #[test]
    fn test_stale_partial_is_replaced() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("a.pgp"), b"fresh").unwrap();
        std::fs::write(temp_dir.path().join("a.txt.partial"), b"stale").unwrap();

        let step = DecryptStep::new(
            temp_dir.path(),
            per_item(),
            OutputPolicy::with_mode(0o640),
            false,
            CopyDecryptor::default(),
        );
        step.run(&item("a.pgp")).unwrap();

        assert_eq!(std::fs::read(temp_dir.path().join("a.txt")).unwrap(), b"fresh");
    }

    #[test]
    fn test_singleton_archives_input_and_refuses_to_clobber() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("a.pgp"), b"first").unwrap();
        std::fs::write(temp_dir.path().join("b.pgp"), b"second").unwrap();

        let step = DecryptStep::new(
            temp_dir.path(),
            OutputNaming::Singleton {
                filename: "latest.csv".to_string(),
            },
            OutputPolicy::with_mode(0o640),
            true,
            CopyDecryptor::default(),
        );

        match step.run(&item("a.pgp")).unwrap() {
            StepOutcome::Decrypted { output, archived } => {
                assert_eq!(output, temp_dir.path().join("latest.csv"));
                assert!(archived.unwrap().exists());
            }
            other => panic!("Expected Decrypted, got {:?}", other),
        }
        assert!(!temp_dir.path().join("a.pgp").exists());

        // The consumer has not picked up latest.csv yet.
        let err = step.run(&item("b.pgp")).unwrap_err();
        assert!(matches!(err, DecryptError::Publish { .. }));
        assert_eq!(
            std::fs::read(temp_dir.path().join("latest.csv")).unwrap(),
            b"first"
        );
        assert!(partials_in(temp_dir.path()).is_empty());
    }
}
