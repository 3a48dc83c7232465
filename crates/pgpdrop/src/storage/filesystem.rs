use std::path::{Path, PathBuf};

use chrono::{Datelike, Local};

use crate::error::StorageError;

/// Subdirectory of the intake directory that receives consumed inputs.
pub const ARCHIVE_DIR_NAME: &str = "processed";

/// Move a file from `src` to `dst`. Uses `rename` first (atomic on the same
/// filesystem) and falls back to copy + delete for cross-device moves.
pub fn move_file(src: &Path, dst: &Path) -> Result<(), StorageError> {
    if std::fs::rename(src, dst).is_ok() {
        return Ok(());
    }

    std::fs::copy(src, dst).map_err(|e| StorageError::MoveFile {
        from: src.to_path_buf(),
        to: dst.to_path_buf(),
        source: e,
    })?;
    std::fs::remove_file(src).map_err(|e| StorageError::MoveFile {
        from: src.to_path_buf(),
        to: dst.to_path_buf(),
        source: e,
    })?;
    Ok(())
}

/// Moves decrypted inputs out of the scanned top level of the intake
/// directory.
pub struct InputArchive {
    archive_directory: PathBuf,
}

impl InputArchive {
    pub fn new<P: AsRef<Path>>(intake_directory: P) -> Self {
        Self {
            archive_directory: intake_directory.as_ref().join(ARCHIVE_DIR_NAME),
        }
    }

    pub fn archive_directory(&self) -> &Path {
        &self.archive_directory
    }

    /// Archives `source_path` as `<YYYY-MM-DD>_<name>`, numbering on conflict.
    pub fn archive<P: AsRef<Path>>(&self, source_path: P) -> Result<PathBuf, StorageError> {
        let source_path = source_path.as_ref();
        self.ensure_directory()?;

        let now = Local::now();
        let date_prefix = format!("{:04}-{:02}-{:02}", now.year(), now.month(), now.day());

        let original_name = source_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("input");

        let archive_filename = format!("{}_{}", date_prefix, original_name);
        let archive_path = self.resolve_conflict(&archive_filename)?;

        move_file(source_path, &archive_path)?;

        Ok(archive_path)
    }

    fn ensure_directory(&self) -> Result<(), StorageError> {
        if !self.archive_directory.exists() {
            std::fs::create_dir_all(&self.archive_directory).map_err(|e| {
                StorageError::CreateDirectory {
                    path: self.archive_directory.clone(),
                    source: e,
                }
            })?;
        }
        Ok(())
    }

    /// Finds a free name, appending `_2`, `_3`, ... before the extension.
    fn resolve_conflict(&self, filename: &str) -> Result<PathBuf, StorageError> {
        let path = self.archive_directory.join(filename);

        // symlink_metadata also sees broken symlinks
        if std::fs::symlink_metadata(&path).is_err() {
            return Ok(path);
        }

        let (base, ext) = match filename.rfind('.') {
            Some(dot_pos) => (&filename[..dot_pos], Some(&filename[dot_pos..])),
            None => (filename, None),
        };

        for counter in 2..=1000 {
            let new_filename = match ext {
                Some(ext) => format!("{}_{}{}", base, counter, ext),
                None => format!("{}_{}", base, counter),
            };

            let new_path = self.archive_directory.join(&new_filename);
            if std::fs::symlink_metadata(&new_path).is_err() {
                return Ok(new_path);
            }
        }

        Err(StorageError::FileExists(path))
    }
}
