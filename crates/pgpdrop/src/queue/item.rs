use std::fmt;
use std::path::Path;

use crate::error::QueueError;

/// One pending unit of work: the bare filename of an input inside the intake
/// directory. The filename is also the dedup key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkItem(String);

impl WorkItem {
    pub fn new(name: impl Into<String>) -> Result<Self, QueueError> {
        let name = name.into();
        if name.is_empty()
            || name == "."
            || name == ".."
            || name.contains('/')
            || name.contains('\n')
            || name.contains('\r')
            || name.contains('\0')
        {
            return Err(QueueError::InvalidItem(name));
        }
        Ok(Self(name))
    }

    /// Builds an item from the final component of `path`.
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?;
        Self::new(name).ok()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Filename without its last extension.
    pub fn stem(&self) -> &str {
        Path::new(&self.0)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&self.0)
    }
}

impl fmt::Display for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for WorkItem {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
