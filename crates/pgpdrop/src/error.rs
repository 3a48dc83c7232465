use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::lock::LockKind;

#[derive(Error, Debug)]
pub enum PgpdropError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Lock error: {0}")]
    Lock(#[from] LockError),

    #[error("Decrypt error: {0}")]
    Decrypt(#[from] DecryptError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    #[error("Logging setup failed: {0}")]
    Telemetry(String),

    #[error("Failed to install signal handlers: {0}")]
    Signal(#[from] ctrlc::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Required directory '{path}' does not exist")]
    MissingDirectory { path: PathBuf },

    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to resolve passphrase: {0}")]
    Secret(#[from] crate::secrets::SecretError),
}

#[derive(Error, Debug)]
pub enum LockError {
    #[error("Failed to open {kind} lock file '{path}': {source}")]
    Open {
        kind: LockKind,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to lock {kind} lock file '{path}': {source}")]
    Lock {
        kind: LockKind,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Timed out after {waited:?} waiting for the {kind} lock")]
    Timeout { kind: LockKind, waited: Duration },
}

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Queue lock timeout: {0}")]
    LockTimeout(LockError),

    #[error("Queue lock unavailable: {0}")]
    Lock(LockError),

    #[error("Failed to read queue file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write queue file '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid work item '{0}': must be a bare filename")]
    InvalidItem(String),
}

impl From<LockError> for QueueError {
    fn from(err: LockError) -> Self {
        match err {
            LockError::Timeout { .. } => QueueError::LockTimeout(err),
            other => QueueError::Lock(other),
        }
    }
}

impl QueueError {
    /// True when the queue lock could not be taken within its bounded wait.
    pub fn is_lock_timeout(&self) -> bool {
        matches!(self, QueueError::LockTimeout(_))
    }
}

#[derive(Error, Debug)]
pub enum HandoffError {
    #[error("Output '{path}' was not consumed within {waited:?}")]
    Timeout { path: PathBuf, waited: Duration },

    #[error("Wait for consumption of '{path}' was cancelled")]
    Cancelled { path: PathBuf },
}

#[derive(Error, Debug)]
pub enum DecryptError {
    #[error("Input file '{0}' no longer exists")]
    MissingInput(PathBuf),

    #[error("Failed to launch decryptor '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Decryptor exited with {status}: {stderr}")]
    ToolFailed { status: String, stderr: String },

    #[error("Decryptor reported success but '{0}' was not written")]
    MissingOutput(PathBuf),

    #[error("Failed to set permissions on '{path}': {source}")]
    Permissions {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to change ownership of '{path}': {source}")]
    Ownership {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to publish output '{path}': {source}")]
    Publish {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to archive input: {0}")]
    Archive(#[from] StorageError),

    #[error(transparent)]
    Handoff(#[from] HandoffError),
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Directory scan failed for '{path}': {source}")]
    ScanFailed {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error(transparent)]
    Queue(#[from] QueueError),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to move file from '{from}' to '{to}': {source}")]
    MoveFile {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("File already exists: {0}")]
    FileExists(PathBuf),
}

pub type Result<T> = std::result::Result<T, PgpdropError>;
