pub mod config;
pub mod decrypt;
pub mod error;
pub mod invocation;
pub mod lifecycle;
pub mod lock;
pub mod queue;
pub mod sanitize;
pub mod secrets;
pub mod storage;
pub mod telemetry;
pub mod worker;

pub use config::{load_config, Config, OutputConfig};
pub use decrypt::{DecryptStep, Decryptor, GpgDecryptor, OutputNaming, OutputPolicy, StepOutcome};
pub use error::{
    ConfigError, DecryptError, HandoffError, LockError, PgpdropError, QueueError, Result,
    StorageError, WorkerError,
};
pub use invocation::{Invocation, QueueStatus, RunOutcome};
pub use lifecycle::{Lifecycle, LockSlot, EXIT_SIGNALLED};
pub use lock::{FileLockGuard, FsLockManager, LockKind, LockManager, MemoryLockManager};
pub use queue::{FileQueue, MemoryQueue, QueueStore, WorkItem};
pub use secrets::{resolve_secret, SecretError};
pub use worker::{DiscoveryScanner, DrainReport, Drainer, HandoffSettings, WorkerConfig};
