pub mod config;
pub mod drainer;
pub mod handoff;
pub mod scanner;

pub use config::{WorkerConfig, PROCESS_LOCK_FILE_NAME, QUEUE_FILE_NAME, QUEUE_LOCK_FILE_NAME};
pub use drainer::{DrainReport, Drainer};
pub use handoff::HandoffSettings;
pub use scanner::DiscoveryScanner;
