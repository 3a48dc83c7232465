use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use crate::config::{Config, OutputConfig};
use crate::decrypt::{GpgDecryptor, OutputNaming, OutputPolicy};
use crate::error::ConfigError;
use crate::secrets::resolve_secret;
use crate::worker::handoff::HandoffSettings;

pub const QUEUE_FILE_NAME: &str = "queue";
pub const QUEUE_LOCK_FILE_NAME: &str = "queue.lock";
pub const PROCESS_LOCK_FILE_NAME: &str = "process.lock";

/// Settings resolved against the filesystem, ready for one invocation.
#[derive(Debug)]
pub struct WorkerConfig {
    pub base_directory: PathBuf,
    pub intake_directory: PathBuf,
    pub state_directory: PathBuf,
    pub log_directory: PathBuf,
    pub input_extensions: Vec<String>,
    pub naming: OutputNaming,
    pub handoff: Option<HandoffSettings>,
    pub archive_processed: bool,
    pub queue_lock_timeout: Duration,
    pub policy: OutputPolicy,
    pub gpg_program: String,
    pub gpg_extra_args: Vec<String>,
    pub gpg_homedir: PathBuf,
    pub passphrase: SecretString,
    pub ignore_mdc_error: bool,
}

impl WorkerConfig {
    /// Resolves paths and credentials. Required directories (base, intake,
    /// gpg homedir) must already exist; state and log directories are created.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let base_directory = PathBuf::from(&config.base_directory);
        require_directory(&base_directory)?;

        let intake_directory = resolve(&base_directory, &config.intake_directory);
        require_directory(&intake_directory)?;

        let gpg_homedir = resolve(&base_directory, &config.gpg.homedir);
        require_directory(&gpg_homedir)?;

        let state_directory = resolve(&base_directory, &config.state_directory);
        ensure_directory(&state_directory)?;

        let log_directory = resolve(&base_directory, &config.log_directory);
        ensure_directory(&log_directory)?;

        let passphrase = resolve_secret(
            config.gpg.passphrase.as_deref(),
            config.gpg.passphrase_file.as_deref(),
            config.gpg.passphrase_env_var.as_deref(),
        )?;

        let handoff = match &config.output {
            OutputConfig::PerItem { .. } => None,
            OutputConfig::Singleton {
                poll_interval_ms,
                max_wait_secs,
                ..
            } => Some(HandoffSettings {
                poll_interval: Duration::from_millis(*poll_interval_ms),
                max_wait: Duration::from_secs(*max_wait_secs),
            }),
        };

        Ok(Self {
            base_directory,
            intake_directory,
            state_directory,
            log_directory,
            input_extensions: config.input_extensions.clone(),
            naming: OutputNaming::from_config(&config.output),
            handoff,
            archive_processed: config.archive_processed,
            queue_lock_timeout: Duration::from_secs(config.queue_lock_timeout_secs),
            policy: OutputPolicy::from_config(&config.permissions)?,
            gpg_program: config.gpg.program.clone(),
            gpg_extra_args: config.gpg.extra_args.clone(),
            gpg_homedir,
            passphrase,
            ignore_mdc_error: config.gpg.ignore_mdc_error,
        })
    }

    pub fn queue_path(&self) -> PathBuf {
        self.state_directory.join(QUEUE_FILE_NAME)
    }

    pub fn queue_lock_path(&self) -> PathBuf {
        self.state_directory.join(QUEUE_LOCK_FILE_NAME)
    }

    pub fn process_lock_path(&self) -> PathBuf {
        self.state_directory.join(PROCESS_LOCK_FILE_NAME)
    }

    pub fn gpg_decryptor(&self) -> GpgDecryptor {
        GpgDecryptor::new(
            self.gpg_program.clone(),
            self.gpg_extra_args.clone(),
            self.gpg_homedir.clone(),
            SecretString::from(self.passphrase.expose_secret().to_string()),
            self.ignore_mdc_error,
        )
    }
}

fn resolve(base: &Path, path: &str) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

fn require_directory(path: &Path) -> Result<(), ConfigError> {
    if path.is_dir() {
        Ok(())
    } else {
        Err(ConfigError::MissingDirectory {
            path: path.to_path_buf(),
        })
    }
}

fn ensure_directory(path: &Path) -> Result<(), ConfigError> {
    std::fs::create_dir_all(path).map_err(|e| ConfigError::CreateDirectory {
        path: path.to_path_buf(),
        source: e,
    })
}
