use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    pub base_directory: String,
    #[serde(default = "default_intake_directory")]
    pub intake_directory: String,
    #[serde(default = "default_state_directory")]
    pub state_directory: String,
    #[serde(default = "default_log_directory")]
    pub log_directory: String,
    #[serde(default = "default_input_extensions")]
    pub input_extensions: Vec<String>,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub archive_processed: bool,
    #[serde(default = "default_queue_lock_timeout_secs")]
    pub queue_lock_timeout_secs: u64,
    pub gpg: GpgConfig,
    #[serde(default)]
    pub permissions: PermissionsConfig,
}

fn default_intake_directory() -> String {
    "incoming".to_string()
}

fn default_state_directory() -> String {
    ".pgpdrop".to_string()
}

fn default_log_directory() -> String {
    "logs".to_string()
}

fn default_input_extensions() -> Vec<String> {
    vec!["pgp".to_string(), "gpg".to_string()]
}

fn default_queue_lock_timeout_secs() -> u64 {
    5
}

/// How output artifact names are derived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum OutputConfig {
    /// `<stem>.<extension>` next to each input.
    PerItem {
        #[serde(default = "default_output_extension")]
        extension: String,
    },
    /// One fixed filename shared by every item, removed by a downstream
    /// consumer between items.
    Singleton {
        filename: String,
        #[serde(default = "default_poll_interval_ms")]
        poll_interval_ms: u64,
        #[serde(default = "default_max_wait_secs")]
        max_wait_secs: u64,
    },
}

fn default_output_extension() -> String {
    "txt".to_string()
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_max_wait_secs() -> u64 {
    300
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig::PerItem {
            extension: default_output_extension(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GpgConfig {
    #[serde(default = "default_gpg_program")]
    pub program: String,
    /// Arguments placed before the gpg flags, e.g. a wrapper script path.
    #[serde(default)]
    pub extra_args: Vec<String>,
    pub homedir: String,
    #[serde(default)]
    pub passphrase: Option<String>,
    #[serde(default)]
    pub passphrase_file: Option<String>,
    #[serde(default)]
    pub passphrase_env_var: Option<String>,
    #[serde(default = "default_true")]
    pub ignore_mdc_error: bool,
}

fn default_gpg_program() -> String {
    "gpg".to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionsConfig {
    /// Octal mode string, e.g. `"640"`.
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub group: Option<String>,
}

fn default_mode() -> String {
    "640".to_string()
}

impl Default for PermissionsConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            owner: None,
            group: None,
        }
    }
}

impl PermissionsConfig {
    /// Parses the octal mode string.
    pub fn parse_mode(&self) -> Option<u32> {
        u32::from_str_radix(self.mode.trim_start_matches("0o"), 8)
            .ok()
            .filter(|mode| *mode <= 0o7777)
    }
}
