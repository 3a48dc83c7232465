//! Test harness for isolated end-to-end runs.
//!
//! The fake decryptor is a shell script invoked as `/bin/sh <script> <delay>
//! <completions> <gpg flags...>`. It copies the input to `--output` after
//! sleeping `<delay>` seconds, appends the input name to the completions
//! file, and fails for any input whose name contains "fail".

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::Command;
use std::thread;
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use tempfile::TempDir;

use pgpdrop::config::load_config;
use pgpdrop::worker::WorkerConfig;

const FAKE_GPG: &str = r#"#!/bin/sh
delay="$1"
completions="$2"
shift 2
out=""
in=""
while [ $# -gt 0 ]; do
    case "$1" in
        --output) out="$2"; shift 2 ;;
        --decrypt) in="$2"; shift 2 ;;
        *) shift ;;
    esac
done
cat > /dev/null
case "$(basename "$in")" in
    *fail*) echo "gpg: decryption failed: Bad session key" >&2; exit 2 ;;
esac
sleep "$delay"
cp "$in" "$out" || exit 1
basename "$in" >> "$completions"
"#;

pub struct TestHarness {
    temp_dir: TempDir,
    pub base_dir: PathBuf,
    pub intake_dir: PathBuf,
    pub gnupg_dir: PathBuf,
    pub config_path: PathBuf,
    pub completions_path: PathBuf,
    script_path: PathBuf,
}

impl TestHarness {
    /// Per-item output mode, decryptor delay of zero.
    pub fn new() -> Self {
        Self::with_delay(0.0)
    }

    pub fn with_delay(delay_secs: f64) -> Self {
        let harness = Self::layout();
        harness.write_config(harness.config_json(delay_secs, None));
        harness
    }

    /// Writes the config with `extra` merged over the defaults.
    pub fn with_overrides(delay_secs: f64, extra: Value) -> Self {
        let harness = Self::layout();
        harness.write_config(harness.config_json(delay_secs, Some(extra)));
        harness
    }

    fn layout() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let base_dir = temp_dir.path().to_path_buf();
        let intake_dir = base_dir.join("incoming");
        let gnupg_dir = base_dir.join("gnupg");
        std::fs::create_dir_all(&intake_dir).expect("Failed to create intake dir");
        std::fs::create_dir_all(&gnupg_dir).expect("Failed to create gnupg dir");

        let script_path = base_dir.join("fake-gpg.sh");
        std::fs::write(&script_path, FAKE_GPG).expect("Failed to write fake gpg");

        Self {
            config_path: base_dir.join("config.json"),
            completions_path: base_dir.join("completions"),
            temp_dir,
            base_dir,
            intake_dir,
            gnupg_dir,
            script_path,
        }
    }

    fn config_json(&self, delay_secs: f64, extra: Option<Value>) -> Value {
        let mut config = json!({
            "version": "1.0",
            "base_directory": self.base_dir,
            "gpg": {
                "program": "/bin/sh",
                "extra_args": [
                    self.script_path,
                    format!("{}", delay_secs),
                    self.completions_path,
                ],
                "homedir": "gnupg",
                "passphrase": "correct horse"
            },
            "permissions": { "mode": "600" }
        });
        if let (Some(Value::Object(extra)), Value::Object(target)) = (extra, &mut config) {
            for (key, value) in extra {
                target.insert(key, value);
            }
        }
        config
    }

    fn write_config(&self, config: Value) {
        let content = serde_json::to_string_pretty(&config).expect("Failed to serialize config");
        std::fs::write(&self.config_path, content).expect("Failed to write config");
    }

    pub fn worker_config(&self) -> WorkerConfig {
        let config = load_config(&self.config_path).expect("Failed to load config");
        WorkerConfig::from_config(&config).expect("Failed to resolve config")
    }

    pub fn write_input(&self, filename: &str, content: &[u8]) -> PathBuf {
        let path = self.intake_dir.join(filename);
        std::fs::write(&path, content).expect("Failed to write input file");
        path
    }

    /// Drops `count` inputs named `item-00.pgp`, `item-01.pgp`, ...
    pub fn seed_inputs(&self, count: usize) -> Vec<String> {
        (0..count)
            .map(|i| {
                let name = format!("item-{:02}.pgp", i);
                self.write_input(&name, format!("cleartext {}", i).as_bytes());
                name
            })
            .collect()
    }

    pub fn output_path(&self, filename: &str) -> PathBuf {
        self.intake_dir.join(filename)
    }

    pub fn queue_path(&self) -> PathBuf {
        self.base_dir.join(".pgpdrop").join("queue")
    }

    /// Queue file lines; a missing file reads as empty.
    pub fn queue_lines(&self) -> Vec<String> {
        match std::fs::read_to_string(self.queue_path()) {
            Ok(content) => content
                .lines()
                .filter(|l| !l.trim().is_empty())
                .map(str::to_string)
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    pub fn completions(&self) -> Vec<String> {
        std::fs::read_to_string(&self.completions_path)
            .map(|c| c.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }

    pub fn log_files(&self) -> Vec<PathBuf> {
        let dir = self.base_dir.join("logs");
        let mut files: Vec<PathBuf> = match std::fs::read_dir(&dir) {
            Ok(entries) => entries.filter_map(|e| e.ok()).map(|e| e.path()).collect(),
            Err(_) => Vec::new(),
        };
        files.sort();
        files
    }

    pub fn read_logs(&self) -> Vec<String> {
        self.log_files()
            .iter()
            .map(|p| std::fs::read_to_string(p).unwrap_or_default())
            .collect()
    }

    /// Number of log lines, across every invocation, containing `phrase`.
    pub fn count_log_lines(&self, phrase: &str) -> usize {
        self.read_logs()
            .iter()
            .map(|log| log.lines().filter(|l| l.contains(phrase)).count())
            .sum()
    }

    /// Number of invocation logs containing `phrase` at least once.
    pub fn count_logs_containing(&self, phrase: &str) -> usize {
        self.read_logs().iter().filter(|log| log.contains(phrase)).count()
    }

    /// `pgpdrop` binary pointed at this harness's config.
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_pgpdrop"));
        cmd.arg("--config").arg(&self.config_path);
        cmd.env_remove("RUST_LOG");
        cmd
    }

    /// Polls until `check` passes or `timeout` elapses.
    pub fn wait_until(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
        let started = Instant::now();
        while started.elapsed() < timeout {
            if check() {
                return true;
            }
            thread::sleep(Duration::from_millis(20));
        }
        check()
    }

    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }
}
