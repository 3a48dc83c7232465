use std::ffi::OsString;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use log::debug;
use secrecy::{ExposeSecret, SecretString};

use super::Decryptor;
use crate::error::DecryptError;
use crate::sanitize::summarize_output;

const STDERR_SUMMARY_CHARS: usize = 400;

/// Runs GnuPG (or a compatible wrapper) as the decryption collaborator.
///
/// The passphrase goes over stdin (`--passphrase-fd 0`) so it never shows up
/// in the process table.
#[derive(Debug)]
pub struct GpgDecryptor {
    program: String,
    extra_args: Vec<String>,
    homedir: PathBuf,
    passphrase: SecretString,
    ignore_mdc_error: bool,
}

impl GpgDecryptor {
    pub fn new(
        program: impl Into<String>,
        extra_args: Vec<String>,
        homedir: impl Into<PathBuf>,
        passphrase: SecretString,
        ignore_mdc_error: bool,
    ) -> Self {
        Self {
            program: program.into(),
            extra_args,
            homedir: homedir.into(),
            passphrase,
            ignore_mdc_error,
        }
    }

    /// Full argument list for one decryption, wrapper arguments first.
    pub fn args(&self, input: &Path, output: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = self.extra_args.iter().map(OsString::from).collect();
        args.extend(
            [
                "--batch",
                "--yes",
                "--no-tty",
                "--pinentry-mode",
                "loopback",
                "--passphrase-fd",
                "0",
            ]
            .into_iter()
            .map(OsString::from),
        );
        args.push("--homedir".into());
        args.push(self.homedir.clone().into_os_string());
        if self.ignore_mdc_error {
            // Some legacy inputs lack an MDC packet; accepted in this deployment.
            args.push("--ignore-mdc-error".into());
        }
        args.push("--output".into());
        args.push(output.as_os_str().to_os_string());
        args.push("--decrypt".into());
        args.push(input.as_os_str().to_os_string());
        args
    }
}

impl Decryptor for GpgDecryptor {
    fn decrypt(&self, input: &Path, output: &Path) -> Result<(), DecryptError> {
        let spawn_err = |e: io::Error| DecryptError::Spawn {
            program: self.program.clone(),
            source: e,
        };

        let mut child = Command::new(&self.program)
            .args(self.args(input, output))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(spawn_err)?;

        if let Some(mut stdin) = child.stdin.take() {
            let written = stdin
                .write_all(self.passphrase.expose_secret().as_bytes())
                .and_then(|_| stdin.write_all(b"\n"));
            if let Err(e) = written {
                // A tool that exits before reading reports its own status below.
                if e.kind() != io::ErrorKind::BrokenPipe {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(spawn_err(e));
                }
                debug!("Decryptor closed stdin early: {}", e);
            }
        }

        let result = child.wait_with_output().map_err(spawn_err)?;
        if result.status.success() {
            Ok(())
        } else {
            Err(DecryptError::ToolFailed {
                status: result.status.to_string(),
                stderr: summarize_output(&result.stderr, STDERR_SUMMARY_CHARS),
            })
        }
    }
}
