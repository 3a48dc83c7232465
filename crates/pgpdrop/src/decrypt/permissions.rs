use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use nix::unistd::{Group, User};

use crate::config::PermissionsConfig;
use crate::error::{ConfigError, DecryptError};

/// Mode and ownership applied to every output artifact before it is published.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputPolicy {
    pub mode: u32,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
}

impl OutputPolicy {
    pub fn with_mode(mode: u32) -> Self {
        Self {
            mode,
            uid: None,
            gid: None,
        }
    }

    /// Resolves owner and group names once, at startup.
    pub fn from_config(config: &PermissionsConfig) -> Result<Self, ConfigError> {
        let mode = config.parse_mode().ok_or_else(|| ConfigError::Validation {
            message: format!("Invalid permissions mode '{}'", config.mode),
        })?;

        let uid = match config.owner.as_deref() {
            Some(name) => Some(
                User::from_name(name)
                    .map_err(|e| ConfigError::Validation {
                        message: format!("Failed to look up user '{}': {}", name, e),
                    })?
                    .ok_or_else(|| ConfigError::Validation {
                        message: format!("Unknown user '{}'", name),
                    })?
                    .uid
                    .as_raw(),
            ),
            None => None,
        };

        let gid = match config.group.as_deref() {
            Some(name) => Some(
                Group::from_name(name)
                    .map_err(|e| ConfigError::Validation {
                        message: format!("Failed to look up group '{}': {}", name, e),
                    })?
                    .ok_or_else(|| ConfigError::Validation {
                        message: format!("Unknown group '{}'", name),
                    })?
                    .gid
                    .as_raw(),
            ),
            None => None,
        };

        Ok(Self { mode, uid, gid })
    }

    pub fn apply(&self, path: &Path) -> Result<(), DecryptError> {
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(self.mode)).map_err(
            |e| DecryptError::Permissions {
                path: path.to_path_buf(),
                source: e,
            },
        )?;

        if self.uid.is_some() || self.gid.is_some() {
            std::os::unix::fs::chown(path, self.uid, self.gid).map_err(|e| {
                DecryptError::Ownership {
                    path: path.to_path_buf(),
                    source: e,
                }
            })?;
        }

        Ok(())
    }
}
