use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::settings::{validate_allow_entry, ConfigError};
use crate::config::ConfigStore;

/// Why a command was refused admission
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenialReason {
    EmptyCommand,
    NotAllowlisted(String),
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenialReason::EmptyCommand => write!(f, "empty command"),
            DenialReason::NotAllowlisted(executable) => {
                write!(f, "'{}' is not an allowed command", executable)
            }
        }
    }
}

/// The first command of a request that failed admission.
///
/// This is a policy refusal to report back to the requester, not a crash.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Command {index} denied ({reason}): {command}")]
pub struct DeniedCommand {
    pub index: usize,
    pub command: String,
    pub reason: DenialReason,
}

/// The executable name of a command: its first whitespace-delimited token
pub fn executable_name(command: &str) -> Option<&str> {
    command.split_whitespace().next()
}

/// Decides which commands may run, backed by the project's allowlist.
///
/// Matching is exact and case-sensitive on the executable token. There is no
/// glob expansion and no prefix or substring matching: allowing `rm` does not
/// allow `rmdir`.
#[derive(Debug, Clone)]
pub struct AllowlistGuard {
    config: Arc<ConfigStore>,
}

impl AllowlistGuard {
    pub fn new(config: Arc<ConfigStore>) -> Self {
        Self { config }
    }

    /// Check a single command against the allowlist
    pub fn is_allowed(&self, command: &str) -> bool {
        self.check(command).is_ok()
    }

    /// Admission check for one command, reporting why it was refused
    pub fn check(&self, command: &str) -> Result<(), DeniedCommand> {
        self.check_at(0, command)
    }

    /// Admission check for an ordered sequence. Returns the first command,
    /// by position, that is not allowed. Nothing is executed.
    pub fn check_sequence<S: AsRef<str>>(&self, commands: &[S]) -> Result<(), DeniedCommand> {
        commands
            .iter()
            .enumerate()
            .try_for_each(|(index, command)| self.check_at(index, command.as_ref()))
    }

    fn check_at(&self, index: usize, command: &str) -> Result<(), DeniedCommand> {
        let deny = |reason| DeniedCommand {
            index,
            command: command.to_string(),
            reason,
        };

        let Some(executable) = executable_name(command) else {
            return Err(deny(DenialReason::EmptyCommand));
        };

        let allowed = self.config.with_config(|config| {
            config
                .security
                .allowed_commands
                .iter()
                .any(|entry| entry == executable)
        });

        if allowed {
            Ok(())
        } else {
            debug!(executable, "command not allowlisted");
            Err(deny(DenialReason::NotAllowlisted(executable.to_string())))
        }
    }

    /// Allowed commands in insertion order
    pub fn allowed_commands(&self) -> Vec<String> {
        self.config
            .with_config(|config| config.security.allowed_commands.clone())
    }

    /// Add an entry and persist it. Blank and duplicate entries are rejected.
    pub fn add(&self, entry: &str) -> Result<(), ConfigError> {
        validate_allow_entry(entry)?;

        self.config.mutate(|config| {
            if config.security.allowed_commands.iter().any(|e| e == entry) {
                return Err(ConfigError::Validation(format!(
                    "'{}' is already an allowed command",
                    entry
                )));
            }
            config.security.allowed_commands.push(entry.to_string());
            Ok(())
        })?;

        info!(entry, "allowed command added");
        Ok(())
    }

    /// Remove an entry and persist. Absent entries are a no-op.
    ///
    /// Returns whether the entry was present. Fails if a custom tool still
    /// depends on the entry.
    pub fn remove(&self, entry: &str) -> Result<bool, ConfigError> {
        let mut removed = false;
        self.config.mutate(|config| {
            let before = config.security.allowed_commands.len();
            config.security.allowed_commands.retain(|e| e != entry);
            removed = config.security.allowed_commands.len() != before;
            Ok(())
        })?;

        if removed {
            info!(entry, "allowed command removed");
        }
        Ok(removed)
    }
}
