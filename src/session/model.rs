use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::exec::{CommandResult, ExecError, HaltReason, SequenceHalt};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    Exited,
    TimedOut,
    Failed,
}

/// One executed command in a session's log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandLogEntry {
    pub command: String,
    pub status: CommandStatus,
    /// Absent when the process never exited on its own
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    pub timestamp: DateTime<Utc>,
}

impl CommandLogEntry {
    pub fn from_result(result: &CommandResult) -> Self {
        Self {
            command: result.command.clone(),
            status: CommandStatus::Exited,
            exit_code: Some(result.exit_code),
            timestamp: result.started_at,
        }
    }

    /// Log entry for a failed attempt. Denied commands were never attempted
    /// and produce none.
    pub fn from_error(command: &str, err: &ExecError) -> Option<Self> {
        let status = match err {
            ExecError::PermissionDenied(_) => return None,
            ExecError::Timeout { .. } => CommandStatus::TimedOut,
            ExecError::Spawn { .. } | ExecError::InvalidCommand(_) => CommandStatus::Failed,
        };

        Some(Self::attempt(command, status))
    }

    /// Log entry for the command that stopped a sequence, when it is not
    /// already among the sequence results
    pub fn from_halt(halt: &SequenceHalt) -> Option<Self> {
        let status = match halt.reason {
            HaltReason::NonZeroExit { .. } | HaltReason::Denied { .. } => return None,
            HaltReason::TimedOut => CommandStatus::TimedOut,
            HaltReason::Failed { .. } => CommandStatus::Failed,
        };

        Some(Self::attempt(&halt.command, status))
    }

    fn attempt(command: &str, status: CommandStatus) -> Self {
        Self {
            command: command.to_string(),
            status,
            exit_code: None,
            timestamp: Utc::now(),
        }
    }
}

/// A bounded window of agent activity tracked as one unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: u64,
    pub started_at: DateTime<Utc>,
    /// Set when the session is sealed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub format_failed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format_error: Option<String>,
    #[serde(default)]
    pub commit_failed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_error: Option<String>,
    #[serde(default)]
    pub changed_files: BTreeSet<String>,
    #[serde(default)]
    pub commits: Vec<String>,
    #[serde(default)]
    pub command_log: Vec<CommandLogEntry>,
}

impl Session {
    pub fn open(id: u64) -> Self {
        Self {
            id,
            started_at: Utc::now(),
            ended_at: None,
            format_failed: false,
            format_error: None,
            commit_failed: false,
            commit_error: None,
            changed_files: BTreeSet::new(),
            commits: Vec::new(),
            command_log: Vec::new(),
        }
    }

    pub fn is_sealed(&self) -> bool {
        self.ended_at.is_some()
    }

    /// One-line commit message summarising the session
    pub fn summary(&self) -> String {
        format!(
            "Coding session {}: {} file(s) changed, {} command(s) run",
            self.id,
            self.changed_files.len(),
            self.command_log.len()
        )
    }
}
