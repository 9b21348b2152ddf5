use chrono::Utc;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::config::STATE_DIR;

const MAX_LOG_SIZE: u64 = 10 * 1024 * 1024; // 10MB

const LOG_FILE: &str = "audit.log";

/// Outcome recorded for an executed command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditOutcome {
    Exited(i32),
    TimedOut,
    SpawnFailed,
}

/// Append-only record of every admission decision and execution in a project
#[derive(Debug)]
pub struct AuditLogger {
    log_path: PathBuf,
}

impl AuditLogger {
    /// Create an AuditLogger for a project root: `<root>/.warden/audit.log`
    pub fn for_project<P: AsRef<Path>>(project_root: P) -> std::io::Result<Self> {
        Self::with_path(project_root.as_ref().join(STATE_DIR).join(LOG_FILE))
    }

    /// Create an AuditLogger with a custom log path
    pub fn with_path<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let log_path = path.as_ref().to_path_buf();

        // Ensure directory exists
        if let Some(parent) = log_path.parent() {
            fs::create_dir_all(parent)?;
        }

        Ok(Self { log_path })
    }

    /// Log a command execution
    pub fn log_command(
        &self,
        command: &str,
        cwd: &Path,
        outcome: AuditOutcome,
    ) -> std::io::Result<()> {
        let status = match outcome {
            AuditOutcome::Exited(code) => format!("exit:{}", code),
            AuditOutcome::TimedOut => "timeout".to_string(),
            AuditOutcome::SpawnFailed => "spawn-failed".to_string(),
        };

        self.append(&format!(
            "[{}] [{}] [{}] [{}] {}\n",
            Utc::now().to_rfc3339(),
            escape_controls(&current_user()),
            escape_controls(&cwd.display().to_string()),
            status,
            escape_controls(command)
        ))
    }

    /// Log a command refused by the allowlist
    pub fn log_denied(&self, command: &str, reason: &str, cwd: &Path) -> std::io::Result<()> {
        // Debug formatting quotes the value and escapes quotes and control characters
        self.append(&format!(
            "[{}] [{}] [{}] [DENIED] command={:?} reason={:?}\n",
            Utc::now().to_rfc3339(),
            escape_controls(&current_user()),
            escape_controls(&cwd.display().to_string()),
            command,
            reason
        ))
    }

    fn append(&self, entry: &str) -> std::io::Result<()> {
        // Check and rotate log if needed
        self.rotate_if_needed()?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)?;

        file.write_all(entry.as_bytes())?;
        file.flush()?;

        Ok(())
    }

    /// Rotate log file if it exceeds MAX_LOG_SIZE
    fn rotate_if_needed(&self) -> std::io::Result<()> {
        if !self.log_path.exists() {
            return Ok(());
        }

        let metadata = fs::metadata(&self.log_path)?;
        if metadata.len() > MAX_LOG_SIZE {
            // Rotate: audit.log -> audit.log.1
            let backup_path = self.log_path.with_extension("log.1");
            fs::rename(&self.log_path, backup_path)?;
        }

        Ok(())
    }

    /// Get the path to the log file
    pub fn log_path(&self) -> &Path {
        &self.log_path
    }
}

/// Every entry is exactly one physical line
fn escape_controls(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_control() {
            escaped.extend(c.escape_default());
        } else {
            escaped.push(c);
        }
    }
    escaped
}

fn current_user() -> String {
    std::env::var("USER").unwrap_or_else(|_| "unknown".to_string())
}
