use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::audit::{AuditLogger, AuditOutcome};
use crate::config::ConfigStore;
use crate::security::{executable_name, AllowlistGuard, DeniedCommand};

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("Permission denied: {0}")]
    PermissionDenied(#[from] DeniedCommand),

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("Failed to execute '{command}': {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    #[error("Command '{command}' timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },
}

/// Result of executing a command. A non-zero exit is still a result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResult {
    pub command: String,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
    pub started_at: DateTime<Utc>,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Per-call execution options
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Working directory, relative to the project root unless absolute
    pub cwd: Option<PathBuf>,
    /// Overrides the configured default timeout
    pub timeout: Option<Duration>,
}

/// Why a sequence stopped before its last command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HaltReason {
    NonZeroExit { exit_code: i32 },
    TimedOut,
    Failed { message: String },
    Denied { message: String },
}

impl From<&ExecError> for HaltReason {
    fn from(err: &ExecError) -> Self {
        match err {
            ExecError::Timeout { .. } => HaltReason::TimedOut,
            ExecError::PermissionDenied(denied) => HaltReason::Denied {
                message: denied.reason.to_string(),
            },
            other => HaltReason::Failed {
                message: other.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceHalt {
    pub index: usize,
    pub command: String,
    pub reason: HaltReason,
}

/// Everything a sequence ran, and where it stopped if it stopped early
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceOutcome {
    pub results: Vec<CommandResult>,
    pub halted: Option<SequenceHalt>,
}

impl SequenceOutcome {
    pub fn completed(&self) -> bool {
        self.halted.is_none()
    }
}

/// Runs admitted commands as child processes.
///
/// Commands are split into argv with shell-word rules and spawned directly,
/// never through a shell, so metacharacters reach the program as literal
/// arguments.
#[derive(Debug)]
pub struct CommandExecutor {
    project_root: PathBuf,
    guard: AllowlistGuard,
    config: Arc<ConfigStore>,
    audit: Option<AuditLogger>,
}

impl CommandExecutor {
    pub fn new<P: AsRef<Path>>(project_root: P, config: Arc<ConfigStore>) -> Self {
        Self {
            project_root: project_root.as_ref().to_path_buf(),
            guard: AllowlistGuard::new(Arc::clone(&config)),
            config,
            audit: None,
        }
    }

    /// Record every decision and execution to an audit log
    pub fn with_audit(mut self, audit: AuditLogger) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn guard(&self) -> &AllowlistGuard {
        &self.guard
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// Run a single command after admission.
    ///
    /// Denied commands never spawn a process. Non-zero exits are returned as
    /// results; only spawn failures and timeouts are errors.
    pub async fn run(&self, command: &str, options: &RunOptions) -> Result<CommandResult, ExecError> {
        let cwd = self.resolve_cwd(options.cwd.as_deref());

        if let Err(denied) = self.guard.check(command) {
            warn!(command, reason = %denied.reason, "command denied");
            self.audit_denied(command, &denied.reason.to_string(), &cwd);
            return Err(denied.into());
        }

        self.spawn(command, &cwd, self.effective_timeout(options)).await
    }

    /// Run commands in order, stopping at the first one that does not exit 0.
    ///
    /// The whole sequence is admission-checked first; if any command is
    /// denied, nothing runs.
    pub async fn run_sequence<S: AsRef<str>>(
        &self,
        commands: &[S],
        options: &RunOptions,
    ) -> Result<SequenceOutcome, DeniedCommand> {
        if let Err(denied) = self.guard.check_sequence(commands) {
            warn!(index = denied.index, command = %denied.command, "sequence denied");
            let cwd = self.resolve_cwd(options.cwd.as_deref());
            self.audit_denied(&denied.command, &denied.reason.to_string(), &cwd);
            return Err(denied);
        }

        let mut results = Vec::with_capacity(commands.len());
        for (index, command) in commands.iter().enumerate() {
            let command = command.as_ref();
            let halt = |reason| SequenceHalt {
                index,
                command: command.to_string(),
                reason,
            };

            match self.run(command, options).await {
                Ok(result) => {
                    let exit_code = result.exit_code;
                    results.push(result);
                    if exit_code != 0 {
                        info!(index, exit_code, "sequence stopped on non-zero exit");
                        return Ok(SequenceOutcome {
                            results,
                            halted: Some(halt(HaltReason::NonZeroExit { exit_code })),
                        });
                    }
                }
                Err(err) => {
                    warn!(index, error = %err, "sequence stopped on error");
                    return Ok(SequenceOutcome {
                        results,
                        halted: Some(halt(HaltReason::from(&err))),
                    });
                }
            }
        }

        Ok(SequenceOutcome {
            results,
            halted: None,
        })
    }

    async fn spawn(
        &self,
        command: &str,
        cwd: &Path,
        timeout: Option<Duration>,
    ) -> Result<CommandResult, ExecError> {
        let argv = shlex::split(command)
            .filter(|argv| !argv.is_empty())
            .ok_or_else(|| ExecError::InvalidCommand(format!("cannot parse '{}'", command)))?;

        // The program that runs must be the token that was admitted
        if executable_name(command) != Some(argv[0].as_str()) {
            return Err(ExecError::InvalidCommand(format!(
                "executable must be written without quotes or escapes: '{}'",
                command
            )));
        }

        let mut cmd = Command::new(&argv[0]);
        cmd.args(&argv[1..])
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(command, cwd = %cwd.display(), ?timeout, "spawning");
        let started_at = Utc::now();
        let started = Instant::now();

        let spawn_error = |source: std::io::Error| {
            self.audit_command(command, cwd, AuditOutcome::SpawnFailed);
            ExecError::Spawn {
                command: command.to_string(),
                source,
            }
        };

        let child = cmd.spawn().map_err(spawn_error)?;

        // Dropping the wait future on timeout kills the child
        let output = match timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait_with_output()).await {
                Ok(output) => output,
                Err(_) => {
                    warn!(command, ?limit, "command timed out, killed");
                    self.audit_command(command, cwd, AuditOutcome::TimedOut);
                    return Err(ExecError::Timeout {
                        command: command.to_string(),
                        timeout: limit,
                    });
                }
            },
            None => child.wait_with_output().await,
        }
        .map_err(spawn_error)?;

        let exit_code = output.status.code().unwrap_or(-1);
        let duration_ms = started.elapsed().as_millis() as u64;
        info!(command, exit_code, duration_ms, "command finished");
        self.audit_command(command, cwd, AuditOutcome::Exited(exit_code));

        Ok(CommandResult {
            command: command.to_string(),
            exit_code,
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration_ms,
            started_at,
        })
    }

    fn resolve_cwd(&self, cwd: Option<&Path>) -> PathBuf {
        match cwd {
            Some(path) if path.is_absolute() => path.to_path_buf(),
            Some(path) => self.project_root.join(path),
            None => self.project_root.clone(),
        }
    }

    fn effective_timeout(&self, options: &RunOptions) -> Option<Duration> {
        options.timeout.or_else(|| {
            let secs = self
                .config
                .with_config(|config| config.execution.timeout_seconds);
            (secs > 0).then(|| Duration::from_secs(secs))
        })
    }

    fn audit_command(&self, command: &str, cwd: &Path, outcome: AuditOutcome) {
        if let Some(audit) = &self.audit {
            if let Err(e) = audit.log_command(command, cwd, outcome) {
                warn!(error = %e, "failed to write audit log");
            }
        }
    }

    fn audit_denied(&self, command: &str, reason: &str, cwd: &Path) {
        if let Some(audit) = &self.audit {
            if let Err(e) = audit.log_denied(command, reason, cwd) {
                warn!(error = %e, "failed to write audit log");
            }
        }
    }
}
