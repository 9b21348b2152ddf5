use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::history::SessionHistory;
use super::model::{CommandLogEntry, Session};
use crate::config::{ConfigStore, ExecutionConfig};
use crate::exec::{CommandExecutor, CommandResult, ExecError, RunOptions, SequenceOutcome};
use crate::security::DeniedCommand;

/// Version-control binary used for auto-commit. Must be allowlisted.
pub const VCS_BINARY: &str = "git";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("A coding session is already open (session {0})")]
    AlreadyOpen(u64),

    #[error("No coding session is open")]
    NoOpenSession,

    #[error("Session {0} not found")]
    NotFound(u64),

    #[error("Session {0} has no failed commit to retry")]
    NothingToRetry(u64),

    #[error("Invalid file path: {0:?}")]
    InvalidPath(String),

    #[error("Session history I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse session history: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize session history: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[derive(Debug)]
struct TrackerState {
    current: Option<Session>,
    history: SessionHistory,
}

/// Tracks coding sessions for one project root: `NoSession -> Open -> Sealed`.
///
/// Every command run through the tracker is appended to the open session.
/// Sealing runs the format and auto-commit hooks through the same
/// admission-checked executor.
#[derive(Debug)]
pub struct SessionTracker {
    project_root: PathBuf,
    config: Arc<ConfigStore>,
    executor: Arc<CommandExecutor>,
    state: Mutex<TrackerState>,
}

impl SessionTracker {
    pub fn new(config: Arc<ConfigStore>, executor: Arc<CommandExecutor>) -> Result<Self, SessionError> {
        let project_root = executor.project_root().to_path_buf();
        let history = SessionHistory::load(&project_root)?;

        Ok(Self {
            project_root,
            config,
            executor,
            state: Mutex::new(TrackerState {
                current: None,
                history,
            }),
        })
    }

    /// Open a new session. Fails if one is already open.
    pub async fn start_session(&self) -> Result<Session, SessionError> {
        let mut state = self.state.lock().await;
        if let Some(open) = &state.current {
            return Err(SessionError::AlreadyOpen(open.id));
        }

        let session = Session::open(state.history.next_id());
        info!(id = session.id, "coding session started");
        state.current = Some(session.clone());
        Ok(session)
    }

    /// Add a file to the open session's change-set.
    ///
    /// Returns false, without error, when no session is open.
    pub async fn record_change(&self, path: &str) -> Result<bool, SessionError> {
        let path = self.normalize_path(path)?;

        let mut state = self.state.lock().await;
        match state.current.as_mut() {
            Some(session) => {
                debug!(id = session.id, path = %path, "file change recorded");
                session.changed_files.insert(path);
                Ok(true)
            }
            None => {
                debug!(path = %path, "no open session, change discarded");
                Ok(false)
            }
        }
    }

    /// Append to the open session's command log; discarded when none is open
    pub async fn on_command_executed(&self, entry: CommandLogEntry) {
        self.record_commands(vec![entry]).await;
    }

    async fn record_commands(&self, entries: Vec<CommandLogEntry>) {
        if entries.is_empty() {
            return;
        }

        let mut state = self.state.lock().await;
        if let Some(session) = state.current.as_mut() {
            session.command_log.extend(entries);
        }
    }

    /// Run one command and log it to the open session
    pub async fn run(&self, command: &str, options: &RunOptions) -> Result<CommandResult, ExecError> {
        let result = self.executor.run(command, options).await;

        let entry = match &result {
            Ok(result) => Some(CommandLogEntry::from_result(result)),
            Err(err) => CommandLogEntry::from_error(command, err),
        };
        if let Some(entry) = entry {
            self.on_command_executed(entry).await;
        }

        result
    }

    /// Run a fail-fast sequence and log everything it attempted
    pub async fn run_sequence<S: AsRef<str> + Sync>(
        &self,
        commands: &[S],
        options: &RunOptions,
    ) -> Result<SequenceOutcome, DeniedCommand> {
        let outcome = self.executor.run_sequence(commands, options).await?;

        let mut entries: Vec<CommandLogEntry> = outcome
            .results
            .iter()
            .map(CommandLogEntry::from_result)
            .collect();
        entries.extend(outcome.halted.as_ref().and_then(CommandLogEntry::from_halt));
        self.record_commands(entries).await;

        Ok(outcome)
    }

    /// Seal the open session, running the format and auto-commit hooks if
    /// enabled, and append it to history.
    ///
    /// Hook failures are recorded on the session; they never keep it open.
    /// If the history cannot be written, the session stays open and the
    /// error is returned.
    pub async fn end_session(&self) -> Result<Session, SessionError> {
        let mut state = self.state.lock().await;
        let mut session = state.current.take().ok_or(SessionError::NoOpenSession)?;
        let config = self.config.current();
        let options = hook_options(&config.execution);

        if config.general.format_on_save {
            self.format_changed_files(&mut session, &config.execution.formatter, &options)
                .await;
        }

        if config.general.git_auto_commit {
            self.commit(&mut session, &options).await;
        }

        session.ended_at = Some(Utc::now());
        info!(
            id = session.id,
            files = session.changed_files.len(),
            commands = session.command_log.len(),
            format_failed = session.format_failed,
            commit_failed = session.commit_failed,
            "coding session sealed"
        );

        if config.general.session_tracking {
            if let Err(e) = state.history.persist_with(&session) {
                warn!(id = session.id, error = %e, "session history not written, session left open");
                session.ended_at = None;
                state.current = Some(session);
                return Err(e);
            }
        }
        state.history.append(session.clone());

        Ok(session)
    }

    /// Retry the auto-commit of a sealed session whose commit failed.
    ///
    /// Only the session's commit fields change.
    pub async fn retry_commit(&self, id: u64) -> Result<Session, SessionError> {
        let mut state = self.state.lock().await;
        let mut session = state
            .history
            .get(id)
            .cloned()
            .ok_or(SessionError::NotFound(id))?;

        if !session.commit_failed {
            return Err(SessionError::NothingToRetry(id));
        }

        let options = self.config.with_config(|c| hook_options(&c.execution));
        let mut attempt = session.clone();
        self.commit(&mut attempt, &options).await;
        session.commits = attempt.commits;
        session.commit_failed = attempt.commit_failed;
        session.commit_error = attempt.commit_error;
        info!(id, commit_failed = session.commit_failed, "commit retried");

        if self.config.with_config(|c| c.general.session_tracking) {
            state.history.persist_with(&session)?;
        }
        state.history.replace(session.clone());

        Ok(session)
    }

    pub async fn current_session(&self) -> Option<Session> {
        self.state.lock().await.current.clone()
    }

    /// Sealed sessions, oldest first
    pub async fn history(&self) -> Vec<Session> {
        self.state.lock().await.history.sessions().to_vec()
    }

    async fn format_changed_files(
        &self,
        session: &mut Session,
        formatter: &str,
        options: &RunOptions,
    ) {
        if session.changed_files.is_empty() {
            return;
        }

        let files: Vec<String> = session.changed_files.iter().cloned().collect();
        let outcome = match join_command(formatter, &files) {
            Some(command) => self.run_hook(session, &command, options).await,
            None => Err(format!("cannot build formatter command from '{}'", formatter)),
        };

        match outcome {
            Ok(_) => info!(id = session.id, files = files.len(), "changed files formatted"),
            Err(message) => {
                warn!(id = session.id, error = %message, "format step failed");
                session.format_failed = true;
                session.format_error = Some(message);
            }
        }
    }

    async fn commit(&self, session: &mut Session, options: &RunOptions) {
        session.commit_failed = false;
        session.commit_error = None;

        if session.changed_files.is_empty() {
            debug!(id = session.id, "no changed files, skipping commit");
            return;
        }

        match self.try_commit(session, options).await {
            Ok(commit) => {
                info!(id = session.id, commit = %commit, "session committed");
                session.commits.push(commit);
            }
            Err(message) => {
                warn!(id = session.id, error = %message, "commit step failed");
                session.commit_failed = true;
                session.commit_error = Some(message);
            }
        }
    }

    /// Stage and commit exactly the session's files. Anything else already
    /// staged stays staged and out of the commit.
    async fn try_commit(&self, session: &mut Session, options: &RunOptions) -> Result<String, String> {
        let files: Vec<String> = session.changed_files.iter().cloned().collect();
        let message = session.summary();

        let mut add = vec!["add".to_string(), "--".to_string()];
        add.extend(files.iter().cloned());
        let add = join_command(VCS_BINARY, &add).ok_or("cannot quote changed file paths")?;
        self.run_hook(session, &add, options).await?;

        let mut commit = vec![
            "commit".to_string(),
            "-m".to_string(),
            message,
            "--".to_string(),
        ];
        commit.extend(files);
        let commit = join_command(VCS_BINARY, &commit).ok_or("cannot quote commit message")?;
        self.run_hook(session, &commit, options).await?;

        let head = self
            .run_hook(session, &format!("{} rev-parse HEAD", VCS_BINARY), options)
            .await?;
        Ok(head.stdout.trim().to_string())
    }

    /// Run a hook command, logging it straight into the session being sealed.
    /// Anything but a zero exit is a hook failure.
    async fn run_hook(
        &self,
        session: &mut Session,
        command: &str,
        options: &RunOptions,
    ) -> Result<CommandResult, String> {
        let result = self.executor.run(command, options).await;

        match &result {
            Ok(result) => session.command_log.push(CommandLogEntry::from_result(result)),
            Err(err) => session
                .command_log
                .extend(CommandLogEntry::from_error(command, err)),
        }

        match result {
            Ok(result) if result.success() => Ok(result),
            Ok(result) => Err(format!(
                "'{}' exited with {}: {}",
                command,
                result.exit_code,
                result.stderr.trim()
            )),
            Err(err) => Err(err.to_string()),
        }
    }

    /// Store paths relative to the project root where possible
    fn normalize_path(&self, path: &str) -> Result<String, SessionError> {
        let trimmed = path.trim();
        if trimmed.is_empty() {
            return Err(SessionError::InvalidPath(path.to_string()));
        }

        let path = Path::new(trimmed);
        let relative = path.strip_prefix(&self.project_root).unwrap_or(path);
        let relative = relative.strip_prefix(".").unwrap_or(relative);
        let relative = relative.to_string_lossy().into_owned();

        // Paths are handed to hook commands as arguments and must not read as options
        if relative.is_empty() || relative.starts_with('-') {
            return Err(SessionError::InvalidPath(trimmed.to_string()));
        }

        Ok(relative)
    }
}

/// Hooks always run under a timeout, never the unbounded default
fn hook_options(execution: &ExecutionConfig) -> RunOptions {
    RunOptions {
        cwd: None,
        timeout: Some(Duration::from_secs(execution.hook_timeout_seconds.max(1))),
    }
}

/// Append words to a base command, quoting each as needed
fn join_command(base: &str, words: &[String]) -> Option<String> {
    let mut argv = shlex::split(base)?;
    if argv.is_empty() {
        return None;
    }
    argv.extend(words.iter().cloned());
    shlex::try_join(argv.iter().map(String::as_str)).ok()
}
