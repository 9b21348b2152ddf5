use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use crate::audit::AuditLogger;
use crate::config::{ConfigError, ConfigStore, Configuration, CustomTool};
use crate::error::AppResult;
use crate::exec::{CommandExecutor, CommandResult, RunOptions, SequenceOutcome};
use crate::security::AllowlistGuard;
use crate::session::{Session, SessionTracker};

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Custom tool not found: {0}")]
    CustomToolNotFound(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(serde_json::Error),

    #[error("Failed to encode tool result: {0}")]
    Encode(serde_json::Error),
}

/// The tool surface for one project root.
///
/// Configuration and allowlist checks happen synchronously before any
/// process is spawned; command runs go through the session tracker so the
/// open session sees them.
#[derive(Debug)]
pub struct Workspace {
    root: PathBuf,
    config: Arc<ConfigStore>,
    guard: AllowlistGuard,
    sessions: SessionTracker,
}

impl Workspace {
    /// Open a project root, loading its configuration and session history
    pub fn open<P: AsRef<Path>>(root: P) -> AppResult<Self> {
        let root = root.as_ref().to_path_buf();
        let config = Arc::new(ConfigStore::open(&root)?);
        let audit = AuditLogger::for_project(&root)?;
        let executor =
            Arc::new(CommandExecutor::new(&root, Arc::clone(&config)).with_audit(audit));
        let guard = executor.guard().clone();
        let sessions = SessionTracker::new(Arc::clone(&config), executor)?;

        info!(root = %root.display(), "workspace opened");
        Ok(Self {
            root,
            config,
            guard,
            sessions,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    // Configuration

    pub fn load_project_config(&self) -> AppResult<Configuration> {
        Ok(self.config.load()?)
    }

    pub fn save_project_config(&self, config: Configuration) -> AppResult<()> {
        Ok(self.config.save(config)?)
    }

    pub fn update_project_config(&self, field: &str, value: toml::Value) -> AppResult<Configuration> {
        Ok(self.config.update(field, value)?)
    }

    pub fn generate_sample_config() -> Configuration {
        ConfigStore::generate_sample()
    }

    /// Register a custom tool. Its command must already be allowlisted.
    pub fn add_custom_tool(&self, tool: CustomTool) -> AppResult<Configuration> {
        let name = tool.name.clone();
        let config = self.config.mutate(|config| {
            if config.custom_tool(&tool.name).is_some() {
                return Err(ConfigError::Validation(format!(
                    "Custom tool '{}' already exists",
                    tool.name
                )));
            }
            config.custom_tools.push(tool);
            Ok(())
        })?;

        info!(tool = %name, "custom tool registered");
        Ok(config)
    }

    /// Remove a custom tool. Absent names are a no-op.
    pub fn remove_custom_tool(&self, name: &str) -> AppResult<bool> {
        let mut removed = false;
        self.config.mutate(|config| {
            let before = config.custom_tools.len();
            config.custom_tools.retain(|tool| tool.name != name);
            removed = config.custom_tools.len() != before;
            Ok(())
        })?;
        Ok(removed)
    }

    // Allowlist

    pub fn get_allowed_commands(&self) -> Vec<String> {
        self.guard.allowed_commands()
    }

    pub fn add_allowed_command(&self, entry: &str) -> AppResult<()> {
        Ok(self.guard.add(entry)?)
    }

    pub fn remove_allowed_command(&self, entry: &str) -> AppResult<bool> {
        Ok(self.guard.remove(entry)?)
    }

    // Execution

    pub async fn secure_run_command(
        &self,
        command: &str,
        options: &RunOptions,
    ) -> AppResult<CommandResult> {
        Ok(self.sessions.run(command, options).await?)
    }

    pub async fn secure_run_command_sequence(
        &self,
        commands: &[String],
        options: &RunOptions,
    ) -> AppResult<SequenceOutcome> {
        Ok(self.sessions.run_sequence(commands, options).await?)
    }

    /// Resolve a registered custom tool and run it like any other command
    pub async fn run_custom_tool(
        &self,
        name: &str,
        args: Option<&str>,
        options: &RunOptions,
    ) -> AppResult<CommandResult> {
        let tool = self
            .config
            .with_config(|config| config.custom_tool(name).cloned())
            .ok_or_else(|| ToolError::CustomToolNotFound(name.to_string()))?;

        let command = tool.resolve(args);
        info!(tool = name, command = %command, "running custom tool");
        Ok(self.sessions.run(&command, options).await?)
    }

    // Sessions

    pub async fn start_coding_session(&self) -> AppResult<Session> {
        Ok(self.sessions.start_session().await?)
    }

    pub async fn end_coding_session(&self) -> AppResult<Session> {
        Ok(self.sessions.end_session().await?)
    }

    pub async fn get_current_session(&self) -> Option<Session> {
        self.sessions.current_session().await
    }

    pub async fn get_session_history(&self) -> Vec<Session> {
        self.sessions.history().await
    }

    pub async fn record_file_change(&self, path: &str) -> AppResult<bool> {
        Ok(self.sessions.record_change(path).await?)
    }

    pub async fn retry_session_commit(&self, id: u64) -> AppResult<Session> {
        Ok(self.sessions.retry_commit(id).await?)
    }
}
