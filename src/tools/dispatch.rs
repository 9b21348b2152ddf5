use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

use super::workspace::{ToolError, Workspace};
use crate::config::{ConfigError, Configuration, CustomTool};
use crate::error::AppResult;
use crate::exec::RunOptions;

/// Every tool name `call_tool` accepts
pub const TOOL_NAMES: &[&str] = &[
    // Configuration
    "load_project_config",
    "save_project_config",
    "update_project_config",
    "generate_sample_config",
    "add_custom_tool",
    "remove_custom_tool",
    // Allowlist
    "get_allowed_commands",
    "add_allowed_command",
    "remove_allowed_command",
    // Execution
    "secure_run_command",
    "secure_run_command_sequence",
    "run_custom_tool",
    // Sessions
    "start_coding_session",
    "end_coding_session",
    "get_current_session",
    "get_session_history",
    "record_file_change",
    "retry_session_commit",
];

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct NoArgs {}

#[derive(Debug, Deserialize)]
struct ExecArgs {
    #[serde(default)]
    cwd: Option<PathBuf>,
    #[serde(default)]
    timeout_ms: Option<u64>,
}

impl ExecArgs {
    fn options(&self) -> RunOptions {
        RunOptions {
            cwd: self.cwd.clone(),
            timeout: self.timeout_ms.map(Duration::from_millis),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RunCommandArgs {
    command: String,
    #[serde(flatten)]
    exec: ExecArgs,
}

#[derive(Debug, Deserialize)]
struct RunSequenceArgs {
    commands: Vec<String>,
    #[serde(flatten)]
    exec: ExecArgs,
}

#[derive(Debug, Deserialize)]
struct RunCustomToolArgs {
    name: String,
    #[serde(default)]
    args: Option<String>,
    #[serde(flatten)]
    exec: ExecArgs,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SaveConfigArgs {
    config: Configuration,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct UpdateConfigArgs {
    path: String,
    value: Value,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct EntryArgs {
    entry: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct NameArgs {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct AddCustomToolArgs {
    tool: CustomTool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PathArgs {
    path: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SessionIdArgs {
    id: u64,
}

impl Workspace {
    /// Dispatch a structured tool call from the host agent.
    ///
    /// `args` is a JSON object (or null for tools without arguments); the
    /// result is the JSON encoding of the tool's return value.
    pub async fn call_tool(&self, name: &str, args: Value) -> AppResult<Value> {
        debug!(tool = name, "tool call");

        match name {
            "load_project_config" => {
                parse::<NoArgs>(args)?;
                encode(&self.load_project_config()?)
            }
            "save_project_config" => {
                let args: SaveConfigArgs = parse(args)?;
                self.save_project_config(args.config)?;
                Ok(json!({ "saved": true }))
            }
            "update_project_config" => {
                let args: UpdateConfigArgs = parse(args)?;
                let value = toml::Value::try_from(&args.value).map_err(|e| {
                    ConfigError::Validation(format!("unsupported value for {}: {}", args.path, e))
                })?;
                encode(&self.update_project_config(&args.path, value)?)
            }
            "generate_sample_config" => {
                parse::<NoArgs>(args)?;
                encode(&Workspace::generate_sample_config())
            }
            "add_custom_tool" => {
                let args: AddCustomToolArgs = parse(args)?;
                encode(&self.add_custom_tool(args.tool)?)
            }
            "remove_custom_tool" => {
                let args: NameArgs = parse(args)?;
                let removed = self.remove_custom_tool(&args.name)?;
                Ok(json!({ "removed": removed }))
            }
            "get_allowed_commands" => {
                parse::<NoArgs>(args)?;
                encode(&self.get_allowed_commands())
            }
            "add_allowed_command" => {
                let args: EntryArgs = parse(args)?;
                self.add_allowed_command(&args.entry)?;
                encode(&self.get_allowed_commands())
            }
            "remove_allowed_command" => {
                let args: EntryArgs = parse(args)?;
                let removed = self.remove_allowed_command(&args.entry)?;
                Ok(json!({ "removed": removed }))
            }
            "secure_run_command" => {
                let args: RunCommandArgs = parse(args)?;
                encode(
                    &self
                        .secure_run_command(&args.command, &args.exec.options())
                        .await?,
                )
            }
            "secure_run_command_sequence" => {
                let args: RunSequenceArgs = parse(args)?;
                encode(
                    &self
                        .secure_run_command_sequence(&args.commands, &args.exec.options())
                        .await?,
                )
            }
            "run_custom_tool" => {
                let args: RunCustomToolArgs = parse(args)?;
                encode(
                    &self
                        .run_custom_tool(&args.name, args.args.as_deref(), &args.exec.options())
                        .await?,
                )
            }
            "start_coding_session" => {
                parse::<NoArgs>(args)?;
                encode(&self.start_coding_session().await?)
            }
            "end_coding_session" => {
                parse::<NoArgs>(args)?;
                encode(&self.end_coding_session().await?)
            }
            "get_current_session" => {
                parse::<NoArgs>(args)?;
                encode(&self.get_current_session().await)
            }
            "get_session_history" => {
                parse::<NoArgs>(args)?;
                encode(&self.get_session_history().await)
            }
            "record_file_change" => {
                let args: PathArgs = parse(args)?;
                let recorded = self.record_file_change(&args.path).await?;
                Ok(json!({ "recorded": recorded }))
            }
            "retry_session_commit" => {
                let args: SessionIdArgs = parse(args)?;
                encode(&self.retry_session_commit(args.id).await?)
            }
            other => Err(ToolError::UnknownTool(other.to_string()).into()),
        }
    }
}

fn parse<T: DeserializeOwned>(args: Value) -> Result<T, ToolError> {
    let args = if args.is_null() { json!({}) } else { args };
    serde_json::from_value(args).map_err(ToolError::InvalidArguments)
}

fn encode<T: Serialize>(value: &T) -> AppResult<Value> {
    Ok(serde_json::to_value(value).map_err(ToolError::Encode)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::exec::ExecError;
    use tempfile::TempDir;

    fn open_workspace() -> (TempDir, Workspace) {
        let temp_dir = TempDir::new().unwrap();
        let workspace = Workspace::open(temp_dir.path()).unwrap();
        (temp_dir, workspace)
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let (_temp, workspace) = open_workspace();
        let err = workspace.call_tool("format_disk", Value::Null).await.unwrap_err();
        assert!(matches!(err, AppError::Tool(ToolError::UnknownTool(_))));
    }

    #[tokio::test]
    async fn test_invalid_arguments() {
        let (_temp, workspace) = open_workspace();
        let err = workspace
            .call_tool("add_allowed_command", json!({ "name": "git" }))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Tool(ToolError::InvalidArguments(_))));

        let err = workspace
            .call_tool("get_allowed_commands", json!({ "verbose": true }))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Tool(ToolError::InvalidArguments(_))));
    }

    #[tokio::test]
    async fn test_allowlist_tools() {
        let (_temp, workspace) = open_workspace();
        let allowed = workspace
            .call_tool("add_allowed_command", json!({ "entry": "echo" }))
            .await
            .unwrap();
        assert_eq!(allowed, json!(["echo"]));

        let removed = workspace
            .call_tool("remove_allowed_command", json!({ "entry": "nonexistent" }))
            .await
            .unwrap();
        assert_eq!(removed, json!({ "removed": false }));
    }

    #[tokio::test]
    async fn test_run_command_tool() {
        let (_temp, workspace) = open_workspace();
        workspace.add_allowed_command("echo").unwrap();

        let result = workspace
            .call_tool("secure_run_command", json!({ "command": "echo hi", "timeout_ms": 5000 }))
            .await
            .unwrap();
        assert_eq!(result["exit_code"], json!(0));
        assert_eq!(result["stdout"], json!("hi\n"));

        let err = workspace
            .call_tool("secure_run_command", json!({ "command": "rm -rf /" }))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Exec(ExecError::PermissionDenied(_))));
    }

    #[tokio::test]
    async fn test_sequence_tool_reports_halt() {
        let (_temp, workspace) = open_workspace();
        workspace.add_allowed_command("true").unwrap();
        workspace.add_allowed_command("false").unwrap();

        let outcome = workspace
            .call_tool(
                "secure_run_command_sequence",
                json!({ "commands": ["true", "false", "true"] }),
            )
            .await
            .unwrap();
        assert_eq!(outcome["results"].as_array().unwrap().len(), 2);
        assert_eq!(outcome["halted"]["index"], json!(1));
        assert_eq!(outcome["halted"]["reason"]["kind"], json!("non_zero_exit"));
    }

    #[tokio::test]
    async fn test_update_config_tool() {
        let (_temp, workspace) = open_workspace();
        let config = workspace
            .call_tool(
                "update_project_config",
                json!({ "path": "general.format_on_save", "value": true }),
            )
            .await
            .unwrap();
        assert_eq!(config["general"]["format_on_save"], json!(true));

        let err = workspace
            .call_tool(
                "update_project_config",
                json!({ "path": "general.nope", "value": true }),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Config(ConfigError::FieldNotFound(_))));
    }

    #[tokio::test]
    async fn test_session_tools() {
        let (_temp, workspace) = open_workspace();
        let current = workspace.call_tool("get_current_session", Value::Null).await.unwrap();
        assert!(current.is_null());

        workspace.call_tool("start_coding_session", Value::Null).await.unwrap();
        let recorded = workspace
            .call_tool("record_file_change", json!({ "path": "x.ts" }))
            .await
            .unwrap();
        assert_eq!(recorded, json!({ "recorded": true }));

        let sealed = workspace.call_tool("end_coding_session", json!({})).await.unwrap();
        assert_eq!(sealed["changed_files"], json!(["x.ts"]));

        let history = workspace.call_tool("get_session_history", Value::Null).await.unwrap();
        assert_eq!(history.as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_tool_names_unique() {
        let mut names = TOOL_NAMES.to_vec();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), TOOL_NAMES.len());
    }
}
