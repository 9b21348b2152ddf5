use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

use crate::security::allowlist::executable_name;

/// Placeholder substituted with caller arguments when a custom tool runs
pub const ARGS_PLACEHOLDER: &str = "{args}";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("Invalid config value: {0}")]
    Validation(String),

    #[error("No such config field: {0}")]
    FieldNotFound(String),
}

/// Project configuration, one per project root
#[derive(Debug, Default, Deserialize, Serialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Configuration {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub project: ProjectConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub custom_tools: Vec<CustomTool>,
}

#[derive(Debug, Default, Deserialize, Serialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct GeneralConfig {
    pub format_on_save: bool,
    pub git_auto_commit: bool,
    pub session_tracking: bool,
}

#[derive(Debug, Default, Deserialize, Serialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SecurityConfig {
    /// Insertion order is display order only; matching is set membership.
    pub allowed_commands: Vec<String>,
}

#[derive(Debug, Default, Deserialize, Serialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    pub instructions: String,
}

/// Hooks run while sealing a session are always bounded by this by default
pub const DEFAULT_HOOK_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ExecutionConfig {
    /// Default per-command timeout. Zero disables it.
    pub timeout_seconds: u64,
    /// Formatter invoked over changed files when a session is sealed
    pub formatter: String,
    /// Limit for each format or commit hook command. Must be non-zero.
    pub hook_timeout_seconds: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 0,
            formatter: "prettier --write".to_string(),
            hook_timeout_seconds: DEFAULT_HOOK_TIMEOUT_SECS,
        }
    }
}

/// A named, pre-approved command template
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct CustomTool {
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub description: String,
}

impl CustomTool {
    /// Resolve the command template against caller arguments.
    ///
    /// `{args}` is replaced by the arguments; without a placeholder the
    /// arguments are appended. The executable token is never substituted.
    pub fn resolve(&self, args: Option<&str>) -> String {
        let args = args.map(str::trim).unwrap_or("");
        if self.command.contains(ARGS_PLACEHOLDER) {
            self.command.replace(ARGS_PLACEHOLDER, args).trim().to_string()
        } else if args.is_empty() {
            self.command.trim().to_string()
        } else {
            format!("{} {}", self.command.trim(), args)
        }
    }
}

impl Configuration {
    /// Default configuration: every policy flag off, empty allowlist
    pub fn default_config() -> Self {
        Self::default()
    }

    /// Illustrative template for a new project
    pub fn sample() -> Self {
        Configuration {
            general: GeneralConfig {
                format_on_save: true,
                git_auto_commit: true,
                session_tracking: true,
            },
            security: SecurityConfig {
                allowed_commands: ["git", "npm", "npx", "node", "prettier", "ls", "cat"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
            },
            project: ProjectConfig {
                instructions: "Use TypeScript strict mode. Run the test suite before committing."
                    .to_string(),
            },
            execution: ExecutionConfig {
                timeout_seconds: 120,
                formatter: "prettier --write".to_string(),
                hook_timeout_seconds: DEFAULT_HOOK_TIMEOUT_SECS,
            },
            custom_tools: vec![CustomTool {
                name: "test".to_string(),
                command: format!("npm test {}", ARGS_PLACEHOLDER),
                description: "Run the project's test suite".to_string(),
            }],
        }
    }

    /// Validate configuration invariants
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for entry in &self.security.allowed_commands {
            validate_allow_entry(entry)?;
            if !seen.insert(entry.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "Duplicate allowed command: {}",
                    entry
                )));
            }
        }

        let mut names = HashSet::new();
        for tool in &self.custom_tools {
            if tool.name.trim().is_empty() {
                return Err(ConfigError::Validation(
                    "Custom tool name must not be empty".to_string(),
                ));
            }
            if !names.insert(tool.name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "Duplicate custom tool name: {}",
                    tool.name
                )));
            }
            self.validate_custom_tool_command(tool)?;
        }

        if self.execution.hook_timeout_seconds == 0 {
            return Err(ConfigError::Validation(
                "hook_timeout_seconds must be greater than zero".to_string(),
            ));
        }

        if self.general.format_on_save && executable_name(&self.execution.formatter).is_none() {
            return Err(ConfigError::Validation(
                "formatter must be set when format_on_save is enabled".to_string(),
            ));
        }

        Ok(())
    }

    fn validate_custom_tool_command(&self, tool: &CustomTool) -> Result<(), ConfigError> {
        let Some(executable) = executable_name(&tool.command) else {
            return Err(ConfigError::Validation(format!(
                "Custom tool '{}' has an empty command",
                tool.name
            )));
        };

        if executable.contains(ARGS_PLACEHOLDER) {
            return Err(ConfigError::Validation(format!(
                "Custom tool '{}' must name its executable literally",
                tool.name
            )));
        }

        if !self.is_allowlisted(executable) {
            return Err(ConfigError::Validation(format!(
                "Custom tool '{}' runs '{}', which is not an allowed command",
                tool.name, executable
            )));
        }

        Ok(())
    }

    fn is_allowlisted(&self, executable: &str) -> bool {
        self.security
            .allowed_commands
            .iter()
            .any(|entry| entry == executable)
    }

    /// Look up a custom tool by name
    pub fn custom_tool(&self, name: &str) -> Option<&CustomTool> {
        self.custom_tools.iter().find(|tool| tool.name == name)
    }
}

/// Check a single allowlist entry
pub fn validate_allow_entry(entry: &str) -> Result<(), ConfigError> {
    if entry.trim().is_empty() {
        return Err(ConfigError::Validation(
            "Allowed command must not be empty".to_string(),
        ));
    }

    if entry
        .chars()
        .any(|c| c.is_whitespace() || matches!(c, '"' | '\'' | '\\'))
    {
        return Err(ConfigError::Validation(format!(
            "Allowed command must be a single executable name: {:?}",
            entry
        )));
    }

    Ok(())
}
