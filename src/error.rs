use std::io;
use thiserror::Error;

// Import module-level errors for AppError
use crate::config::settings::ConfigError;
use crate::exec::executor::ExecError;
use crate::security::allowlist::DeniedCommand;
use crate::session::tracker::SessionError;
use crate::tools::workspace::ToolError;

/// Top-level error that wraps all module-specific errors
///
/// The tool surface returns this so each operation can use `?` while the
/// caller still sees which component refused or failed. Policy refusals
/// (`Denied`, `Exec(PermissionDenied)`) are meant to be reported back to the
/// requester verbatim.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Command denied: {0}")]
    Denied(#[from] DeniedCommand),

    #[error("Execution error: {0}")]
    Exec(#[from] ExecError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl AppError {
    /// Whether this is a policy refusal rather than a failure
    pub fn is_denial(&self) -> bool {
        matches!(
            self,
            AppError::Denied(_) | AppError::Exec(ExecError::PermissionDenied(_))
        )
    }
}

/// Result type for application-level operations
pub type AppResult<T> = std::result::Result<T, AppError>;
