pub mod audit;
pub mod config;
pub mod error;
pub mod exec;
pub mod logging;
pub mod security;
pub mod session;
pub mod tools;

// Re-export commonly used types for convenience
pub use config::{ConfigStore, Configuration, CustomTool};
pub use error::{AppError, AppResult};
pub use exec::{CommandExecutor, CommandResult, RunOptions, SequenceOutcome};
pub use security::{AllowlistGuard, DeniedCommand};
pub use session::{Session, SessionTracker};
pub use tools::{Workspace, WorkspaceRegistry};
