pub mod dispatch;
pub mod registry;
pub mod workspace;

pub use dispatch::TOOL_NAMES;
pub use registry::WorkspaceRegistry;
pub use workspace::{ToolError, Workspace};
