pub mod history;
pub mod model;
pub mod tracker;

pub use history::SessionHistory;
pub use model::{CommandLogEntry, CommandStatus, Session};
pub use tracker::{SessionError, SessionTracker, VCS_BINARY};
