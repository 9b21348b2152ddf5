use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::workspace::Workspace;
use crate::error::AppResult;

/// Hands out one shared `Workspace` per canonical project root, so every
/// tool call against a root goes through the same locks.
#[derive(Debug, Default)]
pub struct WorkspaceRegistry {
    workspaces: Mutex<HashMap<PathBuf, Arc<Workspace>>>,
}

impl WorkspaceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the workspace for a root, opening it on first use
    pub fn get_or_open<P: AsRef<Path>>(&self, root: P) -> AppResult<Arc<Workspace>> {
        let root = root.as_ref().canonicalize()?;

        let mut workspaces = self.workspaces.lock();
        if let Some(workspace) = workspaces.get(&root) {
            return Ok(Arc::clone(workspace));
        }

        let workspace = Arc::new(Workspace::open(&root)?);
        workspaces.insert(root, Arc::clone(&workspace));
        Ok(workspace)
    }

    pub fn len(&self) -> usize {
        self.workspaces.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
