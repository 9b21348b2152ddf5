use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use super::model::Session;
use super::tracker::SessionError;
use crate::config::store::write_atomic;
use crate::config::STATE_DIR;

const HISTORY_FILE: &str = "sessions.toml";

#[derive(Debug, Default, Serialize, Deserialize)]
struct HistoryFile {
    #[serde(default)]
    sessions: Vec<Session>,
}

/// Sealed sessions of a project, oldest first
#[derive(Debug)]
pub struct SessionHistory {
    path: PathBuf,
    sessions: Vec<Session>,
}

impl SessionHistory {
    /// Load `<root>/.warden/sessions.toml`, or start empty if it does not exist
    pub fn load<P: AsRef<Path>>(project_root: P) -> Result<Self, SessionError> {
        let path = project_root.as_ref().join(STATE_DIR).join(HISTORY_FILE);

        let sessions = if path.exists() {
            let contents = fs::read_to_string(&path)?;
            toml::from_str::<HistoryFile>(&contents)?.sessions
        } else {
            Vec::new()
        };

        Ok(Self { path, sessions })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn sessions(&self) -> &[Session] {
        &self.sessions
    }

    /// Id for the next session: one past the highest id seen
    pub fn next_id(&self) -> u64 {
        self.sessions.iter().map(|s| s.id).max().map_or(1, |id| id + 1)
    }

    pub fn get(&self, id: u64) -> Option<&Session> {
        self.sessions.iter().find(|s| s.id == id)
    }

    pub fn append(&mut self, session: Session) {
        self.sessions.push(session);
    }

    /// Replace the stored copy of a session with the same id
    pub fn replace(&mut self, session: Session) -> bool {
        match self.sessions.iter_mut().find(|s| s.id == session.id) {
            Some(stored) => {
                *stored = session;
                true
            }
            None => false,
        }
    }

    /// Atomically write the history as it would be with `session` stored,
    /// replacing the entry with the same id or appending it. The in-memory
    /// history is not changed; callers apply the change once this succeeds.
    pub fn persist_with(&self, session: &Session) -> Result<(), SessionError> {
        let mut sessions = self.sessions.clone();
        match sessions.iter_mut().find(|s| s.id == session.id) {
            Some(stored) => *stored = session.clone(),
            None => sessions.push(session.clone()),
        }

        let file = HistoryFile { sessions };
        let contents = toml::to_string_pretty(&file)?;
        write_atomic(&self.path, &contents)?;
        Ok(())
    }
}
