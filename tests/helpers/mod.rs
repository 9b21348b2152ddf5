#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;
use warden::{Configuration, Workspace};

/// Helper to create a test git repository
pub fn create_test_repo() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let repo_path = temp_dir.path().to_path_buf();

    // Initialize git repo
    Command::new("git")
        .args(["init"])
        .current_dir(&repo_path)
        .output()
        .expect("Failed to init git repo");

    // Configure git
    Command::new("git")
        .args(["config", "user.name", "Test User"])
        .current_dir(&repo_path)
        .output()
        .expect("Failed to set git user.name");

    Command::new("git")
        .args(["config", "user.email", "test@example.com"])
        .current_dir(&repo_path)
        .output()
        .expect("Failed to set git user.email");

    (temp_dir, repo_path)
}

/// Helper to write a configuration and open a workspace on it
pub fn open_workspace(root: &Path, configure: impl FnOnce(&mut Configuration)) -> Workspace {
    let workspace = Workspace::open(root).expect("Failed to open workspace");
    let mut config = Configuration::default_config();
    configure(&mut config);
    workspace
        .save_project_config(config)
        .expect("Failed to save config");
    workspace
}

/// Helper to build an allowlist
pub fn allow(entries: &[&str]) -> Vec<String> {
    entries.iter().map(|s| s.to_string()).collect()
}

/// Helper to read the latest commit subject
pub fn last_commit_subject(repo_path: &Path) -> String {
    let output = Command::new("git")
        .args(["log", "-1", "--format=%s"])
        .current_dir(repo_path)
        .output()
        .expect("Failed to run git log");
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}
