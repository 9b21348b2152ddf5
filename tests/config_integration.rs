// Persisted configuration round-trips and concurrent mutation

mod helpers;

use helpers::open_workspace;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;
use warden::{ConfigStore, Configuration, Workspace, WorkspaceRegistry};

#[test]
fn test_load_without_file_returns_default() {
    let temp = TempDir::new().unwrap();
    let workspace = Workspace::open(temp.path()).unwrap();
    assert_eq!(
        workspace.load_project_config().unwrap(),
        Configuration::default_config()
    );
}

#[test]
fn test_double_save_of_load_is_byte_identical() {
    let temp = TempDir::new().unwrap();
    let workspace = Workspace::open(temp.path()).unwrap();
    let path = ConfigStore::config_path(temp.path());

    workspace
        .save_project_config(Workspace::generate_sample_config())
        .unwrap();

    let loaded = workspace.load_project_config().unwrap();
    workspace.save_project_config(loaded).unwrap();
    let first = fs::read(&path).unwrap();

    let loaded = workspace.load_project_config().unwrap();
    workspace.save_project_config(loaded).unwrap();
    let second = fs::read(&path).unwrap();

    assert_eq!(first, second);
}

#[test]
fn test_persisted_format_is_sectioned_toml() {
    let temp = TempDir::new().unwrap();
    let workspace = Workspace::open(temp.path()).unwrap();
    workspace
        .save_project_config(Workspace::generate_sample_config())
        .unwrap();

    let contents = fs::read_to_string(ConfigStore::config_path(temp.path())).unwrap();
    assert!(contents.contains("[general]"));
    assert!(contents.contains("[security]"));
    assert!(contents.contains("[[custom_tools]]"));
}

#[test]
fn test_generate_sample_has_no_side_effects() {
    let temp = TempDir::new().unwrap();
    let _workspace = Workspace::open(temp.path()).unwrap();
    let sample = Workspace::generate_sample_config();

    assert!(!sample.security.allowed_commands.is_empty());
    assert!(!sample.custom_tools.is_empty());
    assert!(!ConfigStore::config_path(temp.path()).exists());
}

#[test]
fn test_update_persists_across_workspaces() {
    let temp = TempDir::new().unwrap();
    let workspace = open_workspace(temp.path(), |_| {});
    workspace
        .update_project_config("general.git_auto_commit", toml::Value::Boolean(true))
        .unwrap();

    let reopened = Workspace::open(temp.path()).unwrap();
    assert!(reopened.load_project_config().unwrap().general.git_auto_commit);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_allowlist_additions_are_serialized() {
    let temp = TempDir::new().unwrap();
    let registry = WorkspaceRegistry::new();
    let workspace = registry.get_or_open(temp.path()).unwrap();

    let mut handles = Vec::new();
    for i in 0..16 {
        let workspace = Arc::clone(&workspace);
        handles.push(tokio::spawn(async move {
            workspace.add_allowed_command(&format!("tool{}", i)).unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let persisted = workspace.load_project_config().unwrap();
    assert_eq!(persisted.security.allowed_commands.len(), 16);
}
