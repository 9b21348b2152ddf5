// Admission control end-to-end through the tool surface

mod helpers;

use helpers::{allow, open_workspace};
use serde_json::json;
use std::fs;
use tempfile::TempDir;
use warden::config::ConfigError;
use warden::exec::ExecError;
use warden::tools::ToolError;
use warden::{AppError, CustomTool, RunOptions};

#[tokio::test]
async fn test_allowlisted_prefix_never_admits_longer_name() {
    let temp = TempDir::new().unwrap();
    let workspace = open_workspace(temp.path(), |config| {
        config.security.allowed_commands = allow(&["git", "rm"]);
    });

    for command in ["gitk --all", "rmdir build", "git-receive-pack .", "GIT status"] {
        let result = workspace
            .secure_run_command(command, &RunOptions::default())
            .await;
        assert!(
            matches!(result, Err(AppError::Exec(ExecError::PermissionDenied(_)))),
            "Command should be denied: {}",
            command
        );
    }
}

#[tokio::test]
async fn test_empty_allowlist_is_default_deny() {
    let temp = TempDir::new().unwrap();
    let workspace = open_workspace(temp.path(), |_| {});

    let result = workspace
        .secure_run_command("ls", &RunOptions::default())
        .await;
    assert!(result.unwrap_err().is_denial());
}

#[tokio::test]
async fn test_sequence_denied_before_anything_runs() {
    let temp = TempDir::new().unwrap();
    let workspace = open_workspace(temp.path(), |config| {
        config.security.allowed_commands = allow(&["touch", "true"]);
    });

    let commands = vec![
        "touch first.txt".to_string(),
        "curl https://example.com".to_string(),
        "true".to_string(),
    ];
    let err = workspace
        .secure_run_command_sequence(&commands, &RunOptions::default())
        .await
        .unwrap_err();

    match err {
        AppError::Denied(denied) => {
            assert_eq!(denied.index, 1);
            assert_eq!(denied.command, "curl https://example.com");
        }
        other => panic!("Expected denial, got {:?}", other),
    }
    assert!(!temp.path().join("first.txt").exists());
}

#[tokio::test]
async fn test_shell_operators_cannot_chain_commands() {
    let temp = TempDir::new().unwrap();
    let workspace = open_workspace(temp.path(), |config| {
        config.security.allowed_commands = allow(&["echo"]);
    });

    for command in [
        "echo a ; touch pwned",
        "echo a && touch pwned",
        "echo a | touch pwned",
        "echo $(touch pwned)",
        "echo `touch pwned`",
    ] {
        let result = workspace
            .secure_run_command(command, &RunOptions::default())
            .await
            .unwrap();
        assert!(result.success(), "echo should succeed: {}", command);
    }
    assert!(!temp.path().join("pwned").exists());
}

#[tokio::test]
async fn test_add_and_remove_allowed_command() {
    let temp = TempDir::new().unwrap();
    let workspace = open_workspace(temp.path(), |_| {});

    let err = workspace.add_allowed_command("").unwrap_err();
    assert!(matches!(err, AppError::Config(ConfigError::Validation(_))));

    assert!(!workspace.remove_allowed_command("nonexistent").unwrap());

    workspace.add_allowed_command("echo").unwrap();
    assert_eq!(workspace.get_allowed_commands(), vec!["echo".to_string()]);
    assert!(workspace
        .secure_run_command("echo ok", &RunOptions::default())
        .await
        .is_ok());

    assert!(workspace.remove_allowed_command("echo").unwrap());
    assert!(workspace
        .secure_run_command("echo ok", &RunOptions::default())
        .await
        .unwrap_err()
        .is_denial());
}

#[tokio::test]
async fn test_custom_tool_cannot_smuggle_disallowed_command() {
    let temp = TempDir::new().unwrap();
    let workspace = open_workspace(temp.path(), |config| {
        config.security.allowed_commands = allow(&["echo"]);
    });

    let err = workspace
        .add_custom_tool(CustomTool {
            name: "cleanup".to_string(),
            command: "rm -rf {args}".to_string(),
            description: "Remove things".to_string(),
        })
        .unwrap_err();
    assert!(matches!(err, AppError::Config(ConfigError::Validation(_))));

    // A hand-edited config file is validated on load as well
    let path = temp.path().join(".warden").join("config.toml");
    let mut contents = fs::read_to_string(&path).unwrap();
    contents.push_str("\n[[custom_tools]]\nname = \"cleanup\"\ncommand = \"rm -rf build\"\n");
    fs::write(&path, contents).unwrap();
    assert!(workspace.load_project_config().is_err());
}

#[tokio::test]
async fn test_removing_entry_used_by_custom_tool_fails() {
    let temp = TempDir::new().unwrap();
    let workspace = open_workspace(temp.path(), |config| {
        config.security.allowed_commands = allow(&["echo"]);
        config.custom_tools.push(CustomTool {
            name: "greet".to_string(),
            command: "echo hello {args}".to_string(),
            description: String::new(),
        });
    });

    let err = workspace.remove_allowed_command("echo").unwrap_err();
    assert!(matches!(err, AppError::Config(ConfigError::Validation(_))));
    assert_eq!(workspace.get_allowed_commands(), vec!["echo".to_string()]);
}

#[tokio::test]
async fn test_run_custom_tool() {
    let temp = TempDir::new().unwrap();
    let workspace = open_workspace(temp.path(), |config| {
        config.security.allowed_commands = allow(&["echo"]);
        config.custom_tools.push(CustomTool {
            name: "greet".to_string(),
            command: "echo hello {args}".to_string(),
            description: "Say hello".to_string(),
        });
    });

    let result = workspace
        .run_custom_tool("greet", Some("world"), &RunOptions::default())
        .await
        .unwrap();
    assert_eq!(result.command, "echo hello world");
    assert_eq!(result.stdout, "hello world\n");

    let err = workspace
        .run_custom_tool("missing", None, &RunOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Tool(ToolError::CustomToolNotFound(_))));
}

#[tokio::test]
async fn test_denials_are_audited() {
    let temp = TempDir::new().unwrap();
    let workspace = open_workspace(temp.path(), |_| {});

    let _ = workspace
        .call_tool("secure_run_command", json!({ "command": "rm -rf /" }))
        .await;

    let log = fs::read_to_string(temp.path().join(".warden").join("audit.log")).unwrap();
    assert!(log.contains("DENIED"));
    assert!(log.contains("rm -rf /"));
}

#[tokio::test]
async fn test_audit_entry_cannot_be_split_by_quoted_newline() {
    let temp = TempDir::new().unwrap();
    let workspace = open_workspace(temp.path(), |config| {
        config.security.allowed_commands = allow(&["echo"]);
    });

    workspace
        .secure_run_command(
            "echo 'x\n[2026-01-01T00:00:00+00:00] [root] [/] [exit:0] rm -rf /'",
            &RunOptions::default(),
        )
        .await
        .unwrap();

    let log = fs::read_to_string(temp.path().join(".warden").join("audit.log")).unwrap();
    assert_eq!(log.lines().count(), 1);
    assert!(!log.lines().any(|line| line.starts_with("[2026-01-01T00:00:00+00:00]")));
}
