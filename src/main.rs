use clap::error::ErrorKind;
use clap::Parser;
use serde_json::Value;
use std::path::PathBuf;
use std::process::ExitCode;
use warden::tools::TOOL_NAMES;
use warden::{logging, Workspace};

const EXIT_USAGE: u8 = 64;
const EXIT_DENIED: u8 = 2;

#[derive(Parser, Debug)]
#[command(name = "warden", version)]
#[command(about = "Run allowlisted commands and track coding sessions for a project", long_about = None)]
struct Cli {
    /// Project root (defaults to current directory)
    #[arg(long)]
    root: Option<PathBuf>,

    /// List the available tools and exit
    #[arg(long)]
    list: bool,

    /// Tool to call, e.g. secure_run_command
    #[arg(required_unless_present = "list")]
    tool: Option<String>,

    /// Tool arguments as a JSON object
    args: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            let _ = e.print();
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            let _ = e.print();
            return ExitCode::from(EXIT_USAGE);
        }
    };

    if cli.list {
        for name in TOOL_NAMES {
            println!("{}", name);
        }
        return ExitCode::SUCCESS;
    }

    logging::init();

    let Some(tool) = cli.tool else {
        eprintln!("Missing tool name; see --list");
        return ExitCode::from(EXIT_USAGE);
    };

    let args = match cli.args.as_deref().map(serde_json::from_str::<Value>) {
        None => Value::Null,
        Some(Ok(args)) => args,
        Some(Err(e)) => {
            eprintln!("Invalid JSON arguments: {}", e);
            return ExitCode::from(EXIT_USAGE);
        }
    };

    let root = match cli.root {
        Some(root) => root,
        None => match std::env::current_dir() {
            Ok(dir) => dir,
            Err(e) => {
                eprintln!("Cannot read current directory: {}", e);
                return ExitCode::FAILURE;
            }
        },
    };

    let workspace = match Workspace::open(&root) {
        Ok(workspace) => workspace,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match workspace.call_tool(&tool, args).await {
        Ok(result) => match serde_json::to_string_pretty(&result) {
            Ok(json) => {
                println!("{}", json);
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                ExitCode::FAILURE
            }
        },
        Err(e) if e.is_denial() => {
            eprintln!("Denied: {}", e);
            ExitCode::from(EXIT_DENIED)
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
