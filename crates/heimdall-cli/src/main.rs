use std::io::{self, Read};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use heimdall_sandbox::{Config, Coordinator};
use serde_json::json;

/// Drive a heimdall sandbox workspace from the command line.
#[derive(Parser, Debug)]
#[command(name = "heimdall-cli", about = "Confined code-execution sandbox for AI agents")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write a file into the workspace.
    WriteFile {
        path: String,
        /// Read content from this file instead of stdin.
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Read a file from the workspace.
    ReadFile { path: String },
    /// List a workspace directory (defaults to the workspace root).
    ListFiles { path: Option<String> },
    /// Delete a file or directory from the workspace.
    DeleteFile { path: String },
    /// Execute Python source against the embedded engine.
    ExecPython {
        /// Read source from this file instead of stdin.
        #[arg(long)]
        file: Option<PathBuf>,
        /// Package name to (attempt to) install before execution. Repeatable.
        #[arg(long = "package")]
        packages: Vec<String>,
    },
    /// Execute a bash command against the sandboxed bash engine.
    ExecBash {
        command: String,
        #[arg(long)]
        cwd: Option<String>,
    },
}

fn read_source(file: Option<PathBuf>) -> io::Result<String> {
    match file {
        Some(path) => std::fs::read_to_string(path),
        None => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            Ok(buf)
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let config = Config::from_env().unwrap_or_else(|e| {
        eprintln!("failed to initialize workspace: {e}");
        std::process::exit(1);
    });
    let coordinator = Coordinator::new(config);

    // Every command prints one JSON line and exits 0 — failures are encoded
    // in the JSON payload, not the process exit code, mirroring
    // execute_python's own error-as-data convention.
    match args.command {
        Command::WriteFile { path, file } => {
            let content = read_source(file).unwrap_or_else(|e| {
                eprintln!("error reading input: {e}");
                std::process::exit(1);
            });
            match coordinator.write_file(&path, &content).await {
                Ok(()) => println!("{}", json!({"success": true})),
                Err(e) => println!("{}", json!({"success": false, "error": e.public_message()})),
            }
        }
        Command::ReadFile { path } => match coordinator.read_file(&path).await {
            Ok(content) => println!("{}", json!({"success": true, "content": content})),
            Err(e) => println!("{}", json!({"success": false, "error": e.public_message()})),
        },
        Command::ListFiles { path } => match coordinator.list_files(path.as_deref()).await {
            Ok(entries) => println!("{}", json!({"success": true, "entries": entries})),
            Err(e) => println!("{}", json!({"success": false, "error": e.public_message()})),
        },
        Command::DeleteFile { path } => match coordinator.delete_file(&path).await {
            Ok(()) => println!("{}", json!({"success": true})),
            Err(e) => println!("{}", json!({"success": false, "error": e.public_message()})),
        },
        Command::ExecPython { file, packages } => {
            let code = read_source(file).unwrap_or_else(|e| {
                eprintln!("error reading input: {e}");
                std::process::exit(1);
            });
            let result = coordinator.execute_python(&code, packages).await;
            let json_str = serde_json::to_string(&result).expect("PyExecutionResult is always serializable");
            println!("{json_str}");
        }
        Command::ExecBash { command, cwd } => match coordinator.execute_bash(&command, cwd.as_deref()).await {
            Ok(result) => println!(
                "{}",
                json!({"stdout": result.stdout, "stderr": result.stderr, "exit_code": result.exit_code})
            ),
            Err(e) => println!("{}", json!({"success": false, "error": e.public_message()})),
        },
    }
}
