// src/main.rs
// fs-rollback - exercise the transaction manager from the command line

use anyhow::Result;
use clap::{Parser, Subcommand};
use fs_rollback::{RollbackConfig, TransactionManager, spawn_interrupt_guard};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{Level, info, warn};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "fs-rollback")]
#[command(about = "Transactional file edits with commit and rollback")]
#[command(version)]
struct Cli {
    /// Log backup and undo details
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Back up a file, write new content, then commit (or roll back with --abort)
    Apply {
        /// Operation id, also the backup directory name
        #[arg(long, default_value = "cli-apply")]
        op: String,

        /// File to write, relative to the working directory
        #[arg(long)]
        file: PathBuf,

        /// New content for the file
        #[arg(long)]
        content: String,

        /// Roll back instead of committing
        #[arg(long)]
        abort: bool,
    },

    /// Edit a config file in a scratch directory and roll the edit back
    Demo {
        /// Scratch directory (default: system temp dir)
        #[arg(long, env = "FS_ROLLBACK_DEMO_DIR")]
        dir: Option<PathBuf>,
    },
}

/// Back up `file`, write `content`, then commit or roll back.
///
/// Any failure after the context starts rolls it back before returning.
async fn apply(
    manager: &TransactionManager,
    op: &str,
    file: &Path,
    content: &str,
    abort: bool,
) -> Result<serde_json::Value> {
    manager.start_context(op, "cli-apply").await?;

    let written = async {
        let backup = manager.backup_file(op, file).await?;
        tokio::fs::write(&backup.original_path, content).await?;
        info!("Wrote {} bytes to {}", content.len(), backup.original_path.display());
        Ok::<(), anyhow::Error>(())
    }
    .await;

    if let Err(e) = written {
        if let Err(rollback_err) = manager.execute_rollback(op).await {
            warn!(operation_id = %op, "[ROLLBACK] Rollback after failed apply was incomplete: {}", rollback_err);
        }
        return Err(e);
    }

    if abort {
        let report = manager.execute_rollback(op).await?;
        Ok(serde_json::json!({ "operation": op, "result": "rolled_back", "report": report }))
    } else {
        manager.commit_context(op).await?;
        Ok(serde_json::json!({ "operation": op, "result": "committed" }))
    }
}

async fn run_apply(op: String, file: PathBuf, content: String, abort: bool) -> Result<()> {
    let manager = Arc::new(TransactionManager::from_env()?);
    let guard = spawn_interrupt_guard(manager.clone());

    let outcome = apply(&manager, &op, &file, &content, abort).await;
    guard.abort();

    println!("{}", serde_json::to_string_pretty(&outcome?)?);
    Ok(())
}

async fn run_demo(dir: Option<PathBuf>) -> Result<()> {
    let dir = dir.unwrap_or_else(|| std::env::temp_dir().join("fs-rollback-demo"));
    tokio::fs::create_dir_all(&dir).await?;

    let manager = TransactionManager::new(RollbackConfig::new(&dir));
    let config_path = dir.join("config.json");
    tokio::fs::write(&config_path, r#"{"a":1}"#).await?;

    manager.start_context("demo", "edit-file").await?;
    manager.backup_file("demo", "config.json").await?;
    tokio::fs::write(&config_path, r#"{"a":2}"#).await?;
    println!("edited:   {}", tokio::fs::read_to_string(&config_path).await?);

    let report = manager.execute_rollback("demo").await?;
    println!("restored: {}", tokio::fs::read_to_string(&config_path).await?);
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv(); // Load .env from current directory

    let cli = Cli::parse();

    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Apply {
            op,
            file,
            content,
            abort,
        } => run_apply(op, file, content, abort).await?,
        Commands::Demo { dir } => run_demo(dir).await?,
    }

    Ok(())
}
