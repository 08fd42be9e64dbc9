mod replay;

use anyhow::Context;
use clap::{Parser, Subcommand};
use scrivener_queue::prelude::*;
use scrivener_queue_sqlite::SqliteStore;
use serde_json::Value;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "scrivener-queue",
    about = "Operate the scrivener background job queue",
    version
)]
struct Cli {
    /// Path to the queue database.
    #[arg(long, default_value = ".scrivener/queue.db")]
    db: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print queue statistics.
    Status,
    /// Drain everything currently available in the foreground.
    Process,
    /// Move dead letter job(s) back to pending. Takes a job id or "all".
    Retry { target: String },
    /// List dead letter jobs, most recently failed first.
    Dead {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Add a job to the queue.
    Enqueue {
        job_type: String,
        /// JSON payload; defaults to an empty object.
        payload: Option<String>,
        /// Run as a barrier: everything enqueued after waits for this job.
        #[arg(long)]
        sequential: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    let cli = Cli::parse();

    if let Some(parent) = cli.db.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }

    let config = QueueConfig::default();
    let store = SqliteStore::connect(&cli.db, config.max_size).await?;
    let service = QueueService::new(store, Arc::new(replay::ReplayExecutor), config)?;

    match cli.command {
        Command::Status => {
            let stats = service.status().await?;
            println!("{stats}");
        }
        Command::Process => {
            let (succeeded, failed) = service.process_queue().await?;
            println!(
                "processed {} jobs: {} succeeded, {} failed",
                succeeded + failed,
                succeeded,
                failed
            );
            if failed > 0 {
                std::process::exit(1);
            }
        }
        Command::Retry { target } => {
            if target == "all" {
                let moved = service.retry_all_dead_letters().await?;
                println!("requeued {moved} dead letter jobs");
            } else {
                let jid = Xid::from_str(&target).context("not a valid job id")?;
                service.retry_dead_letter(jid).await?;
                println!("requeued job {jid}");
            }
        }
        Command::Dead { limit } => {
            let jobs = service.dead_letters(limit, 0).await?;
            if jobs.is_empty() {
                println!("dead letter store is empty");
            }
            for job in jobs {
                println!(
                    "{}  {}  attempts={}  failed_at={}  {}",
                    job.id, job.job_type, job.attempts, job.failed_at, job.final_error
                );
            }
        }
        Command::Enqueue {
            job_type,
            payload,
            sequential,
        } => {
            let payload = match payload {
                Some(raw) => {
                    serde_json::from_str::<Value>(&raw).context("payload is not valid JSON")?
                }
                None => Value::Object(Default::default()),
            };
            service.enqueue(&job_type, payload, !sequential).await?;
        }
    }
    Ok(())
}
