//! Centime CLI - Inspect and manage the offline mutation queue
//!
//! Reads the same on-disk queue the apps write, so a stuck mutation can be
//! examined, retried, or cleared from the terminal.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Serialize;

use centime_core::config::OfflineConfig;
use centime_core::models::{MutationStatus, QueuedMutation, SyncStateSnapshot};
use centime_core::store::JsonFileStore;
use centime_core::OfflineQueue;

mod error;

use error::CliError;

#[derive(Parser)]
#[command(name = "centime")]
#[command(about = "Inspect the Centime offline mutation queue")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Directory holding the queue files (overrides the config file)
    #[arg(long, value_name = "DIR", global = true)]
    store_dir: Option<PathBuf>,

    /// Path to a JSON config file
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// List queued mutations
    List {
        /// Only show mutations for this collection
        #[arg(long)]
        collection: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show queue counts and the last recorded sync
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Reset failed mutations to pending so the next sync retries them
    Retry,
    /// Drop every queued mutation
    Clear {
        /// Confirm the destructive clear
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("centime=warn".parse().map_err(|_| {
                    CliError::Config("invalid default log directive".to_string())
                })?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = resolve_config(cli.config.as_deref(), cli.store_dir)?;
    let queue = open_queue(&config);

    let output = match cli.command {
        Commands::List { collection, json } => {
            run_list(&queue, collection.as_deref(), json).await?
        }
        Commands::Status { json } => run_status(&queue, json).await?,
        Commands::Retry => run_retry(&queue).await?,
        Commands::Clear { yes } => run_clear(&queue, yes).await?,
    };
    println!("{output}");
    Ok(())
}

fn resolve_config(
    config_path: Option<&std::path::Path>,
    store_dir: Option<PathBuf>,
) -> Result<OfflineConfig, CliError> {
    let mut config = match config_path {
        Some(path) => OfflineConfig::load_from_file(path)
            .map_err(|error| CliError::Config(format!("{}: {error}", path.display())))?,
        None => OfflineConfig::default(),
    };
    if let Some(dir) = store_dir {
        config.storage_dir = dir;
    }
    config
        .validate()
        .map_err(|error| CliError::Config(error.to_string()))?;
    Ok(config)
}

fn open_queue(config: &OfflineConfig) -> OfflineQueue {
    OfflineQueue::new(Arc::new(JsonFileStore::from_config(config)))
}

#[derive(Debug, Serialize)]
struct StatusReport {
    pending: usize,
    failed: usize,
    by_collection: std::collections::BTreeMap<String, usize>,
    last_sync_time: Option<chrono::DateTime<chrono::Utc>>,
}

async fn run_list(
    queue: &OfflineQueue,
    collection: Option<&str>,
    as_json: bool,
) -> Result<String, CliError> {
    let mutations: Vec<QueuedMutation> = queue
        .list_all()
        .await?
        .into_iter()
        .filter(|m| collection.is_none_or(|c| m.collection == c))
        .collect();

    if as_json {
        return Ok(serde_json::to_string_pretty(&mutations)?);
    }
    if mutations.is_empty() {
        return Ok("Queue is empty".to_string());
    }

    let mut lines = Vec::with_capacity(mutations.len());
    for m in &mutations {
        let mut line = format!(
            "{}  {:<7}  {:<6}  {}/{}  queued {}",
            m.id,
            m.status.to_string(),
            m.kind.to_string(),
            m.collection,
            m.target_id,
            m.enqueued_at.format("%Y-%m-%d %H:%M:%S"),
        );
        if m.attempt_count > 0 {
            line.push_str(&format!("  attempts={}", m.attempt_count));
        }
        if let Some(error) = &m.error {
            line.push_str(&format!("  last error: {error}"));
        }
        lines.push(line);
    }
    Ok(lines.join("\n"))
}

async fn run_status(queue: &OfflineQueue, as_json: bool) -> Result<String, CliError> {
    let mutations = queue.list_all().await?;
    let hint: Option<SyncStateSnapshot> = queue.load_sync_hint().await?;
    let mut by_collection = std::collections::BTreeMap::new();
    for mutation in &mutations {
        *by_collection.entry(mutation.collection.clone()).or_insert(0) += 1;
    }
    let report = StatusReport {
        pending: mutations.len(),
        failed: mutations
            .iter()
            .filter(|m| m.status == MutationStatus::Failed)
            .count(),
        by_collection,
        last_sync_time: hint.and_then(|h| h.last_sync_time),
    };

    if as_json {
        return Ok(serde_json::to_string_pretty(&report)?);
    }
    let last_sync = report.last_sync_time.map_or_else(
        || "never".to_string(),
        |t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    );
    let mut out = format!(
        "{} queued ({} failed), last sync: {last_sync}",
        report.pending, report.failed
    );
    for (collection, count) in &report.by_collection {
        out.push_str(&format!("\n  {collection}: {count}"));
    }
    Ok(out)
}

async fn run_retry(queue: &OfflineQueue) -> Result<String, CliError> {
    let failed: Vec<QueuedMutation> = queue
        .list_all()
        .await?
        .into_iter()
        .filter(|m| m.status == MutationStatus::Failed)
        .collect();

    for mutation in &failed {
        queue
            .set_status(mutation.id, MutationStatus::Pending, None)
            .await?;
    }
    Ok(format!("Reset {} failed mutation(s) to pending", failed.len()))
}

async fn run_clear(queue: &OfflineQueue, confirmed: bool) -> Result<String, CliError> {
    if !confirmed {
        return Err(CliError::ClearNotConfirmed);
    }
    let count = queue.list_all().await?.len();
    queue.clear().await?;
    Ok(format!("Cleared {count} queued mutation(s)"))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::{json, Map, Value};
    use tempfile::TempDir;

    use centime_core::models::{collections, MutationKind};

    use super::*;

    fn queue_in(dir: &TempDir) -> OfflineQueue {
        let config = OfflineConfig {
            storage_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        open_queue(&config)
    }

    fn payload(amount: i64) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("amount_minor".to_string(), json!(amount));
        map
    }

    #[tokio::test]
    async fn list_shows_queued_mutations() {
        let dir = TempDir::new().unwrap();
        let queue = queue_in(&dir);
        queue
            .enqueue(MutationKind::Create, collections::TRANSACTIONS, "temp_a", payload(5))
            .await
            .unwrap();

        let text = run_list(&queue, None, false).await.unwrap();
        assert!(text.contains("temp_a"));
        assert!(text.contains("pending"));

        let json_out = run_list(&queue, None, true).await.unwrap();
        let parsed: Vec<QueuedMutation> = serde_json::from_str(&json_out).unwrap();
        assert_eq!(parsed.len(), 1);
    }

    #[tokio::test]
    async fn list_filters_by_collection() {
        let dir = TempDir::new().unwrap();
        let queue = queue_in(&dir);
        queue
            .enqueue(MutationKind::Create, collections::TRANSACTIONS, "temp_a", payload(1))
            .await
            .unwrap();
        queue
            .enqueue(MutationKind::Create, collections::DEBTS, "temp_b", payload(2))
            .await
            .unwrap();

        let text = run_list(&queue, Some(collections::DEBTS), false)
            .await
            .unwrap();
        assert!(text.contains("temp_b"));
        assert!(!text.contains("temp_a"));
    }

    #[tokio::test]
    async fn status_counts_failed_mutations() {
        let dir = TempDir::new().unwrap();
        let queue = queue_in(&dir);
        let id = queue
            .enqueue(MutationKind::Update, collections::DEBTS, "doc_a", payload(1))
            .await
            .unwrap();
        queue
            .set_status(id, MutationStatus::Failed, Some("offline".to_string()))
            .await
            .unwrap();

        let text = run_status(&queue, false).await.unwrap();
        assert_eq!(text, "1 queued (1 failed), last sync: never\n  debts: 1");
    }

    #[tokio::test]
    async fn retry_resets_only_failed_mutations() {
        let dir = TempDir::new().unwrap();
        let queue = queue_in(&dir);
        let failed = queue
            .enqueue(MutationKind::Update, collections::DEBTS, "doc_a", payload(1))
            .await
            .unwrap();
        queue
            .enqueue(MutationKind::Create, collections::DEBTS, "temp_b", payload(2))
            .await
            .unwrap();
        queue
            .set_status(failed, MutationStatus::Failed, Some("offline".to_string()))
            .await
            .unwrap();

        let text = run_retry(&queue).await.unwrap();
        assert_eq!(text, "Reset 1 failed mutation(s) to pending");
        let all = queue.list_all().await.unwrap();
        assert!(all.iter().all(|m| m.status == MutationStatus::Pending));
    }

    #[tokio::test]
    async fn clear_requires_confirmation() {
        let dir = TempDir::new().unwrap();
        let queue = queue_in(&dir);
        queue
            .enqueue(MutationKind::Create, collections::TRANSACTIONS, "temp_a", payload(1))
            .await
            .unwrap();

        assert!(matches!(
            run_clear(&queue, false).await,
            Err(CliError::ClearNotConfirmed)
        ));
        assert_eq!(queue.list_all().await.unwrap().len(), 1);

        let text = run_clear(&queue, true).await.unwrap();
        assert_eq!(text, "Cleared 1 queued mutation(s)");
        assert!(queue.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn store_dir_override_wins_over_defaults() {
        let dir = TempDir::new().unwrap();
        let config = resolve_config(None, Some(dir.path().to_path_buf())).unwrap();
        assert_eq!(config.storage_dir, dir.path());
    }
}
