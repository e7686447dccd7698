//! Operator CLI over `dlq:persistent_failures`: inspect quarantined
//! messages, replay them onto a stream, or discard them.

use std::sync::Arc;

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use serde::Serialize;

use vox_core::NEW_MESSAGE_STREAM;
use vox_dlq::{ERROR_DETAILS_FIELD, ERROR_SERVICE_FIELD, ERROR_TIMESTAMP_FIELD, PersistentEntry};
use vox_stream::{RedisStreamStore, SharedStreamStore};

#[derive(Parser, Debug)]
#[command(author, version, about = "Voxflow DLQ CLI")]
struct Cli {
    /// Emit JSON output
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List persistent DLQ entries, newest first
    List {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Show one entry by message id
    Show {
        #[arg()]
        message_id: String,
    },
    /// Re-enqueue an entry's envelope onto a stream and remove it
    Reprocess {
        #[arg()]
        message_id: String,
        /// Target stream for the replay
        #[arg(long, default_value = NEW_MESSAGE_STREAM)]
        to: String,
    },
    /// Remove an entry without reprocessing it
    Discard {
        #[arg()]
        message_id: String,
    },
}

#[derive(Serialize)]
struct ListRow<'a> {
    message_id: &'a str,
    service: &'a str,
    timestamp: &'a str,
    details: &'a str,
}

fn row(entry: &PersistentEntry) -> ListRow<'_> {
    let field = |key: &str| entry.data.get(key).map(String::as_str).unwrap_or("-");
    ListRow {
        message_id: &entry.message_id,
        service: field(ERROR_SERVICE_FIELD),
        timestamp: field(ERROR_TIMESTAMP_FIELD),
        details: field(ERROR_DETAILS_FIELD),
    }
}

fn print_table(entries: &[PersistentEntry]) {
    println!(
        "{:<16} {:<24} {:<12} details",
        "message_id", "service", "timestamp"
    );
    for entry in entries {
        let row = row(entry);
        println!(
            "{:<16} {:<24} {:<12} {}",
            row.message_id, row.service, row.timestamp, row.details
        );
    }
}

async fn find_entry(
    store: &SharedStreamStore,
    message_id: &str,
) -> Result<PersistentEntry> {
    let entries = vox_dlq::list(store).await?;
    entries
        .into_iter()
        .find(|entry| entry.message_id == message_id)
        .ok_or_else(|| anyhow::anyhow!("dlq entry '{message_id}' not found"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let redis_url =
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".into());
    let store: SharedStreamStore = Arc::new(RedisStreamStore::connect(&redis_url).await?);

    match cli.command {
        Commands::List { limit } => {
            let mut entries = vox_dlq::list(&store).await?;
            entries.truncate(limit);
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else if entries.is_empty() {
                println!("No persistent DLQ entries");
            } else {
                print_table(&entries);
            }
        }
        Commands::Show { message_id } => {
            let entry = find_entry(&store, &message_id).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&entry)?);
            } else {
                println!("message_id: {}", entry.message_id);
                for (key, value) in &entry.data {
                    println!("{key:<18}: {value}");
                }
            }
        }
        Commands::Reprocess { message_id, to } => {
            let entry = find_entry(&store, &message_id).await?;
            if !vox_dlq::reprocess(&store, &entry, &to).await? {
                bail!("dlq entry '{message_id}' was already handled");
            }
            println!("re-enqueued '{message_id}' onto '{to}'");
        }
        Commands::Discard { message_id } => {
            let entry = find_entry(&store, &message_id).await?;
            if !vox_dlq::discard(&store, &entry).await? {
                bail!("dlq entry '{message_id}' was already handled");
            }
            println!("discarded '{message_id}'");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use vox_stream::MemoryStreamStore;

    fn entry(message_id: &str) -> PersistentEntry {
        PersistentEntry {
            message_id: message_id.into(),
            data: BTreeMap::from([
                ("userId".to_string(), "u1".to_string()),
                (
                    ERROR_SERVICE_FIELD.to_string(),
                    "transcription-worker".to_string(),
                ),
            ]),
        }
    }

    #[tokio::test]
    async fn find_entry_matches_on_message_id() {
        let store: SharedStreamStore = Arc::new(MemoryStreamStore::new());
        vox_dlq::persist(&store, &entry("1-0")).await.unwrap();
        vox_dlq::persist(&store, &entry("2-0")).await.unwrap();

        let found = find_entry(&store, "1-0").await.unwrap();
        assert_eq!(found.message_id, "1-0");
        assert!(find_entry(&store, "9-9").await.is_err());
    }

    #[test]
    fn rows_surface_error_fields() {
        let entry = entry("1-0");
        let row = row(&entry);
        assert_eq!(row.service, "transcription-worker");
        assert_eq!(row.timestamp, "-");
    }
}
