//! Secure Audit Trail CLI
//!
//! Command-line front end for recording, verifying and inspecting the
//! encrypted audit chain.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use secure_audit_trail::alerts::AlertFanout;
use secure_audit_trail::audit::{ChainLedger, ChainVerification};
use secure_audit_trail::codec::EventData;
use secure_audit_trail::config::AppConfig;
use secure_audit_trail::crypto::CipherBox;
use secure_audit_trail::database::Database;
use secure_audit_trail::queue::{EventPublisher, QueuedEvent, RabbitMqPublisher};

#[derive(Parser)]
#[command(name = "secure-audit")]
#[command(about = "Encrypted, hash-chained audit trail")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Record an event executed by the current user
    Register {
        /// Event type
        event_type: Option<String>,
    },

    /// Verify the integrity of the whole chain
    Verify,

    /// Rotate the encryption key
    Rotate {
        /// New secret the key is derived from
        new_secret: Option<String>,
    },

    /// Publish an event to the audit queue instead of writing it directly
    Queue {
        /// Event type
        event_type: Option<String>,
    },

    /// List the newest records
    List {
        /// Number of records (default 10)
        limit: Option<String>,
    },

    /// Decrypt and show one record
    View {
        /// Record id
        id: Option<String>,
    },
}

const DEFAULT_LIST_LIMIT: u32 = 10;

/// Leading integer of a numeric argument (`"7"`, `" 7 "`, `"7.9"` give 7).
/// Anything that is not a finite number gives `None`.
fn numeric_arg(arg: &str) -> Option<i64> {
    let arg = arg.trim();
    if let Ok(n) = arg.parse::<i64>() {
        return Some(n);
    }
    arg.parse::<f64>()
        .ok()
        .filter(|n| n.is_finite() && n.abs() < i64::MAX as f64)
        .map(|n| n.trunc() as i64)
}

/// Non-numeric or negative input falls back to the default
fn list_limit(arg: Option<&str>) -> u32 {
    arg.and_then(numeric_arg)
        .filter(|n| *n >= 0)
        .map(|n| u32::try_from(n).unwrap_or(u32::MAX))
        .unwrap_or(DEFAULT_LIST_LIMIT)
}

fn record_id(arg: Option<&str>) -> Option<i64> {
    arg.and_then(numeric_arg).filter(|id| *id >= 1)
}

/// Trimmed argument, or `None` when missing or blank
fn text_arg(arg: Option<String>) -> Option<String> {
    arg.map(|a| a.trim().to_string()).filter(|a| !a.is_empty())
}

fn current_user() -> String {
    std::env::var("USER").unwrap_or_else(|_| "unknown".to_string())
}

async fn open_ledger(config: &AppConfig) -> Result<ChainLedger<Database>> {
    let database = Database::new(&config.database_url)
        .await
        .with_context(|| format!("Failed to open {}", config.database_url))?;
    database.run_migrations().await?;

    let cipher = CipherBox::new(&config.app_key)?.with_backup_dir(&config.key_backup_dir);
    let signal = Arc::new(AlertFanout::from_config(config));

    Ok(ChainLedger::new(database, cipher, signal))
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "secure_audit_trail=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Unknown commands and stray arguments show the help text and exit 0
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            e.print()?;
            return Ok(ExitCode::SUCCESS);
        }
        Err(_) => Cli { command: None },
    };

    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        println!();
        return Ok(ExitCode::SUCCESS);
    };

    let config = AppConfig::load()?;
    info!("Configuration loaded");

    match command {
        Commands::Register { event_type } => {
            let event_type = text_arg(event_type).unwrap_or_else(|| "manual_event".to_string());
            let data = EventData::new()
                .with("executed_by", current_user())
                .with("timestamp", Utc::now().timestamp());

            let ledger = open_ledger(&config).await?;
            let id = ledger.append(&event_type, &data).await?;
            println!("Event '{}' recorded (id {})", event_type, id);
        }

        Commands::Verify => {
            let ledger = open_ledger(&config).await?;
            match ledger.verify_chain().await? {
                ChainVerification::Intact { record_count, .. } => {
                    println!("Audit trail intact ({} records)", record_count);
                }
                ChainVerification::Broken(report) => {
                    println!("Audit trail COMPROMISED: {}", report.summary());
                }
            }
        }

        Commands::Rotate { new_secret } => {
            let Some(new_secret) = text_arg(new_secret) else {
                eprintln!("Usage: secure-audit rotate <new-secret>");
                return Ok(ExitCode::FAILURE);
            };

            let mut ledger = open_ledger(&config).await?;
            let backup = ledger.rotate_key(&new_secret).await?;
            println!("Previous key archived to {}", backup.path.display());
            println!("Update APP_KEY to the new secret before the next run");
        }

        Commands::Queue { event_type } => {
            let event_type = text_arg(event_type).unwrap_or_else(|| "queued_event".to_string());
            let data = EventData::new()
                .with("user", current_user())
                .with("from_cli", true)
                .with("timestamp", Utc::now().timestamp());

            let publisher = RabbitMqPublisher::from_config(&config);
            publisher
                .publish(&QueuedEvent::new(event_type.clone(), data))
                .await?;
            println!("Event '{}' queued on {}", event_type, publisher.queue());
        }

        Commands::List { limit } => {
            let ledger = open_ledger(&config).await?;
            let records = ledger.recent(list_limit(limit.as_deref())).await?;
            if records.is_empty() {
                println!("No audit records");
            }
            for record in records {
                println!(
                    "- [{}] {} @ {}",
                    record.id,
                    record.event_type,
                    record.created_at.format("%Y-%m-%d %H:%M:%S")
                );
            }
        }

        Commands::View { id } => {
            let Some(id) = record_id(id.as_deref()) else {
                eprintln!("Usage: secure-audit view <id> (id >= 1)");
                return Ok(ExitCode::FAILURE);
            };

            let ledger = open_ledger(&config).await?;
            match ledger.open_record(id).await? {
                Some(opened) => {
                    println!("Type: {}", opened.record.event_type);
                    println!("Date: {}", opened.record.created_at);
                    match opened.payload {
                        Ok(data) => println!("Content:\n{}", serde_json::to_string_pretty(&data)?),
                        Err(_) => println!("Content: [DECRYPTION FAILED]"),
                    }
                }
                None => println!("Record {} not found", id),
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}
