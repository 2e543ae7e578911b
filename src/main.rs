use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use paycore::application::notify::NotificationHandler;
use paycore::config::AppConfig;
use paycore::domain::ports::LedgerHandle;
use paycore::infrastructure::event_bus::{EventBus, PAYMENT_NOTIFY_TOPIC};
use paycore::infrastructure::factory::build_manager;
use paycore::infrastructure::in_memory::InMemoryLedger;
use paycore::interfaces::http::{router, serve};
use paycore::logger;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

const EVENT_BUS_CAPACITY: usize = 1024;
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (TOML, YAML or JSON). `PAYCORE__*` variables override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to persistent idempotency ledger (optional). If provided, uses RocksDB.
    #[arg(long)]
    ledger_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the notification endpoint.
    Serve,
    /// Validate configuration and key material, then exit.
    Check,
}

fn open_ledger(path: Option<PathBuf>, ttl: Duration) -> Result<(LedgerHandle, &'static str)> {
    match path {
        #[cfg(feature = "storage-rocksdb")]
        Some(path) => {
            let ledger = paycore::infrastructure::rocksdb::RocksDbLedger::open(path, ttl)
                .into_diagnostic()?;
            Ok((Arc::new(ledger), "rocksdb"))
        }
        #[cfg(not(feature = "storage-rocksdb"))]
        Some(_) => {
            eprintln!(
                "WARNING: Persistent ledger requested via --ledger-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory ledger."
            );
            Ok((Arc::new(in_memory_ledger(ttl)), "in-memory"))
        }
        None => Ok((Arc::new(in_memory_ledger(ttl)), "in-memory")),
    }
}

fn in_memory_ledger(ttl: Duration) -> InMemoryLedger {
    let ledger = InMemoryLedger::new(ttl);
    ledger.spawn_sweeper(SWEEP_INTERVAL);
    ledger
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut cfg = AppConfig::load(cli.config.as_deref()).into_diagnostic()?;
    logger::setup(&cfg.log);

    if cli.ledger_path.is_some() {
        cfg.ledger.path = cli.ledger_path;
    }
    let manager = build_manager(&cfg.pay).into_diagnostic()?;
    let (ledger, ledger_kind) = open_ledger(cfg.ledger.path.clone(), cfg.pay.dedup_ttl())?;

    match cli.command {
        Command::Check => {
            println!("drivers: {}", manager.driver_names().join(","));
            println!("default: {}", manager.default_driver_name().unwrap_or("-"));
            println!("ledger: {ledger_kind}");
        }
        Command::Serve => {
            let bus = EventBus::new(EVENT_BUS_CAPACITY);
            let mut events = bus.subscribe();
            tokio::spawn(async move {
                loop {
                    match events.recv().await {
                        Ok(event) => info!(
                            topic = PAYMENT_NOTIFY_TOPIC,
                            key = %event.idempotency_key,
                            event_type = %event.event_type,
                            "payment event"
                        ),
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(topic = PAYMENT_NOTIFY_TOPIC, skipped, "event consumer lagged")
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
            });

            let handler = NotificationHandler::new(Arc::new(manager), ledger, Arc::new(bus));
            let addr = (cfg.server.host.as_str(), cfg.server.port);
            let listener = tokio::net::TcpListener::bind(addr)
                .await
                .into_diagnostic()?;
            serve(listener, router(Arc::new(handler)), shutdown_signal())
                .await
                .into_diagnostic()?;
        }
    }

    Ok(())
}
