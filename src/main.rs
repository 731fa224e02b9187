use clap::Parser;
use gem_ledger::application::engine::OrderEngine;
use gem_ledger::config::LedgerConfig;
use gem_ledger::domain::ids::SellerId;
use gem_ledger::domain::ports::OrderStoreBox;
use gem_ledger::infrastructure::clock::SystemClock;
use gem_ledger::infrastructure::events::BroadcastPublisher;
use gem_ledger::infrastructure::in_memory::{InMemoryOrderStore, InMemoryPayoutGateway};
use gem_ledger::interfaces::csv::order_writer::OrderWriter;
use gem_ledger::interfaces::json::command_reader::CommandReader;
use gem_ledger::telemetry;
use miette::{IntoDiagnostic, Result};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::PathBuf;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input commands file (JSON lines)
    input: PathBuf,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[cfg(feature = "storage-rocksdb")]
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// JSON object mapping seller ids to payout account references
    #[arg(long)]
    payout_accounts: Option<PathBuf>,

    /// Days after shipment before delivery is confirmed automatically
    #[arg(long, env = "LEDGER_AUTO_CONFIRM_DAYS", default_value_t = 14)]
    auto_confirm_days: i64,

    /// Platform commission withheld from item subtotals at payout, e.g. 0.1
    #[arg(long, env = "LEDGER_COMMISSION_RATE", default_value_t = Decimal::ZERO)]
    commission_rate: Decimal,

    /// Retries after a version conflict before an operation gives up
    #[arg(long, env = "LEDGER_MAX_RETRIES", default_value_t = 5)]
    max_retries: u32,

    /// Log level used when RUST_LOG is not set
    #[arg(long, env = "LEDGER_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

impl Cli {
    #[cfg(feature = "storage-rocksdb")]
    fn open_store(&self) -> Result<OrderStoreBox> {
        use gem_ledger::infrastructure::rocksdb::RocksDBStore;

        Ok(match &self.db_path {
            Some(db_path) => Box::new(RocksDBStore::open(db_path).into_diagnostic()?),
            None => Box::new(InMemoryOrderStore::new()),
        })
    }

    #[cfg(not(feature = "storage-rocksdb"))]
    fn open_store(&self) -> Result<OrderStoreBox> {
        Ok(Box::new(InMemoryOrderStore::new()))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    telemetry::init(&cli.log_level);

    let config = LedgerConfig::default()
        .with_auto_confirm_days(cli.auto_confirm_days)
        .with_commission_rate(cli.commission_rate)
        .with_max_conflict_retries(cli.max_retries);

    let payouts = InMemoryPayoutGateway::new();
    if let Some(path) = &cli.payout_accounts {
        let file = File::open(path).into_diagnostic()?;
        let accounts: HashMap<String, String> =
            serde_json::from_reader(BufReader::new(file)).into_diagnostic()?;
        for (seller_id, account_ref) in accounts {
            payouts.register_account(SellerId::new(seller_id), account_ref).await;
        }
    }

    let publisher = BroadcastPublisher::default();
    let mut events = publisher.subscribe();
    let listener = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => info!(
                    event = event.name(),
                    order_number = %event.order_number(),
                    "domain event"
                ),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "event listener lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let engine = OrderEngine::new(
        cli.open_store()?,
        Box::new(payouts),
        Box::new(publisher),
        Box::new(SystemClock),
        config,
    )
    .into_diagnostic()?;

    // Process commands
    let file = File::open(&cli.input).into_diagnostic()?;
    let reader = CommandReader::new(BufReader::new(file));
    for command_result in reader.commands() {
        match command_result {
            Ok(command) => {
                let name = command.name();
                if let Err(e) = engine.execute(command).await {
                    warn!(command = name, error = %e, "error processing command");
                }
            }
            Err(e) => {
                warn!(error = %e, "error reading command");
            }
        }
    }

    let orders = engine.all_orders().await.into_diagnostic()?;

    // Closing the channel lets the listener drain and exit
    drop(engine);
    listener.await.into_diagnostic()?;

    let stdout = io::stdout();
    let mut writer = OrderWriter::new(stdout.lock());
    writer.write_orders(&orders).into_diagnostic()?;

    Ok(())
}
