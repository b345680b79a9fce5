//! settle_day - run one date's batch settlement from the command line.
//!
//! This is the cron entry point: settle yesterday (or an explicit date) for
//! every agent and print the resulting sheet. Safe to repeat; reruns
//! overwrite the same per-agent records.

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::Parser;
use std::{path::PathBuf, sync::Arc};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use banca_backend::{
    settlement::{run_batch, MultiplierTable, PrizeTable},
    store::SettlementDb,
};

#[derive(Parser, Debug)]
#[command(name = "settle_day", about = "Batch-settle one date for every agent")]
struct Args {
    /// Date to settle (yyyy-MM-dd). Defaults to yesterday.
    #[arg(long)]
    date: Option<NaiveDate>,

    /// SQLite database path.
    #[arg(long, env = "BANCA_DB_PATH", default_value = "banca.db")]
    db: String,

    /// Optional TOML prize-table override.
    #[arg(long, env = "PRIZE_TABLE_PATH")]
    prize_table: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "banca_backend=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let date = match args.date {
        Some(d) => d,
        None => Local::now()
            .date_naive()
            .pred_opt()
            .context("no previous day")?,
    };

    let db = SettlementDb::open(&args.db).context("open settlement database")?;
    let prize_table: Arc<dyn PrizeTable> = match &args.prize_table {
        Some(path) => Arc::new(MultiplierTable::from_toml_file(path)?),
        None => Arc::new(MultiplierTable::default()),
    };

    let report = run_batch(&db, prize_table.as_ref(), date).await?;

    println!("settlement for {date}: {} agents settled", report.settled.len());
    for summary in &report.settled {
        println!(
            "  {:>8}  wagered {:>10.2}  commission {:>9.2}  prizes {:>9.2}  balance {:>11.2}",
            format!("{}-{:04}", summary.module, summary.position),
            summary.wagered,
            summary.commission,
            summary.prizes,
            summary.new_balance,
        );
    }

    if !report.failures.is_empty() {
        eprintln!("{} agent(s) failed:", report.failures.len());
        for failure in &report.failures {
            eprintln!("  {}: {}", failure.agent_id, failure.error);
        }
    }

    Ok(())
}
