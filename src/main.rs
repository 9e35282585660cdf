use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use rusqlite::types::Value as SqlValue;
use tracing::{info, warn};

use football_ingest::api_client::RateLimitedClient;
use football_ingest::config::{Config, parse_competitions};
use football_ingest::logging;
use football_ingest::scheduler::{IngestCycle, Scheduler, StopSignal};
use football_ingest::snapshot::SnapshotArchiver;
use football_ingest::store::{Store, Table};

/// Periodically pulls recent fixtures from football-data.org into SQLite.
#[derive(Parser)]
#[command(author, version, long_about = None)]
struct Cli {
    /// Fetch interval in minutes (default from FETCH_INTERVAL_MINUTES)
    #[arg(long, value_name = "MINUTES")]
    interval: Option<u64>,

    /// Run a single cycle and exit
    #[arg(long)]
    once: bool,

    /// Size of the recent window in days
    #[arg(long)]
    days: Option<u32>,

    /// Competition codes, e.g. PL,CL
    #[arg(long, value_name = "CODES")]
    competitions: Option<String>,

    /// SQLite database path
    #[arg(long, value_name = "FILE")]
    db: Option<PathBuf>,

    /// Print the analytics summary from the database and exit
    #[arg(long)]
    summary: bool,
}

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");

    let cli = Cli::parse();
    let cfg = resolve_config(&cli);
    logging::init(&cfg.log)?;

    let store = Store::open(&cfg.db_path).context("database unreachable at startup")?;

    if cli.summary {
        print_summary(&store)?;
        return store.close();
    }

    let archiver = cfg.snapshot_dir.clone().map(SnapshotArchiver::new);
    let client = RateLimitedClient::from_config(cfg.api.clone(), archiver)?;

    let stop = StopSignal::new();
    stop.install_signal_handler()?;

    info!(
        competitions = ?cfg.competitions,
        interval_min = cfg.interval.as_secs() / 60,
        days = cfg.window_days,
        "scheduler initialized"
    );
    let cycle = IngestCycle::new(
        client,
        store,
        cfg.competitions.clone(),
        cfg.window_days,
        stop.clone(),
    );
    let scheduler = Scheduler::new(cycle, cfg.interval, stop);

    let stats = if cli.once {
        scheduler.run_once()?
    } else {
        scheduler.start()?
    };
    if stats.failures > 0 {
        warn!(failures = stats.failures, cycles = stats.cycles, "some cycles failed");
    }
    Ok(())
}

fn resolve_config(cli: &Cli) -> Config {
    let mut cfg = Config::from_env();
    if let Some(minutes) = cli.interval {
        cfg = cfg.with_interval_minutes(minutes);
    }
    if let Some(days) = cli.days {
        cfg.window_days = days.clamp(1, 60);
    }
    if let Some(raw) = cli.competitions.as_deref() {
        let codes = parse_competitions(raw);
        if !codes.is_empty() {
            cfg.competitions = codes;
        }
    }
    if let Some(db) = cli.db.as_ref() {
        cfg.db_path = db.clone();
    }
    cfg
}

fn print_summary(store: &Store) -> Result<()> {
    let summary = store.analytics_summary()?;
    println!("Analytics summary");
    println!("Total matches: {}", summary.total_matches);
    println!("Total goals: {}", summary.total_goals);
    println!("Teams tracked: {}", summary.team_performance.len());
    println!();
    println!("Team performance");
    print_table(&summary.team_performance);
    println!();
    println!("Recent matches");
    print_table(&summary.recent_matches);
    if !summary.top_scorers.is_empty() {
        println!();
        println!("Top scorers");
        print_table(&summary.top_scorers);
    }
    Ok(())
}

fn print_table(table: &Table) {
    if table.is_empty() {
        println!("  (none)");
        return;
    }
    println!("  {}", table.columns.join(" | "));
    for row in &table.rows {
        let cells: Vec<String> = row.iter().map(format_cell).collect();
        println!("  {}", cells.join(" | "));
    }
}

fn format_cell(value: &SqlValue) -> String {
    match value {
        SqlValue::Null => "-".to_string(),
        SqlValue::Integer(n) => n.to_string(),
        SqlValue::Real(f) => format!("{f:.4}"),
        SqlValue::Text(s) => s.clone(),
        SqlValue::Blob(b) => format!("<{} bytes>", b.len()),
    }
}
