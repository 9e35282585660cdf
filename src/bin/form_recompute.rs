use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use football_ingest::config::Config;
use football_ingest::form::recompute_form_scores;
use football_ingest::logging;
use football_ingest::store::Store;

/// Recomputes the rolling form score of every stored player observation.
#[derive(Parser)]
#[command(author, version, long_about = None)]
struct Cli {
    /// SQLite database path (default from DATABASE_PATH)
    #[arg(long, value_name = "FILE")]
    db: Option<PathBuf>,

    /// Number of most recent observations averaged per player (default from FORM_WINDOW)
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    window: Option<u64>,
}

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");

    let cli = Cli::parse();
    let mut cfg = Config::from_env();
    if let Some(path) = cli.db {
        cfg.db_path = path;
    }
    if let Some(window) = cli.window {
        cfg.form_window = usize::try_from(window).unwrap_or(usize::MAX);
    }
    logging::init(&cfg.log)?;

    let mut store = Store::open(&cfg.db_path)?;
    let summary = recompute_form_scores(&mut store, cfg.form_window);
    store.close()?;
    let summary = summary?;

    println!("Form recompute complete");
    println!("DB: {}", cfg.db_path.display());
    println!("Window: last {} observations", cfg.form_window);
    println!("Players: {}", summary.players);
    println!("Rows updated: {}", summary.rows_updated);
    Ok(())
}
