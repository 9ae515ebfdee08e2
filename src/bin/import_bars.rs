use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use market_sieve::PERSISTENCE;
use market_sieve::data::{BarStore, SqliteStorage};
use market_sieve::domain::Candle;
use market_sieve::utils::epoch_ms_to_date_string;

/// Load daily bars into the screener database.
///
/// Every `<SYMBOL>.json` file in the input directory holds an array of candles
/// (`timestamp_ms`, `open`, `high`, `low`, `close`, `volume`). Only candles newer
/// than what the database already has for the symbol are written.
#[derive(Parser, Debug)]
struct Args {
    /// Directory of <SYMBOL>.json files
    input: PathBuf,

    #[arg(long, default_value = PERSISTENCE.ledger.database_path)]
    db: String,

    /// Candle duration the bars are stored under
    #[arg(long, default_value = "1d")]
    interval: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Setup Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    // 2. Connect to DB
    if let Some(parent) = PathBuf::from(&args.db).parent() {
        std::fs::create_dir_all(parent)?;
    }
    let storage = SqliteStorage::new(&args.db)
        .await
        .with_context(|| format!("Failed to open {}", args.db))?;
    storage.initialize().await?;

    // 3. Walk the input directory
    let mut entries: Vec<PathBuf> = std::fs::read_dir(&args.input)
        .with_context(|| format!("Failed to read {}", args.input.display()))?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    entries.sort();

    let mut total = 0u64;
    for path in entries {
        let Some(symbol) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let text = std::fs::read_to_string(&path)?;
        let mut candles: Vec<Candle> = match serde_json::from_str(&text) {
            Ok(c) => c,
            Err(e) => {
                log::warn!("Skipping {}: {}", path.display(), e);
                continue;
            }
        };
        candles.sort_by_key(|c| c.timestamp_ms);

        if let Some(last) = storage.latest_bar_time(symbol, &args.interval).await? {
            candles.retain(|c| c.timestamp_ms > last);
        }
        if candles.is_empty() {
            log::info!("{}: up to date", symbol);
            continue;
        }

        let written = storage.upsert_bars(symbol, &args.interval, &candles).await?;
        total += written;
        log::info!(
            "{}: {} bars ({} .. {})",
            symbol,
            written,
            epoch_ms_to_date_string(candles[0].timestamp_ms),
            epoch_ms_to_date_string(candles[candles.len() - 1].timestamp_ms)
        );
    }

    log::info!("Imported {} bars into {}", total, args.db);
    Ok(())
}
