//! Daily bars in sqlite, and the blocking fetch adapter the workers use.

use {
    crate::{
        data::{DataFetcher, FetchError, FetchRequest},
        domain::Candle,
        models::OhlcvTimeSeries,
    },
    anyhow::{Context, Result},
    async_trait::async_trait,
    sqlx::{
        ConnectOptions, QueryBuilder, Row,
        sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow, SqliteSynchronous},
    },
    std::{str::FromStr, sync::Arc, time::Duration},
    tokio::runtime::Runtime,
};

/// SQLite caps bound parameters at 32766; a bar binds eight.
const BARS_PER_INSERT: usize = 32766 / 8;

/// WAL-mode options shared by the bar and ledger databases.
pub(crate) fn sqlite_options(db_path: &str, busy: Duration) -> Result<SqliteConnectOptions> {
    let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", db_path))
        .with_context(|| format!("Bad database path: {}", db_path))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(busy)
        .synchronous(SqliteSynchronous::Normal);
    Ok(options)
}

#[async_trait]
pub trait BarStore: Send + Sync {
    async fn initialize(&self) -> Result<()>;
    /// Open time of the newest stored bar
    async fn latest_bar_time(&self, symbol: &str, interval: &str) -> Result<Option<i64>>;
    /// Insert or overwrite bars. Returns the number written.
    async fn upsert_bars(&self, symbol: &str, interval: &str, bars: &[Candle]) -> Result<u64>;
    /// Newest `limit` bars, oldest first
    async fn recent_bars(&self, symbol: &str, interval: &str, limit: usize) -> Result<Vec<Candle>>;
}

pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    pub async fn new(db_path: &str) -> Result<Self> {
        let options = sqlite_options(db_path, Duration::from_secs(60))?
            .log_slow_statements(log::LevelFilter::Warn, Duration::from_secs(10));
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await
            .context("Failed to open bar database")?;
        Ok(Self { pool })
    }
}

fn bar_from_row(row: &SqliteRow) -> Result<Candle, sqlx::Error> {
    Ok(Candle::new(
        row.try_get("open_time")?,
        row.try_get("open")?,
        row.try_get("high")?,
        row.try_get("low")?,
        row.try_get("close")?,
        row.try_get("volume")?,
    ))
}

#[async_trait]
impl BarStore for SqliteStorage {
    async fn initialize(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS bars (
                symbol TEXT NOT NULL,
                interval TEXT NOT NULL,
                open_time INTEGER NOT NULL,
                open REAL NOT NULL,
                high REAL NOT NULL,
                low REAL NOT NULL,
                close REAL NOT NULL,
                volume REAL NOT NULL,
                PRIMARY KEY (symbol, interval, open_time)
            );",
        )
        .execute(&self.pool)
        .await
        .context("Failed to create bars table")?;
        Ok(())
    }

    async fn latest_bar_time(&self, symbol: &str, interval: &str) -> Result<Option<i64>> {
        let latest = sqlx::query_scalar::<_, Option<i64>>(
            "SELECT MAX(open_time) FROM bars WHERE symbol = ? AND interval = ?",
        )
        .bind(symbol)
        .bind(interval)
        .fetch_one(&self.pool)
        .await?;
        Ok(latest)
    }

    async fn upsert_bars(&self, symbol: &str, interval: &str, bars: &[Candle]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        for chunk in bars.chunks(BARS_PER_INSERT) {
            let mut insert = QueryBuilder::new(
                "INSERT OR REPLACE INTO bars (symbol, interval, open_time, open, high, low, close, volume) ",
            );
            insert.push_values(chunk, |mut row, bar| {
                row.push_bind(symbol)
                    .push_bind(interval)
                    .push_bind(bar.timestamp_ms)
                    .push_bind(bar.open)
                    .push_bind(bar.high)
                    .push_bind(bar.low)
                    .push_bind(bar.close)
                    .push_bind(bar.volume);
            });
            insert.build().execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(bars.len() as u64)
    }

    async fn recent_bars(&self, symbol: &str, interval: &str, limit: usize) -> Result<Vec<Candle>> {
        let rows = sqlx::query(
            "SELECT * FROM (
                SELECT open_time, open, high, low, close, volume
                FROM bars
                WHERE symbol = ? AND interval = ?
                ORDER BY open_time DESC
                LIMIT ?
            ) ORDER BY open_time ASC",
        )
        .bind(symbol)
        .bind(interval)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let bars = rows.iter().map(bar_from_row).collect::<Result<Vec<_>, _>>()?;
        Ok(bars)
    }
}

/// Lets worker threads read bars out of [`SqliteStorage`] by blocking on the shared runtime.
pub struct SqliteFetcher {
    storage: Arc<SqliteStorage>,
    runtime: Arc<Runtime>,
}

impl SqliteFetcher {
    pub fn new(storage: Arc<SqliteStorage>, runtime: Arc<Runtime>) -> Self {
        Self { storage, runtime }
    }
}

impl DataFetcher for SqliteFetcher {
    fn fetch(&self, request: &FetchRequest<'_>) -> Result<OhlcvTimeSeries, FetchError> {
        if request.proxy.is_some() {
            log::debug!("{}: proxy ignored for local storage", request.symbol);
        }
        let bars = self
            .runtime
            .block_on(self.storage.recent_bars(request.symbol, request.duration, request.period))
            .map_err(|e| FetchError::Transient {
                symbol: request.symbol.to_string(),
                message: format!("{:#}", e),
            })?;

        if bars.is_empty() {
            return Err(FetchError::Empty {
                symbol: request.symbol.to_string(),
            });
        }
        Ok(OhlcvTimeSeries::from_candles(request.symbol, request.duration, &bars))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(day: i64, close: f64) -> Candle {
        Candle::new(day * crate::utils::MS_IN_D, close, close + 1.0, close - 1.0, close, 100.0)
    }

    #[tokio::test]
    async fn recent_bars_are_the_newest_in_time_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bars.db");
        let store = SqliteStorage::new(path.to_str().unwrap()).await.unwrap();
        store.initialize().await.unwrap();

        let bars: Vec<Candle> = (0..10).map(|d| bar(d, 100.0 + d as f64)).collect();
        assert_eq!(store.upsert_bars("ACME", "1d", &bars).await.unwrap(), 10);
        // rewriting a day replaces it
        store.upsert_bars("ACME", "1d", &[bar(9, 50.0)]).await.unwrap();

        let recent = store.recent_bars("ACME", "1d", 3).await.unwrap();
        let closes: Vec<f64> = recent.iter().map(|c| c.close).collect();
        assert_eq!(closes, vec![107.0, 108.0, 50.0]);
        assert_eq!(
            store.latest_bar_time("ACME", "1d").await.unwrap(),
            Some(9 * crate::utils::MS_IN_D)
        );
        assert_eq!(store.latest_bar_time("OTHER", "1d").await.unwrap(), None);
    }
}
