use {
    crate::{
        config::DF, config::constants::FORWARD_HORIZONS, data::storage::sqlite_options,
        models::OutcomeLedger,
    },
    anyhow::{Context, Result},
    sqlx::{
        QueryBuilder,
        sqlite::{SqlitePool, SqlitePoolOptions},
    },
    std::{sync::Arc, time::Duration},
    tokio::runtime::Runtime,
};

/// Durable sink for backtest checkpoints. Called from the collector thread.
pub trait OutcomeCommitter: Send + Sync {
    fn commit(&self, run_id: &str, ledger: &OutcomeLedger) -> Result<()>;
}

/// Writes ledger rows into sqlite, one row per (run, item, offset, horizon).
pub struct SqliteLedgerStore {
    pool: SqlitePool,
    runtime: Arc<Runtime>,
}

impl SqliteLedgerStore {
    pub async fn new(db_path: &str, runtime: Arc<Runtime>) -> Result<Self> {
        let connection_options = sqlite_options(db_path, Duration::from_secs(10))?;

        let pool = SqlitePoolOptions::new()
            .max_connections(2) // Low connection count, this is low throughput
            .connect_with(connection_options)
            .await
            .context("Failed to connect to ledger database")?;

        let store = Self { pool, runtime };
        store.initialize().await?;
        Ok(store)
    }

    async fn initialize(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS backtest_outcomes (
                run_id TEXT NOT NULL,
                symbol TEXT NOT NULL,
                offset INTEGER NOT NULL,
                horizon INTEGER NOT NULL,
                as_of_ms INTEGER NOT NULL,
                entry_close REAL NOT NULL,
                return_pct REAL,
                sell_signal INTEGER NOT NULL,
                PRIMARY KEY (run_id, symbol, offset, horizon)
            );",
        )
        .execute(&self.pool)
        .await
        .context("Failed to create backtest_outcomes table")?;
        Ok(())
    }

    async fn write(&self, run_id: &str, ledger: &OutcomeLedger) -> Result<u64> {
        let rows = ledger.rows();
        let flat: Vec<_> = rows
            .iter()
            .flat_map(|row| {
                FORWARD_HORIZONS
                    .iter()
                    .zip(row.returns.iter())
                    .map(move |(h, r)| (*row, *h, *r))
            })
            .collect();

        let mut tx = self.pool.begin().await?;
        // 8 binds per row, well inside SQLite's parameter limit
        for chunk in flat.chunks(2000) {
            let mut qb = QueryBuilder::new(
                "INSERT OR REPLACE INTO backtest_outcomes \
                 (run_id, symbol, offset, horizon, as_of_ms, entry_close, return_pct, sell_signal) ",
            );
            qb.push_values(chunk, |mut b, (row, horizon, ret)| {
                b.push_bind(run_id)
                    .push_bind(row.symbol.clone())
                    .push_bind(row.offset as i64)
                    .push_bind(*horizon as i64)
                    .push_bind(row.as_of_ms)
                    .push_bind(row.entry_close)
                    .push_bind(*ret)
                    .push_bind(row.sell_signal);
            });
            qb.build().execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(flat.len() as u64)
    }
}

impl OutcomeCommitter for SqliteLedgerStore {
    fn commit(&self, run_id: &str, ledger: &OutcomeLedger) -> Result<()> {
        let written = self
            .runtime
            .block_on(self.write(run_id, ledger))
            .context("Failed to commit backtest ledger")?;
        if DF.log_results_repo {
            log::info!("RESULTS DB: run {} committed {} outcome rows", run_id, written);
        }
        Ok(())
    }
}
