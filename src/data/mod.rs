mod cache;
mod cache_file;
mod ledger_io;
mod provider;
mod results_repo;
mod storage;

pub use {
    cache::SharedCache,
    cache_file::{default_cache_path, load_cache, save_cache},
    ledger_io::{load_ledger, save_ledger},
    provider::{DataFetcher, FetchError, FetchRequest},
    results_repo::{OutcomeCommitter, SqliteLedgerStore},
    storage::{BarStore, SqliteFetcher, SqliteStorage},
};
