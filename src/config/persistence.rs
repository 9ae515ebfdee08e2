//! File persistence and serialization configuration

/// Configuration for dataset cache persistence
pub struct CachePersistenceConfig {
    /// Directory path for storing cache files
    pub directory: &'static str,
    /// Base filename for cache files (without extension)
    pub filename_base: &'static str,
    /// Current version of the cache serialization format
    pub version: f64,
}

/// Configuration for backtest ledger artefacts
pub struct LedgerPersistenceConfig {
    /// Interim snapshot written at every flush (bincode)
    pub snapshot_path: &'static str,
    /// Default sqlite database for checkpoint commits
    pub database_path: &'static str,
}

/// The Master Persistence Configuration
pub struct PersistenceConfig {
    pub cache: CachePersistenceConfig,
    pub ledger: LedgerPersistenceConfig,
}

pub const PERSISTENCE: PersistenceConfig = PersistenceConfig {
    cache: CachePersistenceConfig {
        directory: "sieve_data",
        filename_base: "stock_data",
        version: 1.0,
    },
    ledger: LedgerPersistenceConfig {
        snapshot_path: "sieve_data/ledger_snapshot.bin",
        database_path: "sieve_data/market.sqlite",
    },
};

/// Generate a duration-specific cache filename
/// Example: "stock_data_1d_v1.bin"
pub fn cache_filename(duration: &str) -> String {
    format!(
        "{}_{}_v{}.bin",
        PERSISTENCE.cache.filename_base, duration, PERSISTENCE.cache.version
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filename_carries_duration_and_version() {
        assert_eq!(cache_filename("1d"), "stock_data_1d_v1.bin");
    }
}
