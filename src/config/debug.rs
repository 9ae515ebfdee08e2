//! Debugging feature flags.

pub struct LogFlags {
    /// Cache hits, misses and stores
    pub log_cache: bool,
    /// Every outcome the collector receives
    pub log_collector: bool,
    /// Ledger upserts and checkpoint commits
    pub log_ledger: bool,
    /// Predicate errors swallowed into placeholders
    pub log_predicates: bool,
    /// Worker start/stop
    pub log_workers: bool,
    pub log_results_repo: bool,
}

pub const DF: LogFlags = LogFlags {
    log_cache: false,
    log_collector: false,
    log_ledger: false,
    log_predicates: true,
    log_workers: true,
    log_results_repo: false,
};

/// Activate trace_time macro (scope-level timing of pipeline stages)
pub const LOG_PERFORMANCE: bool = false;
