// Screening algorithms: indicators, candle patterns, predicates and the decision table
pub mod candle_patterns;
pub mod indicators;
pub mod predicates;
pub mod preprocess;
pub mod strategy_table;

pub use predicates::{PredicateError, PredicateInput, Records, run_battery};
pub use preprocess::{ProcessedView, preprocess};
pub use strategy_table::{Rule, Signal, SignalSet, rule_for};
