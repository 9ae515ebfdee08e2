// Domain types and value objects
mod candle;
mod strategy;

// Re-export commonly used types to the world
pub use candle::{Candle, CandleType};
pub use strategy::{ChartPattern, ReversalKind, ScanMode, StrategySelector};
