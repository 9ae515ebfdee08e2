//! Configuration module for the screener.

// Can all be private now because we have a public re-export.
mod debug;
mod persistence;
mod screener;

// Public
pub mod constants;

// Re-export commonly used items
pub use debug::{DF, LOG_PERFORMANCE};
pub use persistence::{PERSISTENCE, cache_filename};
pub use screener::ScreenerConfig;
