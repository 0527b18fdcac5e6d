//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `core` - Shared context (config, dataset) and token parsing
//! - `config` - Print the effective configuration
//! - `predict` - Row-by-row prediction scan
//! - `query` - Evidence diff, exclusive and bivariate rankings
//! - `search` - Greedy and convergent combination searches

pub mod config;
pub mod core;
pub mod predict;
pub mod query;
pub mod search;

// Re-export command functions for main.rs
pub use config::*;
pub use self::core::*;
pub use predict::*;
pub use query::*;
pub use search::*;

/// Truncate a string to a maximum length, adding "..." if truncated
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
