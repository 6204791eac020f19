//! Core business logic abstractions

pub mod cache;
pub mod log;
pub mod oracle;
pub mod types;

// Re-export main types for cleaner imports
pub use oracle::{PriceOracle, Quote};
pub use types::{
    Holding, LeaderboardEntry, LeagueMember, Portfolio, PortfolioContext, Side, TradeRequest,
    TransactionRecord,
};
