pub mod disk;
pub mod memory;

use crate::core::types::{Holding, LeagueMember, Portfolio, TransactionRecord};
use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;

/// Everything a single trade changes. Persisted all-or-nothing: either the
/// whole commit becomes visible or none of it does.
#[derive(Debug, Clone)]
pub struct TradeCommit {
    pub portfolio: Portfolio,
    pub holding: Holding,
    pub transaction: TransactionRecord,
}

/// Durable keyed storage for portfolios, holdings, transactions, and league
/// membership. Implementations must make `commit_trade` atomic and the
/// create/add operations check-and-insert.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn portfolio(&self, id: &str) -> Result<Option<Portfolio>>;

    /// Insert a new portfolio. Returns `false` without writing if the id is
    /// already taken.
    async fn create_portfolio(&self, portfolio: &Portfolio) -> Result<bool>;

    async fn holding(&self, portfolio_id: &str, symbol: &str) -> Result<Option<Holding>>;

    /// All holdings of a portfolio, ordered by symbol.
    async fn holdings(&self, portfolio_id: &str) -> Result<Vec<Holding>>;

    /// Append-only history in execution order.
    async fn transactions(&self, portfolio_id: &str) -> Result<Vec<TransactionRecord>>;

    async fn commit_trade(&self, commit: &TradeCommit) -> Result<()>;

    /// Members in join order; empty means the league is unknown.
    async fn members(&self, league_id: &str) -> Result<Vec<LeagueMember>>;

    /// Insert a member. Returns `false` without writing if already a member.
    async fn add_member(&self, member: &LeagueMember) -> Result<bool>;

    /// Mark a milestone threshold as announced for a portfolio. Returns
    /// `true` only the first time a given (portfolio, threshold) is recorded.
    async fn record_milestone(&self, portfolio_id: &str, threshold: Decimal) -> Result<bool>;

    /// Delete a league and cascade to its portfolios, holdings, transactions,
    /// membership, and milestone markers.
    async fn remove_league(&self, league_id: &str) -> Result<()>;
}

pub(crate) fn milestone_key(portfolio_id: &str, threshold: Decimal) -> String {
    format!("{portfolio_id}#{}", threshold.normalize())
}
