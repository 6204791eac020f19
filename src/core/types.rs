//! Domain records for the portfolio ledger.
//!
//! Everything here is plain serde data. Mutation goes through the engine;
//! transactions in particular are append-only and never rewritten.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt::Display;

use crate::error::EngineError;

/// Scope a portfolio belongs to: the owner's personal book or a league.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "league", rename_all = "snake_case")]
pub enum PortfolioContext {
    Personal,
    League(String),
}

impl PortfolioContext {
    /// League id, if this is a league context.
    pub fn league(&self) -> Option<&str> {
        match self {
            PortfolioContext::Personal => None,
            PortfolioContext::League(id) => Some(id),
        }
    }

    /// Stable portfolio id for an (owner, context) pair. A portfolio is
    /// created exactly once per pair, so the pair itself is the key.
    pub fn key_of(&self, owner: &str) -> String {
        match self {
            PortfolioContext::Personal => format!("personal/{owner}"),
            PortfolioContext::League(id) => format!("league/{id}/{owner}"),
        }
    }
}

impl Display for PortfolioContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PortfolioContext::Personal => write!(f, "personal"),
            PortfolioContext::League(id) => write!(f, "league/{id}"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Portfolio {
    pub id: String,
    pub owner: String,
    pub context: PortfolioContext,
    /// Invariant: never negative.
    pub cash: Decimal,
    pub created_at: DateTime<Utc>,
    /// Sequence number of the most recent transaction (0 = none yet).
    pub last_seq: u64,
}

/// Position in one symbol. Zero-share rows are retained after a position
/// closes, with the basis reset to zero; `shares` never goes negative.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Holding {
    pub portfolio_id: String,
    pub symbol: String,
    pub shares: Decimal,
    /// Weighted-average purchase price of the current shares.
    pub cost_basis: Decimal,
    pub updated_at: DateTime<Utc>,
}

impl Holding {
    /// The zero-value holding: absence of a position is never an error.
    pub fn zero(portfolio_id: &str, symbol: &str) -> Self {
        Holding {
            portfolio_id: portfolio_id.to_string(),
            symbol: symbol.to_string(),
            shares: Decimal::ZERO,
            cost_basis: Decimal::ZERO,
            updated_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// Append-only trade record; immutable once written. The transaction log is
/// the sole source of truth for historical reconstruction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub portfolio_id: String,
    /// Per-portfolio sequence number, assigned inside the atomic commit.
    pub seq: u64,
    pub symbol: String,
    pub side: Side,
    pub shares: Decimal,
    /// Price at execution, the single point of truth for this trade.
    pub price: Decimal,
    pub fee: Decimal,
    /// Cash balance after this trade was applied.
    pub cash_after: Decimal,
    pub executed_at: DateTime<Utc>,
    pub note: Option<String>,
}

/// A trade request as it enters the executor: closed side variant, strictly
/// typed decimal quantities, validated at the boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRequest {
    pub symbol: String,
    pub side: Side,
    pub shares: Decimal,
    #[serde(default)]
    pub note: Option<String>,
}

impl TradeRequest {
    pub fn new(symbol: &str, side: Side, shares: Decimal) -> Self {
        TradeRequest {
            symbol: symbol.to_string(),
            side,
            shares,
            note: None,
        }
    }

    pub fn with_note(mut self, note: &str) -> Self {
        self.note = Some(note.to_string());
        self
    }

    pub(crate) fn validate(&self, allow_fractional: bool) -> Result<(), EngineError> {
        if self.symbol.trim().is_empty() {
            return Err(EngineError::InvalidTrade("symbol must not be empty".into()));
        }
        if self.shares <= Decimal::ZERO {
            return Err(EngineError::InvalidTrade(format!(
                "share count must be positive, got {}",
                self.shares
            )));
        }
        if !allow_fractional && !self.shares.fract().is_zero() {
            return Err(EngineError::InvalidTrade(format!(
                "fractional shares are not enabled, got {}",
                self.shares
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeagueMember {
    pub league_id: String,
    pub user_id: String,
    pub is_admin: bool,
    pub joined_at: DateTime<Utc>,
}

/// Derived, never hand-edited: recomputed from holdings and live prices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub league_id: String,
    pub user_id: String,
    pub total_value: Decimal,
    /// 1-based position, descending by total value.
    pub rank: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn portfolio_key_is_stable_per_owner_and_context() {
        assert_eq!(PortfolioContext::Personal.key_of("alice"), "personal/alice");
        assert_eq!(
            PortfolioContext::League("summer".into()).key_of("alice"),
            "league/summer/alice"
        );
    }

    #[test]
    fn side_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&Side::Buy).unwrap(), "\"BUY\"");
        assert_eq!(Side::Sell.to_string(), "SELL");
    }

    #[test]
    fn trade_request_rejects_non_positive_shares() {
        let req = TradeRequest::new("AAPL", Side::Buy, Decimal::ZERO);
        assert!(matches!(
            req.validate(false),
            Err(EngineError::InvalidTrade(_))
        ));
    }

    #[test]
    fn trade_request_rejects_fractional_unless_enabled() {
        let req = TradeRequest::new("AAPL", Side::Buy, "1.5".parse().unwrap());
        assert!(matches!(
            req.validate(false),
            Err(EngineError::InvalidTrade(_))
        ));
        assert!(req.validate(true).is_ok());
    }

    #[test]
    fn trade_request_rejects_blank_symbol() {
        let req = TradeRequest::new("  ", Side::Sell, Decimal::ONE);
        assert!(matches!(
            req.validate(false),
            Err(EngineError::InvalidTrade(_))
        ));
    }

    #[test]
    fn zero_holding_has_no_shares_and_no_basis() {
        let h = Holding::zero("personal/alice", "AAPL");
        assert_eq!(h.shares, Decimal::ZERO);
        assert_eq!(h.cost_basis, Decimal::ZERO);
    }
}
