//! Portfolio engine: owns the portfolio/holding invariants.
//!
//! Queries are public; the single mutation primitive [`PortfolioEngine::apply_delta`]
//! is crate-private and only reachable through the trade executor, which
//! holds the portfolio's lock while calling it.

use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, error};

use crate::core::types::{Holding, Portfolio, PortfolioContext, Side, TransactionRecord};
use crate::error::{EngineError, EngineResult};
use crate::store::{LedgerStore, TradeCommit};

/// Fields of the transaction row the executor already knows; the rest
/// (sequence, resulting cash) is filled in at commit time.
#[derive(Debug, Clone)]
pub(crate) struct TradeDraft {
    pub side: Side,
    pub fee: Decimal,
    pub note: Option<String>,
}

#[derive(Clone)]
pub struct PortfolioEngine {
    store: Arc<dyn LedgerStore>,
}

impl PortfolioEngine {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        PortfolioEngine { store }
    }

    pub async fn create_portfolio(
        &self,
        owner: &str,
        context: PortfolioContext,
        starting_cash: Decimal,
    ) -> EngineResult<Portfolio> {
        if starting_cash < Decimal::ZERO {
            return Err(EngineError::InvariantViolation(format!(
                "starting cash must be non-negative, got {starting_cash}"
            )));
        }
        let portfolio = Portfolio {
            id: context.key_of(owner),
            owner: owner.to_string(),
            context: context.clone(),
            cash: starting_cash,
            created_at: Utc::now(),
            last_seq: 0,
        };
        if self.store.create_portfolio(&portfolio).await? {
            debug!(id = %portfolio.id, %starting_cash, "Portfolio created");
            Ok(portfolio)
        } else {
            Err(EngineError::AlreadyExists {
                owner: owner.to_string(),
                context: context.to_string(),
            })
        }
    }

    pub async fn get_portfolio(
        &self,
        owner: &str,
        context: &PortfolioContext,
    ) -> EngineResult<Portfolio> {
        self.portfolio_by_id(&context.key_of(owner)).await
    }

    pub async fn portfolio_by_id(&self, portfolio_id: &str) -> EngineResult<Portfolio> {
        self.store
            .portfolio(portfolio_id)
            .await?
            .ok_or_else(|| EngineError::NotFound {
                entity: "portfolio",
                id: portfolio_id.to_string(),
            })
    }

    /// Absence of a position is answered with the zero-value holding, never
    /// an error; only an unknown portfolio is.
    pub async fn get_holding(&self, portfolio_id: &str, symbol: &str) -> EngineResult<Holding> {
        self.portfolio_by_id(portfolio_id).await?;
        Ok(self
            .store
            .holding(portfolio_id, symbol)
            .await?
            .unwrap_or_else(|| Holding::zero(portfolio_id, symbol)))
    }

    pub async fn holdings(&self, portfolio_id: &str) -> EngineResult<Vec<Holding>> {
        self.portfolio_by_id(portfolio_id).await?;
        Ok(self.store.holdings(portfolio_id).await?)
    }

    pub async fn transactions(&self, portfolio_id: &str) -> EngineResult<Vec<TransactionRecord>> {
        self.portfolio_by_id(portfolio_id).await?;
        Ok(self.store.transactions(portfolio_id).await?)
    }

    /// The only mutation primitive. Re-reads current state, validates the
    /// deltas against it, computes the post-trade records, and persists
    /// portfolio, holding, and transaction in one atomic store commit.
    ///
    /// Caller must hold the portfolio's exclusion for the whole
    /// read-validate-commit span.
    pub(crate) async fn apply_delta(
        &self,
        portfolio_id: &str,
        symbol: &str,
        shares_delta: Decimal,
        price_for_basis: Decimal,
        cash_delta: Decimal,
        draft: TradeDraft,
    ) -> EngineResult<(Holding, TransactionRecord)> {
        let mut portfolio = self.portfolio_by_id(portfolio_id).await?;
        let mut holding = self
            .store
            .holding(portfolio_id, symbol)
            .await?
            .unwrap_or_else(|| Holding::zero(portfolio_id, symbol));

        if shares_delta < Decimal::ZERO && -shares_delta > holding.shares {
            return Err(EngineError::InsufficientShares {
                symbol: symbol.to_string(),
                owned: holding.shares,
                requested: -shares_delta,
            });
        }
        if cash_delta < Decimal::ZERO && portfolio.cash + cash_delta < Decimal::ZERO {
            return Err(EngineError::InsufficientFunds {
                available: portfolio.cash,
                required: -cash_delta,
            });
        }

        let new_shares = holding.shares + shares_delta;
        let new_cash = portfolio.cash + cash_delta;

        // Weighted average on buys; sells keep the basis, and a closed
        // position resets it (zero rows are retained, see DESIGN.md).
        let new_basis = if shares_delta > Decimal::ZERO {
            (holding.shares * holding.cost_basis + shares_delta * price_for_basis) / new_shares
        } else if new_shares.is_zero() {
            Decimal::ZERO
        } else {
            holding.cost_basis
        };

        if new_cash < Decimal::ZERO || new_shares < Decimal::ZERO {
            // Unreachable if validation above is correct; a hit means the
            // ledger arithmetic itself is broken.
            error!(
                portfolio = portfolio_id,
                symbol, %new_cash, %new_shares,
                "Ledger invariant violated, aborting trade"
            );
            return Err(EngineError::InvariantViolation(format!(
                "post-trade state would be cash {new_cash}, shares {new_shares} for {portfolio_id}/{symbol}"
            )));
        }

        let now = Utc::now();
        portfolio.cash = new_cash;
        portfolio.last_seq += 1;
        holding.shares = new_shares;
        holding.cost_basis = new_basis;
        holding.updated_at = now;

        let transaction = TransactionRecord {
            portfolio_id: portfolio_id.to_string(),
            seq: portfolio.last_seq,
            symbol: symbol.to_string(),
            side: draft.side,
            shares: shares_delta.abs(),
            price: price_for_basis,
            fee: draft.fee,
            cash_after: new_cash,
            executed_at: now,
            note: draft.note,
        };

        self.store
            .commit_trade(&TradeCommit {
                portfolio,
                holding: holding.clone(),
                transaction: transaction.clone(),
            })
            .await?;

        Ok((holding, transaction))
    }
}
