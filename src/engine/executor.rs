//! Trade executor: validation, per-portfolio exclusion, atomic execution.
//!
//! One keyed mutex per portfolio serializes conflicting trades; trades on
//! different portfolios never contend. The oracle is consulted once, before
//! the lock is taken, and that price is the single point of truth for both
//! validation and execution.

use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{info, instrument, warn};

use crate::config::EngineConfig;
use crate::core::oracle::PriceOracle;
use crate::core::types::{Side, TradeRequest, TransactionRecord};
use crate::engine::events::{Event, EventBus};
use crate::engine::portfolio::{PortfolioEngine, TradeDraft};
use crate::error::{EngineError, EngineResult};

pub struct TradeExecutor {
    portfolios: PortfolioEngine,
    events: EventBus,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    lock_timeout: Duration,
    fee: Decimal,
    allow_fractional: bool,
}

impl TradeExecutor {
    pub fn new(portfolios: PortfolioEngine, events: EventBus, config: &EngineConfig) -> Self {
        TradeExecutor {
            portfolios,
            events,
            locks: Mutex::new(HashMap::new()),
            lock_timeout: Duration::from_millis(config.lock_timeout_ms),
            fee: config.trade_fee,
            allow_fractional: config.allow_fractional_shares,
        }
    }

    async fn portfolio_lock(&self, portfolio_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(portfolio_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Validate and execute one trade. Validation-read, balance mutation,
    /// and transaction append happen under the portfolio's lock as one
    /// atomic unit; the trade event is published after the commit and can
    /// never roll it back.
    #[instrument(
        name = "ExecuteTrade",
        skip(self, request, oracle),
        fields(portfolio = %portfolio_id, symbol = %request.symbol, side = %request.side)
    )]
    pub async fn execute_trade(
        &self,
        portfolio_id: &str,
        request: TradeRequest,
        oracle: &dyn PriceOracle,
    ) -> EngineResult<TransactionRecord> {
        request.validate(self.allow_fractional)?;

        let quote =
            oracle
                .lookup(&request.symbol)
                .await
                .map_err(|e| EngineError::QuoteUnavailable {
                    symbol: request.symbol.clone(),
                    reason: e.to_string(),
                })?;
        if quote.price <= Decimal::ZERO {
            return Err(EngineError::QuoteUnavailable {
                symbol: request.symbol.clone(),
                reason: format!("non-positive price {}", quote.price),
            });
        }

        let lock = self.portfolio_lock(portfolio_id).await;
        let Ok(_guard) = timeout(self.lock_timeout, lock.lock()).await else {
            warn!("Lock acquisition timed out");
            return Err(EngineError::Busy {
                portfolio_id: portfolio_id.to_string(),
            });
        };

        // Atomic scope: state read here cannot be changed by another trade
        // before our commit lands.
        let portfolio = self.portfolios.portfolio_by_id(portfolio_id).await?;
        let holding = self
            .portfolios
            .get_holding(portfolio_id, &request.symbol)
            .await?;

        let gross = request.shares * quote.price;
        let (shares_delta, cash_delta) = match request.side {
            Side::Buy => {
                let required = gross + self.fee;
                if required > portfolio.cash {
                    return Err(EngineError::InsufficientFunds {
                        available: portfolio.cash,
                        required,
                    });
                }
                (request.shares, -required)
            }
            Side::Sell => {
                if request.shares > holding.shares {
                    return Err(EngineError::InsufficientShares {
                        symbol: request.symbol.clone(),
                        owned: holding.shares,
                        requested: request.shares,
                    });
                }
                (-request.shares, gross - self.fee)
            }
        };

        let (_holding, transaction) = self
            .portfolios
            .apply_delta(
                portfolio_id,
                &request.symbol,
                shares_delta,
                quote.price,
                cash_delta,
                TradeDraft {
                    side: request.side,
                    fee: self.fee,
                    note: request.note,
                },
            )
            .await?;
        drop(_guard);

        info!(
            seq = transaction.seq,
            price = %transaction.price,
            cash_after = %transaction.cash_after,
            "Trade executed"
        );
        self.events.publish(Event::TradeExecuted {
            portfolio_id: portfolio_id.to_string(),
            owner: portfolio.owner,
            league: portfolio.context.league().map(str::to_string),
            symbol: transaction.symbol.clone(),
            side: transaction.side,
            shares: transaction.shares,
            price: transaction.price,
            fee: transaction.fee,
            cash_after: transaction.cash_after,
            executed_at: transaction.executed_at,
        });

        Ok(transaction)
    }
}
