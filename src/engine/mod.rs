//! The trading engine: one facade wiring the portfolio ledger, trade
//! executor, scoring, league membership, and the event bus over a shared
//! ledger store.

pub mod events;
pub mod executor;
pub mod league;
pub mod portfolio;
pub mod scoring;

use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::warn;

use crate::config::EngineConfig;
use crate::core::oracle::PriceOracle;
use crate::core::types::{
    Holding, LeaderboardEntry, LeagueMember, Portfolio, PortfolioContext, TradeRequest,
    TransactionRecord,
};
use crate::error::EngineResult;
use crate::store::LedgerStore;

pub use events::{Event, EventBus, EventSubscriber, LoggingSubscriber};
pub use executor::TradeExecutor;
pub use league::LeagueService;
pub use portfolio::PortfolioEngine;
pub use scoring::ScoringEngine;

pub struct Engine {
    portfolios: PortfolioEngine,
    executor: TradeExecutor,
    scoring: ScoringEngine,
    leagues: LeagueService,
    events: EventBus,
}

impl Engine {
    pub fn new(config: EngineConfig, store: Arc<dyn LedgerStore>) -> Self {
        let events = EventBus::new(config.event_capacity);
        let portfolios = PortfolioEngine::new(store.clone());
        let executor = TradeExecutor::new(portfolios.clone(), events.clone(), &config);
        let scoring = ScoringEngine::new(store.clone(), events.clone(), config.milestones.clone());
        let leagues = LeagueService::new(
            store,
            portfolios.clone(),
            events.clone(),
            config.starting_cash,
        );
        Engine {
            portfolios,
            executor,
            scoring,
            leagues,
            events,
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    // --- Portfolio surface ---

    pub async fn create_portfolio(
        &self,
        owner: &str,
        context: PortfolioContext,
        starting_cash: Decimal,
    ) -> EngineResult<Portfolio> {
        self.portfolios
            .create_portfolio(owner, context, starting_cash)
            .await
    }

    pub async fn get_portfolio(
        &self,
        owner: &str,
        context: &PortfolioContext,
    ) -> EngineResult<Portfolio> {
        self.portfolios.get_portfolio(owner, context).await
    }

    pub async fn get_holding(&self, portfolio_id: &str, symbol: &str) -> EngineResult<Holding> {
        self.portfolios.get_holding(portfolio_id, symbol).await
    }

    pub async fn holdings(&self, portfolio_id: &str) -> EngineResult<Vec<Holding>> {
        self.portfolios.holdings(portfolio_id).await
    }

    pub async fn transactions(&self, portfolio_id: &str) -> EngineResult<Vec<TransactionRecord>> {
        self.portfolios.transactions(portfolio_id).await
    }

    // --- Trading ---

    /// Execute a trade, then recompute the affected league's board with the
    /// same oracle. The trade stands even if the recompute fails; scoring
    /// converges on the next trigger.
    pub async fn execute_trade(
        &self,
        portfolio_id: &str,
        request: TradeRequest,
        oracle: &dyn PriceOracle,
    ) -> EngineResult<TransactionRecord> {
        let transaction = self
            .executor
            .execute_trade(portfolio_id, request, oracle)
            .await?;

        let portfolio = self.portfolios.portfolio_by_id(portfolio_id).await?;
        if let Some(league_id) = portfolio.context.league() {
            if let Err(e) = self.scoring.recompute_leaderboard(league_id, oracle).await {
                warn!(league = league_id, error = %e, "Post-trade leaderboard recompute failed");
            }
        }
        Ok(transaction)
    }

    // --- Scoring ---

    pub async fn recompute_leaderboard(
        &self,
        league_id: &str,
        oracle: &dyn PriceOracle,
    ) -> EngineResult<Vec<LeaderboardEntry>> {
        self.scoring.recompute_leaderboard(league_id, oracle).await
    }

    pub async fn get_leaderboard(&self, league_id: &str) -> EngineResult<Vec<LeaderboardEntry>> {
        self.scoring.get_leaderboard(league_id).await
    }

    pub async fn portfolio_value(
        &self,
        portfolio_id: &str,
        oracle: &dyn PriceOracle,
    ) -> EngineResult<Decimal> {
        self.scoring.portfolio_value(portfolio_id, oracle).await
    }

    // --- Leagues ---

    pub async fn join_league(
        &self,
        league_id: &str,
        user_id: &str,
        is_admin: bool,
    ) -> EngineResult<LeagueMember> {
        self.leagues.join_league(league_id, user_id, is_admin).await
    }

    pub async fn members(&self, league_id: &str) -> EngineResult<Vec<LeagueMember>> {
        self.leagues.members(league_id).await
    }

    pub async fn delete_league(&self, league_id: &str) -> EngineResult<()> {
        self.leagues.delete_league(league_id).await?;
        self.scoring.invalidate(league_id).await;
        Ok(())
    }
}
