use crate::core::types::{Holding, LeagueMember, Portfolio, PortfolioContext, TransactionRecord};
use crate::store::{LedgerStore, TradeCommit, milestone_key};
use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap, HashSet};
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Default)]
struct Tables {
    portfolios: HashMap<String, Portfolio>,
    /// portfolio id -> symbol -> holding; BTreeMap keeps listings ordered.
    holdings: HashMap<String, BTreeMap<String, Holding>>,
    transactions: HashMap<String, Vec<TransactionRecord>>,
    /// league id -> members in join order.
    members: HashMap<String, Vec<LeagueMember>>,
    milestones: HashSet<String>,
}

/// In-memory ledger store. All tables live behind one lock, so a trade
/// commit is a single indivisible write.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn portfolio(&self, id: &str) -> Result<Option<Portfolio>> {
        let tables = self.inner.read().await;
        Ok(tables.portfolios.get(id).cloned())
    }

    async fn create_portfolio(&self, portfolio: &Portfolio) -> Result<bool> {
        let mut tables = self.inner.write().await;
        if tables.portfolios.contains_key(&portfolio.id) {
            return Ok(false);
        }
        debug!(id = %portfolio.id, "Creating portfolio");
        tables
            .portfolios
            .insert(portfolio.id.clone(), portfolio.clone());
        Ok(true)
    }

    async fn holding(&self, portfolio_id: &str, symbol: &str) -> Result<Option<Holding>> {
        let tables = self.inner.read().await;
        Ok(tables
            .holdings
            .get(portfolio_id)
            .and_then(|m| m.get(symbol))
            .cloned())
    }

    async fn holdings(&self, portfolio_id: &str) -> Result<Vec<Holding>> {
        let tables = self.inner.read().await;
        Ok(tables
            .holdings
            .get(portfolio_id)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn transactions(&self, portfolio_id: &str) -> Result<Vec<TransactionRecord>> {
        let tables = self.inner.read().await;
        Ok(tables
            .transactions
            .get(portfolio_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn commit_trade(&self, commit: &TradeCommit) -> Result<()> {
        let mut tables = self.inner.write().await;
        tables
            .portfolios
            .insert(commit.portfolio.id.clone(), commit.portfolio.clone());
        tables
            .holdings
            .entry(commit.portfolio.id.clone())
            .or_default()
            .insert(commit.holding.symbol.clone(), commit.holding.clone());
        tables
            .transactions
            .entry(commit.portfolio.id.clone())
            .or_default()
            .push(commit.transaction.clone());
        Ok(())
    }

    async fn members(&self, league_id: &str) -> Result<Vec<LeagueMember>> {
        let tables = self.inner.read().await;
        Ok(tables.members.get(league_id).cloned().unwrap_or_default())
    }

    async fn add_member(&self, member: &LeagueMember) -> Result<bool> {
        let mut tables = self.inner.write().await;
        let roster = tables.members.entry(member.league_id.clone()).or_default();
        if roster.iter().any(|m| m.user_id == member.user_id) {
            return Ok(false);
        }
        roster.push(member.clone());
        Ok(true)
    }

    async fn record_milestone(&self, portfolio_id: &str, threshold: Decimal) -> Result<bool> {
        let mut tables = self.inner.write().await;
        Ok(tables.milestones.insert(milestone_key(portfolio_id, threshold)))
    }

    async fn remove_league(&self, league_id: &str) -> Result<()> {
        let mut tables = self.inner.write().await;
        tables.members.remove(league_id);

        let doomed: Vec<String> = tables
            .portfolios
            .values()
            .filter(|p| p.context == PortfolioContext::League(league_id.to_string()))
            .map(|p| p.id.clone())
            .collect();
        for id in doomed {
            debug!(portfolio = %id, "Cascading league removal");
            tables.portfolios.remove(&id);
            tables.holdings.remove(&id);
            tables.transactions.remove(&id);
            let prefix = format!("{id}#");
            tables.milestones.retain(|k| !k.starts_with(&prefix));
        }
        Ok(())
    }
}
