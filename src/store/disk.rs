use crate::core::types::{Holding, LeagueMember, Portfolio, PortfolioContext, TransactionRecord};
use crate::store::{LedgerStore, TradeCommit, milestone_key};
use anyhow::Result;
use async_trait::async_trait;
use fjall::{Keyspace, PartitionCreateOptions, PartitionHandle};
use rust_decimal::Decimal;
use std::path::Path;
use tokio::sync::Mutex;
use tracing::debug;

/// Fjall-backed ledger store: one partition per record family, with the
/// trade commit written through a single cross-partition batch so it is
/// all-or-nothing on disk.
pub struct FjallStore {
    keyspace: Keyspace,
    portfolios: PartitionHandle,
    holdings: PartitionHandle,
    transactions: PartitionHandle,
    members: PartitionHandle,
    milestones: PartitionHandle,
    /// Serializes check-and-insert operations; fjall has no compare-and-swap.
    write_guard: Mutex<()>,
}

fn holding_key(portfolio_id: &str, symbol: &str) -> String {
    format!("{portfolio_id}#{symbol}")
}

fn transaction_key(portfolio_id: &str, seq: u64) -> String {
    // Zero-padded so lexicographic prefix scans come back in execution order.
    format!("{portfolio_id}#{seq:012}")
}

fn member_key(league_id: &str, user_id: &str) -> String {
    format!("{league_id}#{user_id}")
}

impl FjallStore {
    pub fn open(path: &Path) -> Result<Self> {
        let keyspace = fjall::Config::new(path).open()?;
        let portfolios = keyspace.open_partition("portfolios", PartitionCreateOptions::default())?;
        let holdings = keyspace.open_partition("holdings", PartitionCreateOptions::default())?;
        let transactions =
            keyspace.open_partition("transactions", PartitionCreateOptions::default())?;
        let members = keyspace.open_partition("members", PartitionCreateOptions::default())?;
        let milestones = keyspace.open_partition("milestones", PartitionCreateOptions::default())?;
        Ok(Self {
            keyspace,
            portfolios,
            holdings,
            transactions,
            members,
            milestones,
            write_guard: Mutex::new(()),
        })
    }

    fn scan_prefix<T: serde::de::DeserializeOwned>(
        partition: &PartitionHandle,
        prefix: &str,
    ) -> Result<Vec<T>> {
        let mut out = Vec::new();
        for item in partition.prefix(prefix) {
            let (_key, value) = item?;
            out.push(serde_json::from_slice(&value)?);
        }
        Ok(out)
    }

    fn keys_with_prefix(partition: &PartitionHandle, prefix: &str) -> Result<Vec<Vec<u8>>> {
        let mut out = Vec::new();
        for item in partition.prefix(prefix) {
            let (key, _value) = item?;
            out.push(key.to_vec());
        }
        Ok(out)
    }
}

#[async_trait]
impl LedgerStore for FjallStore {
    async fn portfolio(&self, id: &str) -> Result<Option<Portfolio>> {
        match self.portfolios.get(id)? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    async fn create_portfolio(&self, portfolio: &Portfolio) -> Result<bool> {
        let _guard = self.write_guard.lock().await;
        if self.portfolios.get(&portfolio.id)?.is_some() {
            return Ok(false);
        }
        debug!(id = %portfolio.id, "Creating portfolio");
        self.portfolios
            .insert(&portfolio.id, serde_json::to_vec(portfolio)?)?;
        Ok(true)
    }

    async fn holding(&self, portfolio_id: &str, symbol: &str) -> Result<Option<Holding>> {
        match self.holdings.get(holding_key(portfolio_id, symbol))? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    async fn holdings(&self, portfolio_id: &str) -> Result<Vec<Holding>> {
        Self::scan_prefix(&self.holdings, &format!("{portfolio_id}#"))
    }

    async fn transactions(&self, portfolio_id: &str) -> Result<Vec<TransactionRecord>> {
        Self::scan_prefix(&self.transactions, &format!("{portfolio_id}#"))
    }

    async fn commit_trade(&self, commit: &TradeCommit) -> Result<()> {
        let mut batch = self.keyspace.batch();
        batch.insert(
            &self.portfolios,
            commit.portfolio.id.as_str(),
            serde_json::to_vec(&commit.portfolio)?,
        );
        batch.insert(
            &self.holdings,
            holding_key(&commit.holding.portfolio_id, &commit.holding.symbol),
            serde_json::to_vec(&commit.holding)?,
        );
        batch.insert(
            &self.transactions,
            transaction_key(&commit.transaction.portfolio_id, commit.transaction.seq),
            serde_json::to_vec(&commit.transaction)?,
        );
        batch.commit()?;
        Ok(())
    }

    async fn members(&self, league_id: &str) -> Result<Vec<LeagueMember>> {
        let mut members: Vec<LeagueMember> =
            Self::scan_prefix(&self.members, &format!("{league_id}#"))?;
        // Keys sort by user id; membership order is join order.
        members.sort_by(|a, b| a.joined_at.cmp(&b.joined_at).then(a.user_id.cmp(&b.user_id)));
        Ok(members)
    }

    async fn add_member(&self, member: &LeagueMember) -> Result<bool> {
        let _guard = self.write_guard.lock().await;
        let key = member_key(&member.league_id, &member.user_id);
        if self.members.get(&key)?.is_some() {
            return Ok(false);
        }
        self.members.insert(&key, serde_json::to_vec(member)?)?;
        Ok(true)
    }

    async fn record_milestone(&self, portfolio_id: &str, threshold: Decimal) -> Result<bool> {
        let _guard = self.write_guard.lock().await;
        let key = milestone_key(portfolio_id, threshold);
        if self.milestones.get(&key)?.is_some() {
            return Ok(false);
        }
        self.milestones.insert(&key, "")?;
        Ok(true)
    }

    async fn remove_league(&self, league_id: &str) -> Result<()> {
        let _guard = self.write_guard.lock().await;

        let mut doomed = Vec::new();
        for item in self.portfolios.iter() {
            let (key, value) = item?;
            let portfolio: Portfolio = serde_json::from_slice(&value)?;
            if portfolio.context == PortfolioContext::League(league_id.to_string()) {
                doomed.push((key.to_vec(), portfolio.id));
            }
        }

        let mut batch = self.keyspace.batch();
        for key in Self::keys_with_prefix(&self.members, &format!("{league_id}#"))? {
            batch.remove(&self.members, key);
        }
        for (key, portfolio_id) in doomed {
            debug!(portfolio = %portfolio_id, "Cascading league removal");
            batch.remove(&self.portfolios, key);
            let prefix = format!("{portfolio_id}#");
            for k in Self::keys_with_prefix(&self.holdings, &prefix)? {
                batch.remove(&self.holdings, k);
            }
            for k in Self::keys_with_prefix(&self.transactions, &prefix)? {
                batch.remove(&self.transactions, k);
            }
            for k in Self::keys_with_prefix(&self.milestones, &prefix)? {
                batch.remove(&self.milestones, k);
            }
        }
        batch.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Side;
    use chrono::Utc;
    use tempfile::tempdir;

    fn portfolio(id: &str, context: PortfolioContext) -> Portfolio {
        Portfolio {
            id: id.to_string(),
            owner: "alice".into(),
            context,
            cash: Decimal::from(10_000),
            created_at: Utc::now(),
            last_seq: 0,
        }
    }

    fn commit_for(p: &Portfolio, symbol: &str, seq: u64) -> TradeCommit {
        let mut portfolio = p.clone();
        portfolio.last_seq = seq;
        TradeCommit {
            portfolio,
            holding: Holding {
                portfolio_id: p.id.clone(),
                symbol: symbol.into(),
                shares: Decimal::from(10),
                cost_basis: Decimal::from(150),
                updated_at: Utc::now(),
            },
            transaction: TransactionRecord {
                portfolio_id: p.id.clone(),
                seq,
                symbol: symbol.into(),
                side: Side::Buy,
                shares: Decimal::from(10),
                price: Decimal::from(150),
                fee: Decimal::ZERO,
                cash_after: Decimal::from(8_500),
                executed_at: Utc::now(),
                note: None,
            },
        }
    }

    #[tokio::test]
    async fn portfolio_roundtrip_and_duplicate_create() {
        let dir = tempdir().unwrap();
        let store = FjallStore::open(dir.path()).unwrap();
        let p = portfolio("personal/alice", PortfolioContext::Personal);

        assert!(store.create_portfolio(&p).await.unwrap());
        assert!(!store.create_portfolio(&p).await.unwrap());

        let read = store.portfolio(&p.id).await.unwrap().unwrap();
        assert_eq!(read.owner, "alice");
        assert_eq!(read.cash, Decimal::from(10_000));
    }

    #[tokio::test]
    async fn transactions_scan_in_sequence_order() {
        let dir = tempdir().unwrap();
        let store = FjallStore::open(dir.path()).unwrap();
        let p = portfolio("personal/alice", PortfolioContext::Personal);
        store.create_portfolio(&p).await.unwrap();

        for seq in 1..=12u64 {
            store.commit_trade(&commit_for(&p, "AAPL", seq)).await.unwrap();
        }

        let seqs: Vec<u64> = store
            .transactions(&p.id)
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.seq)
            .collect();
        assert_eq!(seqs, (1..=12).collect::<Vec<u64>>());
    }

    #[tokio::test]
    async fn holding_keys_do_not_leak_across_portfolios() {
        let dir = tempdir().unwrap();
        let store = FjallStore::open(dir.path()).unwrap();
        let league = PortfolioContext::League("summer".into());
        let a = portfolio(&league.key_of("alice"), league.clone());
        let b = portfolio(&league.key_of("bob"), league.clone());
        store.create_portfolio(&a).await.unwrap();
        store.create_portfolio(&b).await.unwrap();

        store.commit_trade(&commit_for(&a, "AAPL", 1)).await.unwrap();
        store.commit_trade(&commit_for(&b, "MSFT", 1)).await.unwrap();

        let a_holdings = store.holdings(&a.id).await.unwrap();
        assert_eq!(a_holdings.len(), 1);
        assert_eq!(a_holdings[0].symbol, "AAPL");
    }

    #[tokio::test]
    async fn milestone_records_once_across_reopen() {
        let dir = tempdir().unwrap();
        {
            let store = FjallStore::open(dir.path()).unwrap();
            assert!(
                store
                    .record_milestone("league/s/alice", Decimal::from(25_000))
                    .await
                    .unwrap()
            );
        }
        let store = FjallStore::open(dir.path()).unwrap();
        assert!(
            !store
                .record_milestone("league/s/alice", Decimal::from(25_000))
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn remove_league_cascades_on_disk() {
        let dir = tempdir().unwrap();
        let store = FjallStore::open(dir.path()).unwrap();
        let league = PortfolioContext::League("summer".into());
        let p = portfolio(&league.key_of("alice"), league.clone());
        store.create_portfolio(&p).await.unwrap();
        store.commit_trade(&commit_for(&p, "AAPL", 1)).await.unwrap();
        store
            .add_member(&LeagueMember {
                league_id: "summer".into(),
                user_id: "alice".into(),
                is_admin: true,
                joined_at: Utc::now(),
            })
            .await
            .unwrap();

        let personal = portfolio("personal/alice", PortfolioContext::Personal);
        store.create_portfolio(&personal).await.unwrap();

        store.remove_league("summer").await.unwrap();

        assert!(store.portfolio(&p.id).await.unwrap().is_none());
        assert!(store.holdings(&p.id).await.unwrap().is_empty());
        assert!(store.transactions(&p.id).await.unwrap().is_empty());
        assert!(store.members("summer").await.unwrap().is_empty());
        assert!(store.portfolio("personal/alice").await.unwrap().is_some());
    }
}
