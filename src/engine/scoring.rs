//! Scoring engine: total-value computation and league leaderboards.
//!
//! The leaderboard is derived state. Every recompute reads the league in a
//! single pass, prices symbols concurrently, sorts, and replaces the cached
//! board wholesale; the cache is never patched incrementally.

use futures::future::join_all;
use rust_decimal::Decimal;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::core::cache::Cache;
use crate::core::oracle::PriceOracle;
use crate::core::types::{Holding, LeaderboardEntry, Portfolio, PortfolioContext};
use crate::engine::events::{Event, EventBus};
use crate::error::{EngineError, EngineResult};
use crate::store::LedgerStore;

pub struct ScoringEngine {
    store: Arc<dyn LedgerStore>,
    events: EventBus,
    leaderboards: Cache<String, Vec<LeaderboardEntry>>,
    milestones: Vec<Decimal>,
}

impl ScoringEngine {
    pub fn new(store: Arc<dyn LedgerStore>, events: EventBus, milestones: Vec<Decimal>) -> Self {
        ScoringEngine {
            store,
            events,
            leaderboards: Cache::new(),
            milestones,
        }
    }

    /// Price every symbol once, concurrently. Failed or non-positive quotes
    /// are simply absent from the returned map.
    async fn fetch_prices(
        oracle: &dyn PriceOracle,
        symbols: &BTreeSet<String>,
    ) -> HashMap<String, Decimal> {
        let lookups = symbols.iter().map(|symbol| async move {
            (symbol.clone(), oracle.lookup(symbol).await)
        });
        let mut prices = HashMap::new();
        for (symbol, result) in join_all(lookups).await {
            match result {
                Ok(quote) if quote.price > Decimal::ZERO => {
                    prices.insert(symbol, quote.price);
                }
                Ok(quote) => {
                    warn!(symbol = %symbol, price = %quote.price, "Ignoring non-positive quote");
                }
                Err(e) => {
                    warn!(symbol = %symbol, error = %e, "Quote lookup failed during scoring");
                }
            }
        }
        prices
    }

    /// Cash plus marked holdings. A symbol the oracle could not price is
    /// valued at its cost basis instead of zero, and says so in the log.
    fn value_book(
        portfolio: &Portfolio,
        holdings: &[Holding],
        prices: &HashMap<String, Decimal>,
    ) -> Decimal {
        let mut total = portfolio.cash;
        for holding in holdings {
            if holding.shares.is_zero() {
                continue;
            }
            match prices.get(&holding.symbol) {
                Some(price) => total += holding.shares * *price,
                None => {
                    warn!(
                        portfolio = %portfolio.id,
                        symbol = %holding.symbol,
                        basis = %holding.cost_basis,
                        "No quote, valuing holding at cost basis"
                    );
                    total += holding.shares * holding.cost_basis;
                }
            }
        }
        total
    }

    /// Current total value of one portfolio, with the same cost-basis
    /// fallback the leaderboard uses.
    pub async fn portfolio_value(
        &self,
        portfolio_id: &str,
        oracle: &dyn PriceOracle,
    ) -> EngineResult<Decimal> {
        let portfolio =
            self.store
                .portfolio(portfolio_id)
                .await?
                .ok_or_else(|| EngineError::NotFound {
                    entity: "portfolio",
                    id: portfolio_id.to_string(),
                })?;
        let holdings = self.store.holdings(portfolio_id).await?;
        let symbols: BTreeSet<String> = holdings
            .iter()
            .filter(|h| !h.shares.is_zero())
            .map(|h| h.symbol.clone())
            .collect();
        let prices = Self::fetch_prices(oracle, &symbols).await;
        Ok(Self::value_book(&portfolio, &holdings, &prices))
    }

    /// Recompute the full board for a league and replace the cached copy.
    /// Emits `rank_changed` for every member whose position moved (including
    /// first appearance) and `milestone_reached` for newly crossed
    /// thresholds.
    #[instrument(name = "RecomputeLeaderboard", skip(self, oracle), fields(league = %league_id))]
    pub async fn recompute_leaderboard(
        &self,
        league_id: &str,
        oracle: &dyn PriceOracle,
    ) -> EngineResult<Vec<LeaderboardEntry>> {
        let members = self.store.members(league_id).await?;
        if members.is_empty() {
            return Err(EngineError::NotFound {
                entity: "league",
                id: league_id.to_string(),
            });
        }

        // Single snapshot pass over the league before any sorting
        let context = PortfolioContext::League(league_id.to_string());
        let mut books: Vec<(Portfolio, Vec<Holding>)> = Vec::with_capacity(members.len());
        for member in &members {
            let portfolio_id = context.key_of(&member.user_id);
            match self.store.portfolio(&portfolio_id).await? {
                Some(portfolio) => {
                    let holdings = self.store.holdings(&portfolio_id).await?;
                    books.push((portfolio, holdings));
                }
                None => {
                    warn!(user = %member.user_id, "League member has no portfolio, skipping");
                }
            }
        }

        let symbols: BTreeSet<String> = books
            .iter()
            .flat_map(|(_, holdings)| holdings.iter())
            .filter(|h| !h.shares.is_zero())
            .map(|h| h.symbol.clone())
            .collect();
        let prices = Self::fetch_prices(oracle, &symbols).await;

        let mut scored: Vec<(Portfolio, Decimal)> = books
            .iter()
            .map(|(portfolio, holdings)| {
                (portfolio.clone(), Self::value_book(portfolio, holdings, &prices))
            })
            .collect();
        // Descending by value; ties go to the earliest portfolio, then the
        // owner id so the ordering is total.
        scored.sort_by(|(pa, va), (pb, vb)| {
            vb.cmp(va)
                .then(pa.created_at.cmp(&pb.created_at))
                .then(pa.owner.cmp(&pb.owner))
        });

        let entries: Vec<LeaderboardEntry> = scored
            .iter()
            .enumerate()
            .map(|(i, (portfolio, total))| LeaderboardEntry {
                league_id: league_id.to_string(),
                user_id: portfolio.owner.clone(),
                total_value: *total,
                rank: (i + 1) as u32,
            })
            .collect();

        let previous: HashMap<String, u32> = self
            .leaderboards
            .get(&league_id.to_string())
            .await
            .map(|board| board.into_iter().map(|e| (e.user_id, e.rank)).collect())
            .unwrap_or_default();

        for (portfolio, total) in &scored {
            for threshold in &self.milestones {
                if total >= threshold
                    && self.store.record_milestone(&portfolio.id, *threshold).await?
                {
                    self.events.publish(Event::MilestoneReached {
                        portfolio_id: portfolio.id.clone(),
                        owner: portfolio.owner.clone(),
                        league: Some(league_id.to_string()),
                        threshold: *threshold,
                        total_value: *total,
                    });
                }
            }
        }

        for entry in &entries {
            let old_rank = previous.get(&entry.user_id).copied();
            if old_rank != Some(entry.rank) {
                self.events.publish(Event::RankChanged {
                    league_id: league_id.to_string(),
                    user_id: entry.user_id.clone(),
                    old_rank,
                    new_rank: entry.rank,
                    total_value: entry.total_value,
                });
            }
        }

        debug!(entries = entries.len(), "Leaderboard replaced");
        self.leaderboards
            .put(league_id.to_string(), entries.clone())
            .await;
        Ok(entries)
    }

    /// Cached read. `NotFound` for an unknown league; a known league that
    /// was never scored answers with an empty board.
    pub async fn get_leaderboard(&self, league_id: &str) -> EngineResult<Vec<LeaderboardEntry>> {
        if let Some(board) = self.leaderboards.get(&league_id.to_string()).await {
            return Ok(board);
        }
        if self.store.members(league_id).await?.is_empty() {
            Err(EngineError::NotFound {
                entity: "league",
                id: league_id.to_string(),
            })
        } else {
            Ok(Vec::new())
        }
    }

    pub(crate) async fn invalidate(&self, league_id: &str) {
        self.leaderboards.remove(&league_id.to_string()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::LeagueMember;
    use crate::providers::static_quotes::StaticOracle;
    use crate::store::memory::MemoryStore;
    use crate::store::{LedgerStore, TradeCommit};
    use crate::core::types::{Side, TransactionRecord};
    use chrono::{Duration, Utc};

    fn oracle(pairs: &[(&str, i64)]) -> StaticOracle {
        StaticOracle::new(
            pairs
                .iter()
                .map(|(s, p)| (s.to_string(), Decimal::from(*p)))
                .collect(),
        )
    }

    /// Seed a league member with explicit cash, holdings, and creation time.
    async fn seed_member(
        store: &MemoryStore,
        league: &str,
        user: &str,
        cash: i64,
        holdings: &[(&str, i64, i64)],
        created_offset_secs: i64,
    ) {
        store
            .add_member(&LeagueMember {
                league_id: league.into(),
                user_id: user.into(),
                is_admin: false,
                joined_at: Utc::now(),
            })
            .await
            .unwrap();
        let context = PortfolioContext::League(league.to_string());
        let portfolio = Portfolio {
            id: context.key_of(user),
            owner: user.into(),
            context,
            cash: Decimal::from(cash),
            created_at: Utc::now() + Duration::seconds(created_offset_secs),
            last_seq: 0,
        };
        store.create_portfolio(&portfolio).await.unwrap();
        for (i, (symbol, shares, basis)) in holdings.iter().enumerate() {
            let mut p = portfolio.clone();
            p.last_seq = (i + 1) as u64;
            store
                .commit_trade(&TradeCommit {
                    portfolio: p,
                    holding: Holding {
                        portfolio_id: portfolio.id.clone(),
                        symbol: symbol.to_string(),
                        shares: Decimal::from(*shares),
                        cost_basis: Decimal::from(*basis),
                        updated_at: Utc::now(),
                    },
                    transaction: TransactionRecord {
                        portfolio_id: portfolio.id.clone(),
                        seq: (i + 1) as u64,
                        symbol: symbol.to_string(),
                        side: Side::Buy,
                        shares: Decimal::from(*shares),
                        price: Decimal::from(*basis),
                        fee: Decimal::ZERO,
                        cash_after: Decimal::from(cash),
                        executed_at: Utc::now(),
                        note: None,
                    },
                })
                .await
                .unwrap();
        }
    }

    fn scoring(store: Arc<MemoryStore>, milestones: Vec<Decimal>) -> ScoringEngine {
        ScoringEngine::new(store, EventBus::new(64), milestones)
    }

    #[tokio::test]
    async fn ranks_descend_by_total_value() {
        let store = Arc::new(MemoryStore::new());
        // bob: 15_000 cash; alice: 2_000 cash + 100 shares @ 100 = 12_000
        seed_member(&store, "summer", "alice", 2_000, &[("AAPL", 100, 90)], 0).await;
        seed_member(&store, "summer", "bob", 15_000, &[], 1).await;
        let scoring = scoring(store, vec![]);

        let board = scoring
            .recompute_leaderboard("summer", &oracle(&[("AAPL", 100)]))
            .await
            .unwrap();

        assert_eq!(board[0].user_id, "bob");
        assert_eq!(board[0].rank, 1);
        assert_eq!(board[0].total_value, Decimal::from(15_000));
        assert_eq!(board[1].user_id, "alice");
        assert_eq!(board[1].total_value, Decimal::from(12_000));
    }

    #[tokio::test]
    async fn recompute_is_deterministic() {
        let store = Arc::new(MemoryStore::new());
        seed_member(&store, "summer", "alice", 5_000, &[("AAPL", 10, 150)], 0).await;
        seed_member(&store, "summer", "bob", 5_000, &[("MSFT", 20, 80)], 1).await;
        let scoring = scoring(store, vec![]);
        let oracle = oracle(&[("AAPL", 160), ("MSFT", 85)]);

        let first = scoring.recompute_leaderboard("summer", &oracle).await.unwrap();
        let second = scoring.recompute_leaderboard("summer", &oracle).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn ties_break_by_earliest_portfolio_creation() {
        let store = Arc::new(MemoryStore::new());
        seed_member(&store, "summer", "zoe", 10_000, &[], 0).await;
        seed_member(&store, "summer", "adam", 10_000, &[], 60).await;
        let scoring = scoring(store, vec![]);

        let board = scoring
            .recompute_leaderboard("summer", &oracle(&[]))
            .await
            .unwrap();

        // Equal totals: zoe's portfolio is older, so she ranks first even
        // though adam sorts earlier alphabetically
        assert_eq!(board[0].user_id, "zoe");
        assert_eq!(board[1].user_id, "adam");
    }

    #[tokio::test]
    async fn failed_quote_falls_back_to_cost_basis() {
        let store = Arc::new(MemoryStore::new());
        // 15 shares with basis 156 and no quote: contributes 2_340, not zero
        seed_member(&store, "summer", "alice", 1_000, &[("AAPL", 15, 156)], 0).await;
        let scoring = scoring(store, vec![]);

        let board = scoring
            .recompute_leaderboard("summer", &oracle(&[]))
            .await
            .unwrap();

        assert_eq!(board[0].total_value, Decimal::from(1_000 + 15 * 156));
    }

    #[tokio::test]
    async fn price_move_reorders_the_board() {
        let store = Arc::new(MemoryStore::new());
        seed_member(&store, "summer", "alice", 2_000, &[("AAPL", 100, 100)], 0).await;
        seed_member(&store, "summer", "bob", 15_000, &[], 1).await;
        let scoring = scoring(store, vec![]);

        let board = scoring
            .recompute_leaderboard("summer", &oracle(&[("AAPL", 100)]))
            .await
            .unwrap();
        assert_eq!(board[0].user_id, "bob");

        // AAPL rallies: alice's 100 shares are now worth 14_000
        let board = scoring
            .recompute_leaderboard("summer", &oracle(&[("AAPL", 140)]))
            .await
            .unwrap();
        assert_eq!(board[0].user_id, "alice");
        assert_eq!(board[0].total_value, Decimal::from(16_000));
    }

    #[tokio::test]
    async fn rank_changes_are_published() {
        let store = Arc::new(MemoryStore::new());
        seed_member(&store, "summer", "alice", 2_000, &[("AAPL", 100, 100)], 0).await;
        seed_member(&store, "summer", "bob", 15_000, &[], 1).await;
        let events = EventBus::new(64);
        let scoring = ScoringEngine::new(store, events.clone(), vec![]);
        let mut rx = events.subscribe();

        scoring
            .recompute_leaderboard("summer", &oracle(&[("AAPL", 100)]))
            .await
            .unwrap();
        // First board: both members appear
        let mut first_batch = Vec::new();
        while let Ok(event) = rx.try_recv() {
            first_batch.push(event);
        }
        assert_eq!(first_batch.len(), 2);

        scoring
            .recompute_leaderboard("summer", &oracle(&[("AAPL", 140)]))
            .await
            .unwrap();
        let mut swaps = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let Event::RankChanged {
                user_id,
                old_rank,
                new_rank,
                ..
            } = event
            {
                swaps.push((user_id, old_rank, new_rank));
            }
        }
        swaps.sort();
        assert_eq!(
            swaps,
            vec![
                ("alice".to_string(), Some(2), 1),
                ("bob".to_string(), Some(1), 2)
            ]
        );
    }

    #[tokio::test]
    async fn milestones_fire_once() {
        let store = Arc::new(MemoryStore::new());
        seed_member(&store, "summer", "alice", 9_000, &[("AAPL", 10, 100)], 0).await;
        let events = EventBus::new(64);
        let scoring =
            ScoringEngine::new(store, events.clone(), vec![Decimal::from(12_000)]);
        let mut rx = events.subscribe();

        // 9_000 + 10*100 = 10_000: below threshold
        scoring
            .recompute_leaderboard("summer", &oracle(&[("AAPL", 100)]))
            .await
            .unwrap();
        // 9_000 + 10*300 = 12_000: crosses
        scoring
            .recompute_leaderboard("summer", &oracle(&[("AAPL", 300)]))
            .await
            .unwrap();
        scoring
            .recompute_leaderboard("summer", &oracle(&[("AAPL", 300)]))
            .await
            .unwrap();

        let mut milestones = 0;
        while let Ok(event) = rx.try_recv() {
            if let Event::MilestoneReached {
                threshold,
                total_value,
                ..
            } = event
            {
                milestones += 1;
                assert_eq!(threshold, Decimal::from(12_000));
                assert_eq!(total_value, Decimal::from(12_000));
            }
        }
        assert_eq!(milestones, 1);
    }

    #[tokio::test]
    async fn cached_read_and_unknown_league() {
        let store = Arc::new(MemoryStore::new());
        seed_member(&store, "summer", "alice", 10_000, &[], 0).await;
        let scoring = scoring(store, vec![]);

        // Known league, never scored
        assert!(scoring.get_leaderboard("summer").await.unwrap().is_empty());

        let computed = scoring
            .recompute_leaderboard("summer", &oracle(&[]))
            .await
            .unwrap();
        assert_eq!(scoring.get_leaderboard("summer").await.unwrap(), computed);

        let err = scoring.get_leaderboard("winter").await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound { .. }));
    }
}
