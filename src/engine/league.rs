//! League membership: who holds a league portfolio and appears on its board.
//!
//! Leagues exist implicitly from their first member. Joining creates the
//! member row and the league portfolio together; deleting a league cascades
//! to every portfolio it owns.

use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::info;

use crate::core::types::{LeagueMember, PortfolioContext};
use crate::engine::events::{Event, EventBus};
use crate::engine::portfolio::PortfolioEngine;
use crate::error::{EngineError, EngineResult};
use crate::store::LedgerStore;

pub struct LeagueService {
    store: Arc<dyn LedgerStore>,
    portfolios: PortfolioEngine,
    events: EventBus,
    starting_cash: Decimal,
}

impl LeagueService {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        portfolios: PortfolioEngine,
        events: EventBus,
        starting_cash: Decimal,
    ) -> Self {
        LeagueService {
            store,
            portfolios,
            events,
            starting_cash,
        }
    }

    pub async fn join_league(
        &self,
        league_id: &str,
        user_id: &str,
        is_admin: bool,
    ) -> EngineResult<LeagueMember> {
        let member = LeagueMember {
            league_id: league_id.to_string(),
            user_id: user_id.to_string(),
            is_admin,
            joined_at: Utc::now(),
        };
        if !self.store.add_member(&member).await? {
            return Err(EngineError::AlreadyExists {
                owner: user_id.to_string(),
                context: format!("league/{league_id}"),
            });
        }
        self.portfolios
            .create_portfolio(
                user_id,
                PortfolioContext::League(league_id.to_string()),
                self.starting_cash,
            )
            .await?;

        info!(league = league_id, user = user_id, is_admin, "Member joined");
        self.events.publish(Event::MemberJoined {
            league_id: league_id.to_string(),
            user_id: user_id.to_string(),
            is_admin,
            starting_cash: self.starting_cash,
            joined_at: member.joined_at,
        });
        Ok(member)
    }

    pub async fn members(&self, league_id: &str) -> EngineResult<Vec<LeagueMember>> {
        Ok(self.store.members(league_id).await?)
    }

    /// Drops the league's membership, portfolios, holdings, and transaction
    /// history. Personal portfolios are untouched.
    pub async fn delete_league(&self, league_id: &str) -> EngineResult<()> {
        if self.store.members(league_id).await?.is_empty() {
            return Err(EngineError::NotFound {
                entity: "league",
                id: league_id.to_string(),
            });
        }
        self.store.remove_league(league_id).await?;
        info!(league = league_id, "League deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;

    fn service() -> (LeagueService, Arc<MemoryStore>, EventBus) {
        let store = Arc::new(MemoryStore::new());
        let events = EventBus::new(16);
        let service = LeagueService::new(
            store.clone(),
            PortfolioEngine::new(store.clone()),
            events.clone(),
            Decimal::from(10_000),
        );
        (service, store, events)
    }

    #[tokio::test]
    async fn join_creates_member_and_portfolio_and_event() {
        let (service, store, events) = service();
        let mut rx = events.subscribe();

        let member = service.join_league("summer", "alice", true).await.unwrap();
        assert!(member.is_admin);

        let portfolio = store
            .portfolio("league/summer/alice")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(portfolio.cash, Decimal::from(10_000));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind(), "member_joined");
    }

    #[tokio::test]
    async fn joining_twice_is_rejected() {
        let (service, _, _) = service();
        service.join_league("summer", "alice", false).await.unwrap();
        let err = service
            .join_league("summer", "alice", false)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn delete_unknown_league_is_not_found() {
        let (service, _, _) = service();
        let err = service.delete_league("nope").await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound { .. }));
    }

    #[tokio::test]
    async fn delete_cascades_membership_and_portfolios() {
        let (service, store, _) = service();
        service.join_league("summer", "alice", true).await.unwrap();
        service.join_league("summer", "bob", false).await.unwrap();

        service.delete_league("summer").await.unwrap();

        assert!(service.members("summer").await.unwrap().is_empty());
        assert!(
            store
                .portfolio("league/summer/alice")
                .await
                .unwrap()
                .is_none()
        );
    }
}
