//! Domain event publication.
//!
//! Events are fire-and-forget: publishing never blocks a trade's atomic
//! unit, and a failed or slow subscriber is logged and isolated, never
//! surfaced to the caller that produced the event.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::core::types::Side;

/// Payloads carry enough denormalized data that subscribers never need to
/// re-query the ledger synchronously.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
    TradeExecuted {
        portfolio_id: String,
        owner: String,
        league: Option<String>,
        symbol: String,
        side: Side,
        shares: Decimal,
        price: Decimal,
        fee: Decimal,
        cash_after: Decimal,
        executed_at: DateTime<Utc>,
    },
    RankChanged {
        league_id: String,
        user_id: String,
        old_rank: Option<u32>,
        new_rank: u32,
        total_value: Decimal,
    },
    MemberJoined {
        league_id: String,
        user_id: String,
        is_admin: bool,
        starting_cash: Decimal,
        joined_at: DateTime<Utc>,
    },
    MilestoneReached {
        portfolio_id: String,
        owner: String,
        league: Option<String>,
        threshold: Decimal,
        total_value: Decimal,
    },
}

impl Event {
    pub fn kind(&self) -> &'static str {
        match self {
            Event::TradeExecuted { .. } => "trade_executed",
            Event::RankChanged { .. } => "rank_changed",
            Event::MemberJoined { .. } => "member_joined",
            Event::MilestoneReached { .. } => "milestone_reached",
        }
    }
}

/// Any component may consume the feed: in-process widget, chat bridge,
/// notification fan-out. Delivery is at-most-once.
#[async_trait]
pub trait EventSubscriber: Send + Sync {
    async fn deliver(&self, event: &Event) -> anyhow::Result<()>;
}

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        EventBus { tx }
    }

    /// Best-effort publish. If no receivers are attached, drop the message.
    pub fn publish(&self, event: Event) {
        debug!(kind = event.kind(), "Publishing event");
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Drive a subscriber on its own task. Subscriber errors are logged and
    /// the event dropped; a lagging subscriber skips ahead and keeps going.
    pub fn attach<S: EventSubscriber + 'static>(&self, subscriber: S) -> JoinHandle<()> {
        let mut rx = self.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        if let Err(e) = subscriber.deliver(&event).await {
                            warn!(error = %e, kind = event.kind(), "Event subscriber failed, event dropped");
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Event subscriber lagged, events dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

/// Subscriber that mirrors the feed into the log, used by the demo binary
/// as its activity feed.
pub struct LoggingSubscriber;

#[async_trait]
impl EventSubscriber for LoggingSubscriber {
    async fn deliver(&self, event: &Event) -> anyhow::Result<()> {
        info!(kind = event.kind(), payload = ?event, "Activity feed");
        Ok(())
    }
}
