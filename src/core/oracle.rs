//! Price oracle abstraction.
//!
//! The engine never owns quote retrieval; a [`PriceOracle`] is injected per
//! call and quotes are best effort, current at call time.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

#[derive(Debug, Clone)]
pub struct Quote {
    pub price: Decimal,
    pub as_of: DateTime<Utc>,
}

impl Quote {
    pub fn now(price: Decimal) -> Self {
        Quote {
            price,
            as_of: Utc::now(),
        }
    }
}

#[async_trait]
pub trait PriceOracle: Send + Sync {
    async fn lookup(&self, symbol: &str) -> Result<Quote>;
}
