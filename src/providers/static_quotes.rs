use anyhow::{Result, anyhow};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::debug;

use crate::core::oracle::{PriceOracle, Quote};

/// Fixed-price oracle backed by a quote table, for demo scenarios and tests.
/// Symbols missing from the table behave like a quote outage.
pub struct StaticOracle {
    quotes: HashMap<String, Decimal>,
}

impl StaticOracle {
    pub fn new(quotes: HashMap<String, Decimal>) -> Self {
        StaticOracle { quotes }
    }
}

#[async_trait]
impl PriceOracle for StaticOracle {
    async fn lookup(&self, symbol: &str) -> Result<Quote> {
        match self.quotes.get(symbol) {
            Some(price) => {
                debug!(symbol, %price, "Static quote served");
                Ok(Quote::now(*price))
            }
            None => Err(anyhow!("no quote configured for symbol {symbol}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn serves_configured_quotes_and_fails_unknown() {
        let oracle = StaticOracle::new(HashMap::from([("AAPL".to_string(), Decimal::from(150))]));

        let quote = oracle.lookup("AAPL").await.unwrap();
        assert_eq!(quote.price, Decimal::from(150));

        assert!(oracle.lookup("MSFT").await.is_err());
    }
}
