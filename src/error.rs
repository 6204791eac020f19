//! Engine error taxonomy.
//!
//! Validation failures (`InsufficientFunds`, `InsufficientShares`,
//! `QuoteUnavailable`, `InvalidTrade`) are expected, user-facing outcomes and
//! carry the amounts needed to render a precise message. `Busy` is transient
//! and safe to retry. `InvariantViolation` means the ledger itself is
//! inconsistent and is never swallowed.

use rust_decimal::Decimal;

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("portfolio already exists for {owner} in {context}")]
    AlreadyExists { owner: String, context: String },

    #[error("insufficient funds: available {available}, required {required}")]
    InsufficientFunds {
        available: Decimal,
        required: Decimal,
    },

    #[error("insufficient shares of {symbol}: owned {owned}, requested {requested}")]
    InsufficientShares {
        symbol: String,
        owned: Decimal,
        requested: Decimal,
    },

    #[error("no usable quote for {symbol}: {reason}")]
    QuoteUnavailable { symbol: String, reason: String },

    #[error("portfolio {portfolio_id} is busy, retry later")]
    Busy { portfolio_id: String },

    #[error("invalid trade request: {0}")]
    InvalidTrade(String),

    #[error("ledger invariant violated: {0}")]
    InvariantViolation(String),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl EngineError {
    /// Expected, user-facing outcome of a request; render it, don't retry.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            EngineError::NotFound { .. }
                | EngineError::AlreadyExists { .. }
                | EngineError::InsufficientFunds { .. }
                | EngineError::InsufficientShares { .. }
                | EngineError::QuoteUnavailable { .. }
                | EngineError::InvalidTrade(_)
        )
    }

    /// Transient contention; callers may retry with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Busy { .. })
    }
}
