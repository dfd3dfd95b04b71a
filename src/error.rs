//! Unified error handling for the grid engine
//!
//! Every fallible operation in the crate returns `TradingResult<T>`. The
//! variants double as a taxonomy: the engine branches on them to decide
//! whether a failure is retried next cycle, suppresses a placement, or ends
//! the strategy.

use rust_decimal::Decimal;
use std::io;
use thiserror::Error;

/// Main error type for the grid engine
#[derive(Debug, Error)]
pub enum TradingError {
    /// Invalid grid, tick or size parameters. Fatal at construction.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Invalid input to a pure calculation (level count of zero, non-positive tick).
    #[error("Domain error: {0}")]
    Domain(String),

    /// Timeout, rate limit or network failure. Retried on the next cycle.
    #[error("Venue transient error: {0}")]
    VenueTransient(String),

    /// The venue refused the request, e.g. a post-only order that would cross.
    #[error("Venue rejected request: {0}")]
    VenueRejection(String),

    /// Maximum position reached. A suppression signal, not a failure.
    #[error("Risk limit reached: {0}")]
    RiskLimit(String),

    /// Deliberate terminal transition of the strategy.
    #[error("Stop-loss triggered: entry {entry_price}, mid {mid_price}, move {move_percent}%")]
    StopLossTriggered {
        entry_price: Decimal,
        mid_price: Decimal,
        move_percent: Decimal,
    },

    /// Center price or instrument metadata could not be obtained.
    #[error("Market data unavailable: {0}")]
    MarketData(String),

    /// Both the market and the fallback limit close failed.
    #[error("Liquidation failed: {0}")]
    LiquidationFailed(String),

    /// Operation called in a phase that does not allow it.
    #[error("Invalid engine state: {0}")]
    InvalidState(String),
}

impl TradingError {
    /// Check if error is retryable on the next cycle
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TradingError::VenueTransient(_) | TradingError::VenueRejection(_)
        )
    }

    /// True for errors that need operator attention
    pub fn is_critical(&self) -> bool {
        matches!(self, TradingError::LiquidationFailed(_))
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            TradingError::Configuration(_) | TradingError::Domain(_) => "config",
            TradingError::VenueTransient(_) | TradingError::VenueRejection(_) => "venue",
            TradingError::RiskLimit(_)
            | TradingError::StopLossTriggered { .. }
            | TradingError::LiquidationFailed(_) => "risk",
            TradingError::MarketData(_) => "market_data",
            TradingError::InvalidState(_) => "internal",
        }
    }
}

impl From<io::Error> for TradingError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::TimedOut
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted => TradingError::VenueTransient(err.to_string()),
            _ => TradingError::InvalidState(format!("IO error: {}", err)),
        }
    }
}

impl From<tokio::time::error::Elapsed> for TradingError {
    fn from(err: tokio::time::error::Elapsed) -> Self {
        TradingError::VenueTransient(format!("venue call timed out: {}", err))
    }
}

impl From<crate::config::ConfigError> for TradingError {
    fn from(err: crate::config::ConfigError) -> Self {
        TradingError::Configuration(err.to_string())
    }
}

/// Result type alias using TradingError
pub type TradingResult<T> = Result<T, TradingError>;
