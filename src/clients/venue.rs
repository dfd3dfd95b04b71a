//! Venue capability interface consumed by the engine.
//!
//! Transport, signing and response parsing live behind this trait. Whatever
//! implements it hands the engine typed values; a missing book or an unknown
//! order comes back as `None`/`Unknown` rather than an error.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core::types::{OrderStatus, Quote, Side};
use crate::error::TradingResult;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BestBidAsk {
    pub bid: Decimal,
    pub ask: Decimal,
}

impl BestBidAsk {
    pub fn to_quote(self) -> Quote {
        Quote::new(self.bid, self.ask)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PositionSnapshot {
    /// Positive is long, negative is short
    pub size: Decimal,
    pub avg_entry_price: Option<Decimal>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrderStatusReport {
    pub status: OrderStatus,
    pub filled_size: Decimal,
}

#[async_trait]
pub trait VenueClient: Send + Sync {
    /// `Ok(None)` when either side of the book is empty
    async fn get_best_bid_ask(&self, instrument: &str) -> TradingResult<Option<BestBidAsk>>;

    async fn get_tick_size(&self, instrument: &str) -> TradingResult<Decimal>;

    async fn get_min_order_size(&self, _instrument: &str) -> TradingResult<Option<Decimal>> {
        Ok(None)
    }

    async fn get_position(&self, instrument: &str) -> TradingResult<PositionSnapshot>;

    async fn place_limit_order(
        &self,
        instrument: &str,
        side: Side,
        price: Decimal,
        size: Decimal,
        post_only: bool,
    ) -> TradingResult<String>;

    async fn place_market_order(&self, instrument: &str, side: Side, size: Decimal)
        -> TradingResult<String>;

    /// Idempotent: cancelling an order that is already closed succeeds.
    async fn cancel_order(&self, order_id: &str) -> TradingResult<()>;

    async fn get_order_status(&self, order_id: &str) -> TradingResult<OrderStatusReport>;
}

/// Run a venue call under `limit`; an elapsed timer becomes `VenueTransient`.
pub async fn with_timeout<T, F>(limit: std::time::Duration, call: F) -> TradingResult<T>
where
    F: std::future::Future<Output = TradingResult<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(elapsed) => Err(elapsed.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TradingError;
    use crate::simulation::PaperVenue;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_slow_call_becomes_transient() {
        let venue = PaperVenue::new("ETH", dec!(0.1), dec!(99.9), dec!(100.1));
        venue.set_latency(Duration::from_secs(5)).await;

        let result = with_timeout(
            Duration::from_millis(200),
            venue.place_limit_order("ETH", Side::Buy, dec!(99), dec!(1), true),
        )
        .await;

        assert!(matches!(result, Err(TradingError::VenueTransient(_))));
        assert!(result.unwrap_err().is_retryable());
        // Abandoned before it reached the book
        assert_eq!(venue.total_orders_placed().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_within_limit_passes_through() {
        let venue = PaperVenue::new("ETH", dec!(0.1), dec!(99.9), dec!(100.1));
        venue.set_latency(Duration::from_millis(50)).await;

        let status = with_timeout(Duration::from_millis(200), venue.get_order_status("missing"))
            .await
            .unwrap();
        assert_eq!(status.status, OrderStatus::Unknown);
    }
}
