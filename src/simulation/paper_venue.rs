// In-memory venue with a single instrument
//
// Resting limit orders fill when the quote moves through them; post-only
// orders that would cross are rejected; market orders fill at the touch.
// Fills are folded into a net position with a volume-weighted entry price.
// Every venue call can be made to fail on demand, which is how the tests
// exercise the engine's fault isolation.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

use crate::clients::{BestBidAsk, OrderStatusReport, PositionSnapshot, VenueClient};
use crate::core::types::{OrderStatus, Side};
use crate::error::{TradingError, TradingResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderKind {
    Limit { post_only: bool },
    Market,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PaperOrder {
    pub id: String,
    pub side: Side,
    pub kind: OrderKind,
    pub price: Option<Decimal>,
    pub size: Decimal,
    pub filled: Decimal,
    pub status: OrderStatus,
}

#[derive(Debug, Default)]
struct Faults {
    quotes: u32,
    positions: u32,
    placements: u32,
    statuses: u32,
    cancels: u32,
    market_orders: bool,
    aggressive_limits: bool,
}

#[derive(Debug)]
struct PaperState {
    quote: Option<BestBidAsk>,
    orders: HashMap<String, PaperOrder>,
    next_id: u64,
    position: Decimal,
    avg_entry: Option<Decimal>,
    report_avg_entry: bool,
    faults: Faults,
    latency: Duration,
    status_queries: usize,
    cancel_calls: usize,
}

pub struct PaperVenue {
    instrument: String,
    tick_size: Decimal,
    min_order_size: Option<Decimal>,
    state: Mutex<PaperState>,
}

fn take_fault(counter: &mut u32) -> bool {
    if *counter > 0 {
        *counter -= 1;
        true
    } else {
        false
    }
}

fn transient(what: &str) -> TradingError {
    TradingError::VenueTransient(format!("simulated {} failure", what))
}

impl PaperState {
    fn crosses(&self, side: Side, price: Decimal) -> bool {
        match (self.quote, side) {
            (Some(q), Side::Buy) => price >= q.ask,
            (Some(q), Side::Sell) => price <= q.bid,
            (None, _) => false,
        }
    }

    fn new_id(&mut self) -> String {
        self.next_id += 1;
        format!("paper-{}", self.next_id)
    }

    /// Fold a fill into the net position
    fn apply_fill(&mut self, side: Side, price: Decimal, qty: Decimal) {
        let signed = match side {
            Side::Buy => qty,
            Side::Sell => -qty,
        };
        let before = self.position;
        let after = before + signed;

        if before.is_zero() || before.is_sign_positive() == signed.is_sign_positive() {
            let prior = self.avg_entry.unwrap_or(price);
            let total = before.abs() + qty;
            self.avg_entry = Some((before.abs() * prior + qty * price) / total);
        } else if after.is_zero() {
            self.avg_entry = None;
        } else if after.is_sign_positive() != before.is_sign_positive() {
            // Flipped through zero: the remainder opened at this price.
            self.avg_entry = Some(price);
        }

        self.position = after;
    }

    fn fill_crossed_orders(&mut self) {
        let Some(quote) = self.quote else {
            return;
        };

        let mut fills = Vec::new();
        for order in self.orders.values_mut() {
            if order.status != OrderStatus::Open {
                continue;
            }
            let Some(price) = order.price else {
                continue;
            };
            let crossed = match order.side {
                Side::Buy => price >= quote.ask,
                Side::Sell => price <= quote.bid,
            };
            if crossed {
                let qty = order.size - order.filled;
                order.filled = order.size;
                order.status = OrderStatus::Filled;
                fills.push((order.id.clone(), order.side, price, qty));
            }
        }

        fills.sort_by(|a, b| a.0.cmp(&b.0));
        for (id, side, price, qty) in fills {
            debug!("Paper fill {} {} {} @ {}", id, side, qty, price);
            self.apply_fill(side, price, qty);
        }
    }
}

impl PaperVenue {
    pub fn new(instrument: &str, tick_size: Decimal, bid: Decimal, ask: Decimal) -> Self {
        Self {
            instrument: instrument.to_string(),
            tick_size,
            min_order_size: None,
            state: Mutex::new(PaperState {
                quote: Some(BestBidAsk { bid, ask }),
                orders: HashMap::new(),
                next_id: 0,
                position: Decimal::ZERO,
                avg_entry: None,
                report_avg_entry: true,
                faults: Faults::default(),
                latency: Duration::ZERO,
                status_queries: 0,
                cancel_calls: 0,
            }),
        }
    }

    pub fn with_min_order_size(mut self, size: Decimal) -> Self {
        self.min_order_size = Some(size);
        self
    }

    fn check_instrument(&self, instrument: &str) -> TradingResult<()> {
        if instrument != self.instrument {
            return Err(TradingError::MarketData(format!("unknown instrument {}", instrument)));
        }
        Ok(())
    }

    /// Move the book; resting orders it passes through fill at their price.
    pub async fn set_quote(&self, bid: Decimal, ask: Decimal) {
        let mut state = self.state.lock().await;
        state.quote = Some(BestBidAsk { bid, ask });
        state.fill_crossed_orders();
    }

    /// Empty the book so `get_best_bid_ask` returns `None`
    pub async fn clear_quote(&self) {
        self.state.lock().await.quote = None;
    }

    pub async fn set_position(&self, size: Decimal, avg_entry: Option<Decimal>) {
        let mut state = self.state.lock().await;
        state.position = size;
        state.avg_entry = if size.is_zero() { None } else { avg_entry };
    }

    /// Stop reporting an average entry price with positions
    pub async fn hide_avg_entry(&self) {
        self.state.lock().await.report_avg_entry = false;
    }

    /// Cancel an order from the venue side, as an exchange-initiated cancel would
    pub async fn cancel_externally(&self, order_id: &str) {
        let mut state = self.state.lock().await;
        if let Some(order) = state.orders.get_mut(order_id) {
            if order.status == OrderStatus::Open {
                order.status = OrderStatus::Canceled;
            }
        }
    }

    /// Delay order, cancel, status and position calls by `latency`.
    /// A call abandoned while waiting never reaches the book.
    pub async fn set_latency(&self, latency: Duration) {
        self.state.lock().await.latency = latency;
    }

    async fn respond_after_latency(&self) {
        let latency = self.state.lock().await.latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }

    pub async fn fail_next_quotes(&self, n: u32) {
        self.state.lock().await.faults.quotes = n;
    }

    pub async fn fail_next_position_queries(&self, n: u32) {
        self.state.lock().await.faults.positions = n;
    }

    pub async fn fail_next_placements(&self, n: u32) {
        self.state.lock().await.faults.placements = n;
    }

    pub async fn fail_next_status_queries(&self, n: u32) {
        self.state.lock().await.faults.statuses = n;
    }

    pub async fn fail_next_cancels(&self, n: u32) {
        self.state.lock().await.faults.cancels = n;
    }

    pub async fn fail_market_orders(&self, fail: bool) {
        self.state.lock().await.faults.market_orders = fail;
    }

    /// Fail limit orders that are not post-only (the liquidation fallback)
    pub async fn fail_aggressive_limits(&self, fail: bool) {
        self.state.lock().await.faults.aggressive_limits = fail;
    }

    pub async fn open_order_count(&self) -> usize {
        self.state
            .lock()
            .await
            .orders
            .values()
            .filter(|o| o.status == OrderStatus::Open)
            .count()
    }

    /// Open orders as (side, price), sorted by price
    pub async fn open_orders(&self) -> Vec<(Side, Decimal)> {
        let state = self.state.lock().await;
        let mut open: Vec<(Side, Decimal)> = state
            .orders
            .values()
            .filter(|o| o.status == OrderStatus::Open)
            .filter_map(|o| o.price.map(|p| (o.side, p)))
            .collect();
        open.sort_by(|a, b| a.1.cmp(&b.1));
        open
    }

    pub async fn orders(&self) -> Vec<PaperOrder> {
        let state = self.state.lock().await;
        let mut orders: Vec<PaperOrder> = state.orders.values().cloned().collect();
        orders.sort_by_key(|o| o.id.trim_start_matches("paper-").parse::<u64>().unwrap_or(0));
        orders
    }

    pub async fn total_orders_placed(&self) -> usize {
        self.state.lock().await.orders.len()
    }

    /// Orders that were not post-only limits, i.e. closing orders
    pub async fn closing_orders(&self) -> Vec<PaperOrder> {
        self.orders()
            .await
            .into_iter()
            .filter(|o| o.kind != OrderKind::Limit { post_only: true })
            .collect()
    }

    pub async fn position(&self) -> (Decimal, Option<Decimal>) {
        let state = self.state.lock().await;
        (state.position, state.avg_entry)
    }

    pub async fn status_queries(&self) -> usize {
        self.state.lock().await.status_queries
    }

    pub async fn cancel_calls(&self) -> usize {
        self.state.lock().await.cancel_calls
    }
}

#[async_trait]
impl VenueClient for PaperVenue {
    async fn get_best_bid_ask(&self, instrument: &str) -> TradingResult<Option<BestBidAsk>> {
        self.check_instrument(instrument)?;
        let mut state = self.state.lock().await;
        if take_fault(&mut state.faults.quotes) {
            return Err(transient("quote"));
        }
        Ok(state.quote)
    }

    async fn get_tick_size(&self, instrument: &str) -> TradingResult<Decimal> {
        self.check_instrument(instrument)?;
        Ok(self.tick_size)
    }

    async fn get_min_order_size(&self, instrument: &str) -> TradingResult<Option<Decimal>> {
        self.check_instrument(instrument)?;
        Ok(self.min_order_size)
    }

    async fn get_position(&self, instrument: &str) -> TradingResult<PositionSnapshot> {
        self.check_instrument(instrument)?;
        self.respond_after_latency().await;
        let mut state = self.state.lock().await;
        if take_fault(&mut state.faults.positions) {
            return Err(transient("position"));
        }
        Ok(PositionSnapshot {
            size: state.position,
            avg_entry_price: if state.report_avg_entry { state.avg_entry } else { None },
        })
    }

    async fn place_limit_order(
        &self,
        instrument: &str,
        side: Side,
        price: Decimal,
        size: Decimal,
        post_only: bool,
    ) -> TradingResult<String> {
        self.check_instrument(instrument)?;
        self.respond_after_latency().await;
        let mut state = self.state.lock().await;
        if take_fault(&mut state.faults.placements) {
            return Err(transient("placement"));
        }
        if !post_only && state.faults.aggressive_limits {
            return Err(transient("limit order"));
        }
        if size <= Decimal::ZERO || price <= Decimal::ZERO {
            return Err(TradingError::VenueRejection(format!("invalid order {} @ {}", size, price)));
        }
        if let Some(min) = self.min_order_size {
            if size < min {
                return Err(TradingError::VenueRejection(
                    format!("size {} below minimum {}", size, min),
                ));
            }
        }

        let crosses = state.crosses(side, price);
        if post_only && crosses {
            return Err(TradingError::VenueRejection(format!(
                "post-only {} at {} would cross the book",
                side, price
            )));
        }

        let id = state.new_id();
        let mut order = PaperOrder {
            id: id.clone(),
            side,
            kind: OrderKind::Limit { post_only },
            price: Some(price),
            size,
            filled: Decimal::ZERO,
            status: OrderStatus::Open,
        };
        if crosses {
            order.filled = size;
            order.status = OrderStatus::Filled;
            state.apply_fill(side, price, size);
        }
        state.orders.insert(id.clone(), order);
        Ok(id)
    }

    async fn place_market_order(
        &self,
        instrument: &str,
        side: Side,
        size: Decimal,
    ) -> TradingResult<String> {
        self.check_instrument(instrument)?;
        self.respond_after_latency().await;
        let mut state = self.state.lock().await;
        if state.faults.market_orders {
            return Err(transient("market order"));
        }
        let Some(quote) = state.quote else {
            return Err(TradingError::VenueRejection("no liquidity for market order".to_string()));
        };
        let price = match side {
            Side::Buy => quote.ask,
            Side::Sell => quote.bid,
        };

        let id = state.new_id();
        state.orders.insert(
            id.clone(),
            PaperOrder {
                id: id.clone(),
                side,
                kind: OrderKind::Market,
                price: Some(price),
                size,
                filled: size,
                status: OrderStatus::Filled,
            },
        );
        state.apply_fill(side, price, size);
        Ok(id)
    }

    async fn cancel_order(&self, order_id: &str) -> TradingResult<()> {
        self.respond_after_latency().await;
        let mut state = self.state.lock().await;
        state.cancel_calls += 1;
        if take_fault(&mut state.faults.cancels) {
            return Err(transient("cancel"));
        }
        if let Some(order) = state.orders.get_mut(order_id) {
            if order.status == OrderStatus::Open {
                order.status = OrderStatus::Canceled;
            }
        }
        Ok(())
    }

    async fn get_order_status(&self, order_id: &str) -> TradingResult<OrderStatusReport> {
        self.respond_after_latency().await;
        let mut state = self.state.lock().await;
        state.status_queries += 1;
        if take_fault(&mut state.faults.statuses) {
            return Err(transient("status"));
        }
        Ok(match state.orders.get(order_id) {
            Some(order) => OrderStatusReport {
                status: order.status,
                filled_size: order.filled,
            },
            None => OrderStatusReport {
                status: OrderStatus::Unknown,
                filled_size: Decimal::ZERO,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn venue() -> PaperVenue {
        PaperVenue::new("ETH", dec!(0.1), dec!(99.9), dec!(100.1))
    }

    #[tokio::test]
    async fn test_post_only_crossing_rejected() {
        let venue = venue();
        let err = venue
            .place_limit_order("ETH", Side::Sell, dec!(99.8), dec!(1), true)
            .await
            .unwrap_err();
        assert!(matches!(err, TradingError::VenueRejection(_)));
    }

    #[tokio::test]
    async fn test_quote_move_fills_and_tracks_entry() {
        let venue = venue();
        venue.place_limit_order("ETH", Side::Buy, dec!(99), dec!(1), true).await.unwrap();
        venue.place_limit_order("ETH", Side::Buy, dec!(98), dec!(1), true).await.unwrap();

        venue.set_quote(dec!(97.8), dec!(97.9)).await;
        assert_eq!(venue.position().await, (dec!(2), Some(dec!(98.5))));
        assert_eq!(venue.open_order_count().await, 0);
    }

    #[tokio::test]
    async fn test_reducing_fill_keeps_entry_and_flat_clears_it() {
        let venue = venue();
        venue.set_position(dec!(2), Some(dec!(100))).await;
        venue.place_market_order("ETH", Side::Sell, dec!(1)).await.unwrap();
        assert_eq!(venue.position().await, (dec!(1), Some(dec!(100))));
        venue.place_market_order("ETH", Side::Sell, dec!(1)).await.unwrap();
        assert_eq!(venue.position().await, (Decimal::ZERO, None));
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent() {
        let venue = venue();
        let id = venue.place_limit_order("ETH", Side::Buy, dec!(99), dec!(1), true).await.unwrap();
        venue.cancel_order(&id).await.unwrap();
        venue.cancel_order(&id).await.unwrap();
        venue.cancel_order("missing").await.unwrap();
        let status = venue.get_order_status(&id).await.unwrap();
        assert_eq!(status.status, OrderStatus::Canceled);
    }

    #[tokio::test]
    async fn test_faults_are_consumed() {
        let venue = venue();
        venue.fail_next_quotes(1).await;
        assert!(venue.get_best_bid_ask("ETH").await.is_err());
        assert!(venue.get_best_bid_ask("ETH").await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_latency_delays_order_calls() {
        let venue = venue();
        venue.set_latency(Duration::from_millis(500)).await;

        let start = tokio::time::Instant::now();
        venue.place_limit_order("ETH", Side::Buy, dec!(99), dec!(1), true).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(500));
        assert_eq!(venue.open_order_count().await, 1);
    }
}
