// Resting order bookkeeping
//
// The ledger owns every `Order`; grid levels only hold ids. All venue calls
// made here are fault-isolated: a failure for one order is logged and leaves
// that order exactly as it was, and the loop moves on.

use std::collections::HashMap;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::Serialize;
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::clients::{with_timeout, VenueClient};
use crate::config::EngineConfig;
use crate::core::types::{GridLevel, Order, OrderStatus, Side};
use crate::error::TradingError;

/// What happened to a single placement attempt
#[derive(Debug, Clone, PartialEq)]
pub enum PlacementOutcome {
    Placed(String),
    /// The level already references a working order on this side
    AlreadyWorking,
    /// Position-limit gate closed
    Suppressed,
    /// Venue refused the order; the level stays empty until next cycle
    Rejected(String),
    /// Transient failure; the level stays empty until next cycle
    Failed(String),
}

#[derive(Debug, Clone, Default)]
pub struct RefreshReport {
    pub polled: usize,
    pub filled: Vec<Order>,
    pub canceled: Vec<String>,
    pub failed: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CancelReport {
    pub cancelled: Vec<String>,
    pub failed: Vec<String>,
    /// Orders never attempted because the drain deadline passed
    pub abandoned: Vec<String>,
}

impl CancelReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.abandoned.is_empty()
    }
}

#[derive(Debug)]
pub struct OrderLedger {
    orders: HashMap<String, Order>,
    status_batch_size: usize,
    poll_cursor: usize,
    order_pacing: Duration,
    status_pacing: Duration,
    venue_timeout: Duration,
}

impl OrderLedger {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            orders: HashMap::new(),
            status_batch_size: config.status_batch_size.max(1),
            poll_cursor: 0,
            order_pacing: config.order_pacing(),
            status_pacing: config.status_pacing(),
            venue_timeout: config.venue_timeout(),
        }
    }

    pub fn get(&self, order_id: &str) -> Option<&Order> {
        self.orders.get(order_id)
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn orders(&self) -> impl Iterator<Item = &Order> {
        self.orders.values()
    }

    /// Number of tracked, still-working orders on `side` at `price`
    pub fn count_working(&self, side: Side, price: Decimal) -> usize {
        self.orders
            .values()
            .filter(|o| o.side == side && o.price == price && !o.status.is_closed())
            .count()
    }

    /// Place a post-only order for (`level`, `side`) unless one is already working.
    pub async fn place_order<V: VenueClient + ?Sized>(
        &mut self,
        venue: &V,
        instrument: &str,
        level: &mut GridLevel,
        side: Side,
        size: Decimal,
        limit_reached: bool,
    ) -> PlacementOutcome {
        if let Some(existing) = level.order_id(side).map(str::to_string) {
            match self.orders.get(&existing) {
                Some(order) if !order.status.is_closed() => return PlacementOutcome::AlreadyWorking,
                _ => {
                    // Reference to an order the ledger no longer tracks.
                    warn!("Dropping stale {} reference {} at {}", side, existing, level.price);
                    level.set_order_id(side, None);
                }
            }
        }

        if limit_reached {
            debug!("Position limit reached, skipping {} at {}", side, level.price);
            return PlacementOutcome::Suppressed;
        }

        let placed = with_timeout(
            self.venue_timeout,
            venue.place_limit_order(instrument, side, level.price, size, true),
        )
        .await;

        match placed {
            Ok(order_id) => {
                info!(
                    target: "grid::trade",
                    action = "PLACED",
                    side = %side,
                    price = %level.price,
                    size = %size,
                    order_id = %order_id,
                    "📝 {} order placed",
                    side
                );
                level.set_order_id(side, Some(order_id.clone()));
                let order = Order::new(order_id.clone(), side, level.price, size);
                self.orders.insert(order_id.clone(), order);
                PlacementOutcome::Placed(order_id)
            }
            Err(TradingError::VenueRejection(reason)) => {
                warn!("⚠️  {} order at {} rejected: {}", side, level.price, reason);
                PlacementOutcome::Rejected(reason)
            }
            Err(e) => {
                warn!(
                    category = e.category(),
                    retryable = e.is_retryable(),
                    "⚠️  Failed to place {} order at {}: {}",
                    side,
                    level.price,
                    e
                );
                PlacementOutcome::Failed(e.to_string())
            }
        }
    }

    /// Poll the next batch of tracked orders and apply terminal transitions.
    pub async fn refresh_statuses<V: VenueClient + ?Sized>(
        &mut self,
        venue: &V,
        levels: &mut [GridLevel],
    ) -> RefreshReport {
        let mut report = RefreshReport::default();
        let batch = self.next_batch();

        for (i, order_id) in batch.iter().enumerate() {
            if i > 0 && !self.status_pacing.is_zero() {
                sleep(self.status_pacing).await;
            }

            report.polled += 1;
            let queried = with_timeout(self.venue_timeout, venue.get_order_status(order_id)).await;
            let status = match queried {
                Ok(status) => status,
                Err(e) => {
                    debug!(category = e.category(), "Status query failed for {}: {}", order_id, e);
                    report.failed.push(order_id.clone());
                    continue;
                }
            };

            let Some(order) = self.orders.get_mut(order_id) else {
                continue;
            };
            if status.status == OrderStatus::Unknown {
                debug!(
                    "Venue does not know order {}, keeping last status {:?}",
                    order_id, order.status
                );
                continue;
            }
            order.filled_size = status.filled_size;
            order.status = status.status;

            match status.status {
                OrderStatus::Filled => {
                    let order = self.orders.remove(order_id);
                    if let Some(order) = order {
                        info!(
                            target: "grid::trade",
                            action = "FILLED",
                            side = %order.side,
                            price = %order.price,
                            size = %order.filled_size,
                            order_id = %order.id,
                            "✅ {} order filled",
                            order.side
                        );
                        if let Some(level) = find_level(levels, &order.id, order.side) {
                            level.set_order_id(order.side, None);
                            level.set_filled(order.side, true);
                        }
                        report.filled.push(order);
                    }
                }
                OrderStatus::Canceled => {
                    if let Some(order) = self.orders.remove(order_id) {
                        info!(
                            "🚫 {} order {} at {} canceled by venue",
                            order.side, order.id, order.price
                        );
                        if let Some(level) = find_level(levels, &order.id, order.side) {
                            level.set_order_id(order.side, None);
                        }
                    }
                    report.canceled.push(order_id.clone());
                }
                OrderStatus::Open | OrderStatus::Unknown => {}
            }
        }

        report
    }

    /// Best-effort cancel of every tracked order, then clear all references.
    ///
    /// With a `deadline`, orders not attempted before it are reported as
    /// abandoned instead of being dropped silently.
    pub async fn cancel_all<V: VenueClient + ?Sized>(
        &mut self,
        venue: &V,
        levels: &mut [GridLevel],
        deadline: Option<Instant>,
    ) -> CancelReport {
        let mut report = CancelReport::default();
        let mut ids: Vec<String> = self.orders.keys().cloned().collect();
        ids.sort();

        if !ids.is_empty() {
            info!("🛑 Cancelling {} tracked orders", ids.len());
        }

        for (i, order_id) in ids.into_iter().enumerate() {
            if i > 0 && !self.order_pacing.is_zero() {
                let wake = Instant::now() + self.order_pacing;
                match deadline {
                    Some(deadline) if wake > deadline => sleep_until(deadline).await,
                    _ => sleep_until(wake).await,
                }
            }

            // Remaining budget is measured after pacing.
            let limit = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        report.abandoned.push(order_id);
                        continue;
                    }
                    self.venue_timeout.min(deadline - now)
                }
                None => self.venue_timeout,
            };

            match with_timeout(limit, venue.cancel_order(&order_id)).await {
                Ok(()) => {
                    debug!("Order {} cancelled", order_id);
                    report.cancelled.push(order_id);
                }
                Err(e) => {
                    warn!(
                        category = e.category(),
                        "⚠️  Failed to cancel order {}: {}",
                        order_id,
                        e
                    );
                    report.failed.push(order_id);
                }
            }
        }

        self.orders.clear();
        self.poll_cursor = 0;
        for level in levels.iter_mut() {
            level.clear();
        }

        report
    }

    /// Bounded slice of tracked ids, rotating across calls so no order starves.
    fn next_batch(&mut self) -> Vec<String> {
        let mut ids: Vec<String> = self.orders.keys().cloned().collect();
        if ids.is_empty() {
            return ids;
        }
        ids.sort();

        let start = self.poll_cursor % ids.len();
        let take = self.status_batch_size.min(ids.len());
        let batch: Vec<String> = ids.iter().cycle().skip(start).take(take).cloned().collect();
        self.poll_cursor = (start + take) % ids.len();
        batch
    }
}

fn find_level<'a>(
    levels: &'a mut [GridLevel],
    order_id: &str,
    side: Side,
) -> Option<&'a mut GridLevel> {
    levels.iter_mut().find(|l| l.order_id(side) == Some(order_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::PaperVenue;
    use rust_decimal_macros::dec;

    fn ledger() -> OrderLedger {
        OrderLedger::new(&EngineConfig::unpaced())
    }

    fn venue() -> PaperVenue {
        PaperVenue::new("ETH", dec!(0.1), dec!(99.9), dec!(100.1))
    }

    #[tokio::test]
    async fn test_place_order_records_reference() {
        let venue = venue();
        let mut ledger = ledger();
        let mut level = GridLevel::new(dec!(95));

        let outcome =
            ledger.place_order(&venue, "ETH", &mut level, Side::Buy, dec!(0.01), false).await;
        let PlacementOutcome::Placed(id) = outcome else {
            panic!("expected placement, got {:?}", outcome);
        };
        assert_eq!(level.buy_order_id.as_deref(), Some(id.as_str()));
        assert_eq!(ledger.get(&id).map(|o| o.status), Some(OrderStatus::Open));
    }

    #[tokio::test]
    async fn test_second_placement_is_noop() {
        let venue = venue();
        let mut ledger = ledger();
        let mut level = GridLevel::new(dec!(95));

        ledger.place_order(&venue, "ETH", &mut level, Side::Buy, dec!(0.01), false).await;
        let again =
            ledger.place_order(&venue, "ETH", &mut level, Side::Buy, dec!(0.01), false).await;
        assert_eq!(again, PlacementOutcome::AlreadyWorking);
        assert_eq!(ledger.count_working(Side::Buy, dec!(95)), 1);
        assert_eq!(venue.open_order_count().await, 1);
    }

    #[tokio::test]
    async fn test_limit_gate_suppresses() {
        let venue = venue();
        let mut ledger = ledger();
        let mut level = GridLevel::new(dec!(105));

        let outcome =
            ledger.place_order(&venue, "ETH", &mut level, Side::Sell, dec!(0.01), true).await;
        assert_eq!(outcome, PlacementOutcome::Suppressed);
        assert!(level.sell_order_id.is_none());
        assert!(ledger.is_empty());
    }

    #[tokio::test]
    async fn test_post_only_cross_is_rejected() {
        let venue = venue();
        let mut ledger = ledger();
        // A buy above the ask would take liquidity.
        let mut level = GridLevel::new(dec!(101));

        let outcome =
            ledger.place_order(&venue, "ETH", &mut level, Side::Buy, dec!(0.01), false).await;
        assert!(matches!(outcome, PlacementOutcome::Rejected(_)));
        assert!(level.buy_order_id.is_none());
    }

    #[tokio::test]
    async fn test_refresh_handles_fill() {
        let venue = venue();
        let mut ledger = ledger();
        let mut levels = vec![GridLevel::new(dec!(95))];

        ledger.place_order(&venue, "ETH", &mut levels[0], Side::Buy, dec!(0.01), false).await;
        venue.set_quote(dec!(94.8), dec!(94.9)).await;

        let report = ledger.refresh_statuses(&venue, &mut levels).await;
        assert_eq!(report.filled.len(), 1);
        assert!(levels[0].buy_order_id.is_none());
        assert!(levels[0].buy_filled);
        assert!(ledger.is_empty());
    }

    #[tokio::test]
    async fn test_failed_status_query_keeps_order() {
        let venue = venue();
        let mut ledger = ledger();
        let mut levels = vec![GridLevel::new(dec!(95))];

        ledger.place_order(&venue, "ETH", &mut levels[0], Side::Buy, dec!(0.01), false).await;
        venue.fail_next_status_queries(1).await;

        let report = ledger.refresh_statuses(&venue, &mut levels).await;
        assert_eq!(report.failed.len(), 1);
        assert_eq!(ledger.len(), 1);
        assert!(levels[0].buy_order_id.is_some());
    }

    #[tokio::test]
    async fn test_refresh_batches_rotate() {
        let venue = venue();
        let config = EngineConfig {
            status_batch_size: 2,
            ..EngineConfig::unpaced()
        };
        let mut ledger = OrderLedger::new(&config);
        let mut levels: Vec<GridLevel> =
            [dec!(95), dec!(96), dec!(97)].into_iter().map(GridLevel::new).collect();
        for level in levels.iter_mut() {
            ledger.place_order(&venue, "ETH", level, Side::Buy, dec!(0.01), false).await;
        }

        assert_eq!(ledger.refresh_statuses(&venue, &mut levels).await.polled, 2);
        assert_eq!(ledger.refresh_statuses(&venue, &mut levels).await.polled, 2);
        assert_eq!(venue.status_queries().await, 4);
    }

    #[tokio::test]
    async fn test_cancel_all_clears_even_on_failure() {
        let venue = venue();
        let mut ledger = ledger();
        let mut levels: Vec<GridLevel> =
            [dec!(95), dec!(105)].into_iter().map(GridLevel::new).collect();
        ledger.place_order(&venue, "ETH", &mut levels[0], Side::Buy, dec!(0.01), false).await;
        ledger.place_order(&venue, "ETH", &mut levels[1], Side::Sell, dec!(0.01), false).await;
        venue.fail_next_cancels(1).await;

        let report = ledger.cancel_all(&venue, &mut levels, None).await;
        assert_eq!(report.cancelled.len(), 1);
        assert_eq!(report.failed.len(), 1);
        assert!(ledger.is_empty());
        assert!(levels.iter().all(|l| l.buy_order_id.is_none() && l.sell_order_id.is_none()));
    }

    #[tokio::test]
    async fn test_cancel_all_past_deadline_abandons() {
        let venue = venue();
        let mut ledger = ledger();
        let mut levels = vec![GridLevel::new(dec!(95))];
        ledger.place_order(&venue, "ETH", &mut levels[0], Side::Buy, dec!(0.01), false).await;

        let report = ledger.cancel_all(&venue, &mut levels, Some(Instant::now())).await;
        assert_eq!(report.abandoned.len(), 1);
        assert!(!report.is_clean());
        assert!(ledger.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_status_keeps_last_known() {
        let venue = venue();
        let mut ledger = ledger();
        let mut levels: Vec<GridLevel> =
            [dec!(95), dec!(105)].into_iter().map(GridLevel::new).collect();
        ledger.place_order(&venue, "ETH", &mut levels[0], Side::Buy, dec!(0.01), false).await;

        // Tracked here but never seen by the venue
        let ghost = Order::new("ghost-1".to_string(), Side::Sell, dec!(105), dec!(0.01));
        ledger.orders.insert("ghost-1".to_string(), ghost);
        levels[1].set_order_id(Side::Sell, Some("ghost-1".to_string()));

        let report = ledger.refresh_statuses(&venue, &mut levels).await;
        assert_eq!(report.polled, 2);
        assert!(report.failed.is_empty());
        assert_eq!(ledger.get("ghost-1").map(|o| o.status), Some(OrderStatus::Open));
        assert_eq!(levels[1].sell_order_id.as_deref(), Some("ghost-1"));
        assert_eq!(ledger.count_working(Side::Sell, dec!(105)), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_paced_drain_stops_at_deadline() {
        let venue = venue();
        let config = EngineConfig {
            order_pacing_ms: 100,
            ..EngineConfig::unpaced()
        };
        let mut ledger = OrderLedger::new(&config);
        let mut levels: Vec<GridLevel> = [dec!(95), dec!(96), dec!(97), dec!(98), dec!(99)]
            .into_iter()
            .map(GridLevel::new)
            .collect();
        for level in levels.iter_mut() {
            ledger.place_order(&venue, "ETH", level, Side::Buy, dec!(0.01), false).await;
        }

        let start = Instant::now();
        let deadline = start + Duration::from_millis(250);
        let report = ledger.cancel_all(&venue, &mut levels, Some(deadline)).await;

        // Cancels go out at 0, 100 and 200 ms; the fourth would land at 300 ms
        assert_eq!(report.cancelled.len(), 3);
        assert_eq!(report.abandoned.len(), 2);
        assert_eq!(venue.cancel_calls().await, 3);
        assert_eq!(venue.open_order_count().await, 2);
        assert!(Instant::now() <= deadline);
        assert!(ledger.is_empty());
    }
}
