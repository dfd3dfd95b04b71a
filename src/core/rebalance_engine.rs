// Grid strategy engine: owns the strategy state and runs the reconciliation cycle
//
// Phases: Idle -> PlacingInitial -> Monitoring -> (Rebalancing <-> Monitoring)
// -> Liquidating -> Stopped. One cycle runs to completion before the next
// starts; `run_cycle` takes `&mut self`, so two cycles can never overlap.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

use crate::clients::{with_timeout, VenueClient};
use crate::config::{EngineConfig, GridConfig};
use crate::core::grid_calculator::{calculate_grid_levels, round_to_tick};
use crate::core::order_ledger::{CancelReport, OrderLedger, PlacementOutcome};
use crate::core::position_tracker::{Position, PositionTracker};
use crate::core::risk_guard::RiskGuard;
use crate::core::scheduler::TickSource;
use crate::core::shutdown::ShutdownSignal;
use crate::core::types::{EnginePhase, GridLevel, Quote, Side};
use crate::error::{TradingError, TradingResult};

/// Aggregate root. Only the engine mutates it.
#[derive(Debug)]
pub struct StrategyState {
    pub center_price: Decimal,
    pub quote: Quote,
    pub tick_size: Decimal,
    pub levels: Vec<GridLevel>,
    pub ledger: OrderLedger,
    pub position: PositionTracker,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PlacementSummary {
    pub placed: usize,
    pub suppressed: usize,
    pub rejected: usize,
    pub failed: usize,
    pub already_working: usize,
}

impl PlacementSummary {
    fn record(&mut self, outcome: &PlacementOutcome) {
        match outcome {
            PlacementOutcome::Placed(_) => self.placed += 1,
            PlacementOutcome::AlreadyWorking => self.already_working += 1,
            PlacementOutcome::Suppressed => self.suppressed += 1,
            PlacementOutcome::Rejected(_) => self.rejected += 1,
            PlacementOutcome::Failed(_) => self.failed += 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ClosePath {
    NothingToClose,
    Market { order_id: String },
    Limit { order_id: String, price: Decimal },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiquidationReport {
    pub cancel: CancelReport,
    pub close: ClosePath,
    pub closed_size: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// Market data was unavailable; nothing was touched
    Skipped { reason: String },
    Rebalanced { filled: usize, placement: PlacementSummary },
    Liquidated(LiquidationReport),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StopReason {
    Shutdown,
    TicksExhausted,
    StopLoss,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunOutcome {
    pub reason: StopReason,
    pub cycles: u64,
    pub drain: Option<CancelReport>,
    pub liquidation: Option<LiquidationReport>,
}

/// Serializable snapshot for status reporting
#[derive(Debug, Clone, Serialize)]
pub struct StrategyStatus {
    pub phase: EnginePhase,
    pub trading_pair: String,
    pub center_price: Decimal,
    pub bid: Decimal,
    pub ask: Decimal,
    pub mid: Decimal,
    pub position_size: Decimal,
    pub entry_price: Option<Decimal>,
    pub entry_is_estimate: bool,
    pub unrealized_pnl: Decimal,
    pub open_orders: usize,
    pub grid_levels: usize,
    pub cycles: u64,
    pub fills: u64,
    pub stop_loss_disabled: bool,
    pub last_update: Option<DateTime<Utc>>,
}

pub struct RebalanceEngine<V: VenueClient + ?Sized> {
    venue: Arc<V>,
    config: GridConfig,
    engine_config: EngineConfig,
    risk: RiskGuard,
    state: StrategyState,
    phase: EnginePhase,
    shutdown: Option<ShutdownSignal>,
    cycles: u64,
    fills: u64,
    last_update: Option<DateTime<Utc>>,
}

impl<V: VenueClient + ?Sized> RebalanceEngine<V> {
    pub fn new(
        venue: Arc<V>,
        config: GridConfig,
        engine_config: EngineConfig,
    ) -> TradingResult<Self> {
        if config.grid_count == 0 {
            return Err(TradingError::Configuration(
                "grid_count must be greater than 0".to_string(),
            ));
        }
        if config.order_size <= Decimal::ZERO {
            return Err(TradingError::Configuration("order_size must be positive".to_string()));
        }
        if config.price_range_percent <= Decimal::ZERO {
            return Err(TradingError::Configuration(
                "price_range_percent must be positive".to_string(),
            ));
        }
        if config.max_position_size < Decimal::ZERO {
            return Err(TradingError::Configuration(
                "max_position_size must be non-negative".to_string(),
            ));
        }

        let state = StrategyState {
            center_price: Decimal::ZERO,
            quote: Quote::default(),
            tick_size: Decimal::ZERO,
            levels: Vec::new(),
            ledger: OrderLedger::new(&engine_config),
            position: PositionTracker::new(),
        };

        Ok(Self {
            venue,
            risk: RiskGuard::from_config(&config),
            config,
            engine_config,
            state,
            phase: EnginePhase::Idle,
            shutdown: None,
            cycles: 0,
            fills: 0,
            last_update: None,
        })
    }

    pub fn phase(&self) -> EnginePhase {
        self.phase
    }

    pub fn state(&self) -> &StrategyState {
        &self.state
    }

    pub fn levels(&self) -> &[GridLevel] {
        &self.state.levels
    }

    pub fn ledger(&self) -> &OrderLedger {
        &self.state.ledger
    }

    pub fn position(&self) -> Position {
        self.state.position.position()
    }

    pub fn venue(&self) -> &Arc<V> {
        &self.venue
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn compute_unrealized_pnl(&self) -> Decimal {
        self.risk.unrealized_pnl(&self.position(), self.state.quote.mid)
    }

    pub fn check_stop_loss(&self) -> bool {
        self.risk.check_stop_loss(&self.position(), self.state.quote.mid)
    }

    /// Fetch instrument metadata, center price and position, then build the grid.
    ///
    /// Any failure to obtain metadata or a center price is returned to the
    /// caller; nothing has been placed at that point.
    pub async fn initialize(&mut self) -> TradingResult<()> {
        if self.phase != EnginePhase::Idle {
            return Err(TradingError::InvalidState(
                format!("initialize called in phase {}", self.phase),
            ));
        }
        let pair = self.config.trading_pair.clone();
        let timeout = self.engine_config.venue_timeout();
        info!("🔧 Initializing grid strategy for {}", pair);

        let tick = with_timeout(timeout, self.venue.get_tick_size(&pair))
            .await
            .map_err(|e| TradingError::MarketData(format!("tick size for {}: {}", pair, e)))?;
        if tick <= Decimal::ZERO {
            return Err(TradingError::Configuration(
                format!("venue tick size {} is not positive", tick),
            ));
        }

        let min_size = with_timeout(timeout, self.venue.get_min_order_size(&pair))
            .await
            .map_err(|e| {
                TradingError::MarketData(format!("minimum order size for {}: {}", pair, e))
            })?;
        if let Some(min) = min_size {
            if self.config.order_size < min {
                return Err(TradingError::Configuration(format!(
                    "order_size {} is below the venue minimum {}",
                    self.config.order_size, min
                )));
            }
        }

        self.state.tick_size = tick;
        self.refresh_market()
            .await
            .map_err(|e| TradingError::MarketData(format!("center price for {}: {}", pair, e)))?;

        self.state.levels = calculate_grid_levels(
            self.state.center_price,
            self.config.price_range_percent,
            self.config.grid_count,
            tick,
        )
        .map_err(|e| TradingError::Configuration(e.to_string()))?;

        if let Err(e) = self
            .state
            .position
            .refresh(&*self.venue, &pair, self.state.quote.mid, timeout)
            .await
        {
            warn!(
                category = e.category(),
                "⚠️  Initial position query failed, assuming cached {}: {}",
                self.state.position.size(),
                e
            );
        }

        if let (Some(first), Some(last)) = (self.state.levels.first(), self.state.levels.last()) {
            info!(
                "✅ Strategy initialized - pair: {}, center: {}, tick: {}, {} levels from {} to {}",
                pair,
                self.state.center_price,
                tick,
                self.state.levels.len(),
                first.price,
                last.price
            );
        }
        Ok(())
    }

    /// Initialize if needed and place the initial ladder
    pub async fn start(&mut self) -> TradingResult<PlacementSummary> {
        if self.phase == EnginePhase::Idle && self.state.levels.is_empty() {
            self.initialize().await?;
        }
        if self.phase != EnginePhase::Idle {
            return Err(TradingError::InvalidState(format!("start called in phase {}", self.phase)));
        }

        self.phase = EnginePhase::PlacingInitial;
        info!("🚀 Placing initial grid orders");
        let summary = self.place_missing_orders().await;
        self.phase = EnginePhase::Monitoring;
        self.last_update = Some(Utc::now());

        info!(
            "🎯 Initial placement complete - placed: {}, suppressed: {}, rejected: {}, failed: {}",
            summary.placed, summary.suppressed, summary.rejected, summary.failed
        );
        Ok(summary)
    }

    /// One reconciliation cycle: refresh, check stop-loss, then rebalance or liquidate.
    pub async fn run_cycle(&mut self) -> TradingResult<CycleOutcome> {
        if self.phase != EnginePhase::Monitoring {
            return Err(TradingError::InvalidState(
                format!("cycle requested in phase {}", self.phase),
            ));
        }
        self.cycles += 1;
        let pair = self.config.trading_pair.clone();

        if let Err(e) = self.refresh_market().await {
            warn!(
                category = e.category(),
                "⚠️  Cycle {} skipped, price refresh failed: {}",
                self.cycles,
                e
            );
            return Ok(CycleOutcome::Skipped { reason: e.to_string() });
        }

        if let Err(e) = self
            .state
            .position
            .refresh(
                &*self.venue,
                &pair,
                self.state.quote.mid,
                self.engine_config.venue_timeout(),
            )
            .await
        {
            warn!(
                category = e.category(),
                "⚠️  Position refresh failed, keeping cached {}: {}",
                self.state.position.size(),
                e
            );
        }

        if let Some(breach) = self.risk.stop_loss_breach(&self.position(), self.state.quote.mid) {
            return self.liquidate(breach).await.map(CycleOutcome::Liquidated);
        }

        self.phase = EnginePhase::Rebalancing;
        let refresh = self
            .state
            .ledger
            .refresh_statuses(&*self.venue, &mut self.state.levels)
            .await;
        self.fills += refresh.filled.len() as u64;

        let placement = self.place_missing_orders().await;
        self.phase = EnginePhase::Monitoring;
        self.last_update = Some(Utc::now());

        if placement.placed > 0 {
            info!("🔄 Rebalance complete - replaced {} missing grid orders", placement.placed);
        }
        self.log_status();

        Ok(CycleOutcome::Rebalanced {
            filled: refresh.filled.len(),
            placement,
        })
    }

    /// Drive cycles from `ticks` until shutdown, tick exhaustion or stop-loss.
    ///
    /// Shutdown and exhaustion end with a bounded drain; stop-loss ends after
    /// liquidation. A failed liquidation is returned as an error.
    pub async fn run<T: TickSource + ?Sized>(
        &mut self,
        ticks: &mut T,
        shutdown: ShutdownSignal,
    ) -> TradingResult<RunOutcome> {
        self.shutdown = Some(shutdown.clone());
        let mut shutdown = shutdown;

        if self.phase == EnginePhase::Idle {
            self.start().await?;
        }

        let reason = loop {
            if self.phase.is_terminal() {
                break StopReason::StopLoss;
            }
            if shutdown.is_shutting_down() {
                break StopReason::Shutdown;
            }

            tokio::select! {
                biased;
                _ = shutdown.recv() => break StopReason::Shutdown,
                tick = ticks.next_tick() => {
                    if tick.is_none() {
                        break StopReason::TicksExhausted;
                    }
                }
            }

            match self.run_cycle().await {
                Ok(CycleOutcome::Liquidated(report)) => {
                    return Ok(RunOutcome {
                        reason: StopReason::StopLoss,
                        cycles: self.cycles,
                        drain: None,
                        liquidation: Some(report),
                    });
                }
                Ok(_) => {}
                Err(e) if e.is_critical() => return Err(e),
                Err(e) => warn!(
                    category = e.category(),
                    retryable = e.is_retryable(),
                    "⚠️  Cycle {} failed: {}",
                    self.cycles,
                    e
                ),
            }
        };

        if reason == StopReason::StopLoss {
            return Ok(RunOutcome {
                reason,
                cycles: self.cycles,
                drain: None,
                liquidation: None,
            });
        }

        let drain = self.stop().await;
        Ok(RunOutcome {
            reason,
            cycles: self.cycles,
            drain: Some(drain),
            liquidation: None,
        })
    }

    /// Graceful stop: cancel everything within the drain budget.
    pub async fn stop(&mut self) -> CancelReport {
        info!("⏳ Draining grid orders (budget {:?})", self.engine_config.max_drain());
        let deadline = Instant::now() + self.engine_config.max_drain();
        let report = self
            .state
            .ledger
            .cancel_all(&*self.venue, &mut self.state.levels, Some(deadline))
            .await;

        if !report.abandoned.is_empty() {
            error!(
                "❌ Drain deadline passed, {} orders abandoned on venue: {:?}",
                report.abandoned.len(),
                report.abandoned
            );
        }
        if !report.failed.is_empty() {
            warn!("⚠️  {} cancels failed during drain: {:?}", report.failed.len(), report.failed);
        }

        self.phase = EnginePhase::Stopped;
        info!("🏁 Grid strategy stopped - {} orders cancelled", report.cancelled.len());
        report
    }

    pub fn status(&self) -> StrategyStatus {
        let position = self.position();
        StrategyStatus {
            phase: self.phase,
            trading_pair: self.config.trading_pair.clone(),
            center_price: self.state.center_price,
            bid: self.state.quote.bid,
            ask: self.state.quote.ask,
            mid: self.state.quote.mid,
            position_size: position.size,
            entry_price: position.entry_price,
            entry_is_estimate: self.state.position.entry_is_estimate(),
            unrealized_pnl: self.compute_unrealized_pnl(),
            open_orders: self.state.ledger.len(),
            grid_levels: self.state.levels.len(),
            cycles: self.cycles,
            fills: self.fills,
            stop_loss_disabled: self.risk.stop_loss_disabled(),
            last_update: self.last_update,
        }
    }

    async fn refresh_market(&mut self) -> TradingResult<()> {
        let book = with_timeout(
            self.engine_config.venue_timeout(),
            self.venue.get_best_bid_ask(&self.config.trading_pair),
        )
        .await?;

        let Some(book) = book else {
            return Err(TradingError::MarketData("order book is empty".to_string()));
        };
        if book.bid <= Decimal::ZERO || book.ask < book.bid {
            return Err(TradingError::MarketData(
                format!("unusable quote {} / {}", book.bid, book.ask),
            ));
        }

        self.state.quote = book.to_quote();
        self.state.center_price = self.state.quote.mid;
        debug!(
            "Price update - bid: {}, ask: {}, mid: {}",
            book.bid, book.ask, self.state.quote.mid
        );
        Ok(())
    }

    /// Place every missing order on its implied side, outside the near-center band.
    async fn place_missing_orders(&mut self) -> PlacementSummary {
        let mut summary = PlacementSummary::default();
        let center = self.state.center_price;
        let band = self.state.tick_size * Decimal::TWO;
        let size = self.config.order_size;
        let gate = self.risk.position_gate(self.state.position.size());
        let limit_reached = gate.is_err();
        let pacing = self.engine_config.order_pacing();

        if let Err(e) = &gate {
            info!(category = e.category(), "🛡️  {} - suppressing new grid orders", e);
        }

        let mut attempted = 0usize;
        for level in self.state.levels.iter_mut() {
            if self.shutdown.as_ref().is_some_and(|s| s.is_shutting_down()) {
                debug!("Shutdown requested, stopping placements");
                break;
            }
            if (level.price - center).abs() < band {
                continue;
            }
            let side = if level.price < center { Side::Buy } else { Side::Sell };

            if level.order_id(side).is_none() && level.is_filled(side) {
                level.set_filled(side, false);
            }
            if level.order_id(side).is_some() {
                summary.already_working += 1;
                continue;
            }

            if attempted > 0 && !limit_reached && !pacing.is_zero() {
                sleep(pacing).await;
                if self.shutdown.as_ref().is_some_and(|s| s.is_shutting_down()) {
                    debug!("Shutdown requested during pacing, stopping placements");
                    break;
                }
            }
            attempted += 1;

            let outcome = self
                .state
                .ledger
                .place_order(
                    &*self.venue,
                    &self.config.trading_pair,
                    level,
                    side,
                    size,
                    limit_reached,
                )
                .await;
            summary.record(&outcome);
        }

        summary
    }

    /// Cancel the ladder and close the whole position. Always ends Stopped.
    async fn liquidate(&mut self, breach: TradingError) -> TradingResult<LiquidationReport> {
        warn!("🚨 {} - liquidating", breach);
        self.phase = EnginePhase::Liquidating;

        let cancel = self
            .state
            .ledger
            .cancel_all(&*self.venue, &mut self.state.levels, None)
            .await;

        let closed_size = self.state.position.size().abs();
        let close = self.close_position().await;
        self.phase = EnginePhase::Stopped;
        self.last_update = Some(Utc::now());

        match close {
            Ok(close) => {
                info!("🏁 Stop-loss handled, strategy stopped");
                Ok(LiquidationReport {
                    cancel,
                    close,
                    closed_size,
                })
            }
            Err(e) => {
                error!(
                    "❌ CRITICAL: could not close position {} - operator attention required: {}",
                    self.state.position.size(),
                    e
                );
                Err(e)
            }
        }
    }

    async fn close_position(&mut self) -> TradingResult<ClosePath> {
        let size = self.state.position.size();
        if size.is_zero() {
            info!("No open position, nothing to close");
            return Ok(ClosePath::NothingToClose);
        }

        let pair = self.config.trading_pair.clone();
        let timeout = self.engine_config.venue_timeout();
        let (side, qty) = if size > Decimal::ZERO {
            (Side::Sell, size)
        } else {
            (Side::Buy, size.abs())
        };

        info!("📤 Closing position {} with a {} market order", size, side);
        let market = with_timeout(timeout, self.venue.place_market_order(&pair, side, qty)).await;
        let market_err = match market {
            Ok(order_id) => {
                info!(
                    target: "grid::trade",
                    action = "CLOSE",
                    side = %side,
                    size = %qty,
                    order_id = %order_id,
                    "✅ Market close submitted"
                );
                return Ok(ClosePath::Market { order_id });
            }
            Err(e) => e,
        };
        warn!("⚠️  Market close failed, falling back to limit: {}", market_err);

        let raw = match side {
            Side::Sell => self.state.quote.bid * dec!(0.999),
            Side::Buy => self.state.quote.ask * dec!(1.001),
        };
        let price = round_to_tick(raw, self.state.tick_size);

        let limit = self.venue.place_limit_order(&pair, side, price, qty, false);
        match with_timeout(timeout, limit).await {
            Ok(order_id) => {
                info!(
                    target: "grid::trade",
                    action = "CLOSE",
                    side = %side,
                    price = %price,
                    size = %qty,
                    order_id = %order_id,
                    "✅ Limit close submitted"
                );
                Ok(ClosePath::Limit { order_id, price })
            }
            Err(limit_err) => Err(TradingError::LiquidationFailed(format!(
                "market order: {}; limit order at {}: {}",
                market_err, price, limit_err
            ))),
        }
    }

    fn log_status(&self) {
        let position = self.position();
        info!(
            target: "grid::status",
            open_orders = self.state.ledger.len(),
            position = %position.size,
            unrealized_pnl = %self.compute_unrealized_pnl(),
            "📊 Grid status - orders: {}, position: {}, mid: {}",
            self.state.ledger.len(),
            position.size,
            self.state.quote.mid
        );
    }
}
