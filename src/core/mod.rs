// Core strategy modules

pub mod types;
pub mod grid_calculator;
pub mod order_ledger;
pub mod position_tracker;
pub mod risk_guard;
pub mod scheduler;
pub mod shutdown;
pub mod rebalance_engine;

// Re-export commonly used types
pub use types::{EnginePhase, GridLevel, Order, OrderStatus, Quote, Side};
pub use grid_calculator::{calculate_grid_levels, grid_candidates, round_to_tick};
pub use order_ledger::{CancelReport, OrderLedger, PlacementOutcome, RefreshReport};
pub use position_tracker::{Position, PositionChange, PositionTracker};
pub use risk_guard::RiskGuard;
pub use scheduler::{ChannelTicks, IntervalTicks, TickSender, TickSource};
pub use shutdown::{shutdown_channel, ShutdownHandle, ShutdownSignal};
pub use rebalance_engine::{
    ClosePath, CycleOutcome, LiquidationReport, PlacementSummary, RebalanceEngine, RunOutcome,
    StopReason, StrategyState, StrategyStatus,
};
