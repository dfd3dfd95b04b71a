// Grid Trading Engine Library
//
// Places a ladder of post-only limit orders around a center price, keeps it
// replenished as orders fill, and liquidates on a stop-loss breach.

pub mod core;
pub mod clients;
pub mod config;
pub mod error;     // Unified error handling
pub mod logging;
pub mod simulation;

// Re-export core strategy types
pub use crate::core::{
    EnginePhase, GridLevel, Order, OrderStatus, Quote, Side,
    OrderLedger, PositionTracker, RiskGuard, RebalanceEngine, RunOutcome, StopReason,
    StrategyStatus, TickSource, IntervalTicks, ChannelTicks, ShutdownHandle, ShutdownSignal,
    shutdown_channel,
};

// Re-export error types
pub use error::{TradingError, TradingResult};

// Re-export client types
pub use clients::{BestBidAsk, OrderStatusReport, PositionSnapshot, VenueClient};

// Re-export configuration
pub use config::{Config, ConfigError, EngineConfig, GridConfig, LoggingConfig};

// Re-export simulation components
pub use simulation::{PaperVenue, RandomWalkFeed};
