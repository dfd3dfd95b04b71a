// Common test utilities and helpers

#![allow(dead_code)]

use std::sync::Arc;

use grid_trading_engine::{
    Config, EngineConfig, GridConfig, LoggingConfig, PaperVenue, RebalanceEngine,
};
use rust_decimal_macros::dec;

/// Grid around 100 with 10 levels and 5% range on a 0.1 tick
pub fn create_test_grid_config() -> GridConfig {
    GridConfig {
        trading_pair: "ETH".to_string(),
        grid_count: 10,
        order_size: dec!(0.01),
        max_position_size: dec!(0.1),
        price_range_percent: dec!(5),
        stop_loss_percent: dec!(10),
        check_interval_secs: 1,
        disable_stop_loss: false,
    }
}

pub fn create_test_config() -> Config {
    Config {
        grid: create_test_grid_config(),
        engine: EngineConfig::unpaced(),
        logging: LoggingConfig::default(),
    }
}

/// Paper venue quoting 99.9 / 100.1, so mid is exactly 100
pub fn create_paper_venue() -> Arc<PaperVenue> {
    Arc::new(PaperVenue::new("ETH", dec!(0.1), dec!(99.9), dec!(100.1)))
}

pub fn create_engine(venue: Arc<PaperVenue>) -> RebalanceEngine<PaperVenue> {
    create_engine_with(venue, create_test_grid_config(), EngineConfig::unpaced())
}

pub fn create_engine_with(
    venue: Arc<PaperVenue>,
    grid: GridConfig,
    engine: EngineConfig,
) -> RebalanceEngine<PaperVenue> {
    RebalanceEngine::new(venue, grid, engine).expect("Failed to build engine")
}
