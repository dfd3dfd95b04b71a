// Common types used across the engine

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Open,
    Filled,
    Canceled,
    Unknown,
}

impl OrderStatus {
    /// Filled and Canceled are terminal; Unknown is treated as still working.
    pub fn is_closed(&self) -> bool {
        matches!(self, OrderStatus::Filled | OrderStatus::Canceled)
    }
}

/// A resting order as the ledger last saw it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub side: Side,
    pub price: Decimal,
    pub size: Decimal,
    pub filled_size: Decimal,
    pub status: OrderStatus,
}

impl Order {
    pub fn new(id: String, side: Side, price: Decimal, size: Decimal) -> Self {
        Self {
            id,
            side,
            price,
            size,
            filled_size: Decimal::ZERO,
            status: OrderStatus::Open,
        }
    }
}

/// One rung of the ladder. Order references are ids into the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridLevel {
    pub price: Decimal,
    pub buy_order_id: Option<String>,
    pub sell_order_id: Option<String>,
    pub buy_filled: bool,
    pub sell_filled: bool,
}

impl GridLevel {
    pub fn new(price: Decimal) -> Self {
        Self {
            price,
            buy_order_id: None,
            sell_order_id: None,
            buy_filled: false,
            sell_filled: false,
        }
    }

    pub fn order_id(&self, side: Side) -> Option<&str> {
        match side {
            Side::Buy => self.buy_order_id.as_deref(),
            Side::Sell => self.sell_order_id.as_deref(),
        }
    }

    pub fn set_order_id(&mut self, side: Side, id: Option<String>) {
        match side {
            Side::Buy => self.buy_order_id = id,
            Side::Sell => self.sell_order_id = id,
        }
    }

    pub fn is_filled(&self, side: Side) -> bool {
        match side {
            Side::Buy => self.buy_filled,
            Side::Sell => self.sell_filled,
        }
    }

    pub fn set_filled(&mut self, side: Side, filled: bool) {
        match side {
            Side::Buy => self.buy_filled = filled,
            Side::Sell => self.sell_filled = filled,
        }
    }

    /// Drop both references and filled flags
    pub fn clear(&mut self) {
        self.buy_order_id = None;
        self.sell_order_id = None;
        self.buy_filled = false;
        self.sell_filled = false;
    }
}

/// Last observed top of book
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub bid: Decimal,
    pub ask: Decimal,
    pub mid: Decimal,
}

impl Quote {
    pub fn new(bid: Decimal, ask: Decimal) -> Self {
        Self {
            bid,
            ask,
            mid: (bid + ask) / Decimal::TWO,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnginePhase {
    Idle,
    PlacingInitial,
    Monitoring,
    Rebalancing,
    Liquidating,
    Stopped,
}

impl EnginePhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, EnginePhase::Stopped)
    }
}

impl fmt::Display for EnginePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EnginePhase::Idle => "idle",
            EnginePhase::PlacingInitial => "placing_initial",
            EnginePhase::Monitoring => "monitoring",
            EnginePhase::Rebalancing => "rebalancing",
            EnginePhase::Liquidating => "liquidating",
            EnginePhase::Stopped => "stopped",
        };
        f.write_str(name)
    }
}
