// Net position and entry price tracking

use rust_decimal::Decimal;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::clients::{with_timeout, PositionSnapshot, VenueClient};
use crate::error::TradingResult;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Position {
    /// Positive is long, negative is short
    pub size: Decimal,
    /// Unset while flat
    pub entry_price: Option<Decimal>,
}

impl Position {
    pub fn is_flat(&self) -> bool {
        self.size.is_zero()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PositionChange {
    Unchanged,
    Changed { previous: Decimal, current: Decimal },
}

#[derive(Debug, Default)]
pub struct PositionTracker {
    position: Position,
    entry_is_estimate: bool,
}

impl PositionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn size(&self) -> Decimal {
        self.position.size
    }

    pub fn entry_price(&self) -> Option<Decimal> {
        self.position.entry_price
    }

    /// True when the entry price came from the mid-price fallback
    pub fn entry_is_estimate(&self) -> bool {
        self.entry_is_estimate
    }

    /// Fold a fresh venue snapshot into the cache.
    ///
    /// A size change is treated as a fill: the entry price is recomputed from
    /// the venue average, or from `mid` when the venue reports none.
    pub fn apply(&mut self, snapshot: PositionSnapshot, mid: Decimal) -> PositionChange {
        let previous = self.position.size;
        if snapshot.size == previous {
            return PositionChange::Unchanged;
        }

        self.position.size = snapshot.size;

        if snapshot.size.is_zero() {
            self.position.entry_price = None;
            self.entry_is_estimate = false;
            info!("📉 Position flat (was {}), entry price cleared", previous);
        } else if let Some(avg) = snapshot.avg_entry_price.filter(|p| *p > Decimal::ZERO) {
            self.position.entry_price = Some(avg);
            self.entry_is_estimate = false;
            debug!("Entry price updated from venue average: {}", avg);
        } else if mid > Decimal::ZERO {
            self.position.entry_price = Some(mid);
            self.entry_is_estimate = true;
            warn!(
                "⚠️  Venue reported no average entry; using mid {} as an approximate entry price",
                mid
            );
        }

        info!("📊 Position changed: {} -> {}", previous, snapshot.size);
        PositionChange::Changed {
            previous,
            current: snapshot.size,
        }
    }

    /// Query the venue and apply the result. On failure the cache is left as is.
    pub async fn refresh<V: VenueClient + ?Sized>(
        &mut self,
        venue: &V,
        instrument: &str,
        mid: Decimal,
        timeout: Duration,
    ) -> TradingResult<PositionChange> {
        let snapshot = with_timeout(timeout, venue.get_position(instrument)).await?;
        Ok(self.apply(snapshot, mid))
    }
}
