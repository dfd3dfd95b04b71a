// Grid level derivation

use crate::core::types::GridLevel;
use crate::error::{TradingError, TradingResult};
use rust_decimal::{Decimal, RoundingStrategy};

/// Floor `price` to a multiple of `tick`.
pub fn round_to_tick(price: Decimal, tick: Decimal) -> Decimal {
    if tick <= Decimal::ZERO {
        return price;
    }
    (price / tick).round_dp_with_strategy(0, RoundingStrategy::ToNegativeInfinity) * tick
}

/// Raw candidate prices, before positivity filtering and deduplication.
///
/// Always `count + 1` entries: `center - range + i * spacing` for
/// `i in 0..=count`, each floored to the tick.
pub fn grid_candidates(
    center: Decimal,
    range_percent: Decimal,
    count: usize,
    tick: Decimal,
) -> TradingResult<Vec<Decimal>> {
    if count == 0 {
        return Err(TradingError::Domain("grid level count must be greater than 0".to_string()));
    }
    if tick <= Decimal::ZERO {
        return Err(TradingError::Domain(format!("tick size must be positive, got {}", tick)));
    }

    let range = center * range_percent / Decimal::ONE_HUNDRED;
    let spacing = range * Decimal::TWO / Decimal::from(count);
    let lower = center - range;

    Ok((0..=count)
        .map(|i| round_to_tick(lower + spacing * Decimal::from(i), tick))
        .collect())
}

/// Compute the ladder around `center`.
///
/// Non-positive prices are discarded and duplicate prices produced by a tick
/// coarser than the spacing are collapsed, so the result is strictly
/// ascending.
pub fn calculate_grid_levels(
    center: Decimal,
    range_percent: Decimal,
    count: usize,
    tick: Decimal,
) -> TradingResult<Vec<GridLevel>> {
    let mut prices: Vec<Decimal> = grid_candidates(center, range_percent, count, tick)?
        .into_iter()
        .filter(|p| *p > Decimal::ZERO)
        .collect();

    prices.sort();
    prices.dedup();

    Ok(prices.into_iter().map(GridLevel::new).collect())
}
