// Random-walk quote generator for paper runs

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

use crate::core::grid_calculator::round_to_tick;

pub struct RandomWalkFeed {
    mid: Decimal,
    tick: Decimal,
    volatility: f64,
    spread_ticks: u32,
    rng: StdRng,
}

impl RandomWalkFeed {
    /// `volatility` is the maximum relative move per step, e.g. 0.002 for 0.2%.
    pub fn new(start_mid: Decimal, tick: Decimal, volatility: f64) -> Self {
        Self {
            mid: start_mid,
            tick,
            volatility: volatility.abs(),
            spread_ticks: 1,
            rng: StdRng::from_entropy(),
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn mid(&self) -> Decimal {
        self.mid
    }

    /// Advance one step and return the new (bid, ask)
    pub fn step(&mut self) -> (Decimal, Decimal) {
        if self.volatility > 0.0 {
            let change = self.rng.gen_range(-self.volatility..self.volatility);
            let factor = Decimal::from_f64(1.0 + change).unwrap_or(Decimal::ONE);
            let next = self.mid * factor;
            // Never walk below a few ticks.
            self.mid = next.max(self.tick * Decimal::from(10));
        }

        let half_spread = self.tick * Decimal::from(self.spread_ticks);
        let bid = round_to_tick(self.mid - half_spread, self.tick);
        let ask = bid + half_spread * Decimal::TWO;
        (bid, ask)
    }
}
