// Stop-loss and exposure checks

use rust_decimal::Decimal;

use crate::config::GridConfig;
use crate::core::position_tracker::Position;
use crate::error::{TradingError, TradingResult};

#[derive(Debug, Clone)]
pub struct RiskGuard {
    stop_loss_percent: Decimal,
    max_position_size: Decimal,
    stop_loss_disabled: bool,
}

impl RiskGuard {
    pub fn new(stop_loss_percent: Decimal, max_position_size: Decimal) -> Self {
        Self {
            stop_loss_percent,
            max_position_size,
            stop_loss_disabled: false,
        }
    }

    pub fn from_config(config: &GridConfig) -> Self {
        Self {
            stop_loss_percent: config.stop_loss_percent,
            max_position_size: config.max_position_size,
            stop_loss_disabled: config.disable_stop_loss,
        }
    }

    pub fn with_stop_loss_disabled(mut self, disabled: bool) -> Self {
        self.stop_loss_disabled = disabled;
        self
    }

    pub fn stop_loss_disabled(&self) -> bool {
        self.stop_loss_disabled
    }

    /// size × (mid − entry); zero when flat or entry unknown
    pub fn unrealized_pnl(&self, position: &Position, mid: Decimal) -> Decimal {
        match position.entry_price {
            Some(entry) if !position.is_flat() && mid > Decimal::ZERO => {
                position.size * (mid - entry)
            }
            _ => Decimal::ZERO,
        }
    }

    /// |mid − entry| / entry × 100
    pub fn price_move_percent(entry: Decimal, mid: Decimal) -> Option<Decimal> {
        if entry <= Decimal::ZERO {
            return None;
        }
        Some((mid - entry).abs() / entry * Decimal::ONE_HUNDRED)
    }

    pub fn check_stop_loss(&self, position: &Position, mid: Decimal) -> bool {
        self.stop_loss_breach(position, mid).is_some()
    }

    /// The breach as a `StopLossTriggered` value, or `None` while inside the band.
    pub fn stop_loss_breach(&self, position: &Position, mid: Decimal) -> Option<TradingError> {
        if self.stop_loss_disabled || position.is_flat() || mid <= Decimal::ZERO {
            return None;
        }
        let entry = position.entry_price?;
        let move_percent = Self::price_move_percent(entry, mid)?;

        (move_percent >= self.stop_loss_percent).then(|| TradingError::StopLossTriggered {
            entry_price: entry,
            mid_price: mid,
            move_percent: move_percent.round_dp(4),
        })
    }

    pub fn position_limit_reached(&self, size: Decimal) -> bool {
        size.abs() >= self.max_position_size
    }

    /// `Err(RiskLimit)` while new placements must be suppressed
    pub fn position_gate(&self, size: Decimal) -> TradingResult<()> {
        if self.position_limit_reached(size) {
            return Err(TradingError::RiskLimit(format!(
                "position {} at or above max {}",
                size, self.max_position_size
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn long(size: Decimal, entry: Decimal) -> Position {
        Position {
            size,
            entry_price: Some(entry),
        }
    }

    #[test]
    fn test_stop_loss_thresholds() {
        let guard = RiskGuard::new(dec!(10), dec!(1));
        let position = long(dec!(0.1), dec!(4000));

        assert!(guard.check_stop_loss(&position, dec!(4500)));
        assert!(!guard.check_stop_loss(&position, dec!(4100)));
        assert!(guard.check_stop_loss(&position, dec!(3500)));
    }

    #[test]
    fn test_stop_loss_exact_threshold_triggers() {
        let guard = RiskGuard::new(dec!(10), dec!(1));
        assert!(guard.check_stop_loss(&long(dec!(0.1), dec!(4000)), dec!(4400)));
    }

    #[test]
    fn test_stop_loss_needs_position_and_entry() {
        let guard = RiskGuard::new(dec!(10), dec!(1));
        assert!(!guard.check_stop_loss(&Position::default(), dec!(9000)));
        let no_entry = Position {
            size: dec!(0.1),
            entry_price: None,
        };
        assert!(!guard.check_stop_loss(&no_entry, dec!(9000)));
    }

    #[test]
    fn test_disabled_stop_loss_never_triggers() {
        let guard = RiskGuard::new(dec!(10), dec!(1)).with_stop_loss_disabled(true);
        assert!(!guard.check_stop_loss(&long(dec!(0.1), dec!(4000)), dec!(100)));
    }

    #[test]
    fn test_breach_reports_move() {
        let guard = RiskGuard::new(dec!(10), dec!(1));
        let breach = guard.stop_loss_breach(&long(dec!(0.1), dec!(4000)), dec!(4500));
        match breach {
            Some(TradingError::StopLossTriggered { move_percent, .. }) => {
                assert_eq!(move_percent, dec!(12.5));
            }
            other => panic!("expected breach, got {:?}", other),
        }
    }

    #[test]
    fn test_unrealized_pnl() {
        let guard = RiskGuard::new(dec!(10), dec!(1));
        assert_eq!(guard.unrealized_pnl(&long(dec!(0.1), dec!(4000)), dec!(4500)), dec!(50));
        assert_eq!(guard.unrealized_pnl(&long(dec!(-0.1), dec!(4000)), dec!(4500)), dec!(-50));
        assert_eq!(guard.unrealized_pnl(&Position::default(), dec!(4500)), Decimal::ZERO);
    }

    #[test]
    fn test_position_gate() {
        let guard = RiskGuard::new(dec!(10), dec!(0.1));
        assert!(guard.position_limit_reached(dec!(0.1)));
        assert!(guard.position_limit_reached(dec!(-0.1)));
        assert!(!guard.position_limit_reached(dec!(0.09)));
        assert!(matches!(guard.position_gate(dec!(0.1)), Err(TradingError::RiskLimit(_))));
        assert!(guard.position_gate(dec!(0.05)).is_ok());

        let short = guard.position_gate(dec!(-0.2)).unwrap_err();
        assert_eq!(short.category(), "risk");
        assert!(!short.is_retryable());
    }
}
