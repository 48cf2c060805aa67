// Risk management module
//
// Converts free balance into an order notional under the configured caps.
// Pure arithmetic, no I/O.

use serde::Deserialize;

/// Risk caps, loaded once per run and immutable.
///
/// All fields are required in configuration; a missing cap is a config
/// error, not an unlimited default.
#[derive(Debug, Clone, Deserialize)]
pub struct RiskConfig {
    /// Total notional allowed in the position (quote currency)
    pub max_position_notional: f64,
    /// Notional cap for a single order (quote currency)
    pub max_order_notional: f64,
    /// Fraction of the free balance allocated per entry, in [0, 1]
    pub order_fraction_of_balance: f64,
}

pub struct RiskManager {
    cfg: RiskConfig,
}

impl RiskManager {
    pub fn new(cfg: RiskConfig) -> Self {
        Self { cfg }
    }

    /// Order notional for the given free balance: `free * fraction`, clamped
    /// to `[0, max_order_notional]`. Never negative.
    pub fn order_notional(&self, free_balance: f64) -> f64 {
        let target = free_balance * self.cfg.order_fraction_of_balance;
        target.max(0.0).min(self.cfg.max_order_notional)
    }

    /// Whether adding `add_notional` keeps the position within the budget.
    pub fn can_increase(&self, current_notional: f64, add_notional: f64) -> bool {
        current_notional + add_notional <= self.cfg.max_position_notional
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> RiskManager {
        RiskManager::new(RiskConfig {
            max_position_notional: 1000.0,
            max_order_notional: 200.0,
            order_fraction_of_balance: 0.1,
        })
    }

    #[test]
    fn test_order_notional_takes_fraction_of_balance() {
        let rm = manager();
        assert_eq!(rm.order_notional(1000.0), 100.0);
    }

    #[test]
    fn test_order_notional_clamped_to_cap() {
        let rm = manager();
        // 10% of 50_000 = 5_000, capped at 200
        assert_eq!(rm.order_notional(50_000.0), 200.0);
    }

    #[test]
    fn test_order_notional_never_negative() {
        let rm = manager();
        assert_eq!(rm.order_notional(-500.0), 0.0);
        assert_eq!(rm.order_notional(0.0), 0.0);

        let negative_fraction = RiskManager::new(RiskConfig {
            max_position_notional: 1000.0,
            max_order_notional: 200.0,
            order_fraction_of_balance: -0.5,
        });
        assert_eq!(negative_fraction.order_notional(1000.0), 0.0);
    }

    #[test]
    fn test_order_notional_monotonic_in_balance() {
        let rm = manager();
        let balances = [0.0, 10.0, 500.0, 1999.0, 2000.0, 100_000.0];
        let mut last = -1.0;
        for balance in balances {
            let notional = rm.order_notional(balance);
            assert!(notional >= last);
            assert!((0.0..=200.0).contains(&notional));
            last = notional;
        }
    }

    #[test]
    fn test_can_increase_respects_budget() {
        let rm = manager();
        assert!(rm.can_increase(0.0, 1000.0)); // exactly at the cap
        assert!(rm.can_increase(400.0, 600.0));
        assert!(!rm.can_increase(400.0, 600.01));
        assert!(!rm.can_increase(0.0, 1000.5));
    }
}
