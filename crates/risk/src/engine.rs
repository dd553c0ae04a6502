// In crates/risk/src/engine.rs

use crate::types::{RiskPolicy, RiskSettings};
use crate::{Error, Result};
use core_types::Side;
use num_traits::FromPrimitive;
use rust_decimal::Decimal;

/// Converts account balance, risk fraction and stop distance into a
/// quantized order size, and validates candidate entries against a
/// [`RiskPolicy`].
#[derive(Debug, Clone)]
pub struct RiskEngine {
    /// Fraction of the balance retained as a safety margin.
    safety_margin: Decimal,
}

impl RiskEngine {
    pub fn new(settings: &RiskSettings) -> Self {
        Self {
            safety_margin: Decimal::from_f64(settings.balance_safety_margin)
                .unwrap_or(Decimal::ZERO),
        }
    }

    /// The balance actually put to work after the safety margin.
    pub fn available_balance(&self, balance: Decimal) -> Decimal {
        balance * (Decimal::ONE - self.safety_margin)
    }

    /// Sizes an order from the distance between entry and stop.
    ///
    /// The result is floored to the venue's minimum increment and is always
    /// a non-negative multiple of it. A zero result means the account is too
    /// small for this trade; the caller must treat that as "do not trade",
    /// not as an error.
    pub fn position_size(
        &self,
        balance: Decimal,
        risk_fraction: Decimal,
        entry: Decimal,
        stop: Decimal,
        increment: Decimal,
    ) -> Result<Decimal> {
        if entry <= Decimal::ZERO {
            return Err(Error::InvalidParameters(format!(
                "entry price must be positive, got {entry}"
            )));
        }
        if increment <= Decimal::ZERO {
            return Err(Error::InvalidParameters(format!(
                "minimum increment must be positive, got {increment}"
            )));
        }
        let stop_fraction = (entry - stop).abs() / entry;
        if stop_fraction.is_zero() {
            return Err(Error::InvalidParameters(
                "stop distance is zero".to_string(),
            ));
        }

        let notional = self.available_balance(balance) * risk_fraction / stop_fraction;
        let raw_quantity = notional / entry;
        Ok((raw_quantity / increment).floor() * increment)
    }

    /// Validates a candidate entry against the policy.
    ///
    /// Checks, in order: price ordering, risk/reward, confidence. Any
    /// failure is a veto carrying the reason for the decision log.
    pub fn check_entry(
        &self,
        policy: &RiskPolicy,
        side: Side,
        entry: Decimal,
        stop: Decimal,
        target: Decimal,
        confidence: f64,
    ) -> Result<()> {
        let ordered = match side {
            Side::Long => stop < entry && entry < target,
            Side::Short => target < entry && entry < stop,
        };
        if !ordered {
            return Err(Error::Vetoed {
                reason: format!(
                    "invalid price ordering for {side:?}: stop={stop} entry={entry} target={target}"
                ),
            });
        }

        let rr = risk_reward(side, entry, stop, target).ok_or_else(|| Error::Vetoed {
            reason: "risk/reward is undefined for these prices".to_string(),
        })?;
        if rr < policy.min_risk_reward {
            return Err(Error::Vetoed {
                reason: format!(
                    "risk/reward {rr:.2} is below the policy minimum {:.2}",
                    policy.min_risk_reward
                ),
            });
        }

        if confidence < policy.min_confidence {
            return Err(Error::Vetoed {
                reason: format!(
                    "confidence {confidence:.2} is below the policy minimum {:.2}",
                    policy.min_confidence
                ),
            });
        }

        Ok(())
    }
}

/// Potential profit distance over potential loss distance.
///
/// Returns `None` when the loss distance is not positive (the prices are
/// not ordered as a valid bracket for `side`).
pub fn risk_reward(side: Side, entry: Decimal, stop: Decimal, target: Decimal) -> Option<Decimal> {
    let (profit, loss) = match side {
        Side::Long => (target - entry, entry - stop),
        Side::Short => (entry - target, stop - entry),
    };
    if loss <= Decimal::ZERO {
        return None;
    }
    Some(profit / loss)
}

/// The one-way stop ratchet: a proposed stop is applied only when it is
/// strictly more favorable than the current one. For a long position the
/// stop may only rise; for a short it may only fall.
pub fn stop_is_improvement(side: Side, current_stop: Decimal, proposed: Decimal) -> bool {
    match side {
        Side::Long => proposed > current_stop,
        Side::Short => proposed < current_stop,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RiskPolicy;
    use rust_decimal_macros::dec;

    fn engine() -> RiskEngine {
        RiskEngine::new(&RiskSettings {
            balance_safety_margin: 0.02,
            min_risk_reward: 1.5,
            min_confidence: 0.75,
        })
    }

    fn policy() -> RiskPolicy {
        RiskPolicy {
            risk_fraction: dec!(0.02),
            min_risk_reward: dec!(1.5),
            min_confidence: 0.75,
        }
    }

    #[test]
    fn sizes_the_worked_example() {
        // balance=10000, margin 2% -> 9800; risk 2% over a 5% stop distance
        // -> notional 3920; at entry 100 -> 39.2, a multiple of 0.001.
        let qty = engine()
            .position_size(dec!(10000), dec!(0.02), dec!(100), dec!(95), dec!(0.001))
            .unwrap();
        assert_eq!(qty, dec!(39.2));
    }

    #[test]
    fn floors_to_the_increment() {
        let qty = engine()
            .position_size(dec!(10000), dec!(0.02), dec!(100), dec!(95), dec!(0.5))
            .unwrap();
        assert_eq!(qty, dec!(39.0));
        assert_eq!(qty % dec!(0.5), dec!(0));
    }

    #[test]
    fn floors_small_accounts_to_zero() {
        // The raw quantity comes out below one increment; "do not trade".
        let qty = engine()
            .position_size(dec!(10), dec!(0.01), dec!(100), dec!(95), dec!(1))
            .unwrap();
        assert_eq!(qty, dec!(0));
    }

    #[test]
    fn rejects_a_zero_stop_distance() {
        assert!(engine()
            .position_size(dec!(10000), dec!(0.02), dec!(100), dec!(100), dec!(0.001))
            .is_err());
    }

    #[test]
    fn risk_reward_matches_the_reference_values() {
        assert_eq!(
            risk_reward(Side::Long, dec!(100), dec!(95), dec!(115)),
            Some(dec!(3))
        );
        assert_eq!(
            risk_reward(Side::Long, dec!(100), dec!(95), dec!(105)),
            Some(dec!(1))
        );
        assert_eq!(
            risk_reward(Side::Short, dec!(100), dec!(105), dec!(85)),
            Some(dec!(3))
        );
        // Long with the stop above entry is not a valid bracket.
        assert_eq!(risk_reward(Side::Long, dec!(100), dec!(105), dec!(115)), None);
    }

    #[test]
    fn entry_check_enforces_risk_reward() {
        let e = engine();
        assert!(e
            .check_entry(&policy(), Side::Long, dec!(100), dec!(95), dec!(115), 0.9)
            .is_ok());
        let err = e
            .check_entry(&policy(), Side::Long, dec!(100), dec!(95), dec!(105), 0.9)
            .unwrap_err();
        assert!(matches!(err, Error::Vetoed { .. }));
    }

    #[test]
    fn entry_check_enforces_confidence() {
        let err = engine()
            .check_entry(&policy(), Side::Long, dec!(100), dec!(95), dec!(115), 0.5)
            .unwrap_err();
        assert!(matches!(err, Error::Vetoed { .. }));
    }

    #[test]
    fn entry_check_enforces_ordering() {
        // Short with the target above entry is mis-ordered.
        let err = engine()
            .check_entry(&policy(), Side::Short, dec!(100), dec!(105), dec!(110), 0.9)
            .unwrap_err();
        assert!(matches!(err, Error::Vetoed { .. }));
    }

    #[test]
    fn ratchet_only_tightens() {
        assert!(stop_is_improvement(Side::Long, dec!(95), dec!(97)));
        assert!(!stop_is_improvement(Side::Long, dec!(95), dec!(94)));
        assert!(!stop_is_improvement(Side::Long, dec!(95), dec!(95)));
        assert!(stop_is_improvement(Side::Short, dec!(105), dec!(103)));
        assert!(!stop_is_improvement(Side::Short, dec!(105), dec!(106)));
    }
}
