// In crates/risk/src/types.rs

use core_types::RiskTier;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Risk defaults applied to every bot, loaded from configuration.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RiskSettings {
    /// Fraction of the account balance held back from sizing (e.g. 0.02).
    pub balance_safety_margin: f64,
    /// Minimum acceptable risk/reward ratio for a new entry.
    pub min_risk_reward: f64,
    /// Minimum advisory confidence required to act on a recommendation.
    pub min_confidence: f64,
}

/// Trailing-stop and break-even thresholds, loaded from configuration.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TrailingSettings {
    /// Progress toward target at which the stop moves to entry.
    pub break_even_threshold: f64,
    /// Progress toward target at which the stop starts trailing price.
    pub trail_threshold: f64,
    /// Offset behind current price for a trailed stop, as a fraction of price.
    pub trail_offset: f64,
}

impl Default for TrailingSettings {
    fn default() -> Self {
        Self {
            break_even_threshold: 0.5,
            trail_threshold: 0.75,
            trail_offset: 0.004,
        }
    }
}

/// The per-instance risk policy. Built once when a bot starts and never
/// mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct RiskPolicy {
    /// Fraction of available balance risked per trade.
    pub risk_fraction: Decimal,
    /// Minimum acceptable risk/reward ratio.
    pub min_risk_reward: Decimal,
    /// Minimum advisory confidence required to act.
    pub min_confidence: f64,
}

impl RiskPolicy {
    pub fn for_tier(tier: RiskTier, settings: &RiskSettings) -> Self {
        use num_traits::FromPrimitive;
        Self {
            risk_fraction: tier.fraction(),
            min_risk_reward: Decimal::from_f64(settings.min_risk_reward)
                .unwrap_or(Decimal::ONE),
            min_confidence: settings.min_confidence,
        }
    }
}
