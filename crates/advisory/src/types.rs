// In crates/advisory/src/types.rs

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use core_types::{Kline, OpenPosition, Side, Symbol};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Which advisory role produced a recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdvisoryRole {
    EntryEvaluator,
    TradeConductor,
}

/// One action proposed by the advisory service.
///
/// This is a closed set: anything outside it fails validation at the
/// client boundary and never reaches the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AdvisoryAction {
    Maintain,
    Close,
    Ignore,
    AdjustStop { price: Decimal },
    AdjustTarget { price: Decimal },
    TrailingImmediate { distance: Decimal },
    TrailingAtPrice { distance: Decimal, trigger_price: Decimal },
    PartialClose { fraction: Decimal },
    OpenLong { stop: Decimal, target: Decimal },
    OpenShort { stop: Decimal, target: Decimal },
}

impl AdvisoryAction {
    fn allowed_for(&self, role: AdvisoryRole) -> bool {
        match role {
            AdvisoryRole::EntryEvaluator => matches!(
                self,
                AdvisoryAction::Ignore
                    | AdvisoryAction::OpenLong { .. }
                    | AdvisoryAction::OpenShort { .. }
            ),
            AdvisoryRole::TradeConductor => matches!(
                self,
                AdvisoryAction::Maintain
                    | AdvisoryAction::Close
                    | AdvisoryAction::AdjustStop { .. }
                    | AdvisoryAction::AdjustTarget { .. }
                    | AdvisoryAction::TrailingImmediate { .. }
                    | AdvisoryAction::TrailingAtPrice { .. }
                    | AdvisoryAction::PartialClose { .. }
            ),
        }
    }
}

/// A structured, confidence-scored recommendation from the advisory
/// service. Produced once per call, consumed immediately, retained only in
/// the event stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvisoryRecommendation {
    pub timestamp: DateTime<Utc>,
    pub role: AdvisoryRole,
    /// Confidence score in [0, 1].
    pub confidence: f64,
    /// Actions to apply, in the order returned.
    pub actions: Vec<AdvisoryAction>,
    /// Free-text reasoning, kept for the event log only.
    pub rationale: String,
}

impl AdvisoryRecommendation {
    /// Validates a recommendation against its role's allowed action set.
    ///
    /// This runs once at the client boundary; downstream code can rely on
    /// the confidence range and the per-role action restriction.
    pub fn validated(self, role: AdvisoryRole) -> Result<Self> {
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(Error::InvalidRecommendation(format!(
                "confidence {} is outside [0, 1]",
                self.confidence
            )));
        }
        for action in &self.actions {
            if !action.allowed_for(role) {
                return Err(Error::InvalidRecommendation(format!(
                    "action {action:?} is not allowed for {role:?}"
                )));
            }
            if let AdvisoryAction::PartialClose { fraction } = action {
                if *fraction <= Decimal::ZERO || *fraction >= Decimal::ONE {
                    return Err(Error::InvalidRecommendation(format!(
                        "partial_close fraction {fraction} is outside (0, 1)"
                    )));
                }
            }
        }
        Ok(Self { role, ..self })
    }
}

/// The wire shape returned by the advisory service, before boundary
/// validation stamps it with a role and timestamp.
#[derive(Debug, Deserialize)]
pub struct WireRecommendation {
    pub confidence: f64,
    #[serde(default)]
    pub actions: Vec<AdvisoryAction>,
    #[serde(default)]
    pub rationale: String,
}

impl WireRecommendation {
    pub fn into_validated(self, role: AdvisoryRole) -> Result<AdvisoryRecommendation> {
        AdvisoryRecommendation {
            timestamp: Utc::now(),
            role,
            confidence: self.confidence,
            actions: self.actions,
            rationale: self.rationale,
        }
        .validated(role)
    }
}

/// Candles for one timeframe, part of the multi-timeframe context handed
/// to the advisory service.
#[derive(Debug, Clone, Serialize)]
pub struct MarketSlice {
    pub timeframe: String,
    pub klines: Vec<Kline>,
}

/// Context for an entry evaluation.
#[derive(Debug, Clone, Serialize)]
pub struct EntryContext {
    pub symbol: Symbol,
    pub subaccount: String,
    pub timeframe: String,
    /// The side the technical signal fired for.
    pub side: Side,
    /// The price the entry would execute near.
    pub proposed_entry: Decimal,
    pub balance: Decimal,
    pub market: Vec<MarketSlice>,
}

/// Context for a review of an open position.
#[derive(Debug, Clone, Serialize)]
pub struct PositionContext {
    pub symbol: Symbol,
    pub subaccount: String,
    pub timeframe: String,
    pub position: OpenPosition,
    pub last_price: Decimal,
    pub balance: Decimal,
    pub market: Vec<MarketSlice>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn rec(actions: Vec<AdvisoryAction>, confidence: f64) -> AdvisoryRecommendation {
        AdvisoryRecommendation {
            timestamp: Utc::now(),
            role: AdvisoryRole::TradeConductor,
            confidence,
            actions,
            rationale: String::new(),
        }
    }

    #[test]
    fn accepts_conductor_actions_for_the_conductor() {
        let r = rec(
            vec![
                AdvisoryAction::AdjustStop { price: dec!(97) },
                AdvisoryAction::Maintain,
            ],
            0.8,
        );
        assert!(r.validated(AdvisoryRole::TradeConductor).is_ok());
    }

    #[test]
    fn rejects_entry_actions_for_the_conductor() {
        let r = rec(
            vec![AdvisoryAction::OpenLong {
                stop: dec!(95),
                target: dec!(115),
            }],
            0.8,
        );
        assert!(matches!(
            r.validated(AdvisoryRole::TradeConductor),
            Err(Error::InvalidRecommendation(_))
        ));
    }

    #[test]
    fn rejects_conductor_actions_for_the_entry_evaluator() {
        let r = rec(vec![AdvisoryAction::Close], 0.8);
        assert!(r.validated(AdvisoryRole::EntryEvaluator).is_err());
    }

    #[test]
    fn rejects_out_of_range_confidence() {
        assert!(rec(vec![AdvisoryAction::Maintain], 1.2)
            .validated(AdvisoryRole::TradeConductor)
            .is_err());
        assert!(rec(vec![AdvisoryAction::Maintain], -0.1)
            .validated(AdvisoryRole::TradeConductor)
            .is_err());
    }

    #[test]
    fn rejects_degenerate_partial_close_fractions() {
        for fraction in [dec!(0), dec!(1), dec!(1.5)] {
            assert!(rec(vec![AdvisoryAction::PartialClose { fraction }], 0.8)
                .validated(AdvisoryRole::TradeConductor)
                .is_err());
        }
    }

    #[test]
    fn parses_the_wire_shape() {
        let json = serde_json::json!({
            "confidence": 0.82,
            "actions": [
                { "action": "adjust_stop", "price": "96.5" },
                { "action": "trailing_at_price", "distance": "1.2", "trigger_price": "110" }
            ],
            "rationale": "momentum intact, tighten risk"
        });
        let wire: WireRecommendation = serde_json::from_value(json).unwrap();
        let rec = wire.into_validated(AdvisoryRole::TradeConductor).unwrap();
        assert_eq!(rec.actions.len(), 2);
        assert_eq!(
            rec.actions[0],
            AdvisoryAction::AdjustStop { price: dec!(96.5) }
        );
    }

    #[test]
    fn unknown_action_tags_fail_to_parse() {
        let json = serde_json::json!({
            "confidence": 0.9,
            "actions": [{ "action": "yolo_in" }],
        });
        assert!(serde_json::from_value::<WireRecommendation>(json).is_err());
    }
}
