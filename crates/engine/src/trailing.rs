// In crates/engine/src/trailing.rs

use core_types::{OpenPosition, Side};
use num_traits::FromPrimitive;
use risk::{stop_is_improvement, TrailingSettings};
use rust_decimal::Decimal;

/// Why a stop move was proposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopMoveReason {
    BreakEven,
    Trail,
}

/// A proposed stop mutation. Only ever tighter than the current stop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StopProposal {
    pub price: Decimal,
    pub reason: StopMoveReason,
}

/// Plans monotonic stop tightening as unrealized profit progresses toward
/// the target.
///
/// Pure: the caller pushes the proposal to the venue and keeps local state
/// untouched when that push fails.
#[derive(Debug, Clone)]
pub struct TrailingPlanner {
    break_even_threshold: Decimal,
    trail_threshold: Decimal,
    trail_offset: Decimal,
}

impl TrailingPlanner {
    pub fn new(settings: &TrailingSettings) -> Self {
        Self {
            break_even_threshold: Decimal::from_f64(settings.break_even_threshold)
                .unwrap_or(Decimal::new(5, 1)),
            trail_threshold: Decimal::from_f64(settings.trail_threshold)
                .unwrap_or(Decimal::new(75, 2)),
            trail_offset: Decimal::from_f64(settings.trail_offset)
                .unwrap_or(Decimal::new(4, 3)),
        }
    }

    /// Fraction of the distance to target already covered, clamped at zero.
    fn progress(position: &OpenPosition, price: Decimal) -> Option<Decimal> {
        let (gained, total) = match position.side {
            Side::Long => (
                price - position.entry_price,
                position.target_price - position.entry_price,
            ),
            Side::Short => (
                position.entry_price - price,
                position.entry_price - position.target_price,
            ),
        };
        if total <= Decimal::ZERO {
            return None;
        }
        Some(gained.max(Decimal::ZERO) / total)
    }

    /// Proposes the next stop for a position at the given price, or `None`
    /// when nothing qualifies. Every proposal passes the one-way ratchet.
    pub fn plan(&self, position: &OpenPosition, price: Decimal) -> Option<StopProposal> {
        let progress = Self::progress(position, price)?;

        let mut candidates: Vec<StopProposal> = Vec::new();

        if progress >= self.trail_threshold {
            let trailed = match position.side {
                Side::Long => price * (Decimal::ONE - self.trail_offset),
                Side::Short => price * (Decimal::ONE + self.trail_offset),
            };
            candidates.push(StopProposal {
                price: trailed,
                reason: StopMoveReason::Trail,
            });
        }

        let stop_worse_than_entry = match position.side {
            Side::Long => position.stop_price < position.entry_price,
            Side::Short => position.stop_price > position.entry_price,
        };
        if progress >= self.break_even_threshold && stop_worse_than_entry {
            candidates.push(StopProposal {
                price: position.entry_price,
                reason: StopMoveReason::BreakEven,
            });
        }

        // Keep only genuine improvements, then take the tightest one.
        candidates.retain(|c| stop_is_improvement(position.side, position.stop_price, c.price));
        candidates.into_iter().max_by_key(|c| match position.side {
            Side::Long => c.price,
            Side::Short => -c.price,
        })
    }
}
