// In crates/engine/src/signal.rs

use core_types::{Kline, Side};
use num_traits::cast::ToPrimitive;
use ta::indicators::ExponentialMovingAverage as Ema;
use ta::Next;

/// The per-side entry condition.
///
/// Fires when the previous (last closed) bar's close sits on the right
/// side of both of that side's moving averages AND the current bar has
/// broken the previous bar's extreme. The current, still-forming bar only
/// supplies the breakout extreme; it never feeds the averages.
pub fn entry_signal(klines: &[Kline], side: Side, fast_period: u32, slow_period: u32) -> bool {
    // The averages need a full warm-up of closed bars plus the forming bar.
    if klines.len() < slow_period as usize + 2 {
        return false;
    }

    let (current, closed) = match klines.split_last() {
        Some(split) => split,
        None => return false,
    };
    let previous = match closed.last() {
        Some(k) => k,
        None => return false,
    };

    let mut fast = Ema::new(fast_period as usize).unwrap();
    let mut slow = Ema::new(slow_period as usize).unwrap();
    let mut fast_val = 0.0;
    let mut slow_val = 0.0;
    for kline in closed {
        let close = kline.close.to_f64().unwrap();
        fast_val = fast.next(close);
        slow_val = slow.next(close);
    }

    let prev_close = previous.close.to_f64().unwrap();
    match side {
        Side::Long => {
            prev_close > fast_val && prev_close > slow_val && current.high > previous.high
        }
        Side::Short => {
            prev_close < fast_val && prev_close < slow_val && current.low < previous.low
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn kline(i: i64, open: Decimal, high: Decimal, low: Decimal, close: Decimal) -> Kline {
        Kline {
            open_time: i * 60_000,
            open,
            high,
            low,
            close,
            volume: dec!(1),
            close_time: (i + 1) * 60_000 - 1,
        }
    }

    /// A steady uptrend: each close one above the last.
    fn uptrend(len: i64) -> Vec<Kline> {
        (0..len)
            .map(|i| {
                let c = Decimal::from(100 + i);
                kline(i, c - dec!(0.5), c + dec!(0.5), c - dec!(1), c)
            })
            .collect()
    }

    #[test]
    fn fires_long_on_breakout_in_an_uptrend() {
        let mut klines = uptrend(30);
        // Current bar breaks above the previous high.
        let prev_high = klines[28].high;
        klines[29].high = prev_high + dec!(2);
        assert!(entry_signal(&klines, Side::Long, 5, 10));
    }

    #[test]
    fn holds_long_without_a_breakout() {
        let mut klines = uptrend(30);
        // Current bar stays inside the previous bar's range.
        let prev = klines[28].clone();
        klines[29].high = prev.high - dec!(0.1);
        klines[29].low = prev.low + dec!(0.1);
        assert!(!entry_signal(&klines, Side::Long, 5, 10));
    }

    #[test]
    fn holds_long_when_price_is_below_the_averages() {
        let mut klines = uptrend(30);
        // Previous close collapses below the trend; breakout alone is not
        // enough.
        klines[28].close = dec!(50);
        klines[29].high = klines[28].high + dec!(2);
        assert!(!entry_signal(&klines, Side::Long, 5, 10));
    }

    #[test]
    fn fires_short_in_a_downtrend_with_a_breakdown() {
        let mut klines: Vec<Kline> = (0..30)
            .map(|i| {
                let c = Decimal::from(200 - i);
                kline(i, c + dec!(0.5), c + dec!(1), c - dec!(0.5), c)
            })
            .collect();
        klines[29].low = klines[28].low - dec!(2);
        assert!(entry_signal(&klines, Side::Short, 5, 10));
    }

    #[test]
    fn needs_a_full_warmup() {
        let klines = uptrend(8);
        assert!(!entry_signal(&klines, Side::Long, 5, 10));
    }
}
