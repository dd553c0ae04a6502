// In crates/core-types/src/types.rs

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A trading pair symbol (e.g., "BTC-PERP").
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Symbol(pub String);

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The direction of a position or order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// The side of the order that closes a position on this side.
    pub fn opposite(self) -> Self {
        match self {
            Side::Long => Side::Short,
            Side::Short => Side::Long,
        }
    }
}

/// One OHLCV bar. The `open_time` doubles as the bar index used for
/// debouncing repeated triggers within the same bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Kline {
    pub open_time: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub close_time: i64,
}

/// A unique identifier for a bot instance, assigned by the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BotId(pub Uuid);

impl BotId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for BotId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which entry sides a bot is allowed to take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnabledSides {
    Long,
    Short,
    Both,
}

impl EnabledSides {
    pub fn allows(self, side: Side) -> bool {
        match (self, side) {
            (EnabledSides::Both, _) => true,
            (EnabledSides::Long, Side::Long) => true,
            (EnabledSides::Short, Side::Short) => true,
            _ => false,
        }
    }
}

/// The fixed set of per-trade risk fractions a bot can be configured with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskTier {
    Conservative,
    Balanced,
    Aggressive,
}

impl RiskTier {
    /// The fraction of available balance risked per trade.
    pub fn fraction(self) -> Decimal {
        match self {
            RiskTier::Conservative => Decimal::new(1, 2), // 0.01
            RiskTier::Balanced => Decimal::new(2, 2),     // 0.02
            RiskTier::Aggressive => Decimal::new(5, 2),   // 0.05
        }
    }
}

/// The immutable, creation-time configuration of a bot instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    pub symbol: Symbol,
    /// The chart timeframe the bot trades (e.g., "5m", "1h").
    pub timeframe: String,
    /// The venue subaccount this bot trades on.
    pub subaccount: String,
    /// Which sides the bot may open.
    pub sides: EnabledSides,

    // Per-side moving-average periods for the entry condition.
    pub long_fast_period: u32,
    pub long_slow_period: u32,
    pub short_fast_period: u32,
    pub short_slow_period: u32,

    pub risk_tier: RiskTier,

    /// Seconds between scheduled reviews of an open position.
    pub conduct_interval_secs: u64,
    /// Whether to review an already-open position immediately on start.
    #[serde(default)]
    pub conduct_on_start: bool,
    /// Seconds the instance loop sleeps between ticks.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
}

fn default_poll_interval() -> u64 {
    15
}

impl BotConfig {
    /// Basic sanity checks performed once when a bot is requested.
    pub fn validate(&self) -> crate::Result<()> {
        if self.symbol.0.is_empty() {
            return Err(crate::Error::InvalidConfig("symbol is empty".into()));
        }
        if self.subaccount.is_empty() {
            return Err(crate::Error::InvalidConfig("subaccount is empty".into()));
        }
        for (fast, slow) in [
            (self.long_fast_period, self.long_slow_period),
            (self.short_fast_period, self.short_slow_period),
        ] {
            if fast == 0 || slow == 0 || fast >= slow {
                return Err(crate::Error::InvalidConfig(format!(
                    "moving-average periods must satisfy 0 < fast < slow (got {}/{})",
                    fast, slow
                )));
            }
        }
        if self.poll_interval_secs == 0 {
            return Err(crate::Error::InvalidConfig(
                "poll_interval_secs must be positive".into(),
            ));
        }
        timeframe_ms(&self.timeframe).map(|_| ())
    }
}

/// Converts a timeframe string like "5m" or "1h" into milliseconds.
pub fn timeframe_ms(timeframe: &str) -> crate::Result<i64> {
    let (value, unit) = timeframe.split_at(timeframe.len().saturating_sub(1));
    let value: i64 = value
        .parse()
        .map_err(|_| crate::Error::UnknownTimeframe(timeframe.to_string()))?;
    let unit_ms = match unit {
        "m" => 60_000,
        "h" => 3_600_000,
        "d" => 86_400_000,
        _ => return Err(crate::Error::UnknownTimeframe(timeframe.to_string())),
    };
    if value <= 0 {
        return Err(crate::Error::UnknownTimeframe(timeframe.to_string()));
    }
    Ok(value * unit_ms)
}

/// The lifecycle status of a bot instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BotStatus {
    Running,
    Stopped,
    Error,
}

/// An open position as reported by the venue. The venue copy is
/// authoritative; local copies are refreshed from it every tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenPosition {
    pub side: Side,
    pub entry_price: Decimal,
    pub stop_price: Decimal,
    pub target_price: Decimal,
    pub quantity: Decimal,
    pub trailing_distance: Option<Decimal>,
}

/// The per-instance position state machine's state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum PositionState {
    Flat,
    Open(OpenPosition),
}

impl PositionState {
    pub fn is_flat(&self) -> bool {
        matches!(self, PositionState::Flat)
    }

    pub fn as_open(&self) -> Option<&OpenPosition> {
        match self {
            PositionState::Flat => None,
            PositionState::Open(p) => Some(p),
        }
    }
}
