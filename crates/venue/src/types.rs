// In crates/venue/src/types.rs

use core_types::{OpenPosition, Side};
use rust_decimal::Decimal;
use serde::Deserialize;

/// The envelope every venue REST response arrives in.
#[derive(Debug, Deserialize)]
pub struct ApiEnvelope<T> {
    pub success: bool,
    pub result: Option<T>,
    pub error: Option<String>,
}

/// One wallet entry from the balances endpoint.
#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct WalletBalance {
    /// The currency of this entry (e.g., "USD").
    pub coin: String,
    /// The balance available for new positions.
    pub free: Decimal,
    /// The total balance including margin in use.
    pub total: Decimal,
}

/// Instrument metadata from the markets endpoint.
#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct MarketInfo {
    pub name: String,
    /// The minimum order size increment.
    pub size_increment: Decimal,
    /// The minimum price increment.
    pub price_increment: Decimal,
}

/// One position from the positions endpoint. A `size` of zero means flat.
#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PositionInfo {
    pub market: String,
    /// "long" or "short".
    pub side: String,
    pub size: Decimal,
    pub entry_price: Decimal,
    pub stop_price: Option<Decimal>,
    pub target_price: Option<Decimal>,
    pub trailing_distance: Option<Decimal>,
}

impl PositionInfo {
    /// Maps the venue's wire shape into the orchestrator's position record.
    ///
    /// A bracket the venue does not report must never read as already
    /// crossed, so missing stops and targets fall back to the far side of
    /// the price axis for the position's direction.
    pub fn into_open_position(self) -> Option<OpenPosition> {
        if self.size.is_zero() {
            return None;
        }
        let side = match self.side.as_str() {
            "long" => Side::Long,
            _ => Side::Short,
        };
        let (stop_fallback, target_fallback) = match side {
            Side::Long => (Decimal::ZERO, Decimal::MAX),
            Side::Short => (Decimal::MAX, Decimal::ZERO),
        };
        Some(OpenPosition {
            side,
            entry_price: self.entry_price,
            stop_price: self.stop_price.unwrap_or(stop_fallback),
            target_price: self.target_price.unwrap_or(target_fallback),
            quantity: self.size,
            trailing_distance: self.trailing_distance,
        })
    }
}

/// One candle from the markets candles endpoint.
#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct WireCandle {
    pub start_time: i64,
    pub end_time: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

/// The acknowledgement returned for order placement and mutation calls.
#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct OrderAck {
    pub id: i64,
    pub status: String,
}
