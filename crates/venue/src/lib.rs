// In crates/venue/src/lib.rs

use async_trait::async_trait;
use core_types::{Kline, OpenPosition, Side, Symbol};
use rust_decimal::Decimal;

pub mod error;
pub mod paper;
pub mod rest;
pub mod sim;
pub mod types;

// Re-export public types
pub use error::{Error, Result};
pub use paper::PaperVenue;
pub use rest::RestVenue;
pub use sim::{SimVenue, VenueCall};

/// The boundary to the trading venue.
///
/// Every call may fail with a connectivity or validation error, and the
/// orchestrator never assumes success without a confirmed response. The
/// venue is the system of record: whenever a position is open, its copy of
/// the position wins over anything cached locally.
#[async_trait]
pub trait VenueGateway: Send + Sync {
    /// Current account balance for a subaccount, in the quote currency.
    async fn get_balance(&self, subaccount: &str) -> Result<Decimal>;

    /// The minimum order size increment for an instrument.
    async fn get_min_increment(&self, symbol: &Symbol, subaccount: &str) -> Result<Decimal>;

    /// The open position for (symbol, subaccount), if any.
    async fn get_open_position(
        &self,
        symbol: &Symbol,
        subaccount: &str,
    ) -> Result<Option<OpenPosition>>;

    /// The most recent `limit` bars for a symbol at a timeframe, oldest
    /// first. The final bar may still be forming.
    async fn get_klines(&self, symbol: &Symbol, timeframe: &str, limit: u16)
        -> Result<Vec<Kline>>;

    /// Places a market order with its protective bracket attached.
    async fn place_market_order(
        &self,
        symbol: &Symbol,
        side: Side,
        quantity: Decimal,
        stop: Decimal,
        target: Decimal,
        subaccount: &str,
    ) -> Result<()>;

    /// Replaces the stop price protecting the open position.
    async fn set_stop(&self, symbol: &Symbol, price: Decimal, subaccount: &str) -> Result<()>;

    /// Replaces the target price of the open position.
    async fn set_target(&self, symbol: &Symbol, price: Decimal, subaccount: &str) -> Result<()>;

    /// Attaches or replaces a trailing stop, optionally armed only once
    /// `trigger_price` prints.
    async fn set_trailing(
        &self,
        symbol: &Symbol,
        distance: Decimal,
        trigger_price: Option<Decimal>,
        subaccount: &str,
    ) -> Result<()>;

    /// Closes the open position at market.
    async fn close_position(&self, symbol: &Symbol, subaccount: &str) -> Result<()>;

    /// Closes part of the open position at market.
    async fn partial_close(
        &self,
        symbol: &Symbol,
        quantity: Decimal,
        subaccount: &str,
    ) -> Result<()>;
}
