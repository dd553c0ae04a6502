// In crates/venue/src/paper.rs

use crate::sim::SimVenue;
use crate::{Result, VenueGateway};
use async_trait::async_trait;
use core_types::{Kline, OpenPosition, Side, Symbol};
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::sync::Mutex;

/// A paper-trading venue: market data comes from a real gateway, while
/// balances, positions and order flow live in the in-memory book.
///
/// Each candle fetch mirrors the series into the book, so paper fills
/// execute at the same prices a live instance would be looking at.
pub struct PaperVenue {
    market: std::sync::Arc<dyn VenueGateway>,
    book: SimVenue,
    initial_balance: Decimal,
    seeded: Mutex<HashSet<String>>,
}

impl PaperVenue {
    pub fn new(market: std::sync::Arc<dyn VenueGateway>, initial_balance: Decimal) -> Self {
        Self {
            market,
            book: SimVenue::new(),
            initial_balance,
            seeded: Mutex::new(HashSet::new()),
        }
    }

    fn seed_subaccount(&self, subaccount: &str) {
        let mut seeded = self.seeded.lock().unwrap();
        if seeded.insert(subaccount.to_string()) {
            self.book.set_balance(subaccount, self.initial_balance);
        }
    }
}

#[async_trait]
impl VenueGateway for PaperVenue {
    async fn get_balance(&self, subaccount: &str) -> Result<Decimal> {
        self.seed_subaccount(subaccount);
        self.book.get_balance(subaccount).await
    }

    async fn get_min_increment(&self, symbol: &Symbol, subaccount: &str) -> Result<Decimal> {
        self.market.get_min_increment(symbol, subaccount).await
    }

    async fn get_open_position(
        &self,
        symbol: &Symbol,
        subaccount: &str,
    ) -> Result<Option<OpenPosition>> {
        self.book.get_open_position(symbol, subaccount).await
    }

    async fn get_klines(
        &self,
        symbol: &Symbol,
        timeframe: &str,
        limit: u16,
    ) -> Result<Vec<Kline>> {
        let klines = self.market.get_klines(symbol, timeframe, limit).await?;
        // Keep the book's view of price current for paper fills.
        self.book.set_klines(symbol, klines.clone());
        Ok(klines)
    }

    async fn place_market_order(
        &self,
        symbol: &Symbol,
        side: Side,
        quantity: Decimal,
        stop: Decimal,
        target: Decimal,
        subaccount: &str,
    ) -> Result<()> {
        self.book
            .place_market_order(symbol, side, quantity, stop, target, subaccount)
            .await
    }

    async fn set_stop(&self, symbol: &Symbol, price: Decimal, subaccount: &str) -> Result<()> {
        self.book.set_stop(symbol, price, subaccount).await
    }

    async fn set_target(&self, symbol: &Symbol, price: Decimal, subaccount: &str) -> Result<()> {
        self.book.set_target(symbol, price, subaccount).await
    }

    async fn set_trailing(
        &self,
        symbol: &Symbol,
        distance: Decimal,
        trigger_price: Option<Decimal>,
        subaccount: &str,
    ) -> Result<()> {
        self.book
            .set_trailing(symbol, distance, trigger_price, subaccount)
            .await
    }

    async fn close_position(&self, symbol: &Symbol, subaccount: &str) -> Result<()> {
        self.book.close_position(symbol, subaccount).await
    }

    async fn partial_close(
        &self,
        symbol: &Symbol,
        quantity: Decimal,
        subaccount: &str,
    ) -> Result<()> {
        self.book.partial_close(symbol, quantity, subaccount).await
    }
}
