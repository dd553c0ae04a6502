// In crates/venue/src/sim.rs

use crate::{Error, Result, VenueGateway};
use async_trait::async_trait;
use core_types::{Kline, OpenPosition, Side, Symbol};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Mutex;

/// A mutating venue call, recorded so tests can assert on side effects.
#[derive(Debug, Clone, PartialEq)]
pub enum VenueCall {
    PlaceOrder {
        symbol: Symbol,
        side: Side,
        quantity: Decimal,
        stop: Decimal,
        target: Decimal,
    },
    SetStop { symbol: Symbol, price: Decimal },
    SetTarget { symbol: Symbol, price: Decimal },
    SetTrailing {
        symbol: Symbol,
        distance: Decimal,
        trigger_price: Option<Decimal>,
    },
    Close { symbol: Symbol },
    PartialClose { symbol: Symbol, quantity: Decimal },
}

#[derive(Debug, Default)]
struct SimState {
    balances: HashMap<String, Decimal>,
    increments: HashMap<String, Decimal>,
    positions: HashMap<(String, String), OpenPosition>,
    klines: HashMap<String, Vec<Kline>>,
    calls: Vec<VenueCall>,
    failing: bool,
    hanging: bool,
}

/// An in-memory venue for paper trading and tests.
///
/// Orders fill instantly at the latest close, positions are keyed by
/// (symbol, subaccount), and every mutating call is recorded. Tests can
/// flip the venue into a failing (transient errors) or hanging (calls
/// never return) mode.
#[derive(Debug, Default)]
pub struct SimVenue {
    state: Mutex<SimState>,
}

impl SimVenue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_balance(&self, subaccount: &str, balance: Decimal) {
        self.state
            .lock()
            .unwrap()
            .balances
            .insert(subaccount.to_string(), balance);
    }

    pub fn set_increment(&self, symbol: &Symbol, increment: Decimal) {
        self.state
            .lock()
            .unwrap()
            .increments
            .insert(symbol.0.clone(), increment);
    }

    /// Replaces the candle series served for a symbol, oldest first.
    pub fn set_klines(&self, symbol: &Symbol, klines: Vec<Kline>) {
        self.state
            .lock()
            .unwrap()
            .klines
            .insert(symbol.0.clone(), klines);
    }

    /// Installs a position directly, as if it had been opened elsewhere.
    pub fn set_position(&self, symbol: &Symbol, subaccount: &str, position: OpenPosition) {
        self.state
            .lock()
            .unwrap()
            .positions
            .insert((symbol.0.clone(), subaccount.to_string()), position);
    }

    /// Removes a position directly, simulating a manual close.
    pub fn clear_position(&self, symbol: &Symbol, subaccount: &str) {
        self.state
            .lock()
            .unwrap()
            .positions
            .remove(&(symbol.0.clone(), subaccount.to_string()));
    }

    /// When set, every call fails with a transient connectivity error.
    pub fn set_failing(&self, failing: bool) {
        self.state.lock().unwrap().failing = failing;
    }

    /// When set, every call blocks forever. Used to exercise stop timeouts.
    pub fn set_hanging(&self, hanging: bool) {
        self.state.lock().unwrap().hanging = hanging;
    }

    /// The mutating calls recorded so far.
    pub fn calls(&self) -> Vec<VenueCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn open_position(&self, symbol: &Symbol, subaccount: &str) -> Option<OpenPosition> {
        self.state
            .lock()
            .unwrap()
            .positions
            .get(&(symbol.0.clone(), subaccount.to_string()))
            .cloned()
    }

    /// Applies the failing/hanging switches before touching state.
    async fn gate(&self) -> Result<()> {
        let (failing, hanging) = {
            let state = self.state.lock().unwrap();
            (state.failing, state.hanging)
        };
        if hanging {
            futures::future::pending::<()>().await;
        }
        if failing {
            return Err(Error::Connectivity("simulated outage".to_string()));
        }
        Ok(())
    }

    fn last_close(state: &SimState, symbol: &Symbol) -> Option<Decimal> {
        state
            .klines
            .get(&symbol.0)
            .and_then(|k| k.last())
            .map(|k| k.close)
    }
}

#[async_trait]
impl VenueGateway for SimVenue {
    async fn get_balance(&self, subaccount: &str) -> Result<Decimal> {
        self.gate().await?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .balances
            .get(subaccount)
            .copied()
            .unwrap_or(Decimal::ZERO))
    }

    async fn get_min_increment(&self, symbol: &Symbol, _subaccount: &str) -> Result<Decimal> {
        self.gate().await?;
        self.state
            .lock()
            .unwrap()
            .increments
            .get(&symbol.0)
            .copied()
            .ok_or_else(|| Error::Rejected {
                reason: format!("unknown market {}", symbol.0),
            })
    }

    async fn get_open_position(
        &self,
        symbol: &Symbol,
        subaccount: &str,
    ) -> Result<Option<OpenPosition>> {
        self.gate().await?;
        Ok(self.open_position(symbol, subaccount))
    }

    async fn get_klines(
        &self,
        symbol: &Symbol,
        _timeframe: &str,
        limit: u16,
    ) -> Result<Vec<Kline>> {
        self.gate().await?;
        let state = self.state.lock().unwrap();
        let series = state.klines.get(&symbol.0).cloned().unwrap_or_default();
        let skip = series.len().saturating_sub(limit as usize);
        Ok(series.into_iter().skip(skip).collect())
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
        self.gate().await?;
        let mut state = self.state.lock().unwrap();
        if quantity <= Decimal::ZERO {
            return Err(Error::Rejected {
                reason: "order size must be positive".to_string(),
            });
        }
        let key = (symbol.0.clone(), subaccount.to_string());
        if state.positions.contains_key(&key) {
            return Err(Error::Rejected {
                reason: format!("position already open for {}", symbol.0),
            });
        }
        let entry_price = Self::last_close(&state, symbol).ok_or_else(|| Error::Rejected {
            reason: format!("no market data for {}", symbol.0),
        })?;

        state.positions.insert(
            key,
            OpenPosition {
                side,
                entry_price,
                stop_price: stop,
                target_price: target,
                quantity,
                trailing_distance: None,
            },
        );
        state.calls.push(VenueCall::PlaceOrder {
            symbol: symbol.clone(),
            side,
            quantity,
            stop,
            target,
        });
        Ok(())
    }

    async fn set_stop(&self, symbol: &Symbol, price: Decimal, subaccount: &str) -> Result<()> {
        self.gate().await?;
        let mut state = self.state.lock().unwrap();
        let key = (symbol.0.clone(), subaccount.to_string());
        let position = state.positions.get_mut(&key).ok_or_else(|| Error::Rejected {
            reason: format!("no open position for {}", symbol.0),
        })?;
        position.stop_price = price;
        state.calls.push(VenueCall::SetStop {
            symbol: symbol.clone(),
            price,
        });
        Ok(())
    }

    async fn set_target(&self, symbol: &Symbol, price: Decimal, subaccount: &str) -> Result<()> {
        self.gate().await?;
        let mut state = self.state.lock().unwrap();
        let key = (symbol.0.clone(), subaccount.to_string());
        let position = state.positions.get_mut(&key).ok_or_else(|| Error::Rejected {
            reason: format!("no open position for {}", symbol.0),
        })?;
        position.target_price = price;
        state.calls.push(VenueCall::SetTarget {
            symbol: symbol.clone(),
            price,
        });
        Ok(())
    }

    async fn set_trailing(
        &self,
        symbol: &Symbol,
        distance: Decimal,
        trigger_price: Option<Decimal>,
        subaccount: &str,
    ) -> Result<()> {
        self.gate().await?;
        let mut state = self.state.lock().unwrap();
        let key = (symbol.0.clone(), subaccount.to_string());
        let position = state.positions.get_mut(&key).ok_or_else(|| Error::Rejected {
            reason: format!("no open position for {}", symbol.0),
        })?;
        position.trailing_distance = Some(distance);
        state.calls.push(VenueCall::SetTrailing {
            symbol: symbol.clone(),
            distance,
            trigger_price,
        });
        Ok(())
    }

    async fn close_position(&self, symbol: &Symbol, subaccount: &str) -> Result<()> {
        self.gate().await?;
        let mut state = self.state.lock().unwrap();
        let key = (symbol.0.clone(), subaccount.to_string());
        if state.positions.remove(&key).is_none() {
            return Err(Error::Rejected {
                reason: format!("no open position for {}", symbol.0),
            });
        }
        state.calls.push(VenueCall::Close {
            symbol: symbol.clone(),
        });
        Ok(())
    }

    async fn partial_close(
        &self,
        symbol: &Symbol,
        quantity: Decimal,
        subaccount: &str,
    ) -> Result<()> {
        self.gate().await?;
        let mut state = self.state.lock().unwrap();
        let key = (symbol.0.clone(), subaccount.to_string());
        let position = state.positions.get_mut(&key).ok_or_else(|| Error::Rejected {
            reason: format!("no open position for {}", symbol.0),
        })?;
        if quantity <= Decimal::ZERO || quantity >= position.quantity {
            return Err(Error::Rejected {
                reason: format!(
                    "partial close size {quantity} must be within the open size {}",
                    position.quantity
                ),
            });
        }
        position.quantity -= quantity;
        state.calls.push(VenueCall::PartialClose {
            symbol: symbol.clone(),
            quantity,
        });
        Ok(())
    }
}
