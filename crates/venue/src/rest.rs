// In crates/venue/src/rest.rs

use crate::types::{ApiEnvelope, MarketInfo, OrderAck, PositionInfo, WalletBalance, WireCandle};
use crate::{Error, Result, VenueGateway};
use async_trait::async_trait;
use chrono::Utc;
use core_types::{timeframe_ms, Kline, OpenPosition, Side, Symbol};
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use sha2::Sha256;

// Create a type alias for the HMAC-SHA256 implementation.
type HmacSha256 = Hmac<Sha256>;

/// The live venue gateway: signed REST requests against the exchange API.
///
/// Each request carries the API key, an HMAC-SHA256 signature over
/// `timestamp + method + path + body`, and the subaccount the call is
/// routed to.
#[derive(Debug, Clone)]
pub struct RestVenue {
    http_client: reqwest::Client,
    api_key: String,
    secret_key: String,
    base_url: String,
}

impl RestVenue {
    pub fn new(base_url: &str, api_key: &str, secret_key: &str) -> Result<Self> {
        let http_client = reqwest::Client::new();
        Ok(Self {
            http_client,
            api_key: api_key.to_string(),
            secret_key: secret_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Generates an HMAC-SHA256 signature over the request payload.
    fn sign(&self, payload: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.secret_key.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(payload.as_bytes());
        let result = mac.finalize();
        hex::encode(result.into_bytes())
    }

    /// Sends a signed request and unwraps the venue's response envelope.
    async fn request<T: serde::de::DeserializeOwned>(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<Value>,
        subaccount: &str,
    ) -> Result<T> {
        let timestamp = Utc::now().timestamp_millis();
        let body_str = body
            .as_ref()
            .map(|b| b.to_string())
            .unwrap_or_default();
        let signature = self.sign(&format!("{timestamp}{method}{path}{body_str}"));

        let url = format!("{}{}", self.base_url, path);
        let mut request = self
            .http_client
            .request(method, &url)
            .header("VENUE-KEY", &self.api_key)
            .header("VENUE-SIGN", signature)
            .header("VENUE-TS", timestamp.to_string())
            .header("VENUE-SUBACCOUNT", subaccount);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await.map_err(Error::RequestFailed)?;
        let text = response.text().await.map_err(Error::RequestFailed)?;
        let envelope: ApiEnvelope<T> =
            serde_json::from_str(&text).map_err(Error::DeserializationFailed)?;

        if !envelope.success {
            return Err(Error::ApiError {
                msg: envelope.error.unwrap_or_else(|| "unknown error".to_string()),
            });
        }
        envelope.result.ok_or(Error::ApiError {
            msg: "response envelope carried no result".to_string(),
        })
    }
}

#[async_trait]
impl VenueGateway for RestVenue {
    async fn get_balance(&self, subaccount: &str) -> Result<Decimal> {
        let balances: Vec<WalletBalance> = self
            .request(reqwest::Method::GET, "/api/wallet/balances", None, subaccount)
            .await?;
        // The quote currency wallet funds every position.
        Ok(balances
            .iter()
            .find(|b| b.coin == "USD")
            .map(|b| b.free)
            .unwrap_or(Decimal::ZERO))
    }

    async fn get_min_increment(&self, symbol: &Symbol, subaccount: &str) -> Result<Decimal> {
        let market: MarketInfo = self
            .request(
                reqwest::Method::GET,
                &format!("/api/markets/{}", symbol.0),
                None,
                subaccount,
            )
            .await?;
        Ok(market.size_increment)
    }

    async fn get_open_position(
        &self,
        symbol: &Symbol,
        subaccount: &str,
    ) -> Result<Option<OpenPosition>> {
        let positions: Vec<PositionInfo> = self
            .request(reqwest::Method::GET, "/api/positions", None, subaccount)
            .await?;
        Ok(positions
            .into_iter()
            .find(|p| p.market == symbol.0)
            .and_then(PositionInfo::into_open_position))
    }

    async fn get_klines(
        &self,
        symbol: &Symbol,
        timeframe: &str,
        limit: u16,
    ) -> Result<Vec<Kline>> {
        let resolution_secs = timeframe_ms(timeframe)
            .map_err(|e| Error::Rejected {
                reason: e.to_string(),
            })?
            / 1000;
        // Market data is account-independent; no subaccount routing needed.
        let candles: Vec<WireCandle> = self
            .request(
                reqwest::Method::GET,
                &format!(
                    "/api/markets/{}/candles?resolution={}&limit={}",
                    symbol.0, resolution_secs, limit
                ),
                None,
                "",
            )
            .await?;

        // Convert the wire candles into the internal Kline type.
        Ok(candles
            .into_iter()
            .map(|c| Kline {
                open_time: c.start_time,
                open: c.open,
                high: c.high,
                low: c.low,
                close: c.close,
                volume: c.volume,
                close_time: c.end_time,
            })
            .collect())
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
        let side_str = match side {
            Side::Long => "buy",
            Side::Short => "sell",
        };
        let body = json!({
            "market": symbol.0,
            "side": side_str,
            "type": "market",
            "size": quantity,
            "stopPrice": stop,
            "targetPrice": target,
        });
        let ack: OrderAck = self
            .request(reqwest::Method::POST, "/api/orders", Some(body), subaccount)
            .await?;
        tracing::info!(order_id = ack.id, status = %ack.status, "Market order placed.");
        Ok(())
    }

    async fn set_stop(&self, symbol: &Symbol, price: Decimal, subaccount: &str) -> Result<()> {
        let body = json!({ "market": symbol.0, "stopPrice": price });
        let _ack: OrderAck = self
            .request(
                reqwest::Method::POST,
                "/api/conditional_orders/stop",
                Some(body),
                subaccount,
            )
            .await?;
        Ok(())
    }

    async fn set_target(&self, symbol: &Symbol, price: Decimal, subaccount: &str) -> Result<()> {
        let body = json!({ "market": symbol.0, "targetPrice": price });
        let _ack: OrderAck = self
            .request(
                reqwest::Method::POST,
                "/api/conditional_orders/target",
                Some(body),
                subaccount,
            )
            .await?;
        Ok(())
    }

    async fn set_trailing(
        &self,
        symbol: &Symbol,
        distance: Decimal,
        trigger_price: Option<Decimal>,
        subaccount: &str,
    ) -> Result<()> {
        let mut body = json!({ "market": symbol.0, "trailValue": distance });
        if let Some(trigger) = trigger_price {
            body["triggerPrice"] = json!(trigger);
        }
        let _ack: OrderAck = self
            .request(
                reqwest::Method::POST,
                "/api/conditional_orders/trailing",
                Some(body),
                subaccount,
            )
            .await?;
        Ok(())
    }

    async fn close_position(&self, symbol: &Symbol, subaccount: &str) -> Result<()> {
        let body = json!({ "market": symbol.0 });
        let _ack: OrderAck = self
            .request(
                reqwest::Method::POST,
                "/api/positions/close",
                Some(body),
                subaccount,
            )
            .await?;
        Ok(())
    }

    async fn partial_close(
        &self,
        symbol: &Symbol,
        quantity: Decimal,
        subaccount: &str,
    ) -> Result<()> {
        let body = json!({ "market": symbol.0, "size": quantity });
        let _ack: OrderAck = self
            .request(
                reqwest::Method::POST,
                "/api/positions/close",
                Some(body),
                subaccount,
            )
            .await?;
        Ok(())
    }
}
