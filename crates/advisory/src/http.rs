// In crates/advisory/src/http.rs

use crate::types::{AdvisoryRole, EntryContext, PositionContext, WireRecommendation};
use crate::{AdvisoryClient, AdvisoryRecommendation, Error, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

/// An advisory client that POSTs the gathered context to an HTTP service
/// and validates the structured recommendation it returns.
#[derive(Debug, Clone)]
pub struct HttpAdvisoryClient {
    http_client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpAdvisoryClient {
    pub fn new(base_url: &str, api_key: &str, timeout_secs: u64) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| Error::ClientBuildError(e.to_string()))?;
        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    /// POSTs a context payload and maps the response through boundary
    /// validation. The service signals failure with an `error` object, so
    /// that is probed before deserializing into the wire shape.
    async fn request<C: serde::Serialize>(
        &self,
        path: &str,
        role: AdvisoryRole,
        context: &C,
    ) -> Result<AdvisoryRecommendation> {
        let url = format!("{}/{}", self.base_url, path);

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(context)
            .send()
            .await
            .map_err(Error::RequestFailed)?;

        let status = response.status();
        let text = response.text().await.map_err(Error::RequestFailed)?;
        let value: Value = serde_json::from_str(&text).map_err(Error::DeserializationFailed)?;

        if let Some(msg) = value.get("error").and_then(Value::as_str) {
            return Err(Error::ServiceError {
                status: status.as_u16(),
                msg: msg.to_string(),
            });
        }
        if !status.is_success() {
            return Err(Error::ServiceError {
                status: status.as_u16(),
                msg: text,
            });
        }

        let wire: WireRecommendation =
            serde_json::from_value(value).map_err(Error::DeserializationFailed)?;
        wire.into_validated(role)
    }
}

#[async_trait]
impl AdvisoryClient for HttpAdvisoryClient {
    async fn evaluate_entry(&self, context: &EntryContext) -> Result<AdvisoryRecommendation> {
        self.request("entry", AdvisoryRole::EntryEvaluator, context)
            .await
    }

    async fn conduct_position(
        &self,
        context: &PositionContext,
    ) -> Result<AdvisoryRecommendation> {
        self.request("conduct", AdvisoryRole::TradeConductor, context)
            .await
    }
}
