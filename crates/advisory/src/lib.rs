// In crates/advisory/src/lib.rs

use async_trait::async_trait;

pub mod error;
pub mod http;
pub mod scripted;
pub mod types;

// Re-export public types
pub use error::{Error, Result};
pub use http::HttpAdvisoryClient;
pub use scripted::ScriptedAdvisoryClient;
pub use types::{
    AdvisoryAction, AdvisoryRecommendation, AdvisoryRole, EntryContext, MarketSlice,
    PositionContext,
};

/// The boundary to the external advisory service.
///
/// Two roles are consumed: the entry evaluator validates a candidate entry
/// and proposes its protective bracket, and the trade conductor reviews an
/// open position and proposes maintain/adjust/close actions. Both return a
/// structured, confidence-scored recommendation that has already been
/// validated against the role's allowed action set, so callers never see
/// loosely-typed payloads.
#[async_trait]
pub trait AdvisoryClient: Send + Sync {
    /// Asks the entry evaluator to judge a candidate entry.
    ///
    /// The returned recommendation is restricted to ignore / open_long /
    /// open_short actions.
    async fn evaluate_entry(&self, context: &EntryContext) -> Result<AdvisoryRecommendation>;

    /// Asks the trade conductor to review an open position.
    ///
    /// The returned recommendation is restricted to maintain / close /
    /// adjustment actions.
    async fn conduct_position(&self, context: &PositionContext)
        -> Result<AdvisoryRecommendation>;
}
