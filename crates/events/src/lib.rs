// In crates/events/src/lib.rs

use advisory::AdvisoryRecommendation;
use chrono::{DateTime, Utc};
use core_types::{BotId, BotStatus, PositionState, Symbol};
use serde::Serialize;

/// Tags every bot-scoped event with the instance it belongs to.
#[derive(Debug, Clone, Serialize)]
pub struct BotMeta {
    pub bot_id: BotId,
    pub symbol: Symbol,
    pub subaccount: String,
    pub timeframe: String,
}

/// A lifecycle change of a bot instance (start/stop/error).
#[derive(Debug, Clone, Serialize)]
pub struct LifecycleEvent {
    pub meta: BotMeta,
    pub timestamp: DateTime<Utc>,
    pub status: BotStatus,
    pub detail: String,
}

/// Why a position-state transition happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionReason {
    Entry,
    TargetHit,
    StopHit,
    ManualClose,
    AdvisoryClose,
    PartialClose,
}

/// One position-state transition.
#[derive(Debug, Clone, Serialize)]
pub struct TransitionEvent {
    pub meta: BotMeta,
    pub timestamp: DateTime<Utc>,
    pub reason: TransitionReason,
    pub from: PositionState,
    pub to: PositionState,
}

/// One advisory invocation together with its validated response.
#[derive(Debug, Clone, Serialize)]
pub struct AdvisoryEvent {
    pub meta: BotMeta,
    pub timestamp: DateTime<Utc>,
    pub recommendation: AdvisoryRecommendation,
    /// False when the confidence threshold filtered the response out.
    pub acted_on: bool,
}

/// A candidate action dropped by the risk policy (low confidence, low
/// risk/reward, invalid price ordering, zero quantity, loosening stop).
#[derive(Debug, Clone, Serialize)]
pub struct RiskRejectionEvent {
    pub meta: BotMeta,
    pub timestamp: DateTime<Utc>,
    pub reason: String,
}

/// A log line mirrored from the tracing pipeline for UI consumption.
#[derive(Debug, Clone, Serialize)]
pub struct LogMessage {
    pub timestamp: DateTime<Utc>,
    pub level: String,
    pub message: String,
}

/// The top-level event enum broadcast to the operational API.
/// `tag` and `content` are used by serde for clean JSON representation.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "payload")]
pub enum BotEvent {
    Lifecycle(LifecycleEvent),
    Transition(TransitionEvent),
    Advisory(AdvisoryEvent),
    RiskRejection(RiskRejectionEvent),
    Log(LogMessage),
}

/// The broadcast handle every component emits events through.
pub type EventSender = tokio::sync::broadcast::Sender<BotEvent>;
