// In crates/engine/src/bot.rs

use crate::conductor::AdvisoryScheduler;
use crate::manager::InstanceShared;
use crate::signal;
use crate::trailing::TrailingPlanner;
use crate::{KLINE_HISTORY_SIZE, STARTUP_SYNC_ATTEMPTS, STARTUP_SYNC_DELAY};
use advisory::{
    AdvisoryAction, AdvisoryClient, AdvisoryRecommendation, EntryContext, MarketSlice,
    PositionContext,
};
use chrono::Utc;
use core_types::{BotConfig, BotId, BotStatus, Kline, OpenPosition, PositionState, Side};
use events::{
    AdvisoryEvent, BotEvent, BotMeta, EventSender, LifecycleEvent, RiskRejectionEvent,
    TransitionEvent, TransitionReason,
};
use risk::{stop_is_improvement, RiskEngine, RiskPolicy, RiskSettings, TrailingSettings};
use rust_decimal::Decimal;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::watch;
use venue::VenueGateway;

/// How many bars each advisory context slice carries.
const CONTEXT_BARS: u16 = 50;

/// Higher timeframes added to every advisory context.
const CONTEXT_LADDER: [&str; 2] = ["1h", "4h"];

/// A single, independent trading instance for one (symbol, subaccount).
///
/// Runs as its own tokio task: ticks are strictly sequential, every venue
/// and advisory call is awaited inline, and cancellation is observed at the
/// top of the loop and across the inter-tick sleep.
pub struct BotWorker {
    id: BotId,
    config: BotConfig,
    venue: Arc<dyn VenueGateway>,
    advisory: Arc<dyn AdvisoryClient>,
    risk: RiskEngine,
    policy: RiskPolicy,
    trailing: TrailingPlanner,
    scheduler: AdvisoryScheduler,
    events: EventSender,
    shared: Arc<RwLock<InstanceShared>>,
    cancel: watch::Receiver<bool>,
    position: PositionState,
}

impl BotWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: BotId,
        config: BotConfig,
        venue: Arc<dyn VenueGateway>,
        advisory: Arc<dyn AdvisoryClient>,
        risk_settings: &RiskSettings,
        trailing_settings: &TrailingSettings,
        events: EventSender,
        shared: Arc<RwLock<InstanceShared>>,
        cancel: watch::Receiver<bool>,
    ) -> Self {
        let policy = RiskPolicy::for_tier(config.risk_tier, risk_settings);
        let scheduler = AdvisoryScheduler::new(
            Duration::from_secs(config.conduct_interval_secs),
            config.conduct_on_start,
        );
        Self {
            id,
            config,
            venue,
            advisory,
            risk: RiskEngine::new(risk_settings),
            policy,
            trailing: TrailingPlanner::new(trailing_settings),
            scheduler,
            events,
            shared,
            cancel,
            position: PositionState::Flat,
        }
    }

    /// The main, long-running loop for this instance.
    pub async fn run(mut self) {
        tracing::info!(
            bot_id = %self.id,
            symbol = %self.config.symbol,
            timeframe = %self.config.timeframe,
            subaccount = %self.config.subaccount,
            "Starting bot instance."
        );

        // The venue is the system of record; refuse to guess our state.
        match self.sync_position_at_startup().await {
            Ok(position) => {
                self.position = position;
                self.sync_shared_position();
            }
            Err(e) => {
                tracing::error!(bot_id = %self.id, error = %e, "Startup position sync exhausted its retries. Aborting instance.");
                self.set_shared_status(BotStatus::Error, Some(e.to_string()));
                self.emit(BotEvent::Lifecycle(LifecycleEvent {
                    meta: self.meta(),
                    timestamp: Utc::now(),
                    status: BotStatus::Error,
                    detail: format!("startup position sync failed: {e}"),
                }));
                return;
            }
        }

        let poll = Duration::from_secs(self.config.poll_interval_secs);
        loop {
            if *self.cancel.borrow() {
                break;
            }

            if let Err(e) = self.tick().await {
                tracing::warn!(bot_id = %self.id, error = %e, "Tick abandoned; retrying next tick.");
            }
            self.sync_shared_position();

            tokio::select! {
                _ = tokio::time::sleep(poll) => {}
                changed = self.cancel.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        tracing::info!(bot_id = %self.id, "Bot instance loop exited.");
        self.set_shared_status(BotStatus::Stopped, None);
    }

    /// Queries the venue for the authoritative position before trading,
    /// retrying a fixed number of times before giving up for good.
    async fn sync_position_at_startup(&mut self) -> venue::Result<PositionState> {
        let mut last_error = None;
        for attempt in 1..=STARTUP_SYNC_ATTEMPTS {
            if *self.cancel.borrow() {
                return Ok(PositionState::Flat);
            }
            match self
                .venue
                .get_open_position(&self.config.symbol, &self.config.subaccount)
                .await
            {
                Ok(Some(position)) => return Ok(PositionState::Open(position)),
                Ok(None) => return Ok(PositionState::Flat),
                Err(e) => {
                    tracing::warn!(bot_id = %self.id, attempt, error = %e, "Startup position sync failed.");
                    last_error = Some(e);
                    if attempt < STARTUP_SYNC_ATTEMPTS {
                        tokio::time::sleep(STARTUP_SYNC_DELAY).await;
                    }
                }
            }
        }
        Err(last_error
            .unwrap_or_else(|| venue::Error::Connectivity("startup sync failed".to_string())))
    }

    /// One pass of the state machine. A returned error means the tick was
    /// abandoned with no state change; the next tick starts from scratch.
    pub(crate) async fn tick(&mut self) -> venue::Result<()> {
        let klines = self
            .venue
            .get_klines(&self.config.symbol, &self.config.timeframe, KLINE_HISTORY_SIZE)
            .await?;
        if klines.len() < 2 {
            return Ok(());
        }
        let current = klines[klines.len() - 1].clone();

        // While in a position, venue truth wins over the local copy.
        if !self.position.is_flat() {
            self.refresh_from_venue(current.open_time).await?;
        }

        if self.position.as_open().is_some() {
            self.check_exits(&current).await?;
        }

        if self.position.is_flat() {
            self.entry_pass(&klines, &current).await;
        } else {
            if let Some(position) = self.position.as_open().cloned() {
                self.trailing_pass(&position, &current).await;
            }
            // Re-read: the trailing pass may have tightened the stop.
            if let Some(position) = self.position.as_open().cloned() {
                self.conduct_pass(&position, &current).await;
            }
        }

        Ok(())
    }

    /// Re-reads the open position from the venue. A position that vanished
    /// at the venue (a manual close) flips the state machine to flat.
    async fn refresh_from_venue(&mut self, bar: i64) -> venue::Result<()> {
        match self
            .venue
            .get_open_position(&self.config.symbol, &self.config.subaccount)
            .await?
        {
            Some(position) => {
                self.position = PositionState::Open(position);
            }
            None => {
                tracing::info!(bot_id = %self.id, "Venue reports no position; adopting the manual close.");
                self.transition_to_flat(TransitionReason::ManualClose, bar);
            }
        }
        Ok(())
    }

    /// Exit transitions in priority order: target, then stop.
    async fn check_exits(&mut self, current: &Kline) -> venue::Result<()> {
        let Some(position) = self.position.as_open().cloned() else {
            return Ok(());
        };

        let target_crossed = match position.side {
            Side::Long => current.high >= position.target_price,
            Side::Short => current.low <= position.target_price,
        };
        let stop_crossed = match position.side {
            Side::Long => current.low <= position.stop_price,
            Side::Short => current.high >= position.stop_price,
        };

        if target_crossed {
            self.close_at_venue(TransitionReason::TargetHit, current.open_time)
                .await?;
        } else if stop_crossed {
            self.close_at_venue(TransitionReason::StopHit, current.open_time)
                .await?;
        }
        Ok(())
    }

    /// Closes the position at the venue and, once confirmed, transitions
    /// to flat. A validation rejection defers to venue truth next tick.
    async fn close_at_venue(
        &mut self,
        reason: TransitionReason,
        bar: i64,
    ) -> venue::Result<()> {
        match self
            .venue
            .close_position(&self.config.symbol, &self.config.subaccount)
            .await
        {
            Ok(()) => {
                self.transition_to_flat(reason, bar);
                Ok(())
            }
            Err(e) if e.is_transient() => Err(e),
            Err(e) => {
                tracing::warn!(bot_id = %self.id, error = %e, "Close rejected; deferring to venue truth next tick.");
                Ok(())
            }
        }
    }

    fn transition_to_flat(&mut self, reason: TransitionReason, bar: i64) {
        let from = std::mem::replace(&mut self.position, PositionState::Flat);
        self.scheduler.note_position_closed(bar);
        tracing::info!(bot_id = %self.id, ?reason, "Position closed.");
        self.emit(BotEvent::Transition(TransitionEvent {
            meta: self.meta(),
            timestamp: Utc::now(),
            reason,
            from,
            to: PositionState::Flat,
        }));
        self.sync_shared_position();
    }

    /// Break-even / trailing management. Mutation failures leave local
    /// state untouched and are retried next tick.
    async fn trailing_pass(&mut self, position: &OpenPosition, current: &Kline) {
        let Some(proposal) = self.trailing.plan(position, current.close) else {
            return;
        };
        match self
            .venue
            .set_stop(&self.config.symbol, proposal.price, &self.config.subaccount)
            .await
        {
            Ok(()) => {
                tracing::info!(
                    bot_id = %self.id,
                    reason = ?proposal.reason,
                    price = %proposal.price,
                    "Stop tightened."
                );
                if let PositionState::Open(p) = &mut self.position {
                    p.stop_price = proposal.price;
                }
            }
            Err(e) => {
                tracing::warn!(bot_id = %self.id, error = %e, "Stop mutation failed; retrying next tick.");
            }
        }
    }

    /// Scheduled review of the open position by the trade conductor.
    async fn conduct_pass(&mut self, position: &OpenPosition, current: &Kline) {
        if !self.scheduler.begin_conduct(current.open_time) {
            return;
        }

        let balance = match self.venue.get_balance(&self.config.subaccount).await {
            Ok(balance) => balance,
            Err(e) => {
                tracing::warn!(bot_id = %self.id, error = %e, "Balance query failed; skipping this review.");
                return;
            }
        };
        let context = PositionContext {
            symbol: self.config.symbol.clone(),
            subaccount: self.config.subaccount.clone(),
            timeframe: self.config.timeframe.clone(),
            position: position.clone(),
            last_price: current.close,
            balance,
            market: self.gather_market().await,
        };

        let recommendation = match self.advisory.conduct_position(&context).await {
            Ok(rec) => rec,
            Err(e) => {
                tracing::error!(bot_id = %self.id, error = %e, "Position review failed; no action this cycle.");
                return;
            }
        };

        let acted_on = recommendation.confidence >= self.policy.min_confidence;
        self.emit(BotEvent::Advisory(AdvisoryEvent {
            meta: self.meta(),
            timestamp: Utc::now(),
            recommendation: recommendation.clone(),
            acted_on,
        }));
        if !acted_on {
            self.emit_rejection(format!(
                "review confidence {:.2} is below the policy minimum {:.2}",
                recommendation.confidence, self.policy.min_confidence
            ));
            return;
        }

        self.apply_conduct_actions(recommendation, current).await;
    }

    /// Applies conductor actions in the order returned. Each action is
    /// re-validated against the live position, and the stop ratchet holds
    /// here exactly as it does in the trailing path.
    async fn apply_conduct_actions(
        &mut self,
        recommendation: AdvisoryRecommendation,
        current: &Kline,
    ) {
        for action in recommendation.actions {
            // The position may have been closed or resized by a previous
            // action in this batch.
            let Some(position) = self.position.as_open().cloned() else {
                break;
            };

            match action {
                AdvisoryAction::Maintain | AdvisoryAction::Ignore => {}

                AdvisoryAction::Close => {
                    if let Err(e) = self
                        .close_at_venue(TransitionReason::AdvisoryClose, current.open_time)
                        .await
                    {
                        tracing::warn!(bot_id = %self.id, error = %e, "Advisory close failed; retrying next tick.");
                    }
                }

                AdvisoryAction::AdjustStop { price } => {
                    if !stop_is_improvement(position.side, position.stop_price, price) {
                        self.emit_rejection(format!(
                            "adjust_stop to {price} would loosen the stop from {}",
                            position.stop_price
                        ));
                        continue;
                    }
                    let through_price = match position.side {
                        Side::Long => price >= current.close,
                        Side::Short => price <= current.close,
                    };
                    if through_price {
                        self.emit_rejection(format!(
                            "adjust_stop to {price} crosses the current price {}",
                            current.close
                        ));
                        continue;
                    }
                    match self
                        .venue
                        .set_stop(&self.config.symbol, price, &self.config.subaccount)
                        .await
                    {
                        Ok(()) => {
                            tracing::info!(bot_id = %self.id, price = %price, "Stop adjusted per review.");
                            if let PositionState::Open(p) = &mut self.position {
                                p.stop_price = price;
                            }
                        }
                        Err(e) => {
                            tracing::warn!(bot_id = %self.id, error = %e, "Stop adjustment failed.");
                        }
                    }
                }

                AdvisoryAction::AdjustTarget { price } => {
                    let valid = match position.side {
                        Side::Long => price > current.close,
                        Side::Short => price < current.close,
                    };
                    if !valid {
                        self.emit_rejection(format!(
                            "adjust_target to {price} crosses the current price {}",
                            current.close
                        ));
                        continue;
                    }
                    match self
                        .venue
                        .set_target(&self.config.symbol, price, &self.config.subaccount)
                        .await
                    {
                        Ok(()) => {
                            tracing::info!(bot_id = %self.id, price = %price, "Target adjusted per review.");
                            if let PositionState::Open(p) = &mut self.position {
                                p.target_price = price;
                            }
                        }
                        Err(e) => {
                            tracing::warn!(bot_id = %self.id, error = %e, "Target adjustment failed.");
                        }
                    }
                }

                AdvisoryAction::TrailingImmediate { distance } => {
                    self.apply_trailing(&position, distance, None).await;
                }

                AdvisoryAction::TrailingAtPrice {
                    distance,
                    trigger_price,
                } => {
                    self.apply_trailing(&position, distance, Some(trigger_price))
                        .await;
                }

                AdvisoryAction::PartialClose { fraction } => {
                    self.apply_partial_close(&position, fraction).await;
                }

                // Boundary validation keeps entry actions out of conductor
                // responses; nothing to do if one slips through a bug.
                AdvisoryAction::OpenLong { .. } | AdvisoryAction::OpenShort { .. } => {
                    tracing::error!(bot_id = %self.id, ?action, "Entry action in a conductor response; dropped.");
                }
            }
        }
    }

    async fn apply_trailing(
        &mut self,
        position: &OpenPosition,
        distance: Decimal,
        trigger_price: Option<Decimal>,
    ) {
        if distance <= Decimal::ZERO {
            self.emit_rejection(format!("trailing distance {distance} must be positive"));
            return;
        }
        if let Some(existing) = position.trailing_distance {
            if distance > existing {
                self.emit_rejection(format!(
                    "trailing distance {distance} would exceed the existing trailing stop {existing}"
                ));
                return;
            }
        }
        match self
            .venue
            .set_trailing(
                &self.config.symbol,
                distance,
                trigger_price,
                &self.config.subaccount,
            )
            .await
        {
            Ok(()) => {
                tracing::info!(bot_id = %self.id, distance = %distance, "Trailing stop attached.");
                if let PositionState::Open(p) = &mut self.position {
                    p.trailing_distance = Some(distance);
                }
            }
            Err(e) => {
                tracing::warn!(bot_id = %self.id, error = %e, "Trailing mutation failed.");
            }
        }
    }

    async fn apply_partial_close(&mut self, position: &OpenPosition, fraction: Decimal) {
        let increment = match self
            .venue
            .get_min_increment(&self.config.symbol, &self.config.subaccount)
            .await
        {
            Ok(increment) => increment,
            Err(e) => {
                tracing::warn!(bot_id = %self.id, error = %e, "Increment query failed; dropping partial close.");
                return;
            }
        };

        let quantity = ((position.quantity * fraction) / increment).floor() * increment;
        if quantity <= Decimal::ZERO {
            self.emit_rejection(format!(
                "partial close of {fraction} sizes to zero at increment {increment}"
            ));
            return;
        }
        if quantity >= position.quantity {
            self.emit_rejection(format!(
                "partial close quantity {quantity} would close the whole position"
            ));
            return;
        }

        match self
            .venue
            .partial_close(&self.config.symbol, quantity, &self.config.subaccount)
            .await
        {
            Ok(()) => {
                let from = self.position.clone();
                if let PositionState::Open(p) = &mut self.position {
                    p.quantity -= quantity;
                }
                tracing::info!(bot_id = %self.id, quantity = %quantity, "Position partially closed.");
                self.emit(BotEvent::Transition(TransitionEvent {
                    meta: self.meta(),
                    timestamp: Utc::now(),
                    reason: TransitionReason::PartialClose,
                    from,
                    to: self.position.clone(),
                }));
            }
            Err(e) => {
                tracing::warn!(bot_id = %self.id, error = %e, "Partial close failed.");
            }
        }
    }

    /// Entry detection while flat. A firing signal routes through the
    /// entry evaluator; nothing opens without its approval.
    async fn entry_pass(&mut self, klines: &[Kline], current: &Kline) {
        for side in [Side::Long, Side::Short] {
            if !self.config.sides.allows(side) {
                continue;
            }
            let (fast, slow) = match side {
                Side::Long => (self.config.long_fast_period, self.config.long_slow_period),
                Side::Short => (self.config.short_fast_period, self.config.short_slow_period),
            };
            if !signal::entry_signal(klines, side, fast, slow) {
                continue;
            }
            if !self.scheduler.begin_entry(side, current.open_time) {
                continue;
            }
            tracing::info!(bot_id = %self.id, ?side, "Entry condition met; asking the entry evaluator.");
            if self.try_enter(side, current).await {
                break;
            }
        }
    }

    /// Runs the full evaluate → size → place pipeline for one candidate
    /// entry. Returns true once a position is confirmed open.
    async fn try_enter(&mut self, side: Side, current: &Kline) -> bool {
        let balance = match self.venue.get_balance(&self.config.subaccount).await {
            Ok(balance) => balance,
            Err(e) => {
                tracing::warn!(bot_id = %self.id, error = %e, "Balance query failed; dropping this entry.");
                return false;
            }
        };

        let context = EntryContext {
            symbol: self.config.symbol.clone(),
            subaccount: self.config.subaccount.clone(),
            timeframe: self.config.timeframe.clone(),
            side,
            proposed_entry: current.close,
            balance,
            market: self.gather_market().await,
        };
        let recommendation = match self.advisory.evaluate_entry(&context).await {
            Ok(rec) => rec,
            Err(e) => {
                tracing::error!(bot_id = %self.id, error = %e, "Entry evaluation failed; no action this cycle.");
                return false;
            }
        };

        let acted_on = recommendation.confidence >= self.policy.min_confidence;
        self.emit(BotEvent::Advisory(AdvisoryEvent {
            meta: self.meta(),
            timestamp: Utc::now(),
            recommendation: recommendation.clone(),
            acted_on,
        }));
        if !acted_on {
            self.emit_rejection(format!(
                "entry confidence {:.2} is below the policy minimum {:.2}",
                recommendation.confidence, self.policy.min_confidence
            ));
            return false;
        }

        let proposal = recommendation.actions.iter().find_map(|action| match action {
            AdvisoryAction::OpenLong { stop, target } => Some((Side::Long, *stop, *target)),
            AdvisoryAction::OpenShort { stop, target } => Some((Side::Short, *stop, *target)),
            _ => None,
        });
        let Some((approved_side, stop, target)) = proposal else {
            tracing::info!(bot_id = %self.id, "Entry evaluator declined the entry.");
            return false;
        };
        if approved_side != side {
            self.emit_rejection(format!(
                "evaluator proposed {approved_side:?} against the {side:?} signal; dropped"
            ));
            return false;
        }

        let entry = current.close;
        if let Err(e) = self
            .risk
            .check_entry(&self.policy, side, entry, stop, target, recommendation.confidence)
        {
            self.emit_rejection(e.to_string());
            return false;
        }

        let increment = match self
            .venue
            .get_min_increment(&self.config.symbol, &self.config.subaccount)
            .await
        {
            Ok(increment) => increment,
            Err(e) => {
                tracing::warn!(bot_id = %self.id, error = %e, "Increment query failed; dropping this entry.");
                return false;
            }
        };
        let quantity = match self.risk.position_size(
            balance,
            self.policy.risk_fraction,
            entry,
            stop,
            increment,
        ) {
            Ok(quantity) => quantity,
            Err(e) => {
                self.emit_rejection(e.to_string());
                return false;
            }
        };
        if quantity.is_zero() {
            self.emit_rejection(format!(
                "order sizes to zero at increment {increment}; not trading"
            ));
            return false;
        }

        if let Err(e) = self
            .venue
            .place_market_order(
                &self.config.symbol,
                side,
                quantity,
                stop,
                target,
                &self.config.subaccount,
            )
            .await
        {
            tracing::warn!(bot_id = %self.id, error = %e, "Order placement failed; dropping this entry.");
            return false;
        }

        // Order confirmed. Prefer the venue's view of the fill; fall back
        // to the local picture until the next tick refreshes it.
        let position = match self
            .venue
            .get_open_position(&self.config.symbol, &self.config.subaccount)
            .await
        {
            Ok(Some(position)) => position,
            _ => OpenPosition {
                side,
                entry_price: entry,
                stop_price: stop,
                target_price: target,
                quantity,
                trailing_distance: None,
            },
        };

        let from = std::mem::replace(&mut self.position, PositionState::Open(position.clone()));
        self.scheduler.note_position_opened();
        tracing::info!(
            bot_id = %self.id,
            ?side,
            entry = %position.entry_price,
            quantity = %position.quantity,
            "Position opened."
        );
        self.emit(BotEvent::Transition(TransitionEvent {
            meta: self.meta(),
            timestamp: Utc::now(),
            reason: TransitionReason::Entry,
            from,
            to: PositionState::Open(position),
        }));
        self.sync_shared_position();
        true
    }

    /// Multi-timeframe candles for the advisory context. A slice that
    /// fails to load is skipped rather than failing the whole call.
    async fn gather_market(&self) -> Vec<MarketSlice> {
        let mut slices = Vec::new();
        let mut frames = vec![self.config.timeframe.clone()];
        for higher in CONTEXT_LADDER {
            if higher != self.config.timeframe {
                frames.push(higher.to_string());
            }
        }
        for frame in frames {
            match self
                .venue
                .get_klines(&self.config.symbol, &frame, CONTEXT_BARS)
                .await
            {
                Ok(klines) if !klines.is_empty() => slices.push(MarketSlice {
                    timeframe: frame,
                    klines,
                }),
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(bot_id = %self.id, timeframe = %frame, error = %e, "Skipping context timeframe.");
                }
            }
        }
        slices
    }

    fn meta(&self) -> BotMeta {
        BotMeta {
            bot_id: self.id,
            symbol: self.config.symbol.clone(),
            subaccount: self.config.subaccount.clone(),
            timeframe: self.config.timeframe.clone(),
        }
    }

    fn emit(&self, event: BotEvent) {
        let _ = self.events.send(event);
    }

    fn emit_rejection(&self, reason: String) {
        tracing::warn!(bot_id = %self.id, %reason, "Candidate action rejected.");
        self.emit(BotEvent::RiskRejection(RiskRejectionEvent {
            meta: self.meta(),
            timestamp: Utc::now(),
            reason,
        }));
    }

    fn sync_shared_position(&self) {
        let mut shared = self.shared.write().unwrap();
        shared.position = self.position.clone();
    }

    fn set_shared_status(&self, status: BotStatus, last_error: Option<String>) {
        let mut shared = self.shared.write().unwrap();
        shared.status = status;
        if status != BotStatus::Running {
            shared.stopped_at.get_or_insert_with(Utc::now);
        }
        if last_error.is_some() {
            shared.last_error = last_error;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use advisory::{AdvisoryRole, ScriptedAdvisoryClient};
    use core_types::{EnabledSides, RiskTier, Symbol};
    use rust_decimal_macros::dec;
    use tokio::sync::broadcast;
    use venue::{SimVenue, VenueCall};

    const BAR_MS: i64 = 300_000;

    fn config() -> BotConfig {
        BotConfig {
            symbol: Symbol("BTC-PERP".into()),
            timeframe: "5m".into(),
            subaccount: "main".into(),
            sides: EnabledSides::Both,
            long_fast_period: 5,
            long_slow_period: 10,
            short_fast_period: 5,
            short_slow_period: 10,
            risk_tier: RiskTier::Balanced,
            conduct_interval_secs: 900,
            conduct_on_start: false,
            poll_interval_secs: 15,
        }
    }

    fn risk_settings() -> RiskSettings {
        RiskSettings {
            balance_safety_margin: 0.02,
            min_risk_reward: 1.5,
            min_confidence: 0.75,
        }
    }

    struct Harness {
        venue: Arc<SimVenue>,
        advisory: Arc<ScriptedAdvisoryClient>,
        worker: BotWorker,
        _cancel: watch::Sender<bool>,
        _events: broadcast::Receiver<BotEvent>,
    }

    fn harness(config: BotConfig) -> Harness {
        let venue = Arc::new(SimVenue::new());
        let advisory = Arc::new(ScriptedAdvisoryClient::new());
        let (events_tx, events_rx) = broadcast::channel(256);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let shared = Arc::new(RwLock::new(InstanceShared::new()));

        let venue_dyn: Arc<dyn VenueGateway> = venue.clone();
        let advisory_dyn: Arc<dyn AdvisoryClient> = advisory.clone();
        let worker = BotWorker::new(
            BotId::new(),
            config,
            venue_dyn,
            advisory_dyn,
            &risk_settings(),
            &TrailingSettings::default(),
            events_tx,
            shared,
            cancel_rx,
        );
        Harness {
            venue,
            advisory,
            worker,
            _cancel: cancel_tx,
            _events: events_rx,
        }
    }

    fn bar(index: i64, open: Decimal, high: Decimal, low: Decimal, close: Decimal) -> Kline {
        Kline {
            open_time: index * BAR_MS,
            open,
            high,
            low,
            close,
            volume: dec!(1),
            close_time: (index + 1) * BAR_MS - 1,
        }
    }

    /// Rising closes, each bar's high above the previous one: the long
    /// entry condition holds on the final bar.
    fn uptrend(len: i64) -> Vec<Kline> {
        (0..len)
            .map(|i| {
                let c = Decimal::from(100 + i);
                bar(i, c - dec!(0.5), c + dec!(0.5), c - dec!(1), c)
            })
            .collect()
    }

    /// Dead-flat bars around `close`: no entry condition can fire.
    fn flat_series(len: i64, close: Decimal) -> Vec<Kline> {
        (0..len)
            .map(|i| bar(i, close, close + dec!(0.5), close - dec!(0.5), close))
            .collect()
    }

    fn recommendation(
        role: AdvisoryRole,
        confidence: f64,
        actions: Vec<AdvisoryAction>,
    ) -> AdvisoryRecommendation {
        AdvisoryRecommendation {
            timestamp: Utc::now(),
            role,
            confidence,
            actions,
            rationale: String::new(),
        }
    }

    fn long_position() -> OpenPosition {
        OpenPosition {
            side: Side::Long,
            entry_price: dec!(100),
            stop_price: dec!(95),
            target_price: dec!(120),
            quantity: dec!(1),
            trailing_distance: None,
        }
    }

    /// Installs an open long both locally and at the venue, as the state
    /// machine expects while in a position.
    fn install_long(h: &mut Harness, position: OpenPosition) {
        let symbol = Symbol("BTC-PERP".into());
        h.venue.set_position(&symbol, "main", position.clone());
        h.worker.position = PositionState::Open(position);
    }

    #[tokio::test]
    async fn approved_entry_opens_a_position() {
        let mut h = harness(config());
        let symbol = Symbol("BTC-PERP".into());
        h.venue.set_balance("main", dec!(10000));
        h.venue.set_increment(&symbol, dec!(0.001));
        h.venue.set_klines(&symbol, uptrend(30));
        // Entry at 129: stop 123, target 147 is a 3.0 risk/reward.
        h.advisory
            .push_entry(recommendation(
                AdvisoryRole::EntryEvaluator,
                0.9,
                vec![AdvisoryAction::OpenLong {
                    stop: dec!(123),
                    target: dec!(147),
                }],
            ))
            .await;

        h.worker.tick().await.unwrap();

        assert_eq!(h.advisory.entry_calls(), 1);
        let position = h.venue.open_position(&symbol, "main").expect("position opened");
        assert_eq!(position.side, Side::Long);
        assert_eq!(position.stop_price, dec!(123));
        assert!(position.quantity > Decimal::ZERO);
        assert_eq!(position.quantity % dec!(0.001), dec!(0));
        assert!(!h.worker.position.is_flat());
        assert!(h
            .venue
            .calls()
            .iter()
            .any(|c| matches!(c, VenueCall::PlaceOrder { .. })));
    }

    #[tokio::test]
    async fn a_bar_asks_the_entry_evaluator_only_once() {
        let mut h = harness(config());
        let symbol = Symbol("BTC-PERP".into());
        h.venue.set_balance("main", dec!(10000));
        h.venue.set_increment(&symbol, dec!(0.001));
        h.venue.set_klines(&symbol, uptrend(30));
        // Below the 0.75 threshold: no trade, but the bar is consumed.
        h.advisory
            .push_entry(recommendation(
                AdvisoryRole::EntryEvaluator,
                0.5,
                vec![AdvisoryAction::OpenLong {
                    stop: dec!(123),
                    target: dec!(147),
                }],
            ))
            .await;

        h.worker.tick().await.unwrap();
        h.worker.tick().await.unwrap();
        h.worker.tick().await.unwrap();

        assert_eq!(h.advisory.entry_calls(), 1);
        assert!(h.venue.open_position(&symbol, "main").is_none());
        assert!(h.worker.position.is_flat());
    }

    #[tokio::test]
    async fn low_confidence_reviews_touch_nothing() {
        let mut cfg = config();
        cfg.conduct_on_start = true;
        let mut h = harness(cfg);
        let symbol = Symbol("BTC-PERP".into());
        h.venue.set_balance("main", dec!(10000));
        h.venue.set_increment(&symbol, dec!(0.001));
        // Price at 105: 25% progress, below every trailing threshold.
        h.venue.set_klines(&symbol, flat_series(30, dec!(105)));
        install_long(&mut h, long_position());
        h.advisory
            .push_conduct(recommendation(
                AdvisoryRole::TradeConductor,
                0.5,
                vec![AdvisoryAction::AdjustStop { price: dec!(103) }],
            ))
            .await;

        h.worker.tick().await.unwrap();

        assert_eq!(h.advisory.conduct_calls(), 1);
        assert!(h.venue.calls().is_empty());
        assert_eq!(
            h.venue.open_position(&symbol, "main").unwrap().stop_price,
            dec!(95)
        );
    }

    #[tokio::test]
    async fn adjust_stop_never_loosens() {
        let mut cfg = config();
        cfg.conduct_on_start = true;
        cfg.conduct_interval_secs = 0;
        let mut h = harness(cfg);
        let symbol = Symbol("BTC-PERP".into());
        h.venue.set_balance("main", dec!(10000));
        h.venue.set_klines(&symbol, flat_series(30, dec!(105)));
        install_long(&mut h, long_position());
        // First review tries to loosen, second tightens.
        h.advisory
            .push_conduct(recommendation(
                AdvisoryRole::TradeConductor,
                0.9,
                vec![AdvisoryAction::AdjustStop { price: dec!(90) }],
            ))
            .await;
        h.advisory
            .push_conduct(recommendation(
                AdvisoryRole::TradeConductor,
                0.9,
                vec![AdvisoryAction::AdjustStop { price: dec!(101) }],
            ))
            .await;

        h.worker.tick().await.unwrap();
        assert!(h.venue.calls().is_empty());
        assert_eq!(
            h.venue.open_position(&symbol, "main").unwrap().stop_price,
            dec!(95)
        );

        // Next bar, next review: the tightening one is applied.
        let mut series = flat_series(31, dec!(105));
        series.remove(0);
        h.venue.set_klines(&symbol, series);
        h.worker.tick().await.unwrap();
        assert_eq!(
            h.venue.open_position(&symbol, "main").unwrap().stop_price,
            dec!(101)
        );
    }

    #[tokio::test]
    async fn a_crossed_stop_closes_the_position() {
        let mut h = harness(config());
        let symbol = Symbol("BTC-PERP".into());
        // Current bar trades down through the stop at 95.
        let mut series = flat_series(30, dec!(100));
        series[29].low = dec!(94);
        series[29].close = dec!(96);
        h.venue.set_klines(&symbol, series);
        install_long(&mut h, long_position());

        h.worker.tick().await.unwrap();

        assert!(h.worker.position.is_flat());
        assert!(h.venue.open_position(&symbol, "main").is_none());
        assert!(h
            .venue
            .calls()
            .iter()
            .any(|c| matches!(c, VenueCall::Close { .. })));
    }

    #[tokio::test]
    async fn a_crossed_target_closes_the_position() {
        let mut h = harness(config());
        let symbol = Symbol("BTC-PERP".into());
        let mut series = flat_series(30, dec!(100));
        series[29].high = dec!(121);
        series[29].close = dec!(119);
        h.venue.set_klines(&symbol, series);
        install_long(&mut h, long_position());

        h.worker.tick().await.unwrap();

        assert!(h.worker.position.is_flat());
        assert!(h.venue.open_position(&symbol, "main").is_none());
    }

    #[tokio::test]
    async fn a_manual_close_at_the_venue_wins() {
        let mut h = harness(config());
        let symbol = Symbol("BTC-PERP".into());
        h.venue.set_klines(&symbol, flat_series(30, dec!(105)));
        // Local state believes in a long the venue no longer has.
        h.worker.position = PositionState::Open(long_position());

        h.worker.tick().await.unwrap();

        assert!(h.worker.position.is_flat());
        // Reconciliation only; nothing was sent to the venue.
        assert!(h.venue.calls().is_empty());
    }

    #[tokio::test]
    async fn a_failing_venue_abandons_the_tick_without_state_changes() {
        let mut h = harness(config());
        let symbol = Symbol("BTC-PERP".into());
        h.venue.set_klines(&symbol, flat_series(30, dec!(105)));
        install_long(&mut h, long_position());
        h.venue.set_failing(true);

        let err = h.worker.tick().await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(h.worker.position, PositionState::Open(long_position()));
    }

    #[tokio::test]
    async fn the_trailing_stop_only_ever_tightens() {
        let mut h = harness(config());
        let symbol = Symbol("BTC-PERP".into());
        install_long(&mut h, long_position());

        // 50% progress: stop ratchets to entry.
        h.venue.set_klines(&symbol, flat_series(30, dec!(110)));
        h.worker.tick().await.unwrap();
        assert_eq!(
            h.venue.open_position(&symbol, "main").unwrap().stop_price,
            dec!(100)
        );

        // 80% progress: stop trails 0.4% behind price.
        h.venue.set_klines(&symbol, flat_series(30, dec!(116)));
        h.worker.tick().await.unwrap();
        let trailed = dec!(116) * dec!(0.996);
        assert_eq!(
            h.venue.open_position(&symbol, "main").unwrap().stop_price,
            trailed
        );

        // Price eases back without touching the stop: the trailed level
        // would now be looser, so nothing moves.
        let mut series = flat_series(30, dec!(116));
        series[29].low = dec!(115.9);
        series[29].close = dec!(115.95);
        series[29].high = dec!(116.3);
        h.venue.set_klines(&symbol, series);
        h.worker.tick().await.unwrap();
        assert_eq!(
            h.venue.open_position(&symbol, "main").unwrap().stop_price,
            trailed
        );
        let stop_moves = h
            .venue
            .calls()
            .iter()
            .filter(|c| matches!(c, VenueCall::SetStop { .. }))
            .count();
        assert_eq!(stop_moves, 2);
    }

    #[tokio::test]
    async fn partial_close_is_quantized_and_bounded() {
        let mut cfg = config();
        cfg.conduct_on_start = true;
        let mut h = harness(cfg);
        let symbol = Symbol("BTC-PERP".into());
        h.venue.set_balance("main", dec!(10000));
        h.venue.set_increment(&symbol, dec!(0.1));
        h.venue.set_klines(&symbol, flat_series(30, dec!(105)));
        let mut position = long_position();
        position.quantity = dec!(1.05);
        install_long(&mut h, position);
        h.advisory
            .push_conduct(recommendation(
                AdvisoryRole::TradeConductor,
                0.9,
                vec![AdvisoryAction::PartialClose {
                    fraction: dec!(0.5),
                }],
            ))
            .await;

        h.worker.tick().await.unwrap();

        // 1.05 * 0.5 = 0.525, floored to 0.5 at the 0.1 increment.
        assert_eq!(
            h.venue.open_position(&symbol, "main").unwrap().quantity,
            dec!(0.55)
        );
        assert!(h.venue.calls().iter().any(|c| matches!(
            c,
            VenueCall::PartialClose { quantity, .. } if *quantity == dec!(0.5)
        )));
    }
}

