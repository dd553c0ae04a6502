// In crates/engine/src/manager.rs

use crate::bot::BotWorker;
use advisory::AdvisoryClient;
use chrono::{DateTime, Utc};
use core_types::{BotConfig, BotId, BotStatus, PositionState};
use events::{BotEvent, BotMeta, EventSender, LifecycleEvent};
use risk::{RiskSettings, TrailingSettings};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use venue::VenueGateway;

#[derive(Error, Debug)]
pub enum Error {
    #[error("No bot with id {0}")]
    UnknownBot(BotId),

    #[error(transparent)]
    InvalidConfig(#[from] core_types::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// The runtime fields of an instance that outlive a single tick.
///
/// Written by the instance's own loop; the manager only reads it, except
/// for the stop path stamping the final status.
#[derive(Debug)]
pub struct InstanceShared {
    pub status: BotStatus,
    pub started_at: DateTime<Utc>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub position: PositionState,
    pub last_error: Option<String>,
}

impl InstanceShared {
    pub fn new() -> Self {
        Self {
            status: BotStatus::Running,
            started_at: Utc::now(),
            stopped_at: None,
            position: PositionState::Flat,
            last_error: None,
        }
    }
}

impl Default for InstanceShared {
    fn default() -> Self {
        Self::new()
    }
}

/// A point-in-time view of one instance, served to API callers.
#[derive(Debug, Clone, Serialize)]
pub struct BotSnapshot {
    pub id: BotId,
    pub config: BotConfig,
    pub status: BotStatus,
    pub started_at: DateTime<Utc>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub position: PositionState,
    pub last_error: Option<String>,
}

/// One entry in the manager's instance table.
struct BotHandle {
    config: BotConfig,
    shared: Arc<RwLock<InstanceShared>>,
    cancel: watch::Sender<bool>,
    join: Option<JoinHandle<()>>,
}

/// Owns the set of running bot instances.
///
/// `start` spawns each instance into its own tokio task and returns
/// immediately; `stop` signals cooperative cancellation and waits, never
/// aborting the task, so in-flight venue calls are allowed to finish. The
/// instance table is the only state shared across callers and is guarded
/// by a single async mutex.
pub struct BotManager {
    venue: Arc<dyn VenueGateway>,
    advisory: Arc<dyn AdvisoryClient>,
    risk_settings: RiskSettings,
    trailing_settings: TrailingSettings,
    events: EventSender,
    bots: Mutex<HashMap<BotId, BotHandle>>,
}

impl BotManager {
    pub fn new(
        venue: Arc<dyn VenueGateway>,
        advisory: Arc<dyn AdvisoryClient>,
        risk_settings: RiskSettings,
        trailing_settings: TrailingSettings,
        events: EventSender,
    ) -> Self {
        Self {
            venue,
            advisory,
            risk_settings,
            trailing_settings,
            events,
            bots: Mutex::new(HashMap::new()),
        }
    }

    /// Validates the configuration, spawns the instance and returns its id
    /// without waiting for the first tick.
    pub async fn start(&self, config: BotConfig) -> Result<BotId> {
        config.validate()?;

        let id = BotId::new();
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let shared = Arc::new(RwLock::new(InstanceShared::new()));

        let worker = BotWorker::new(
            id,
            config.clone(),
            self.venue.clone(),
            self.advisory.clone(),
            &self.risk_settings,
            &self.trailing_settings,
            self.events.clone(),
            shared.clone(),
            cancel_rx,
        );
        let join = tokio::spawn(worker.run());

        self.bots.lock().await.insert(
            id,
            BotHandle {
                config: config.clone(),
                shared,
                cancel: cancel_tx,
                join: Some(join),
            },
        );

        tracing::info!(bot_id = %id, symbol = %config.symbol, subaccount = %config.subaccount, "Bot instance started.");
        self.emit_lifecycle(id, &config, BotStatus::Running, "started");
        Ok(id)
    }

    /// Signals cancellation and waits up to `timeout` for the loop to
    /// exit. On success the instance is removed from the table; on timeout
    /// it is marked `Error` and kept, with its last known position intact.
    pub async fn stop(&self, id: BotId, timeout: Duration) -> Result<BotStatus> {
        let (config, shared, join) = {
            let mut bots = self.bots.lock().await;
            let handle = bots.get_mut(&id).ok_or(Error::UnknownBot(id))?;
            let join = handle.join.take();
            let _ = handle.cancel.send(true);
            (handle.config.clone(), handle.shared.clone(), join)
        };

        let Some(mut join) = join else {
            // A concurrent stop already owns the join handle; report the
            // status it left behind.
            let status = shared.read().unwrap().status;
            return Ok(status);
        };

        match tokio::time::timeout(timeout, &mut join).await {
            Ok(_join_result) => {
                let status = {
                    let mut s = shared.write().unwrap();
                    if s.status == BotStatus::Running {
                        s.status = BotStatus::Stopped;
                    }
                    s.stopped_at.get_or_insert_with(Utc::now);
                    s.status
                };
                self.bots.lock().await.remove(&id);
                tracing::info!(bot_id = %id, ?status, "Bot instance stopped.");
                self.emit_lifecycle(id, &config, status, "stopped");
                Ok(status)
            }
            Err(_elapsed) => {
                {
                    let mut s = shared.write().unwrap();
                    s.status = BotStatus::Error;
                    s.last_error = Some(format!("did not stop within {timeout:?}"));
                }
                // The task is still running; keep the handle so a later
                // stop can try again.
                if let Some(handle) = self.bots.lock().await.get_mut(&id) {
                    handle.join = Some(join);
                }
                tracing::warn!(bot_id = %id, ?timeout, "Bot instance did not stop in time.");
                self.emit_lifecycle(id, &config, BotStatus::Error, "stop timed out");
                Ok(BotStatus::Error)
            }
        }
    }

    /// Stops every instance, sequentially, with the same timeout each.
    pub async fn stop_all(&self, timeout: Duration) -> Vec<(BotId, BotStatus)> {
        let ids: Vec<BotId> = self.bots.lock().await.keys().copied().collect();
        let mut results = Vec::with_capacity(ids.len());
        for id in ids {
            if let Ok(status) = self.stop(id, timeout).await {
                results.push((id, status));
            }
        }
        results
    }

    /// The current snapshot of one instance, if it is still in the table.
    pub async fn status(&self, id: BotId) -> Option<BotSnapshot> {
        let bots = self.bots.lock().await;
        bots.get(&id).map(|handle| Self::snapshot(id, handle))
    }

    /// Snapshots of every instance in the table.
    pub async fn list(&self) -> Vec<BotSnapshot> {
        let bots = self.bots.lock().await;
        let mut snapshots: Vec<BotSnapshot> = bots
            .iter()
            .map(|(id, handle)| Self::snapshot(*id, handle))
            .collect();
        snapshots.sort_by_key(|s| s.started_at);
        snapshots
    }

    fn snapshot(id: BotId, handle: &BotHandle) -> BotSnapshot {
        let shared = handle.shared.read().unwrap();
        BotSnapshot {
            id,
            config: handle.config.clone(),
            status: shared.status,
            started_at: shared.started_at,
            stopped_at: shared.stopped_at,
            position: shared.position.clone(),
            last_error: shared.last_error.clone(),
        }
    }

    fn emit_lifecycle(&self, id: BotId, config: &BotConfig, status: BotStatus, detail: &str) {
        let _ = self.events.send(BotEvent::Lifecycle(LifecycleEvent {
            meta: BotMeta {
                bot_id: id,
                symbol: config.symbol.clone(),
                subaccount: config.subaccount.clone(),
                timeframe: config.timeframe.clone(),
            },
            timestamp: Utc::now(),
            status,
            detail: detail.to_string(),
        }));
    }
}
