// In crates/engine/tests/manager_lifecycle.rs
//
// Lifecycle behavior of the bot manager against the in-memory venue.

use advisory::{AdvisoryClient, ScriptedAdvisoryClient};
use core_types::{BotConfig, BotStatus, EnabledSides, Kline, PositionState, RiskTier, Symbol};
use engine::BotManager;
use risk::{RiskSettings, TrailingSettings};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use venue::{SimVenue, VenueGateway};

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
        poll_interval_secs: 1,
    }
}

fn risk_settings() -> RiskSettings {
    RiskSettings {
        balance_safety_margin: 0.02,
        min_risk_reward: 1.5,
        min_confidence: 0.75,
    }
}

fn flat_series(len: i64, close: Decimal) -> Vec<Kline> {
    (0..len)
        .map(|i| Kline {
            open_time: i * 300_000,
            open: close,
            high: close + dec!(0.5),
            low: close - dec!(0.5),
            close,
            volume: dec!(1),
            close_time: (i + 1) * 300_000 - 1,
        })
        .collect()
}

fn manager_with(venue: Arc<SimVenue>) -> BotManager {
    let advisory: Arc<dyn AdvisoryClient> = Arc::new(ScriptedAdvisoryClient::new());
    let (events_tx, _events_rx) = broadcast::channel(256);
    let venue_dyn: Arc<dyn VenueGateway> = venue;
    BotManager::new(
        venue_dyn,
        advisory,
        risk_settings(),
        TrailingSettings::default(),
        events_tx,
    )
}

#[tokio::test(start_paused = true)]
async fn a_healthy_instance_stops_within_the_timeout() {
    let venue = Arc::new(SimVenue::new());
    venue.set_klines(&Symbol("BTC-PERP".into()), flat_series(30, dec!(100)));
    let manager = manager_with(venue);

    let id = manager.start(config()).await.unwrap();
    let snapshot = manager.status(id).await.unwrap();
    assert_eq!(snapshot.status, BotStatus::Running);

    let status = manager.stop(id, Duration::from_secs(10)).await.unwrap();
    assert_eq!(status, BotStatus::Stopped);

    // Removed from the active set only after the confirmed stop.
    assert!(manager.status(id).await.is_none());
    assert!(manager.list().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn an_unresponsive_instance_is_marked_error_and_kept() {
    let venue = Arc::new(SimVenue::new());
    venue.set_klines(&Symbol("BTC-PERP".into()), flat_series(30, dec!(100)));
    // Every venue call blocks forever: cancellation is never observed.
    venue.set_hanging(true);
    let manager = manager_with(venue);

    let id = manager.start(config()).await.unwrap();
    let status = manager.stop(id, Duration::from_millis(200)).await.unwrap();
    assert_eq!(status, BotStatus::Error);

    // The table still reflects the instance and its last known position.
    let snapshot = manager.status(id).await.unwrap();
    assert_eq!(snapshot.status, BotStatus::Error);
    assert_eq!(snapshot.position, PositionState::Flat);
    assert!(snapshot.last_error.is_some());
}

#[tokio::test(start_paused = true)]
async fn repeated_startup_failures_are_fatal() {
    let venue = Arc::new(SimVenue::new());
    venue.set_failing(true);
    let manager = manager_with(venue);

    let id = manager.start(config()).await.unwrap();

    // The worker retries its startup sync on a fixed delay, then aborts.
    let mut status = BotStatus::Running;
    for _ in 0..200 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        status = manager.status(id).await.unwrap().status;
        if status == BotStatus::Error {
            break;
        }
    }
    assert_eq!(status, BotStatus::Error);
}

#[tokio::test(start_paused = true)]
async fn invalid_configurations_never_spawn() {
    let venue = Arc::new(SimVenue::new());
    let manager = manager_with(venue);

    let mut bad = config();
    bad.long_fast_period = 50; // fast above slow
    assert!(manager.start(bad).await.is_err());
    assert!(manager.list().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn stop_all_drains_the_table() {
    let venue = Arc::new(SimVenue::new());
    venue.set_klines(&Symbol("BTC-PERP".into()), flat_series(30, dec!(100)));
    venue.set_klines(&Symbol("ETH-PERP".into()), flat_series(30, dec!(100)));
    let manager = manager_with(venue);

    manager.start(config()).await.unwrap();
    let mut second = config();
    second.symbol = Symbol("ETH-PERP".into());
    second.subaccount = "alt".into();
    manager.start(second).await.unwrap();
    assert_eq!(manager.list().await.len(), 2);

    let results = manager.stop_all(Duration::from_secs(10)).await;
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|(_, s)| *s == BotStatus::Stopped));
    assert!(manager.list().await.is_empty());
}
