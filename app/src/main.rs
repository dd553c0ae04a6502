// In app/src/main.rs

use advisory::{AdvisoryClient, HttpAdvisoryClient};
use anyhow::Result;
use clap::{Parser, Subcommand};
use engine::BotManager;
use events::BotEvent;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing_subscriber::prelude::*;
use venue::{PaperVenue, RestVenue, VenueGateway};

mod tracing_layer;
use self::tracing_layer::EventBroadcastLayer;

/// Starting balance for every subaccount in paper mode.
const PAPER_INITIAL_BALANCE: rust_decimal::Decimal = dec!(10_000);

/// How long the shutdown path waits for each instance to wind down.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

// --- Command-Line Interface Definition ---

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = "An advisory-driven leveraged trading bot orchestrator.")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Runs the orchestrator: seeds bots from config and serves the API.
    Run,

    /// Loads and validates the configuration, then exits.
    CheckConfig,
}

// --- Main Application Entry Point ---

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from a .env file, if it exists.
    dotenvy::dotenv().ok();

    // --- Event Broadcast and Tracing Setup ---
    let (events_tx, _) = broadcast::channel::<BotEvent>(1024);
    let event_layer = EventBroadcastLayer::new(events_tx.clone());
    let fmt_layer = tracing_subscriber::fmt::layer().with_filter(
        tracing_subscriber::filter::Targets::new().with_default(tracing::Level::INFO),
    );
    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(event_layer)
        .init();

    // Parse command-line arguments.
    let cli = Cli::parse();

    tracing::info!("Starting Helmsman application");

    match cli.command {
        Commands::Run => {
            run_app(events_tx).await?;
        }
        Commands::CheckConfig => {
            check_config()?;
        }
    }

    Ok(())
}

// --- "Run" Subcommand Logic ---

/// The primary logic for the `run` command.
/// Initializes all core components, seeds the configured bots and serves
/// the operational API until a shutdown is requested.
async fn run_app(events_tx: events::EventSender) -> Result<()> {
    // --- 1. Initialization ---
    let settings = app_config::load_settings()?;
    tracing::info!("Application settings loaded successfully.");

    // --- 2. Component Instantiation ---
    let live_venue = Arc::new(RestVenue::new(
        &settings.venue.rest_base_url,
        &settings.venue.api_key,
        &settings.venue.secret_key,
    )?);

    // Conditionally route order flow based on the config flag.
    let venue: Arc<dyn VenueGateway> = if settings.app.live_trading_enabled {
        tracing::warn!("LIVE TRADING IS ENABLED. REAL ORDERS WILL BE PLACED.");
        live_venue
    } else {
        tracing::info!("Live trading disabled; orders fill against the paper book.");
        Arc::new(PaperVenue::new(live_venue, PAPER_INITIAL_BALANCE))
    };

    let advisory: Arc<dyn AdvisoryClient> = Arc::new(HttpAdvisoryClient::new(
        &settings.advisory.base_url,
        &settings.advisory.api_key,
        settings.advisory.timeout_secs,
    )?);

    let manager = Arc::new(BotManager::new(
        venue,
        advisory,
        settings.risk.clone(),
        settings.trailing.clone(),
        events_tx.clone(),
    ));

    // --- 3. Seed the Configured Bots ---
    let portfolio = app_config::load_bot_portfolio()?;
    for seeded in portfolio.bot_configs {
        if !seeded.enabled {
            tracing::warn!(symbol = %seeded.config.symbol, "Skipping disabled bot.");
            continue;
        }
        match manager.start(seeded.config.clone()).await {
            Ok(id) => {
                tracing::info!(bot_id = %id, symbol = %seeded.config.symbol, "Seeded bot from configuration.");
            }
            Err(e) => {
                tracing::error!(symbol = %seeded.config.symbol, error = %e, "Failed to seed bot. Skipping.");
            }
        }
    }

    // --- 4. Serve Until Shutdown ---
    let server_handle = tokio::spawn(web_server::run(
        settings.server.clone(),
        manager.clone(),
        events_tx.clone(),
    ));

    tokio::select! {
        server_result = server_handle => {
            tracing::error!(?server_result, "Operational API task has terminated unexpectedly.");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown requested; stopping all bot instances.");
            let results = manager.stop_all(SHUTDOWN_TIMEOUT).await;
            for (id, status) in results {
                tracing::info!(bot_id = %id, ?status, "Instance wound down.");
            }
        }
    }

    tracing::info!("Helmsman application has finished.");
    Ok(())
}

// --- "CheckConfig" Subcommand Logic ---

/// Loads every configuration layer and validates the seeded bots without
/// touching the venue.
fn check_config() -> Result<()> {
    let settings = app_config::load_settings()?;
    println!(
        "settings ok: environment={}, live_trading_enabled={}",
        settings.app.environment, settings.app.live_trading_enabled
    );

    let portfolio = app_config::load_bot_portfolio()?;
    for seeded in &portfolio.bot_configs {
        seeded.config.validate()?;
        println!(
            "bot ok: {} {} on {} (enabled={})",
            seeded.config.symbol, seeded.config.timeframe, seeded.config.subaccount, seeded.enabled
        );
    }
    println!("{} bot(s) configured.", portfolio.bot_configs.len());
    Ok(())
}
