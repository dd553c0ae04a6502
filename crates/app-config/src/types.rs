// In crates/app-config/src/types.rs

use core_types::BotConfig;
use risk::types::{RiskSettings, TrailingSettings};
use serde::Deserialize;

#[derive(Deserialize, Debug, Clone)]
pub struct Settings {
    /// The application's general settings.
    pub app: AppSettings,
    /// Settings for the venue gateway.
    pub venue: VenueSettings,
    /// Settings for the advisory service endpoint.
    pub advisory: AdvisorySettings,
    /// Settings for the operational API server.
    pub server: ServerSettings,
    /// Risk-policy defaults applied to every bot.
    pub risk: RiskSettings,
    /// Trailing-stop and break-even thresholds.
    #[serde(default)]
    pub trailing: TrailingSettings,
}

#[derive(Deserialize, Debug, Clone)]
pub struct AppSettings {
    /// The environment the application is running in (e.g., "development", "production").
    pub environment: String,
    /// The log level for the application.
    pub log_level: String,
    /// When false, orders are routed to the in-memory paper venue.
    #[serde(default)]
    pub live_trading_enabled: bool,
}

#[derive(Deserialize, Debug, Clone)]
pub struct VenueSettings {
    /// The API key for the venue.
    pub api_key: String,
    /// The secret key for the venue.
    pub secret_key: String,
    /// The REST API base URL for the venue.
    pub rest_base_url: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct AdvisorySettings {
    /// Base URL of the advisory service.
    pub base_url: String,
    /// Bearer token presented to the advisory service.
    pub api_key: String,
    /// Request timeout in seconds.
    #[serde(default = "default_advisory_timeout")]
    pub timeout_secs: u64,
}

fn default_advisory_timeout() -> u64 {
    60
}

#[derive(Deserialize, Debug, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

// --- Structs for bots.toml Configuration ---

/// The set of bots started automatically at boot.
#[derive(Deserialize, Debug, Clone)]
pub struct BotPortfolio {
    #[serde(rename = "bots")]
    pub bot_configs: Vec<SeededBot>,
}

/// One `[[bots]]` entry in `config/bots.toml`.
#[derive(Deserialize, Debug, Clone)]
pub struct SeededBot {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(flatten)]
    pub config: BotConfig,
}

fn default_enabled() -> bool {
    true
}
