// In crates/web-server/src/types.rs

use core_types::{BotId, BotStatus};
use serde::{Deserialize, Serialize};

/// Response body for `POST /api/bots`.
#[derive(Debug, Serialize)]
pub struct StartBotResponse {
    pub id: BotId,
}

/// Query parameters for the stop endpoints (e.g., ?timeout_secs=10).
#[derive(Debug, Deserialize)]
pub struct StopParams {
    // `serde(default = ...)` provides a default value if the param is missing.
    #[serde(default = "default_stop_timeout")]
    pub timeout_secs: u64,
}

// Helper function for serde defaults.
fn default_stop_timeout() -> u64 {
    10
}

/// Response body for the stop endpoints.
#[derive(Debug, Serialize)]
pub struct StopResponse {
    pub id: BotId,
    pub status: BotStatus,
}
