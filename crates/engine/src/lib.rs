// In crates/engine/src/lib.rs

pub mod bot;
pub mod conductor;
pub mod manager;
pub mod signal;
pub mod trailing;

pub use manager::{BotManager, BotSnapshot, Error, Result};

/// How many bars each instance pulls from the venue per tick. Enough to
/// warm the slowest configurable moving average with room to spare.
pub const KLINE_HISTORY_SIZE: u16 = 200;

/// Startup position-sync attempts before an instance aborts as fatal.
pub const STARTUP_SYNC_ATTEMPTS: u32 = 5;

/// Fixed delay between startup position-sync attempts.
pub const STARTUP_SYNC_DELAY: std::time::Duration = std::time::Duration::from_secs(2);
