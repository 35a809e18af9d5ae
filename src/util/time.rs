//! Time utilities for the race simulation

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Get current Unix timestamp in milliseconds
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

/// Server start time for uptime tracking
static SERVER_START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Initialize server start time (call once at startup)
pub fn init_server_time() {
    SERVER_START.get_or_init(Instant::now);
}

/// Get server uptime in seconds
pub fn uptime_secs() -> u64 {
    SERVER_START
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0)
}

/// Simulation frames per second
pub const TARGET_FPS: u32 = 30;

/// Target duration of one tick
pub const TARGET_FRAME_TIME: Duration = Duration::from_micros(1_000_000 / TARGET_FPS as u64);

/// Countdown broadcast before each race, one value per second
pub const COUNTDOWN_SECONDS: u8 = 5;
