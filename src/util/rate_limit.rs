//! Rate limiting utilities

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Rate limiter type alias
pub type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Create a rate limiter with the specified requests per second
pub fn create_limiter(requests_per_second: u32) -> Arc<Limiter> {
    let quota = Quota::per_second(NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN));
    Arc::new(RateLimiter::direct(quota))
}

/// Inbound WebSocket messages per second, per socket.
/// Control at frame rate plus headroom for ready/ping/summary.
pub const SOCKET_MESSAGE_RATE_LIMIT: u32 = 60;

/// Per-socket inbound limiter
#[derive(Clone)]
pub struct SocketRateLimiter {
    limiter: Arc<Limiter>,
}

impl SocketRateLimiter {
    pub fn new() -> Self {
        Self::with_rate(SOCKET_MESSAGE_RATE_LIMIT)
    }

    pub fn with_rate(per_second: u32) -> Self {
        Self {
            limiter: create_limiter(per_second),
        }
    }

    /// True when the message may be processed
    pub fn check(&self) -> bool {
        self.limiter.check().is_ok()
    }
}

impl Default for SocketRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
