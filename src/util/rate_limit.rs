//! Rate limiting utilities

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Rate limiter type alias
pub type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Create a rate limiter with the specified events per second
pub fn create_limiter(per_second: u32) -> Arc<Limiter> {
    let quota = Quota::per_second(NonZeroU32::new(per_second).unwrap_or(NonZeroU32::MIN));
    Arc::new(RateLimiter::direct(quota))
}

/// Decode-failure warnings per second from the telemetry socket
pub const DECODE_WARN_RATE_LIMIT: u32 = 2;

/// Gate for log lines that can fire at tick rate.
///
/// Suppressed events are counted so the next emitted line can report them.
#[derive(Clone)]
pub struct LogThrottle {
    limiter: Arc<Limiter>,
    suppressed: Arc<AtomicU64>,
}

impl LogThrottle {
    pub fn new(per_second: u32) -> Self {
        Self {
            limiter: create_limiter(per_second),
            suppressed: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Returns `Some(suppressed_since_last)` when a line may be emitted
    pub fn check(&self) -> Option<u64> {
        if self.limiter.check().is_ok() {
            Some(self.suppressed.swap(0, Ordering::Relaxed))
        } else {
            self.suppressed.fetch_add(1, Ordering::Relaxed);
            None
        }
    }
}

impl Default for LogThrottle {
    fn default() -> Self {
        Self::new(DECODE_WARN_RATE_LIMIT)
    }
}
