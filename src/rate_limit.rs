//! Sliding-window admission control for outbound notifications.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{trace, warn};

/// Length of the trailing window the cap applies to.
pub const WINDOW: Duration = Duration::from_secs(60);

/// A source of monotonic time. Injected so tests can move time forward.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// The real monotonic clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A fixed-capacity sliding-window rate limiter.
///
/// Each admitted attempt records its timestamp. Capacity frees up only as
/// recorded timestamps age past [`WINDOW`]; there is no gradual refill.
pub struct RateLimiter {
    max_per_window: usize,
    timestamps: Mutex<VecDeque<Instant>>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("max_per_window", &self.max_per_window)
            .field("in_window", &self.timestamps.lock().len())
            .finish()
    }
}

impl RateLimiter {
    /// Creates a limiter admitting at most `max_per_minute` attempts per
    /// trailing 60 seconds.
    pub fn new(max_per_minute: usize) -> Self {
        Self::with_clock(max_per_minute, Arc::new(SystemClock))
    }

    /// Creates a limiter that reads time from `clock`.
    ///
    /// A cap of zero would reject everything forever, so it is raised to one.
    pub fn with_clock(max_per_minute: usize, clock: Arc<dyn Clock>) -> Self {
        let max_per_window = if max_per_minute == 0 {
            warn!("Rate limit cap of 0 is not allowed, using 1");
            1
        } else {
            max_per_minute
        };
        Self {
            max_per_window,
            timestamps: Mutex::new(VecDeque::with_capacity(max_per_window)),
            clock,
        }
    }

    /// The configured per-window cap.
    pub fn capacity(&self) -> usize {
        self.max_per_window
    }

    /// Checks whether another attempt may go out now, recording it if so.
    ///
    /// Eviction, the capacity check and the append happen in one critical
    /// section.
    pub fn allow(&self) -> bool {
        let now = self.clock.now();
        let mut timestamps = self.timestamps.lock();

        while let Some(oldest) = timestamps.front() {
            if now.saturating_duration_since(*oldest) > WINDOW {
                timestamps.pop_front();
            } else {
                break;
            }
        }

        if timestamps.len() >= self.max_per_window {
            trace!(in_window = timestamps.len(), cap = self.max_per_window, "Rate limit reached");
            return false;
        }

        timestamps.push_back(now);
        true
    }

    /// Number of admitted attempts currently retained in the window.
    pub fn in_window(&self) -> usize {
        self.timestamps.lock().len()
    }
}
