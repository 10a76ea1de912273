//! Rate limiter
//!
//! Fixed-window token bucket: at most `max_requests` calls are admitted per
//! `window`. The bucket refills completely when a call arrives after the
//! current window has elapsed.

use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::config::RateLimit;
use crate::error::{Result, StrataError};

struct Window {
    started: Option<Instant>,
    tokens: u32,
}

/// Admission control in front of the engine
pub struct RateLimiter {
    window: Duration,
    max_requests: u32,
    state: Mutex<Window>,
}

impl RateLimiter {
    pub fn new(limit: RateLimit) -> Self {
        Self {
            window: limit.window,
            max_requests: limit.max_requests,
            state: Mutex::new(Window {
                started: None,
                tokens: limit.max_requests,
            }),
        }
    }

    /// Take one token, or fail with [`StrataError::RateLimited`]
    pub fn try_acquire(&self) -> Result<()> {
        self.try_acquire_at(Instant::now())
    }

    fn try_acquire_at(&self, now: Instant) -> Result<()> {
        let mut state = self.state.lock();
        let expired = state
            .started
            .map_or(true, |started| now.duration_since(started) > self.window);
        if expired {
            state.started = Some(now);
            state.tokens = self.max_requests;
        }
        if state.tokens == 0 {
            return Err(StrataError::RateLimited);
        }
        state.tokens -= 1;
        Ok(())
    }

    /// Tokens left in the current window
    pub fn remaining(&self) -> u32 {
        self.state.lock().tokens
    }
}
