use std::collections::VecDeque;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Length of the sliding per-minute window.
pub const RATE_WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RateLimitError {
    /// Terminal for the run: the loop stops calling the backend instead of waiting.
    #[error("session call budget exhausted ({limit} backend calls)")]
    SessionExhausted { limit: u32 },
}

/// Sliding record of backend call timestamps plus the session counter.
///
/// Timestamps may lie in the future: a call that had to wait is recorded at
/// the instant it is allowed to proceed.
#[derive(Debug, Clone, Default)]
pub struct RateWindow {
    calls: VecDeque<Instant>,
    session_count: u64,
}

impl RateWindow {
    fn prune(&mut self, now: Instant) {
        while self
            .calls
            .front()
            .is_some_and(|t| now.saturating_duration_since(*t) >= RATE_WINDOW)
        {
            self.calls.pop_front();
        }
    }
}

/// Throttles outbound calls to the reasoning backend.
///
/// Two independent ceilings: a sliding per-minute count, answered with a wait,
/// and a fixed per-session count, answered with [`RateLimitError`].
#[derive(Debug)]
pub struct RateLimiter {
    per_minute: u32,
    per_session: u32,
    window: RateWindow,
}

impl RateLimiter {
    pub fn new(per_minute: u32, per_session: u32) -> Self {
        Self {
            per_minute,
            per_session,
            window: RateWindow::default(),
        }
    }

    /// Reserve one backend call. Returns how long the caller must suspend
    /// before issuing it (zero when under the per-minute ceiling).
    pub fn acquire(&mut self) -> Result<Duration, RateLimitError> {
        self.acquire_at(Instant::now())
    }

    pub fn acquire_at(&mut self, now: Instant) -> Result<Duration, RateLimitError> {
        if self.window.session_count >= u64::from(self.per_session) {
            return Err(RateLimitError::SessionExhausted {
                limit: self.per_session,
            });
        }

        self.window.prune(now);
        self.window.session_count += 1;

        let per_minute = usize::try_from(self.per_minute).unwrap_or(usize::MAX);
        if self.window.calls.len() < per_minute {
            self.window.calls.push_back(now);
            return Ok(Duration::ZERO);
        }

        let Some(oldest) = self.window.calls.pop_front() else {
            self.window.calls.push_back(now);
            return Ok(Duration::ZERO);
        };
        let wait = (oldest + RATE_WINDOW).saturating_duration_since(now);
        self.window.calls.push_back(now + wait);
        Ok(wait)
    }

    pub fn session_count(&self) -> u64 {
        self.window.session_count
    }

    pub fn remaining_session_calls(&self) -> u64 {
        u64::from(self.per_session).saturating_sub(self.window.session_count)
    }
}
