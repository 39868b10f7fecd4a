use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::config::RateLimitSettings;

/// Fixed-window request counter keyed by client.
///
/// State lives only in memory: the maintenance scheduler drops expired
/// windows and shutdown clears the map.
pub struct RateLimiter {
    windows: DashMap<String, Window>,
    window: Duration,
    max_requests: u32,
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed { remaining: u32 },
    Limited { retry_after: u64 },
}

impl RateLimiter {
    pub fn new(settings: RateLimitSettings) -> Self {
        Self {
            windows: DashMap::new(),
            window: settings.window,
            max_requests: settings.max_requests,
        }
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    pub fn check(&self, key: &str) -> RateDecision {
        self.check_at(key, Instant::now())
    }

    fn check_at(&self, key: &str, now: Instant) -> RateDecision {
        let mut entry = self
            .windows
            .entry(key.to_string())
            .or_insert(Window { started: now, count: 0 });

        if now.duration_since(entry.started) >= self.window {
            *entry = Window { started: now, count: 0 };
        }

        if entry.count >= self.max_requests {
            let elapsed = now.duration_since(entry.started);
            let remaining = self.window.saturating_sub(elapsed);
            // Round up so clients never retry a moment too early
            let retry_after = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
            return RateDecision::Limited { retry_after: retry_after.max(1) };
        }

        entry.count += 1;
        RateDecision::Allowed {
            remaining: self.max_requests - entry.count,
        }
    }

    /// Drops windows that have fully elapsed. Returns how many were removed.
    pub fn cleanup_expired(&self) -> usize {
        self.cleanup_expired_at(Instant::now())
    }

    fn cleanup_expired_at(&self, now: Instant) -> usize {
        let before = self.windows.len();
        self.windows
            .retain(|_, w| now.duration_since(w.started) < self.window);
        before.saturating_sub(self.windows.len())
    }

    pub fn clear(&self) {
        self.windows.clear();
    }

    pub fn tracked_clients(&self) -> usize {
        self.windows.len()
    }
}
