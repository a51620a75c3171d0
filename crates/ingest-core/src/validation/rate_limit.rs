//! Per-client upload rate limiting.
//!
//! Mirrors the in-memory, `RwLock<HashMap<...>>`-backed rate limit backend
//! used elsewhere in this codebase for domain-level throttling: cheap,
//! single-process, no external store required.

use std::collections::HashMap;
use std::time::{Duration, SystemTime};

use tokio::sync::RwLock;

/// Rolling window of upload timestamps for one client.
#[derive(Debug, Default)]
struct ClientWindows {
    timestamps: Vec<SystemTime>,
}

impl ClientWindows {
    fn count_within(&self, window: Duration, now: SystemTime) -> usize {
        self.timestamps
            .iter()
            .filter(|t| now.duration_since(**t).map(|d| d <= window).unwrap_or(true))
            .count()
    }

    fn evict_older_than(&mut self, window: Duration, now: SystemTime) {
        self.timestamps
            .retain(|t| now.duration_since(*t).map(|d| d <= window).unwrap_or(true));
    }
}

/// Tracks rolling 1-hour and 24-hour upload windows per client.
pub struct RateLimiter {
    clients: RwLock<HashMap<String, ClientWindows>>,
    max_per_hour: u32,
    max_per_day: u32,
}

pub enum RateLimitWindow {
    Hour,
    Day,
}

impl RateLimitWindow {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Hour => "1 hour",
            Self::Day => "24 hours",
        }
    }
}

impl RateLimiter {
    pub fn new(max_per_hour: u32, max_per_day: u32) -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
            max_per_hour,
            max_per_day,
        }
    }

    /// Check whether `client_id` may upload right now; if so, records the
    /// attempt. Returns the window that would be exceeded, if any.
    pub async fn check_and_record(&self, client_id: &str) -> Option<RateLimitWindow> {
        let now = SystemTime::now();
        let hour = Duration::from_secs(3600);
        let day = Duration::from_secs(86_400);

        let mut clients = self.clients.write().await;
        let entry = clients.entry(client_id.to_string()).or_default();
        entry.evict_older_than(day, now);

        if entry.count_within(hour, now) >= self.max_per_hour as usize {
            return Some(RateLimitWindow::Hour);
        }
        if entry.count_within(day, now) >= self.max_per_day as usize {
            return Some(RateLimitWindow::Day);
        }

        entry.timestamps.push(now);
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn allows_up_to_the_hourly_cap() {
        let limiter = RateLimiter::new(3, 100);
        for _ in 0..3 {
            assert!(limiter.check_and_record("client-a").await.is_none());
        }
        assert!(matches!(limiter.check_and_record("client-a").await, Some(RateLimitWindow::Hour)));
    }

    #[tokio::test]
    async fn tracks_clients_independently() {
        let limiter = RateLimiter::new(1, 100);
        assert!(limiter.check_and_record("a").await.is_none());
        assert!(limiter.check_and_record("b").await.is_none());
        assert!(limiter.check_and_record("a").await.is_some());
    }

    #[tokio::test]
    async fn property_max_plus_one_yields_exactly_one_rejection() {
        let cap = 5;
        let limiter = RateLimiter::new(cap, 1000);
        let mut rejections = 0;
        for _ in 0..(cap + 1) {
            if limiter.check_and_record("client").await.is_some() {
                rejections += 1;
            }
        }
        assert_eq!(rejections, 1);
    }
}
