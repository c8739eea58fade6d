//! Rate limiter for resend cooldowns and brute force protection

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::info;

/// Rate limiter configuration
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Maximum number of attempts allowed per window
    pub max_attempts: u32,
    /// Time window in seconds
    pub window_seconds: u64,
    /// Ban duration in seconds once the limit is exceeded; zero means the
    /// caller only waits for the window to roll over
    pub ban_duration_seconds: u64,
}

impl RateLimiterConfig {
    /// One attempt per `seconds`, e.g. email resends
    pub fn cooldown(seconds: u64) -> Self {
        Self {
            max_attempts: 1,
            window_seconds: seconds,
            ban_duration_seconds: 0,
        }
    }
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            window_seconds: 300,       // 5 minutes
            ban_duration_seconds: 900, // 15 minutes
        }
    }
}

/// Outcome of a rate limited attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed,
    Limited { retry_after: Duration },
}

#[derive(Debug)]
struct RateLimiterEntry {
    attempts: u32,
    window_started: Instant,
    ban_expires: Option<Instant>,
}

/// Keyed fixed-window rate limiter
#[derive(Debug, Clone)]
pub struct RateLimiter {
    config: RateLimiterConfig,
    entries: Arc<Mutex<HashMap<String, RateLimiterEntry>>>,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            config,
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Record an attempt for `key`
    pub async fn hit(&self, key: &str) -> RateDecision {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        let window = Duration::from_secs(self.config.window_seconds);

        let entry = entries
            .entry(key.to_string())
            .or_insert(RateLimiterEntry {
                attempts: 0,
                window_started: now,
                ban_expires: None,
            });

        if let Some(ban_expires) = entry.ban_expires {
            if now < ban_expires {
                return RateDecision::Limited {
                    retry_after: ban_expires - now,
                };
            }
            entry.attempts = 0;
            entry.window_started = now;
            entry.ban_expires = None;
        }

        if now.duration_since(entry.window_started) >= window {
            entry.attempts = 0;
            entry.window_started = now;
        }

        if entry.attempts >= self.config.max_attempts {
            if self.config.ban_duration_seconds > 0 {
                let ban = Duration::from_secs(self.config.ban_duration_seconds);
                entry.ban_expires = Some(now + ban);
                info!("Locked out key for {} seconds", self.config.ban_duration_seconds);
                return RateDecision::Limited { retry_after: ban };
            }
            let retry_after = (entry.window_started + window).saturating_duration_since(now);
            return RateDecision::Limited { retry_after };
        }

        entry.attempts += 1;
        RateDecision::Allowed
    }

    /// Forget every attempt recorded for `key`
    pub async fn reset(&self, key: &str) {
        self.entries.lock().await.remove(key);
    }

    /// Drop entries whose window and ban are both over
    pub async fn prune(&self) -> usize {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        let window = Duration::from_secs(self.config.window_seconds);
        let before = entries.len();
        entries.retain(|_, e| {
            e.ban_expires.is_some_and(|b| now < b) || now.duration_since(e.window_started) < window
        });
        before - entries.len()
    }
}
