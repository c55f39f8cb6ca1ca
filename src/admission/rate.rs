//! Fixed-window per-identity rate limiting.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::debug;

use crate::config::RateLimitConfig;

use super::identity::CallerIdentity;

/// Outcome of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    /// Whether the request is allowed.
    pub allowed: bool,
    /// Requests remaining in the current window.
    pub remaining: u32,
    /// Time until the current window resets.
    pub retry_after: Duration,
}

/// One caller's counter within the current window.
#[derive(Debug, Clone, Copy)]
struct WindowRecord {
    count: u32,
    window_reset: Instant,
}

/// Fixed-window request throttle keyed by caller identity.
///
/// Deliberately a plain fixed window, not sliding or token-bucket: a caller
/// straddling a window boundary can issue up to twice the limit in quick
/// succession. The counter resets the first time a check lands past the
/// boundary, so stale records never block a fresh window.
pub struct RateLimiter {
    config: RateLimitConfig,
    windows: DashMap<CallerIdentity, WindowRecord>,
}

impl RateLimiter {
    /// Create a new rate limiter.
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: DashMap::new(),
        }
    }

    /// Check and count a request for the given identity.
    pub fn check(&self, identity: &CallerIdentity) -> RateLimitDecision {
        self.check_at(identity, Instant::now())
    }

    fn check_at(&self, identity: &CallerIdentity, now: Instant) -> RateLimitDecision {
        let max = self.config.max_requests;
        let window = self.config.window();

        let mut entry = self
            .windows
            .entry(identity.clone())
            .or_insert(WindowRecord {
                count: 0,
                window_reset: now + window,
            });
        let record = entry.value_mut();

        if now >= record.window_reset {
            record.count = 1;
            record.window_reset = now + window;
            return RateLimitDecision {
                allowed: true,
                remaining: max.saturating_sub(1),
                retry_after: window,
            };
        }

        if record.count >= max {
            debug!(identity = %identity, "Rate limit exceeded");
            return RateLimitDecision {
                allowed: false,
                remaining: 0,
                retry_after: record.window_reset - now,
            };
        }

        record.count += 1;
        RateLimitDecision {
            allowed: true,
            remaining: max.saturating_sub(record.count),
            retry_after: record.window_reset - now,
        }
    }

    /// Remove records whose window has already elapsed.
    pub fn purge_stale(&self) -> usize {
        self.purge_stale_at(Instant::now())
    }

    fn purge_stale_at(&self, now: Instant) -> usize {
        let before = self.windows.len();
        self.windows.retain(|_, record| now < record.window_reset);
        before - self.windows.len()
    }

    /// Number of identities currently tracked.
    pub fn record_count(&self) -> usize {
        self.windows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max_requests: u32, window_secs: u64) -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            max_requests,
            window_secs,
        })
    }

    fn identity(name: &str) -> CallerIdentity {
        CallerIdentity::new(name)
    }

    #[test]
    fn test_allows_up_to_limit() {
        let limiter = limiter(20, 600);
        let id = identity("203.0.113.7");
        let now = Instant::now();

        for i in 0..20 {
            let decision = limiter.check_at(&id, now);
            assert!(decision.allowed, "request {} should be allowed", i + 1);
        }

        let decision = limiter.check_at(&id, now);
        assert!(!decision.allowed);
        assert_eq!(decision.remaining, 0);
    }

    #[test]
    fn test_remaining_counts_down() {
        let limiter = limiter(3, 600);
        let id = identity("a");
        let now = Instant::now();

        assert_eq!(limiter.check_at(&id, now).remaining, 2);
        assert_eq!(limiter.check_at(&id, now).remaining, 1);
        assert_eq!(limiter.check_at(&id, now).remaining, 0);
        assert!(!limiter.check_at(&id, now).allowed);
    }

    #[test]
    fn test_window_boundary_resets_counter() {
        let limiter = limiter(2, 600);
        let id = identity("a");
        let now = Instant::now();

        limiter.check_at(&id, now);
        limiter.check_at(&id, now);
        assert!(!limiter.check_at(&id, now).allowed);

        // First request of the next window is allowed again.
        let later = now + Duration::from_secs(601);
        let decision = limiter.check_at(&id, later);
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 1);
    }

    #[test]
    fn test_identities_are_independent() {
        let limiter = limiter(1, 600);
        let now = Instant::now();

        assert!(limiter.check_at(&identity("a"), now).allowed);
        assert!(limiter.check_at(&identity("b"), now).allowed);
        assert!(!limiter.check_at(&identity("a"), now).allowed);
    }

    #[test]
    fn test_retry_after_tracks_window() {
        let limiter = limiter(1, 600);
        let id = identity("a");
        let now = Instant::now();

        limiter.check_at(&id, now);
        let denied = limiter.check_at(&id, now + Duration::from_secs(100));
        assert!(!denied.allowed);
        assert_eq!(denied.retry_after, Duration::from_secs(500));
    }

    #[test]
    fn test_purge_drops_elapsed_windows_only() {
        let limiter = limiter(5, 600);
        let now = Instant::now();

        limiter.check_at(&identity("old"), now);
        limiter.check_at(&identity("fresh"), now + Duration::from_secs(500));
        assert_eq!(limiter.record_count(), 2);

        let purged = limiter.purge_stale_at(now + Duration::from_secs(601));
        assert_eq!(purged, 1);
        assert_eq!(limiter.record_count(), 1);
    }

    #[test]
    fn test_stale_record_does_not_block() {
        let limiter = limiter(1, 600);
        let id = identity("a");
        let now = Instant::now();

        limiter.check_at(&id, now);
        // No purge has run, but the elapsed window reads as fresh.
        assert!(limiter.check_at(&id, now + Duration::from_secs(1000)).allowed);
    }
}
