//! Per-domain scan cooldown.
//!
//! Enforces a minimum interval between scans of the same domain regardless of
//! which caller asks. Keys are derived with a deliberately loose extraction:
//! unlike the strict normalizer in `crate::domain`, a malformed input is used
//! as-is rather than rejected, since the limiter only needs a stable grouping
//! key.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::debug;
use url::Url;

use crate::config::CooldownConfig;

/// Outcome of a cooldown check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CooldownDecision {
    /// Whether a new scan of the domain may start.
    pub allowed: bool,
    /// Time until the cooldown elapses, when denied.
    pub retry_after: Option<Duration>,
}

/// Per-domain cooldown limiter.
pub struct DomainCooldown {
    config: CooldownConfig,
    last_scans: DashMap<String, Instant>,
}

impl DomainCooldown {
    /// Create a new cooldown limiter.
    pub fn new(config: CooldownConfig) -> Self {
        Self {
            config,
            last_scans: DashMap::new(),
        }
    }

    /// Check whether the domain may be scanned now.
    pub fn can_scan(&self, domain: &str) -> CooldownDecision {
        self.can_scan_at(domain, Instant::now())
    }

    fn can_scan_at(&self, domain: &str, now: Instant) -> CooldownDecision {
        let key = cooldown_key(domain);
        let cooldown = self.config.cooldown();

        match self.last_scans.get(&key) {
            None => CooldownDecision {
                allowed: true,
                retry_after: None,
            },
            Some(last) => {
                let elapsed = now.saturating_duration_since(*last);
                if elapsed >= cooldown {
                    CooldownDecision {
                        allowed: true,
                        retry_after: None,
                    }
                } else {
                    debug!(domain = %key, "Domain is cooling down");
                    CooldownDecision {
                        allowed: false,
                        retry_after: Some(cooldown - elapsed),
                    }
                }
            }
        }
    }

    /// Record that a scan of the domain was admitted now.
    ///
    /// Call this only on successful admission, never on a mere check.
    pub fn record_scan(&self, domain: &str) {
        self.record_scan_at(domain, Instant::now());
    }

    fn record_scan_at(&self, domain: &str, now: Instant) {
        self.last_scans.insert(cooldown_key(domain), now);
    }

    /// Remove records old enough that they can no longer influence a check.
    pub fn purge_stale(&self) -> usize {
        self.purge_stale_at(Instant::now())
    }

    fn purge_stale_at(&self, now: Instant) -> usize {
        let horizon = self.config.cooldown() * 2;
        let before = self.last_scans.len();
        self.last_scans
            .retain(|_, last| now.saturating_duration_since(*last) < horizon);
        before - self.last_scans.len()
    }

    /// Number of domains currently tracked.
    pub fn record_count(&self) -> usize {
        self.last_scans.len()
    }
}

/// Derive the cooldown grouping key for arbitrary input.
///
/// Parses as a URL (with an assumed scheme when absent) and takes the host;
/// on parse failure the raw string is used as the host. Either way the
/// leading `www.` is stripped and the result lowercased.
pub fn cooldown_key(raw: &str) -> String {
    let trimmed = raw.trim();
    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };

    let host = match Url::parse(&candidate) {
        Ok(url) => url.host_str().map(|h| h.to_string()),
        Err(_) => None,
    };

    let host = host.unwrap_or_else(|| trimmed.to_string()).to_ascii_lowercase();
    host.trim_start_matches("www.").to_string()
}

/// Render a millisecond-precision duration for cooldown messages.
///
/// Produces "N hour(s) and M minute(s)" above an hour, "M minute(s)" below,
/// with sub-minute remainders rounded up.
pub fn format_remaining_time(remaining: Duration) -> String {
    let ms = remaining.as_millis();
    let hours = ms / 3_600_000;
    let minutes = (ms % 3_600_000).div_ceil(60_000);

    let plural = |n: u128| if n == 1 { "" } else { "s" };

    if hours > 0 {
        if minutes > 0 {
            format!(
                "{} hour{} and {} minute{}",
                hours,
                plural(hours),
                minutes,
                plural(minutes)
            )
        } else {
            format!("{} hour{}", hours, plural(hours))
        }
    } else {
        let minutes = minutes.max(1);
        format!("{} minute{}", minutes, plural(minutes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cooldown(secs: u64) -> DomainCooldown {
        DomainCooldown::new(CooldownConfig {
            cooldown_secs: secs,
        })
    }

    #[test]
    fn test_first_scan_allowed() {
        let limiter = cooldown(86_400);
        assert!(limiter.can_scan("example.com").allowed);
    }

    #[test]
    fn test_recorded_scan_blocks_until_cooldown() {
        let limiter = cooldown(86_400);
        let now = Instant::now();

        limiter.record_scan_at("example.com", now);

        let decision = limiter.can_scan_at("example.com", now);
        assert!(!decision.allowed);
        assert_eq!(decision.retry_after, Some(Duration::from_secs(86_400)));

        let later = now + Duration::from_secs(86_400);
        assert!(limiter.can_scan_at("example.com", later).allowed);
    }

    #[test]
    fn test_retry_after_shrinks_with_elapsed() {
        let limiter = cooldown(3600);
        let now = Instant::now();

        limiter.record_scan_at("example.com", now);
        let decision = limiter.can_scan_at("example.com", now + Duration::from_secs(600));
        assert_eq!(decision.retry_after, Some(Duration::from_secs(3000)));
    }

    #[test]
    fn test_record_overwrites() {
        let limiter = cooldown(3600);
        let now = Instant::now();

        limiter.record_scan_at("example.com", now);
        limiter.record_scan_at("example.com", now + Duration::from_secs(3600));
        assert_eq!(limiter.record_count(), 1);

        // The second record restarts the clock.
        let decision = limiter.can_scan_at("example.com", now + Duration::from_secs(3601));
        assert!(!decision.allowed);
    }

    #[test]
    fn test_domains_are_independent() {
        let limiter = cooldown(3600);
        let now = Instant::now();

        limiter.record_scan_at("a.com", now);
        assert!(limiter.can_scan_at("b.com", now).allowed);
    }

    #[test]
    fn test_url_and_bare_host_share_a_key() {
        let limiter = cooldown(3600);
        let now = Instant::now();

        limiter.record_scan_at("https://www.example.com/pricing", now);
        assert!(!limiter.can_scan_at("example.com", now).allowed);
    }

    #[test]
    fn test_purge_keeps_records_within_horizon() {
        let limiter = cooldown(3600);
        let now = Instant::now();

        limiter.record_scan_at("old.com", now);
        limiter.record_scan_at("fresh.com", now + Duration::from_secs(7000));

        let purged = limiter.purge_stale_at(now + Duration::from_secs(7201));
        assert_eq!(purged, 1);
        assert_eq!(limiter.record_count(), 1);
        // A record inside 2x cooldown survives even though its cooldown elapsed.
        assert!(limiter
            .can_scan_at("fresh.com", now + Duration::from_secs(11_000))
            .allowed);
    }

    #[test]
    fn test_cooldown_key_parses_urls() {
        assert_eq!(cooldown_key("https://www.Example.com/a?b=c"), "example.com");
        assert_eq!(cooldown_key("example.com/path"), "example.com");
    }

    #[test]
    fn test_cooldown_key_falls_back_to_raw() {
        // Not parseable as a URL even with a scheme prepended.
        assert_eq!(cooldown_key("not a url"), "not a url");
        assert_eq!(cooldown_key("www.not a url"), "not a url");
    }

    #[test]
    fn test_cooldown_key_idempotent() {
        let once = cooldown_key("https://www.Example.com/path");
        assert_eq!(cooldown_key(&once), once);
    }

    #[test]
    fn test_format_remaining_time() {
        assert_eq!(
            format_remaining_time(Duration::from_millis(90 * 60 * 1000)),
            "1 hour and 30 minutes"
        );
        assert_eq!(
            format_remaining_time(Duration::from_millis(5 * 60 * 1000)),
            "5 minutes"
        );
        assert_eq!(
            format_remaining_time(Duration::from_secs(2 * 3600)),
            "2 hours"
        );
        assert_eq!(
            format_remaining_time(Duration::from_secs(3661)),
            "1 hour and 2 minutes"
        );
        assert_eq!(format_remaining_time(Duration::from_secs(30)), "1 minute");
    }
}
