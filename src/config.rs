//! Configuration management for Scangate.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration for the Scangate service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScangateConfig {
    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Domain cooldown configuration
    #[serde(default)]
    pub cooldown: CooldownConfig,

    /// Job registry configuration
    #[serde(default)]
    pub jobs: JobConfig,

    /// Scan execution configuration
    #[serde(default)]
    pub scan: ScanConfig,

    /// Audit logging configuration
    #[serde(default)]
    pub audit: AuditConfig,
}

/// Per-identity rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Maximum requests allowed per identity within a window
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,

    /// Window duration in seconds
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_secs: default_window_secs(),
        }
    }
}

impl RateLimitConfig {
    /// The window duration as a `Duration`.
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

fn default_max_requests() -> u32 {
    20
}

fn default_window_secs() -> u64 {
    600
}

/// Per-domain cooldown configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CooldownConfig {
    /// Minimum interval between scans of the same domain, in seconds
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
}

impl Default for CooldownConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: default_cooldown_secs(),
        }
    }
}

impl CooldownConfig {
    /// The cooldown interval as a `Duration`.
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

fn default_cooldown_secs() -> u64 {
    86_400
}

/// Job registry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    /// Job time-to-live in seconds, measured from creation regardless of status
    #[serde(default = "default_job_ttl_secs")]
    pub ttl_secs: u64,

    /// Minimum interval between lazy cleanup passes, in seconds
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_job_ttl_secs(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
        }
    }
}

impl JobConfig {
    /// The job TTL as a `Duration`.
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    /// The cleanup throttle interval as a `Duration`.
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

fn default_job_ttl_secs() -> u64 {
    900
}

fn default_cleanup_interval_secs() -> u64 {
    120
}

/// Scan execution configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Upper bound on a single scan's duration, in seconds
    #[serde(default = "default_scan_timeout_secs")]
    pub timeout_secs: u64,

    /// Base URL for rendering report links on completed jobs
    #[serde(default = "default_report_base_url")]
    pub report_base_url: String,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_scan_timeout_secs(),
            report_base_url: default_report_base_url(),
        }
    }
}

impl ScanConfig {
    /// The scan timeout as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_scan_timeout_secs() -> u64 {
    300
}

fn default_report_base_url() -> String {
    "/report".to_string()
}

/// Audit logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Maximum length of error strings recorded in audit events and jobs
    #[serde(default = "default_max_error_len")]
    pub max_error_len: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            max_error_len: default_max_error_len(),
        }
    }
}

fn default_max_error_len() -> usize {
    500
}

impl ScangateConfig {
    /// Load configuration from a file path.
    pub fn from_file(path: &str) -> crate::error::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: ScangateConfig = serde_yaml::from_str(&contents)
            .map_err(|e| crate::error::ScangateError::Config(e.to_string()))?;
        Ok(config)
    }
}
