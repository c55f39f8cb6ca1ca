//! Structured audit emission for admission decisions and scan outcomes.
//!
//! The audit sink is a pure side channel: it has no feedback into admission
//! decisions and must never fail the caller's request.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::jobs::JobId;

/// Result tag attached to every scan event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanEventResult {
    Queued,
    Completed,
    Failed,
    RateLimited,
    Rejected,
}

impl ScanEventResult {
    fn as_str(&self) -> &'static str {
        match self {
            ScanEventResult::Queued => "queued",
            ScanEventResult::Completed => "completed",
            ScanEventResult::Failed => "failed",
            ScanEventResult::RateLimited => "rate_limited",
            ScanEventResult::Rejected => "rejected",
        }
    }
}

/// One audit record.
#[derive(Debug, Clone)]
pub struct ScanEvent {
    pub identity: String,
    pub domain: String,
    pub timestamp: DateTime<Utc>,
    pub result: ScanEventResult,
    pub job_id: Option<JobId>,
    pub is_admin: bool,
    pub duration: Option<Duration>,
    /// Truncated; never carries unbounded attacker-controlled input.
    pub error: Option<String>,
}

impl ScanEvent {
    /// Build an event stamped with the current time.
    pub fn new(identity: impl Into<String>, domain: impl Into<String>, result: ScanEventResult) -> Self {
        Self {
            identity: identity.into(),
            domain: domain.into(),
            timestamp: Utc::now(),
            result,
            job_id: None,
            is_admin: false,
            duration: None,
            error: None,
        }
    }

    pub fn with_job_id(mut self, job_id: JobId) -> Self {
        self.job_id = Some(job_id);
        self
    }

    pub fn with_admin(mut self, is_admin: bool) -> Self {
        self.is_admin = is_admin;
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    /// Attach an error cause, truncated to `max_len` characters.
    pub fn with_error(mut self, error: &str, max_len: usize) -> Self {
        self.error = Some(truncate_error(error, max_len));
        self
    }
}

/// Truncate an error string on a character boundary.
pub fn truncate_error(error: &str, max_len: usize) -> String {
    if error.chars().count() <= max_len {
        error.to_string()
    } else {
        error.chars().take(max_len).collect()
    }
}

/// Sink for scan events.
///
/// Implementations must be infallible from the caller's point of view; a sink
/// that can fail internally has to swallow the failure.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: ScanEvent);
}

/// Audit sink that emits events through `tracing`.
#[derive(Debug, Default)]
pub struct TracingAudit;

impl AuditSink for TracingAudit {
    fn record(&self, event: ScanEvent) {
        info!(
            target: "scangate::audit",
            identity = %event.identity,
            domain = %event.domain,
            timestamp = %event.timestamp.to_rfc3339(),
            result = event.result.as_str(),
            job_id = ?event.job_id,
            is_admin = event.is_admin,
            duration_ms = event.duration.map(|d| d.as_millis() as u64),
            error = event.error.as_deref(),
            "scan event"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_error_short_input_unchanged() {
        assert_eq!(truncate_error("boom", 500), "boom");
    }

    #[test]
    fn test_truncate_error_bounds_long_input() {
        let long = "x".repeat(1000);
        assert_eq!(truncate_error(&long, 500).len(), 500);
    }

    #[test]
    fn test_truncate_error_respects_char_boundaries() {
        let input = "ééééé";
        assert_eq!(truncate_error(input, 3), "ééé");
    }

    #[test]
    fn test_tracing_sink_accepts_events() {
        let sink = TracingAudit;
        sink.record(ScanEvent::new("203.0.113.7", "example.com", ScanEventResult::Queued));
        sink.record(
            ScanEvent::new("203.0.113.7", "example.com", ScanEventResult::Failed)
                .with_error("boom", 500),
        );
    }

    #[test]
    fn test_event_builder() {
        let event = ScanEvent::new("203.0.113.7", "example.com", ScanEventResult::Failed)
            .with_admin(true)
            .with_duration(Duration::from_secs(3))
            .with_error(&"e".repeat(600), 500);

        assert!(event.is_admin);
        assert_eq!(event.duration, Some(Duration::from_secs(3)));
        assert_eq!(event.error.unwrap().len(), 500);
        assert_eq!(event.result, ScanEventResult::Failed);
    }
}
