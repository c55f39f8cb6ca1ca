//! Scan job model.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque job identifier, used by callers as the polling key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(Uuid);

impl JobId {
    /// Mint a fresh, globally unique id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle status of a scan job.
///
/// `Pending` is the only initial state; `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    /// Whether no further transition can occur from this status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Whether the state machine permits moving to `next`.
    ///
    /// Terminal states are never left, and `Running` is never skipped.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Running)
                | (JobStatus::Running, JobStatus::Completed)
                | (JobStatus::Running, JobStatus::Failed)
        )
    }
}

/// Result fields attached to a job when its scan completes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletedReport {
    /// Identifier of the durably stored report.
    pub report_id: String,
    /// Token granting access to the private report view.
    pub private_token: String,
    /// URL of the public report view.
    pub public_url: String,
    /// URL of the private report view.
    pub private_url: String,
    /// Wall-clock duration of each scan phase, in milliseconds.
    pub timings: HashMap<String, u64>,
}

/// One admitted scan attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanJob {
    pub id: JobId,
    /// Normalized target domain.
    pub domain: String,
    /// Fully-qualified URL the scanner fetches.
    pub scan_url: String,
    /// Caller's request to publish the resulting report.
    pub make_public: bool,
    pub status: JobStatus,
    /// Immutable; the basis for TTL eviction.
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Populated only when `status == Completed`.
    pub report: Option<CompletedReport>,
    /// Populated only when `status == Failed`. Truncated for safety.
    pub error: Option<String>,
}

impl ScanJob {
    /// Create a fresh pending job.
    pub fn new(domain: impl Into<String>, scan_url: impl Into<String>, make_public: bool) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            domain: domain.into(),
            scan_url: scan_url.into(),
            make_public,
            status: JobStatus::Pending,
            created_at: now,
            updated_at: now,
            report: None,
            error: None,
        }
    }
}

/// Partial update applied through `JobRegistry::update`.
///
/// Only the fields present are applied; `updated_at` is always refreshed.
#[derive(Debug, Clone, Default)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub report: Option<CompletedReport>,
    pub error: Option<String>,
}

impl JobUpdate {
    /// Update that moves the job to `Running`.
    pub fn running() -> Self {
        Self {
            status: Some(JobStatus::Running),
            ..Default::default()
        }
    }

    /// Update that completes the job with its report fields.
    pub fn completed(report: CompletedReport) -> Self {
        Self {
            status: Some(JobStatus::Completed),
            report: Some(report),
            ..Default::default()
        }
    }

    /// Update that fails the job with an error cause.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: Some(JobStatus::Failed),
            error: Some(error.into()),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_job_is_pending() {
        let job = ScanJob::new("example.com", "https://example.com", false);
        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.report.is_none());
        assert!(job.error.is_none());
        assert_eq!(job.created_at, job.updated_at);
    }

    #[test]
    fn test_job_ids_are_unique() {
        let a = ScanJob::new("example.com", "https://example.com", false);
        let b = ScanJob::new("example.com", "https://example.com", false);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_terminal_states() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }

    #[test]
    fn test_legal_transitions() {
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Running));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Completed));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Failed));
    }

    #[test]
    fn test_illegal_transitions() {
        // Running is never skipped.
        assert!(!JobStatus::Pending.can_transition_to(JobStatus::Completed));
        assert!(!JobStatus::Pending.can_transition_to(JobStatus::Failed));
        // Terminal states are never left.
        assert!(!JobStatus::Completed.can_transition_to(JobStatus::Running));
        assert!(!JobStatus::Failed.can_transition_to(JobStatus::Pending));
        assert!(!JobStatus::Completed.can_transition_to(JobStatus::Failed));
    }
}
