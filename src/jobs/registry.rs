//! In-memory scan job registry.
//!
//! The registry exclusively owns all live `ScanJob` instances. Jobs are
//! evicted once their age exceeds the configured TTL regardless of status, so
//! a hung scan simply disappears from the registry; pollers treat "not found"
//! as expired-or-never-existed.

use std::collections::HashMap;
use std::time::Instant;

use chrono::Utc;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::config::JobConfig;

use super::job::{JobId, JobUpdate, ScanJob};

/// Outcome of an admission attempt against the registry.
#[derive(Debug, Clone)]
pub enum JobAdmission {
    /// A fresh job was created.
    Created(ScanJob),
    /// An in-flight job for the same domain already exists.
    AlreadyActive(ScanJob),
}

/// The scan job registry.
///
/// A single mutex guards the whole map: the dedup check and the insert that
/// follows it are a compound operation, so per-entry locking would leave a
/// window where two requests for the same domain both observe "no active job".
pub struct JobRegistry {
    config: JobConfig,
    jobs: Mutex<HashMap<JobId, ScanJob>>,
    last_cleanup: Mutex<Instant>,
}

impl JobRegistry {
    /// Create a new registry.
    pub fn new(config: JobConfig) -> Self {
        Self {
            config,
            jobs: Mutex::new(HashMap::new()),
            last_cleanup: Mutex::new(Instant::now()),
        }
    }

    /// Create a job for the domain, unless one is already in flight.
    ///
    /// The dedup check and the insert happen under one critical section.
    pub fn create(
        &self,
        domain: &str,
        scan_url: &str,
        make_public: bool,
    ) -> JobAdmission {
        self.cleanup_if_due();

        let mut jobs = self.jobs.lock();

        // An expired-but-unpurged job must not block a fresh admission.
        if let Some(active) =
            Self::find_active(&jobs, domain).filter(|job| !self.is_expired(job))
        {
            debug!(domain = %domain, job_id = %active.id, "Joining in-flight job");
            return JobAdmission::AlreadyActive(active);
        }

        let job = ScanJob::new(domain, scan_url, make_public);
        debug!(domain = %domain, job_id = %job.id, "Created scan job");
        jobs.insert(job.id, job.clone());
        JobAdmission::Created(job)
    }

    /// Look up a job by id. Expired jobs read as absent.
    pub fn get(&self, id: JobId) -> Option<ScanJob> {
        self.cleanup_if_due();

        let jobs = self.jobs.lock();
        jobs.get(&id)
            .filter(|job| !self.is_expired(job))
            .cloned()
    }

    /// Apply a partial update to a job.
    ///
    /// Only the provided fields are applied and `updated_at` is always
    /// refreshed. An unknown id is a no-op returning `None`. A status change
    /// the state machine forbids is refused with a warning, leaving the job
    /// untouched.
    pub fn update(&self, id: JobId, update: JobUpdate) -> Option<ScanJob> {
        self.cleanup_if_due();

        let mut jobs = self.jobs.lock();
        let job = jobs.get_mut(&id)?;

        if let Some(next) = update.status {
            if !job.status.can_transition_to(next) {
                warn!(
                    job_id = %id,
                    from = ?job.status,
                    to = ?next,
                    "Refusing illegal job status transition"
                );
                return Some(job.clone());
            }
            job.status = next;
        }
        if let Some(report) = update.report {
            job.report = Some(report);
        }
        if let Some(error) = update.error {
            job.error = Some(error);
        }
        job.updated_at = Utc::now();

        Some(job.clone())
    }

    /// Find the first non-terminal job for a domain, if any.
    pub fn find_active_for_domain(&self, domain: &str) -> Option<ScanJob> {
        let jobs = self.jobs.lock();
        Self::find_active(&jobs, domain).filter(|job| !self.is_expired(job))
    }

    /// Evict every job older than the configured TTL. Returns the count evicted.
    pub fn purge_expired(&self) -> usize {
        let mut jobs = self.jobs.lock();
        let before = jobs.len();
        jobs.retain(|_, job| !self.is_expired(job));
        let evicted = before - jobs.len();
        if evicted > 0 {
            debug!(evicted = evicted, "Evicted expired scan jobs");
        }
        evicted
    }

    /// Number of jobs currently held, including expired ones not yet purged.
    pub fn job_count(&self) -> usize {
        self.jobs.lock().len()
    }

    fn find_active(jobs: &HashMap<JobId, ScanJob>, domain: &str) -> Option<ScanJob> {
        jobs.values()
            .find(|job| job.domain == domain && !job.status.is_terminal())
            .cloned()
    }

    fn is_expired(&self, job: &ScanJob) -> bool {
        let age = Utc::now().signed_duration_since(job.created_at);
        age.to_std()
            .map(|age| age >= self.config.ttl())
            .unwrap_or(false)
    }

    /// Run a cleanup pass if the throttle interval has elapsed.
    ///
    /// Invoked from the read/write paths so the registry stays bounded even
    /// without the background maintenance task.
    fn cleanup_if_due(&self) {
        let now = Instant::now();
        {
            let mut last = self.last_cleanup.lock();
            if now.duration_since(*last) < self.config.cleanup_interval() {
                return;
            }
            *last = now;
        }
        self.purge_expired();
    }

    #[cfg(test)]
    fn backdate(&self, id: JobId, by: chrono::Duration) {
        let mut jobs = self.jobs.lock();
        if let Some(job) = jobs.get_mut(&id) {
            job.created_at = job.created_at - by;
        }
    }
}
