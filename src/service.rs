//! Scan admission orchestration.
//!
//! `ScanService` composes the identity-keyed rate limiter, the per-domain
//! cooldown, the job registry, and the audit sink into the single entrypoint
//! the transport glue calls: `admit_scan` to start a scan, `poll_job` to read
//! its progress.

use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::admission::cooldown::{format_remaining_time, DomainCooldown};
use crate::admission::identity::CallerIdentity;
use crate::admission::rate::RateLimiter;
use crate::audit::{truncate_error, AuditSink, ScanEvent, ScanEventResult};
use crate::config::ScangateConfig;
use crate::domain::{self, DomainError};
use crate::error::Result;
use crate::jobs::{CompletedReport, JobAdmission, JobId, JobRegistry, JobUpdate, ScanJob};
use crate::scanner::Scanner;
use crate::store::ReportStore;

/// Why an admission was refused.
///
/// Rejections are a typed outcome, not an error: each variant carries enough
/// structured detail for the caller to render a helpful message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("invalid domain: {0}")]
    InvalidDomain(#[from] DomainError),

    #[error("too many requests; try again in {}", format_remaining_time(*retry_after))]
    RateLimited { remaining: u32, retry_after: Duration },

    #[error("{domain} was scanned recently; try again in {}", format_remaining_time(*retry_after))]
    DomainCooldown { domain: String, retry_after: Duration },

    #[error("{domain} has opted out of public reports")]
    OptedOut { domain: String },
}

/// Outcome of an admission attempt.
#[derive(Debug, Clone)]
pub enum Admission {
    /// A fresh job was created and the scan handed off.
    Queued { job_id: JobId },
    /// A scan of this domain is already in flight; poll the existing job.
    AlreadyInFlight { job_id: JobId },
    /// The request was refused before any job was created.
    Rejected(Rejection),
}

impl Admission {
    /// The job id to poll, when one exists.
    pub fn job_id(&self) -> Option<JobId> {
        match self {
            Admission::Queued { job_id } | Admission::AlreadyInFlight { job_id } => Some(*job_id),
            Admission::Rejected(_) => None,
        }
    }
}

/// Handle for the background maintenance task.
///
/// Dropping the handle also stops the task; `shutdown` additionally waits
/// for it to finish.
pub struct MaintenanceHandle {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl MaintenanceHandle {
    /// Signal the task to stop and wait for it to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(());
        let _ = self.task.await;
    }
}

/// Counts from one maintenance pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub expired_jobs: usize,
    pub stale_rate_records: usize,
    pub stale_cooldown_records: usize,
}

/// The scan admission and lifecycle service.
pub struct ScanService<S, R> {
    config: ScangateConfig,
    rate_limiter: Arc<RateLimiter>,
    cooldown: Arc<DomainCooldown>,
    registry: Arc<JobRegistry>,
    audit: Arc<dyn AuditSink>,
    scanner: Arc<S>,
    store: Arc<R>,
}

impl<S, R> ScanService<S, R>
where
    S: Scanner + 'static,
    R: ReportStore + 'static,
{
    /// Create a new service with explicitly injected configuration and
    /// collaborators. Independent instances share no state.
    pub fn new(
        config: ScangateConfig,
        scanner: Arc<S>,
        store: Arc<R>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit.clone()));
        let cooldown = Arc::new(DomainCooldown::new(config.cooldown.clone()));
        let registry = Arc::new(JobRegistry::new(config.jobs.clone()));
        Self {
            config,
            rate_limiter,
            cooldown,
            registry,
            audit,
            scanner,
            store,
        }
    }

    /// Decide whether a scan may start, and start it if so.
    ///
    /// The decision chain: strict domain validation, per-identity rate limit
    /// (admins bypass), per-domain cooldown (admins bypass), opt-out policy
    /// for public reports, then duplicate-in-flight dedup. A fresh admission
    /// records the domain cooldown immediately and hands the scan to the
    /// scanner as a detached task; the call never waits for the scan.
    pub async fn admit_scan(
        &self,
        identity: &CallerIdentity,
        raw_domain: &str,
        make_public: bool,
        is_admin: bool,
    ) -> Result<Admission> {
        let domain = match domain::normalize(raw_domain) {
            Ok(domain) => domain,
            Err(e) => {
                self.audit.record(
                    ScanEvent::new(identity.as_str(), raw_domain.trim(), ScanEventResult::Rejected)
                        .with_admin(is_admin)
                        .with_error(&e.to_string(), self.config.audit.max_error_len),
                );
                return Ok(Admission::Rejected(Rejection::InvalidDomain(e)));
            }
        };

        if !is_admin {
            let decision = self.rate_limiter.check(identity);
            if !decision.allowed {
                info!(identity = %identity, domain = %domain, "Rate limit exceeded");
                self.audit.record(
                    ScanEvent::new(identity.as_str(), &domain, ScanEventResult::RateLimited),
                );
                return Ok(Admission::Rejected(Rejection::RateLimited {
                    remaining: decision.remaining,
                    retry_after: decision.retry_after,
                }));
            }

            let decision = self.cooldown.can_scan(&domain);
            if !decision.allowed {
                let retry_after = decision.retry_after.unwrap_or_default();
                info!(
                    identity = %identity,
                    domain = %domain,
                    retry_after = %format_remaining_time(retry_after),
                    "Domain is cooling down"
                );
                self.audit.record(
                    ScanEvent::new(identity.as_str(), &domain, ScanEventResult::Rejected)
                        .with_error("domain_cooldown", self.config.audit.max_error_len),
                );
                return Ok(Admission::Rejected(Rejection::DomainCooldown {
                    domain,
                    retry_after,
                }));
            }
        }

        if make_public && self.store.is_domain_opted_out(&domain).await? {
            info!(identity = %identity, domain = %domain, "Domain has opted out of public reports");
            self.audit.record(
                ScanEvent::new(identity.as_str(), &domain, ScanEventResult::Rejected)
                    .with_admin(is_admin)
                    .with_error("opted_out", self.config.audit.max_error_len),
            );
            return Ok(Admission::Rejected(Rejection::OptedOut { domain }));
        }

        let scan_url = domain::scan_url(&domain);
        let job = match self.registry.create(&domain, &scan_url, make_public) {
            JobAdmission::AlreadyActive(job) => {
                // Idempotent admission: neither a fresh queue nor a refusal.
                // The job id marks this apart from every other rejected event.
                self.audit.record(
                    ScanEvent::new(identity.as_str(), &domain, ScanEventResult::Rejected)
                        .with_job_id(job.id)
                        .with_admin(is_admin)
                        .with_error("duplicate_in_flight", self.config.audit.max_error_len),
                );
                return Ok(Admission::AlreadyInFlight { job_id: job.id });
            }
            JobAdmission::Created(job) => job,
        };

        // Recorded at admission so a near-simultaneous request for the same
        // domain is blocked even while this scan is still running.
        self.cooldown.record_scan(&domain);

        self.audit.record(
            ScanEvent::new(identity.as_str(), &domain, ScanEventResult::Queued)
                .with_job_id(job.id)
                .with_admin(is_admin),
        );
        info!(identity = %identity, domain = %domain, job_id = %job.id, "Scan queued");

        self.spawn_scan(identity.clone(), job.clone());

        Ok(Admission::Queued { job_id: job.id })
    }

    /// Read a job's current state. Expired and unknown ids both read as `None`.
    pub fn poll_job(&self, job_id: JobId) -> Option<ScanJob> {
        self.registry.get(job_id)
    }

    /// Run one synchronous maintenance pass over all backing maps.
    pub fn run_maintenance_once(&self) -> MaintenanceReport {
        let report = MaintenanceReport {
            expired_jobs: self.registry.purge_expired(),
            stale_rate_records: self.rate_limiter.purge_stale(),
            stale_cooldown_records: self.cooldown.purge_stale(),
        };
        debug!(
            expired_jobs = report.expired_jobs,
            stale_rate_records = report.stale_rate_records,
            stale_cooldown_records = report.stale_cooldown_records,
            "Maintenance pass complete"
        );
        report
    }

    /// Start the background maintenance task.
    ///
    /// Runs a pass every cleanup interval until the returned handle is shut
    /// down. The lazy cleanup on the request path remains active either way.
    pub fn start_maintenance(&self) -> MaintenanceHandle {
        let registry = Arc::clone(&self.registry);
        let rate_limiter = Arc::clone(&self.rate_limiter);
        let cooldown = Arc::clone(&self.cooldown);
        let period = self.config.jobs.cleanup_interval();

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick fires immediately; skip it.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => {
                        debug!("Maintenance task shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        registry.purge_expired();
                        rate_limiter.purge_stale();
                        cooldown.purge_stale();
                    }
                }
            }
        });

        MaintenanceHandle {
            shutdown: shutdown_tx,
            task,
        }
    }

    /// Hand a freshly created job to the scanner as a detached task.
    fn spawn_scan(&self, identity: CallerIdentity, job: ScanJob) {
        let registry = Arc::clone(&self.registry);
        let scanner = Arc::clone(&self.scanner);
        let store = Arc::clone(&self.store);
        let audit = Arc::clone(&self.audit);
        let timeout = self.config.scan.timeout();
        let report_base_url = self.config.scan.report_base_url.clone();
        let max_error_len = self.config.audit.max_error_len;

        tokio::spawn(async move {
            let started = Instant::now();
            registry.update(job.id, JobUpdate::running());

            let outcome = match tokio::time::timeout(timeout, scanner.run(&job.scan_url)).await {
                Ok(Ok(output)) => {
                    finish_scan(
                        &registry,
                        store.as_ref(),
                        &job,
                        &output,
                        &report_base_url,
                        max_error_len,
                    )
                    .await
                }
                Ok(Err(e)) => Err(e.to_string()),
                Err(_) => Err(format!("scan timed out after {}s", timeout.as_secs())),
            };

            let duration = started.elapsed();
            match outcome {
                Ok(()) => {
                    info!(job_id = %job.id, domain = %job.domain, duration_ms = duration.as_millis() as u64, "Scan completed");
                    audit.record(
                        ScanEvent::new(identity.as_str(), &job.domain, ScanEventResult::Completed)
                            .with_job_id(job.id)
                            .with_duration(duration),
                    );
                }
                Err(cause) => {
                    warn!(job_id = %job.id, domain = %job.domain, error = %cause, "Scan failed");
                    registry.update(
                        job.id,
                        JobUpdate::failed(truncate_error(&cause, max_error_len)),
                    );
                    audit.record(
                        ScanEvent::new(identity.as_str(), &job.domain, ScanEventResult::Failed)
                            .with_job_id(job.id)
                            .with_duration(duration)
                            .with_error(&cause, max_error_len),
                    );
                }
            }
        });
    }
}

/// Persist a successful scan and mark the job completed.
async fn finish_scan<R: ReportStore>(
    registry: &JobRegistry,
    store: &R,
    job: &ScanJob,
    output: &crate::scanner::ScanOutput,
    report_base_url: &str,
    max_error_len: usize,
) -> std::result::Result<(), String> {
    let stored = store
        .create_report(&job.domain, output)
        .await
        .map_err(|e| e.to_string())?;

    if job.make_public {
        // The report row already exists; a failed toggle leaves it private
        // rather than failing the whole scan.
        if let Err(e) = store.set_report_visibility(&stored.report_id, true).await {
            warn!(
                job_id = %job.id,
                report_id = %stored.report_id,
                error = %truncate_error(&e.to_string(), max_error_len),
                "Failed to publish report; leaving it private"
            );
        }
    }

    let report = CompletedReport {
        public_url: format!("{}/{}", report_base_url, stored.report_id),
        private_url: format!(
            "{}/{}?token={}",
            report_base_url, stored.report_id, stored.private_token
        ),
        report_id: stored.report_id,
        private_token: stored.private_token,
        timings: output.timings.clone(),
    };
    registry.update(job.id, JobUpdate::completed(report));
    Ok(())
}
