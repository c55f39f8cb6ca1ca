//! Report store capability trait.
//!
//! Durable report storage and visibility toggling are owned elsewhere; the
//! service only creates report rows for completed scans and consults the
//! opt-out list at admission time.

use async_trait::async_trait;

use crate::error::Result;
use crate::scanner::ScanOutput;

/// A durably stored report row.
#[derive(Debug, Clone)]
pub struct StoredReport {
    /// Identifier of the new report.
    pub report_id: String,
    /// Token granting access to the private report view.
    pub private_token: String,
}

/// Trait for report store implementations.
#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Persist a completed scan as a report row. New reports start private;
    /// publication goes through `set_report_visibility`.
    async fn create_report(&self, domain: &str, output: &ScanOutput) -> Result<StoredReport>;

    /// Toggle a report's public visibility.
    async fn set_report_visibility(&self, report_id: &str, public: bool) -> Result<()>;

    /// Whether the domain's owner has opted out of public reports.
    async fn is_domain_opted_out(&self, domain: &str) -> Result<bool>;
}
