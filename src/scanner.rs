//! Scanner capability trait.
//!
//! The scan engine that crawls a page and detects accessibility violations
//! lives outside this crate; the service only orchestrates its invocation.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Result of one page audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanOutput {
    /// Aggregate accessibility score for the page.
    pub score: u32,
    /// Raw issue payload as produced by the audit engine.
    pub issues: serde_json::Value,
    /// Wall-clock duration of each scan phase, in milliseconds.
    pub timings: HashMap<String, u64>,
}

/// Trait for scan engine implementations.
#[async_trait]
pub trait Scanner: Send + Sync {
    /// Audit the page at `scan_url`.
    async fn run(&self, scan_url: &str) -> Result<ScanOutput>;
}
