//! Strict domain normalization for job and report keys.
//!
//! This is the validating normalizer used everywhere a domain becomes a key:
//! job creation, report rows, opt-out lookups. The cooldown limiter carries
//! its own looser extraction (`admission::cooldown::cooldown_key`) which must
//! stay distinct, since a cooldown key only needs to group requests stably.

use thiserror::Error;
use url::Url;

/// Validation failures produced by [`normalize`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    #[error("domain is empty")]
    Empty,

    #[error("domain contains whitespace")]
    Whitespace,

    #[error("domain has no dot")]
    MissingDot,

    #[error("domain could not be parsed: {0}")]
    Unparseable(String),
}

/// Normalize raw user input into a canonical domain string.
///
/// Accepts a bare host, a host with path, or a full URL. The result is a
/// lowercase host with any scheme, path, port, trailing dots, and leading
/// `www.` removed. Fails on empty input, embedded whitespace, or a host
/// without a dot.
pub fn normalize(raw: &str) -> Result<String, DomainError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(DomainError::Empty);
    }
    if trimmed.chars().any(char::is_whitespace) {
        return Err(DomainError::Whitespace);
    }

    let host = parse_host(trimmed)?.to_ascii_lowercase();
    let host = host.trim_end_matches('.').trim_start_matches("www.");

    if host.is_empty() {
        return Err(DomainError::Empty);
    }
    if !host.contains('.') {
        return Err(DomainError::MissingDot);
    }

    Ok(host.to_string())
}

/// Build the fully-qualified URL the scanner will fetch for a domain.
pub fn scan_url(domain: &str) -> String {
    format!("https://{}", domain)
}

fn parse_host(input: &str) -> Result<String, DomainError> {
    // Inputs without a scheme parse as relative URLs, so supply one.
    let candidate = if input.contains("://") {
        input.to_string()
    } else {
        format!("https://{}", input)
    };

    let url = Url::parse(&candidate).map_err(|e| DomainError::Unparseable(e.to_string()))?;
    url.host_str()
        .map(|h| h.to_string())
        .ok_or_else(|| DomainError::Unparseable("no host".to_string()))
}
