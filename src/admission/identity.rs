//! Caller identity extraction from request metadata.

use std::fmt;
use std::net::IpAddr;

/// An opaque caller identity used as the rate-limiting key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallerIdentity(String);

impl CallerIdentity {
    /// Wrap an already-derived identity string.
    pub fn new(identity: impl Into<String>) -> Self {
        Self(identity.into())
    }

    /// The identity as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CallerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Request metadata the transport layer hands over for identity derivation.
///
/// The fields mirror the usual proxy headers; the glue layer copies header
/// values in verbatim without parsing them.
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    /// Value of the `x-forwarded-for` header, if present.
    pub forwarded_for: Option<String>,
    /// Value of the `x-real-ip` header, if present.
    pub real_ip: Option<String>,
    /// The peer address of the connection, if known.
    pub remote_addr: Option<IpAddr>,
}

impl RequestMeta {
    /// Derive the caller identity.
    ///
    /// Precedence: first hop of `x-forwarded-for`, then `x-real-ip`, then the
    /// socket address. Falls back to `"unknown"` so a caller with no usable
    /// metadata still rate-limits as a single shared bucket.
    pub fn caller_identity(&self) -> CallerIdentity {
        if let Some(forwarded) = &self.forwarded_for {
            if let Some(first) = forwarded.split(',').next() {
                let first = first.trim();
                if !first.is_empty() {
                    return CallerIdentity::new(first);
                }
            }
        }

        if let Some(real_ip) = &self.real_ip {
            let real_ip = real_ip.trim();
            if !real_ip.is_empty() {
                return CallerIdentity::new(real_ip);
            }
        }

        if let Some(addr) = self.remote_addr {
            return CallerIdentity::new(addr.to_string());
        }

        CallerIdentity::new("unknown")
    }
}
