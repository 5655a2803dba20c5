//! # Origin / Host Admission
//!
//! Pre-routing check of the `Origin` and `Host` headers against the
//! configured allowlists. Runs before authentication and before any
//! handler, so a rejected request never reaches business logic.
//!
//! - A missing `Origin` is allowed (non-browser clients do not send one).
//! - A present `Origin` must match an allowed origin exactly, ignoring a
//!   trailing slash.
//! - `Host` is required. The port is stripped and the name compared
//!   case-insensitively.

use std::collections::BTreeSet;

use crate::error::AdmissionError;
use crate::settings::Settings;

/// Allowlist-based request admission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmissionGuard {
    origins: BTreeSet<String>,
    hosts: BTreeSet<String>,
}

impl AdmissionGuard {
    pub fn new<O, H>(origins: O, hosts: H) -> Self
    where
        O: IntoIterator,
        O::Item: AsRef<str>,
        H: IntoIterator,
        H::Item: AsRef<str>,
    {
        Self {
            origins: origins
                .into_iter()
                .map(|o| normalize_origin(o.as_ref()))
                .collect(),
            hosts: hosts
                .into_iter()
                .map(|h| normalize_configured_host(h.as_ref()))
                .collect(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(&settings.cors_origins, &settings.allowed_hosts)
    }

    /// Configured origins, for building the CORS response layer.
    pub fn origins(&self) -> impl Iterator<Item = &str> {
        self.origins.iter().map(String::as_str)
    }

    pub fn origin_allowed(&self, origin: Option<&str>) -> bool {
        match origin {
            None => true,
            Some(o) => self.origins.contains(&normalize_origin(o)),
        }
    }

    pub fn host_allowed(&self, host: Option<&str>) -> bool {
        match host.and_then(host_name) {
            Some(name) => self.hosts.contains(&name),
            None => false,
        }
    }

    /// Decide admission. Origin is checked first, so a request failing both
    /// checks reports the origin rejection.
    pub fn check(&self, origin: Option<&str>, host: Option<&str>) -> Result<(), AdmissionError> {
        if !self.origin_allowed(origin) {
            return Err(AdmissionError::OriginNotAllowed);
        }
        if !self.host_allowed(host) {
            return Err(AdmissionError::HostNotAllowed);
        }
        Ok(())
    }

    pub fn is_allowed(&self, origin: Option<&str>, host: Option<&str>) -> bool {
        self.check(origin, host).is_ok()
    }
}

fn normalize_origin(origin: &str) -> String {
    origin.trim().trim_end_matches('/').to_string()
}

/// Normalize an allowlist entry: lowercase, brackets removed from IPv6
/// literals, any port dropped.
pub(crate) fn normalize_configured_host(host: &str) -> String {
    host_name(host).unwrap_or_else(|| host.trim().to_ascii_lowercase())
}

/// Extract the lowercase host name from a `Host` header value.
///
/// Returns `None` for empty or structurally broken values.
fn host_name(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let name = if let Some(rest) = raw.strip_prefix('[') {
        // [v6]:port or [v6]
        let (inner, tail) = rest.split_once(']')?;
        if !(tail.is_empty() || valid_port_suffix(tail)) {
            return None;
        }
        inner
    } else if raw.matches(':').count() > 1 {
        // Bare IPv6 literal, only seen in configuration.
        raw
    } else {
        match raw.split_once(':') {
            Some((name, port)) if valid_port_suffix(&format!(":{port}")) => name,
            Some(_) => return None,
            None => raw,
        }
    };

    if name.is_empty() {
        return None;
    }
    Some(name.to_ascii_lowercase())
}

fn valid_port_suffix(tail: &str) -> bool {
    tail.strip_prefix(':')
        .is_some_and(|p| !p.is_empty() && p.parse::<u16>().is_ok())
}
