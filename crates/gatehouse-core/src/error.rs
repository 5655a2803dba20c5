//! # Error Types
//!
//! Errors raised before any request reaches a handler: configuration
//! problems found at startup, and admission rejections found at the edge.
//!
//! ## Design
//!
//! - [`ConfigurationError`] is startup-fatal and lists every bad field in
//!   one pass so operators can fix them all at once.
//! - [`AdmissionError`] carries no request data back to the caller.

use std::fmt;

use thiserror::Error;

/// One invalid or missing configuration field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigProblem {
    /// Environment variable name.
    pub field: &'static str,
    /// What is wrong with it. Never contains the value of a secret.
    pub reason: String,
}

impl fmt::Display for ConfigProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.reason)
    }
}

/// Settings could not be loaded. Aborts process startup.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid configuration ({} problem(s)): {}", .problems.len(), render(.problems))]
pub struct ConfigurationError {
    problems: Vec<ConfigProblem>,
}

impl ConfigurationError {
    pub fn new(problems: Vec<ConfigProblem>) -> Self {
        Self { problems }
    }

    /// Every problem found, in the order the fields were checked.
    pub fn problems(&self) -> &[ConfigProblem] {
        &self.problems
    }

    /// Whether the named field is among the problems.
    pub fn mentions(&self, field: &str) -> bool {
        self.problems.iter().any(|p| p.field == field)
    }
}

fn render(problems: &[ConfigProblem]) -> String {
    problems
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Pre-routing rejection of a request.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionError {
    /// The `Origin` header is not in the configured CORS origins.
    #[error("origin not allowed")]
    OriginNotAllowed,

    /// The `Host` header is missing or not in the configured hosts.
    #[error("invalid host header")]
    HostNotAllowed,
}
