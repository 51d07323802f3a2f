use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while processing captures, matching, or replaying requests.
#[derive(Error, Debug)]
pub enum HarcurlError {
    /// IO error (file not found, permission denied, etc.).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error outside of capture parsing.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The capture buffer is not valid JSON.
    #[error("Malformed capture: {0}")]
    MalformedInput(String),

    /// The capture parsed as JSON but lacks the required structure.
    #[error("Invalid HAR file: {0}")]
    SchemaViolation(String),

    /// Unknown or expired session id.
    #[error("Session not found: {0}")]
    NotFound(String),

    /// The matcher selected an entry that is not part of the session.
    #[error("Matcher returned index {index}, which is not one of the {available} analyzed entries")]
    InvalidMatchIndex { index: i64, available: usize },

    /// The matcher response did not follow the expected shape.
    #[error("Matcher contract violation: {0}")]
    MatcherContractViolation(String),

    /// The matcher could not be reached or returned an API error.
    #[error("Matcher error: {0}")]
    Matcher(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Scheme not allowed: {0} (only http and https are supported)")]
    SchemeNotAllowed(String),

    #[error("Blocked host: {0}")]
    BlockedHost(String),

    #[error("Blocked IP address: {0}")]
    BlockedIp(String),

    /// The outbound replay did not finish in time.
    #[error("Request timed out after {}s", .0.as_secs())]
    ReplayTimeout(Duration),

    /// The outbound replay failed (DNS, connect, TLS, read).
    #[error("Request failed: {0}")]
    ReplayFailure(String),

    /// Invalid CLI arguments or configuration values.
    #[error("Invalid arguments: {0}")]
    InvalidArgs(String),
}

impl HarcurlError {
    /// Stable machine-readable identifier used in JSON error payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Io(_) => "io",
            Self::Json(_) => "json",
            Self::MalformedInput(_) => "malformed_input",
            Self::SchemaViolation(_) => "schema_violation",
            Self::NotFound(_) => "not_found",
            Self::InvalidMatchIndex { .. } => "invalid_match_index",
            Self::MatcherContractViolation(_) => "matcher_contract_violation",
            Self::Matcher(_) => "matcher_error",
            Self::InvalidUrl(_) => "invalid_url",
            Self::SchemeNotAllowed(_) => "scheme_not_allowed",
            Self::BlockedHost(_) => "blocked_host",
            Self::BlockedIp(_) => "blocked_ip",
            Self::ReplayTimeout(_) => "replay_timeout",
            Self::ReplayFailure(_) => "replay_failure",
            Self::InvalidArgs(_) => "invalid_args",
        }
    }

    /// True for the replay validation failures, all of which the user can correct.
    pub fn is_replay_rejection(&self) -> bool {
        matches!(
            self,
            Self::InvalidUrl(_)
                | Self::SchemeNotAllowed(_)
                | Self::BlockedHost(_)
                | Self::BlockedIp(_)
        )
    }
}

/// Convenience result type for harcurl operations.
pub type Result<T> = std::result::Result<T, HarcurlError>;
