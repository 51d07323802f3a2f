//! Stable, supported API surface for embedding harcurl.
//!
//! This module re-exports the types and functions intended for external use.
//! Treat the contents of this module as SemVer-stable.

pub use crate::analyze::{run_analyze, AnalyzeRequest, AnalyzeResponse};
pub use crate::compact::{
    compact_entries, dedup_groups, normalize_url, summarize, CompactEntry, DedupGroup,
    MatcherSummary,
};
pub use crate::curl::{
    generate_curl, generate_curl_with, is_sensitive_header, shell_quote, CurlOptions,
    RequestDetails, REDACTED,
};
pub use crate::error::{HarcurlError, Result};
pub use crate::filter::{
    classify_entry, filter_entries, FilterBreakdown, FilterOutcome, FilterStats, RemovalReason,
};
pub use crate::guard::{
    assert_allowed_scheme, is_blocked_ip, validate_for_replay, validate_for_replay_with,
    HostResolver, ReplayTarget, SystemResolver,
};
pub use crate::har::{
    parse_har_file, parse_har_slice, parse_har_str, CapturedEntry, Content, Entry, Har,
    Header, Log, PostData, PostParam, Request, Response,
};
pub use crate::matcher::{
    parse_match_payload, Candidate, HttpMatcher, HttpMatcherOptions, MatchRequest, MatchResult,
    Matcher, TokenUsage,
};
pub use crate::replay::{
    execute, ExecuteRequest, ExecuteResponse, ReplayFailurePayload, ReplaySettings,
};
pub use crate::session::{SessionStore, StoredSession};
pub use crate::size::{format_size, parse_size_bytes, parse_size_bytes_usize};
pub use crate::strip::{strip_bodies, MAX_STORED_REQUEST_BODY_CHARS};
pub use crate::upload::{process_upload, UploadResponse};
