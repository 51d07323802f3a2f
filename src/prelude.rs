//! Convenience prelude for common harcurl embedding tasks.

pub use crate::api::{
    generate_curl, parse_har_file, process_upload, run_analyze, summarize, AnalyzeRequest,
    Entry, Har, HarcurlError, Matcher, Result, SessionStore,
};
