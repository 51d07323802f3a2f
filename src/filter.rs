//! Reduce a capture to the entries that could plausibly be the API call the
//! user is looking for.
//!
//! Every entry is checked against the removal predicates in a fixed order and
//! attributed to the first one it matches, so the breakdown always adds up.

use serde::Serialize;
use url::Url;

use crate::har::{CapturedEntry, Entry};

const STATIC_MIME_PREFIXES: &[&str] = &["image/", "font/", "audio/", "video/"];

const STATIC_MIME_TYPES: &[&str] = &[
    "javascript",
    "ecmascript",
    "text/css",
    "application/octet-stream",
    "application/font-woff",
    "application/font-sfnt",
    "application/vnd.ms-fontobject",
    "application/x-font",
    "application/wasm",
];

const STATIC_EXTENSIONS: &[&str] = &[
    "js", "mjs", "cjs", "css", "map", "png", "jpg", "jpeg", "gif", "svg", "webp", "avif", "ico",
    "bmp", "tif", "tiff", "woff", "woff2", "ttf", "otf", "eot", "mp4", "webm", "mp3", "wav",
    "ogg", "m4a", "wasm",
];

const TRACKING_PATTERNS: &[&str] = &[
    "google-analytics.com",
    "analytics.google.com",
    "googletagmanager.com",
    "googlesyndication.com",
    "googleadservices.com",
    "doubleclick.net",
    "connect.facebook.net",
    "facebook.com/tr",
    "hotjar.com",
    "clarity.ms",
    "segment.io",
    "segment.com/v1",
    "mixpanel.com",
    "amplitude.com",
    "heapanalytics.com",
    "fullstory.com",
    "newrelic.com",
    "nr-data.net",
    "sentry.io",
    "datadoghq.com",
    "browser-intake-",
    "bugsnag.com",
    "logrocket.io",
    "intercom.io",
    "optimizely.com",
    "quantserve.com",
    "scorecardresearch.com",
    "criteo.com",
    "taboola.com",
    "outbrain.com",
    "adsrvr.org",
    "/collect?",
    "/beacon",
    "/pixel",
    "/telemetry",
];

/// Why an entry was removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalReason {
    Html,
    StaticAssetMime,
    StaticAssetUrl,
    Tracking,
    DataBlob,
    Redirect,
    Options,
}

/// Per-reason removal counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterBreakdown {
    pub html: usize,
    pub static_asset_mime: usize,
    pub static_asset_url: usize,
    pub tracking: usize,
    pub data_blob: usize,
    pub redirects: usize,
    pub options: usize,
}

impl FilterBreakdown {
    fn record(&mut self, reason: RemovalReason) {
        match reason {
            RemovalReason::Html => self.html += 1,
            RemovalReason::StaticAssetMime => self.static_asset_mime += 1,
            RemovalReason::StaticAssetUrl => self.static_asset_url += 1,
            RemovalReason::Tracking => self.tracking += 1,
            RemovalReason::DataBlob => self.data_blob += 1,
            RemovalReason::Redirect => self.redirects += 1,
            RemovalReason::Options => self.options += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.html
            + self.static_asset_mime
            + self.static_asset_url
            + self.tracking
            + self.data_blob
            + self.redirects
            + self.options
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FilterStats {
    pub total: usize,
    pub removed: usize,
    pub kept: usize,
}

#[derive(Debug)]
pub struct FilterOutcome {
    pub kept: Vec<CapturedEntry>,
    pub stats: FilterStats,
    pub breakdown: FilterBreakdown,
}

/// Return the first removal predicate the entry matches, if any.
pub fn classify_entry(entry: &Entry) -> Option<RemovalReason> {
    let mime = entry
        .response
        .content
        .mime_type
        .as_deref()
        .unwrap_or("")
        .to_ascii_lowercase();
    let url = entry.request.url.as_str();

    if mime.contains("text/html") {
        return Some(RemovalReason::Html);
    }
    if is_static_mime(&mime) {
        return Some(RemovalReason::StaticAssetMime);
    }
    if url_extension(url).is_some_and(|ext| STATIC_EXTENSIONS.contains(&ext.as_str())) {
        return Some(RemovalReason::StaticAssetUrl);
    }
    if is_tracking_url(url) {
        return Some(RemovalReason::Tracking);
    }
    if is_data_or_blob(url) {
        return Some(RemovalReason::DataBlob);
    }
    if (300..400).contains(&entry.response.status) {
        return Some(RemovalReason::Redirect);
    }
    if entry.request.method.eq_ignore_ascii_case("OPTIONS") {
        return Some(RemovalReason::Options);
    }
    None
}

/// Split captured entries into kept and removed, preserving capture order.
pub fn filter_entries(entries: Vec<CapturedEntry>) -> FilterOutcome {
    let total = entries.len();
    let mut breakdown = FilterBreakdown::default();
    let mut kept = Vec::new();

    for captured in entries {
        match classify_entry(&captured.entry) {
            Some(reason) => breakdown.record(reason),
            None => kept.push(captured),
        }
    }

    let stats = FilterStats {
        total,
        removed: total - kept.len(),
        kept: kept.len(),
    };

    FilterOutcome {
        kept,
        stats,
        breakdown,
    }
}

fn is_static_mime(mime: &str) -> bool {
    STATIC_MIME_PREFIXES.iter().any(|p| mime.starts_with(p))
        || STATIC_MIME_TYPES.iter().any(|t| mime.contains(t))
}

fn is_tracking_url(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    TRACKING_PATTERNS.iter().any(|p| lower.contains(p))
}

fn is_data_or_blob(url: &str) -> bool {
    let lower = url.trim_start().to_ascii_lowercase();
    lower.starts_with("data:") || lower.starts_with("blob:")
}

fn url_extension(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let path = parsed.path();
    let file = path.rsplit('/').next().unwrap_or("");
    let ext = file.rsplit('.').next()?;
    if ext == file {
        return None;
    }
    Some(ext.to_lowercase())
}
