//! One upload, start to finish: parse, number, filter, compact, strip, store.

use serde::Serialize;
use tracing::info;

use crate::compact::{compact_entries, CompactEntry};
use crate::error::Result;
use crate::filter::{filter_entries, FilterBreakdown, FilterStats};
use crate::har::{parse_har_slice, CapturedEntry};
use crate::session::SessionStore;
use crate::strip::strip_bodies;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub session_id: String,
    /// Filtered entries, for display.
    pub entries: Vec<CompactEntry>,
    /// Every entry in the capture, including removed ones.
    pub all_entries: Vec<CompactEntry>,
    pub stats: FilterStats,
    pub breakdown: FilterBreakdown,
}

/// Process a raw capture buffer and store the result as a new session.
pub fn process_upload(bytes: &[u8], store: &SessionStore) -> Result<UploadResponse> {
    let har = parse_har_slice(bytes)?;
    let captured = CapturedEntry::enumerate(har.log.entries);
    let all_entries = compact_entries(&captured);

    let outcome = filter_entries(captured);
    let entries = compact_entries(&outcome.kept);

    let mut kept = outcome.kept;
    strip_bodies(&mut kept);

    let session_id = store.put(kept, entries.clone(), outcome.stats.total);
    info!(
        session_id = %session_id,
        total = outcome.stats.total,
        kept = outcome.stats.kept,
        removed = outcome.stats.removed,
        "capture uploaded"
    );

    Ok(UploadResponse {
        session_id,
        entries,
        all_entries,
        stats: outcome.stats,
        breakdown: outcome.breakdown,
    })
}
