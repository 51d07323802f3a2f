mod parser;

use serde::{Deserialize, Serialize};

pub use parser::{
    parse_har_file, parse_har_slice, parse_har_str, Content, Entry, Har, Header, Log,
    PostData, PostParam, Request, Response,
};

/// A capture entry paired with its 0-based position in the original capture.
///
/// The index is assigned once at parse time and is the only cross-reference
/// used between the display list, the matcher summary and stored sessions.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CapturedEntry {
    pub index: usize,
    pub entry: Entry,
}

impl CapturedEntry {
    /// Number every entry by its capture position.
    pub fn enumerate(entries: Vec<Entry>) -> Vec<CapturedEntry> {
        entries
            .into_iter()
            .enumerate()
            .map(|(index, entry)| CapturedEntry { index, entry })
            .collect()
    }
}

/// True for HTTP/2 pseudo-headers such as `:authority`.
pub fn is_pseudo_header(name: &str) -> bool {
    name.starts_with(':')
}
