//! Lightweight display records and the token-efficient summary handed to the
//! matcher.

use std::collections::{BTreeSet, HashMap};
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::har::{CapturedEntry, Entry};
use crate::size::format_size;

/// Display projection of a captured entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompactEntry {
    pub index: usize,
    pub method: String,
    pub url: String,
    pub status: i32,
    pub mime_type: String,
    pub size: i64,
}

impl CompactEntry {
    pub fn new(index: usize, entry: &Entry) -> Self {
        Self {
            index,
            method: entry.request.method.to_ascii_uppercase(),
            url: entry.request.url.clone(),
            status: entry.response.status,
            mime_type: entry.response.content.mime_type.clone().unwrap_or_default(),
            size: entry.response.content.size,
        }
    }
}

/// Project every entry, keeping capture order and index.
pub fn compact_entries(entries: &[CapturedEntry]) -> Vec<CompactEntry> {
    entries
        .iter()
        .map(|c| CompactEntry::new(c.index, &c.entry))
        .collect()
}

/// Entries sharing method, origin+path and query-parameter names.
#[derive(Debug, Clone)]
pub struct DedupGroup<'a> {
    pub representative: &'a CompactEntry,
    pub members: Vec<usize>,
    base: String,
    param_names: Vec<String>,
}

impl DedupGroup<'_> {
    pub fn count(&self) -> usize {
        self.members.len()
    }

    /// The representative URL with every parameter value replaced by `{name}`.
    pub fn pattern_url(&self) -> String {
        if self.param_names.is_empty() {
            return self.base.clone();
        }
        let query = self
            .param_names
            .iter()
            .map(|name| format!("{name}={{{name}}}"))
            .collect::<Vec<_>>()
            .join("&");
        format!("{}?{}", self.base, query)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatcherSummary {
    pub text: String,
    pub unique_count: usize,
    pub total_count: usize,
}

#[derive(Hash, PartialEq, Eq)]
struct GroupKey {
    method: String,
    base: String,
    param_names: Vec<String>,
}

/// Split a URL into (origin + path, sorted unique query parameter names).
///
/// URLs the parser rejects are split on the first `?` by hand, so they still
/// group with identical siblings.
pub fn normalize_url(url: &str) -> (String, Vec<String>) {
    match Url::parse(url) {
        Ok(parsed) if parsed.has_host() => {
            let host = parsed.host_str().unwrap_or_default();
            let base = match parsed.port() {
                Some(port) => format!("{}://{}:{}{}", parsed.scheme(), host, port, parsed.path()),
                None => format!("{}://{}{}", parsed.scheme(), host, parsed.path()),
            };
            let names: BTreeSet<String> = parsed
                .query_pairs()
                .map(|(name, _)| name.into_owned())
                .collect();
            (base, names.into_iter().collect())
        }
        _ => {
            let without_fragment = url.split('#').next().unwrap_or(url);
            let (base, query) = without_fragment
                .split_once('?')
                .unwrap_or((without_fragment, ""));
            let names: BTreeSet<String> = query
                .split('&')
                .filter(|pair| !pair.is_empty())
                .map(|pair| pair.split('=').next().unwrap_or(pair).to_string())
                .collect();
            (base.to_string(), names.into_iter().collect())
        }
    }
}

/// Group entries by normalized key, in order of first appearance.
pub fn dedup_groups(entries: &[CompactEntry]) -> Vec<DedupGroup<'_>> {
    let mut groups: Vec<DedupGroup<'_>> = Vec::new();
    let mut positions: HashMap<GroupKey, usize> = HashMap::new();

    for entry in entries {
        let (base, param_names) = normalize_url(&entry.url);
        let key = GroupKey {
            method: entry.method.to_ascii_uppercase(),
            base: base.clone(),
            param_names: param_names.clone(),
        };
        match positions.get(&key) {
            Some(&pos) => groups[pos].members.push(entry.index),
            None => {
                positions.insert(key, groups.len());
                groups.push(DedupGroup {
                    representative: entry,
                    members: vec![entry.index],
                    base,
                    param_names,
                });
            }
        }
    }

    groups
}

/// Render the matcher summary, one line per entry or per dedup group.
///
/// Line shape: `[index] METHOD url → STATUS (mime, size)`. Grouped lines show
/// the parameter pattern; groups with more than one member add an `[xN]` suffix.
pub fn summarize(entries: &[CompactEntry], deduplicate: bool) -> MatcherSummary {
    let mut text = String::new();
    let mut unique_count = 0usize;

    if deduplicate {
        for group in dedup_groups(entries) {
            push_line(&mut text, group.representative, &group.pattern_url());
            if group.count() > 1 {
                let _ = write!(text, " [x{}]", group.count());
            }
            unique_count += 1;
        }
    } else {
        for entry in entries {
            push_line(&mut text, entry, &entry.url);
            unique_count += 1;
        }
    }

    MatcherSummary {
        text,
        unique_count,
        total_count: entries.len(),
    }
}

fn push_line(text: &mut String, entry: &CompactEntry, url: &str) {
    if !text.is_empty() {
        text.push('\n');
    }
    let mime = if entry.mime_type.is_empty() {
        "unknown"
    } else {
        entry.mime_type.as_str()
    };
    let _ = write!(
        text,
        "[{}] {} {} → {} ({}, {})",
        entry.index,
        entry.method,
        url,
        entry.status,
        mime,
        format_size(entry.size)
    );
}
