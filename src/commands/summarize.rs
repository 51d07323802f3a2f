use std::path::PathBuf;

use crate::compact::{compact_entries, summarize};
use crate::error::Result;
use crate::filter::filter_entries;
use crate::har::{parse_har_file, CapturedEntry};

#[derive(Clone, Copy, Debug)]
pub struct SummarizeOptions {
    pub deduplicate: bool,
}

impl Default for SummarizeOptions {
    fn default() -> Self {
        Self { deduplicate: true }
    }
}

/// Print the summary the matcher would receive for a capture.
pub fn run_summarize(input: PathBuf, options: &SummarizeOptions) -> Result<()> {
    let har = parse_har_file(&input)?;
    let outcome = filter_entries(CapturedEntry::enumerate(har.log.entries));
    let compact = compact_entries(&outcome.kept);
    let summary = summarize(&compact, options.deduplicate);

    if !summary.text.is_empty() {
        println!("{}", summary.text);
    }

    let saved = if summary.total_count == 0 {
        0.0
    } else {
        100.0 * (summary.total_count - summary.unique_count) as f64 / summary.total_count as f64
    };
    eprintln!(
        "{} lines for {} entries ({:.0}% fewer); {} of {} captured entries filtered out",
        summary.unique_count,
        summary.total_count,
        saved,
        outcome.stats.removed,
        outcome.stats.total
    );

    Ok(())
}
