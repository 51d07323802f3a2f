use std::path::PathBuf;

use serde::Serialize;

use crate::compact::{compact_entries, CompactEntry};
use crate::error::Result;
use crate::filter::{filter_entries, FilterBreakdown, FilterStats};
use crate::har::{parse_har_file, CapturedEntry};

#[derive(Clone, Copy, Debug, Default)]
pub struct FilterOptions {
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct FilterOutput {
    stats: FilterStats,
    breakdown: FilterBreakdown,
    entries: Vec<CompactEntry>,
}

/// Parse and filter a capture offline, printing what was kept and why the rest went.
pub fn run_filter(input: PathBuf, options: &FilterOptions) -> Result<()> {
    let har = parse_har_file(&input)?;
    let outcome = filter_entries(CapturedEntry::enumerate(har.log.entries));

    let out = FilterOutput {
        stats: outcome.stats,
        breakdown: outcome.breakdown,
        entries: compact_entries(&outcome.kept),
    };

    if options.json {
        println!("{}", serde_json::to_string(&out)?);
        return Ok(());
    }

    println!("total={}", out.stats.total);
    println!("kept={}", out.stats.kept);
    println!("removed={}", out.stats.removed);
    println!("html={}", out.breakdown.html);
    println!("static_asset_mime={}", out.breakdown.static_asset_mime);
    println!("static_asset_url={}", out.breakdown.static_asset_url);
    println!("tracking={}", out.breakdown.tracking);
    println!("data_blob={}", out.breakdown.data_blob);
    println!("redirects={}", out.breakdown.redirects);
    println!("options={}", out.breakdown.options);

    Ok(())
}
