use std::path::PathBuf;

use crate::curl::{generate_curl_with, CurlOptions};
use crate::error::{HarcurlError, Result};
use crate::guard::assert_allowed_scheme;
use crate::har::parse_har_file;

#[derive(Clone, Copy, Debug)]
pub struct CurlCommandOptions {
    /// Position of the entry in the original capture.
    pub index: usize,
    pub redact: bool,
}

/// Print the curl command for one captured entry.
pub fn run_curl(input: PathBuf, options: &CurlCommandOptions) -> Result<()> {
    let har = parse_har_file(&input)?;
    let total = har.log.entries.len();
    let entry = har.log.entries.get(options.index).ok_or_else(|| {
        HarcurlError::InvalidArgs(format!(
            "Entry index {} is out of range; the capture has {} entries",
            options.index, total
        ))
    })?;

    assert_allowed_scheme(&entry.request.url)?;

    let command = generate_curl_with(
        entry,
        &CurlOptions {
            redact_sensitive: options.redact,
        },
    );
    println!("{command}");
    Ok(())
}
