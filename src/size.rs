use crate::error::{HarcurlError, Result};

const KB: f64 = 1024.0;
const MB: f64 = 1024.0 * 1024.0;

/// Render a byte count for display: `0 B`, `512 B`, `1.5 KB`, `2.0 MB`.
///
/// Negative sizes (HAR uses `-1` for "unknown") render as `0 B`.
pub fn format_size(bytes: i64) -> String {
    if bytes <= 0 {
        return "0 B".to_string();
    }
    let value = bytes as f64;
    if value < KB {
        format!("{bytes} B")
    } else if value < MB {
        format!("{:.1} KB", value / KB)
    } else {
        format!("{:.1} MB", value / MB)
    }
}

/// Parse a human size such as `150MB`, `1.5M`, `100k` or `unlimited`.
pub fn parse_size_bytes(s: &str) -> Result<Option<u64>> {
    let raw = s.trim();
    if raw.is_empty() {
        return Err(HarcurlError::InvalidArgs(
            "Size value cannot be empty".to_string(),
        ));
    }

    let lower = raw.to_lowercase();
    if lower == "unlimited" {
        return Ok(None);
    }

    let number_end = lower
        .char_indices()
        .take_while(|(_, ch)| ch.is_ascii_digit() || *ch == '.')
        .map(|(idx, ch)| idx + ch.len_utf8())
        .last()
        .unwrap_or(0);

    let number_str = lower[..number_end].trim();
    if number_str.is_empty() {
        return Err(HarcurlError::InvalidArgs(format!(
            "Invalid size value '{raw}'; expected a number like '1.5MB' or '100k'",
        )));
    }

    let unit_str = lower[number_end..].trim();
    let number: f64 = number_str.parse().map_err(|_| {
        HarcurlError::InvalidArgs(format!(
            "Invalid size value '{raw}'; expected a number like '1.5MB'",
        ))
    })?;

    let multiplier = match unit_str {
        "" | "b" => 1.0,
        "k" | "kb" | "kib" => KB,
        "m" | "mb" | "mib" => MB,
        "g" | "gb" | "gib" => MB * 1024.0,
        _ => {
            return Err(HarcurlError::InvalidArgs(format!(
                "Invalid size unit '{unit_str}'; use B, KB, MB, GB, or 'unlimited'",
            )))
        }
    };

    let bytes = number * multiplier;
    if !bytes.is_finite() || bytes > u64::MAX as f64 {
        return Err(HarcurlError::InvalidArgs(format!(
            "Size value '{raw}' is too large",
        )));
    }

    Ok(Some(bytes.round() as u64))
}

/// Like [`parse_size_bytes`], narrowed to `usize` for in-memory limits.
pub fn parse_size_bytes_usize(s: &str) -> Result<Option<usize>> {
    match parse_size_bytes(s)? {
        Some(value) => usize::try_from(value)
            .map(Some)
            .map_err(|_| HarcurlError::InvalidArgs("Size value is too large".to_string())),
        None => Ok(None),
    }
}
