use std::fs;
use std::path::Path;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{HarcurlError, Result};

#[derive(Debug, Deserialize)]
pub struct Har {
    pub log: Log,
}

/// Only `entries` is read; the rest of the log (creator, pages, browser) is ignored.
#[derive(Debug, Deserialize)]
pub struct Log {
    pub entries: Vec<Entry>,
}

/// One HTTP transaction from the capture.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_date_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<f64>,
    pub request: Request,
    pub response: Response,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    pub method: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_version: Option<String>,
    #[serde(default)]
    pub headers: Vec<Header>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_data: Option<PostData>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    #[serde(default, deserialize_with = "lenient_int")]
    pub status: i32,
    #[serde(default)]
    pub status_text: String,
    #[serde(default)]
    pub headers: Vec<Header>,
    #[serde(default)]
    pub content: Content,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Content {
    #[serde(default, deserialize_with = "lenient_int")]
    pub size: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct Header {
    pub name: String,
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Vec<PostParam>>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostParam {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

/// Integer fields some exporters write as floats (`120.0`) or `null`.
fn lenient_int<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: TryFrom<i64> + Default,
{
    let Some(number) = Option::<serde_json::Number>::deserialize(deserializer)? else {
        return Ok(T::default());
    };
    let whole = match number.as_i64() {
        Some(n) => n,
        None => number.as_f64().map(|f| f.trunc() as i64).unwrap_or_default(),
    };
    T::try_from(whole).map_err(|_| D::Error::custom(format!("number out of range: {number}")))
}

/// Parse a HAR document held in memory.
///
/// The whole document either parses or the call fails: a buffer that is not
/// JSON is `MalformedInput`, while valid JSON without a `log.entries` array (or
/// with entries that do not have the HAR shape) is `SchemaViolation`. Entry
/// indices downstream rely on nothing being skipped here.
pub fn parse_har_slice(bytes: &[u8]) -> Result<Har> {
    let value: serde_json::Value = serde_json::from_slice(bytes)
        .map_err(|err| HarcurlError::MalformedInput(err.to_string()))?;

    let Some(log) = value.get("log") else {
        return Err(HarcurlError::SchemaViolation(
            "missing top-level 'log' object".to_string(),
        ));
    };
    match log.get("entries") {
        Some(entries) if entries.is_array() => {}
        Some(_) => {
            return Err(HarcurlError::SchemaViolation(
                "'log.entries' must be an array".to_string(),
            ))
        }
        None => {
            return Err(HarcurlError::SchemaViolation(
                "missing 'log.entries' array".to_string(),
            ))
        }
    }

    serde_json::from_value(value).map_err(|err| HarcurlError::SchemaViolation(err.to_string()))
}

pub fn parse_har_str(text: &str) -> Result<Har> {
    parse_har_slice(text.as_bytes())
}

/// Parse a HAR file from disk into strongly typed structures.
pub fn parse_har_file(path: &Path) -> Result<Har> {
    let bytes = fs::read(path)?;
    parse_har_slice(&bytes)
}
