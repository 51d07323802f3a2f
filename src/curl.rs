//! Turn a captured entry back into a request: a shell command for display and
//! plain request details for the execute path.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::har::{is_pseudo_header, Entry, PostData};

pub const REDACTED: &str = "[REDACTED]";

const LINE_JOINER: &str = " \\\n  ";

/// Headers an HTTP client computes itself; forcing them breaks replay.
const SKIPPED_CURL_HEADERS: &[&str] = &["host", "connection", "content-length", "accept-encoding"];

/// Headers left out of the request details returned alongside the command.
const SKIPPED_DETAIL_HEADERS: &[&str] = &["host", "connection", "content-length"];

const SENSITIVE_HEADERS: &[&str] = &[
    "authorization",
    "cookie",
    "x-api-key",
    "x-auth-token",
    "proxy-authorization",
];

#[derive(Debug, Clone, Copy)]
pub struct CurlOptions {
    /// Replace sensitive header values with `[REDACTED]`.
    pub redact_sensitive: bool,
}

impl Default for CurlOptions {
    fn default() -> Self {
        Self {
            redact_sensitive: true,
        }
    }
}

/// Build the display command for an entry, with sensitive values redacted.
pub fn generate_curl(entry: &Entry) -> String {
    generate_curl_with(entry, &CurlOptions::default())
}

pub fn generate_curl_with(entry: &Entry, options: &CurlOptions) -> String {
    let request = &entry.request;
    let method = request.method.to_ascii_uppercase();
    let body = RequestBody::from_post_data(request.post_data.as_ref());

    let mut parts: Vec<String> = vec!["curl".to_string()];

    let implied_by_body = method == "POST" && !matches!(body, RequestBody::None);
    if method != "GET" && !implied_by_body {
        parts.push(format!("-X {method}"));
    }

    parts.push(shell_quote(&request.url));

    for header in &request.headers {
        if is_pseudo_header(&header.name) || name_in(&header.name, SKIPPED_CURL_HEADERS) {
            continue;
        }
        let value = if options.redact_sensitive && is_sensitive_header(&header.name) {
            REDACTED
        } else {
            header.value.as_str()
        };
        parts.push(format!(
            "-H {}",
            shell_quote(&format!("{}: {}", header.name, value))
        ));
    }

    match body {
        RequestBody::Raw(text) => parts.push(format!("--data-raw {}", shell_quote(text))),
        RequestBody::Form(params) => {
            for (name, value) in params {
                parts.push(format!(
                    "--data-urlencode {}",
                    shell_quote(&format!("{name}={value}"))
                ));
            }
        }
        RequestBody::None => {}
    }

    parts.join(LINE_JOINER)
}

/// Wrap a value in single quotes, escaping embedded quotes as `'\''`.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

pub fn is_sensitive_header(name: &str) -> bool {
    name_in(name, SENSITIVE_HEADERS)
}

fn name_in(name: &str, list: &[&str]) -> bool {
    list.iter().any(|candidate| name.eq_ignore_ascii_case(candidate))
}

enum RequestBody<'a> {
    Raw(&'a str),
    Form(Vec<(&'a str, &'a str)>),
    None,
}

impl<'a> RequestBody<'a> {
    fn from_post_data(post_data: Option<&'a PostData>) -> Self {
        let Some(post_data) = post_data else {
            return Self::None;
        };
        if let Some(text) = post_data.text.as_deref().filter(|t| !t.is_empty()) {
            return Self::Raw(text);
        }
        let params: Vec<(&str, &str)> = post_data
            .params
            .iter()
            .flatten()
            .map(|p| (p.name.as_str(), p.value.as_deref().unwrap_or("")))
            .collect();
        if params.is_empty() {
            Self::None
        } else {
            Self::Form(params)
        }
    }
}

/// Unredacted request pieces for display and for the execute endpoint.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RequestDetails {
    pub url: String,
    pub method: String,
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

impl RequestDetails {
    pub fn from_entry(entry: &Entry) -> Self {
        let request = &entry.request;
        let mut headers: BTreeMap<String, String> = BTreeMap::new();
        for header in &request.headers {
            if is_pseudo_header(&header.name) || name_in(&header.name, SKIPPED_DETAIL_HEADERS) {
                continue;
            }
            let name = header.name.to_ascii_lowercase();
            match headers.get_mut(&name) {
                Some(existing) => {
                    let separator = if name == "cookie" { "; " } else { ", " };
                    existing.push_str(separator);
                    existing.push_str(&header.value);
                }
                None => {
                    headers.insert(name, header.value.clone());
                }
            }
        }

        let body = match RequestBody::from_post_data(request.post_data.as_ref()) {
            RequestBody::Raw(text) => Some(text.to_string()),
            RequestBody::Form(params) => {
                let mut serializer = url::form_urlencoded::Serializer::new(String::new());
                for (name, value) in params {
                    serializer.append_pair(name, value);
                }
                headers
                    .entry("content-type".to_string())
                    .or_insert_with(|| "application/x-www-form-urlencoded".to_string());
                Some(serializer.finish())
            }
            RequestBody::None => None,
        };

        Self {
            url: request.url.clone(),
            method: request.method.to_ascii_uppercase(),
            headers,
            body,
        }
    }
}
