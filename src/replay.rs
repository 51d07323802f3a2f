//! Server-side execution of a reconstructed request.
//!
//! The URL goes through the full replay validation first. The connection is
//! then pinned to the addresses that validation resolved and redirects are not
//! followed, so the request cannot be steered to a host that was never checked.

use std::collections::BTreeMap;
use std::io::{self, Read};
use std::net::{SocketAddr, ToSocketAddrs};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use url::Url;

use crate::error::{HarcurlError, Result};
use crate::guard::{is_blocked_ip, validate_for_replay_with, HostResolver};
use crate::har::is_pseudo_header;

pub const DEFAULT_REPLAY_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_RESPONSE_BYTES: u64 = 10 * 1024 * 1024;

/// Headers the client sets from the URL and body itself.
const SKIPPED_HEADERS: &[&str] = &["host", "content-length", "connection"];

const TIMEOUT_HINT: &str = "The target did not answer in time. It may be slow or may refuse \
requests from servers; run the curl command from your own machine instead.";
const FAILURE_HINT: &str = "The request could not be completed from the server. Sites often \
block server-side requests or require a browser session; run the curl command locally.";
const CURL_HINT: &str = "Copy the generated curl command and paste it into a terminal.";

fn default_method() -> String {
    "GET".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecuteRequest {
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteResponse {
    pub status: u16,
    pub status_text: String,
    pub headers: BTreeMap<String, String>,
    pub body: String,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct ReplaySettings {
    pub timeout: Duration,
    /// `None` reads the whole body.
    pub max_response_bytes: Option<u64>,
}

impl Default for ReplaySettings {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_REPLAY_TIMEOUT,
            max_response_bytes: Some(DEFAULT_MAX_RESPONSE_BYTES),
        }
    }
}

/// Client-facing payload for a replay that timed out or failed.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayFailurePayload {
    pub error: String,
    pub message: String,
    pub hint: String,
    pub curl_hint: String,
}

impl ReplayFailurePayload {
    /// Build the payload for a timeout or fetch failure; other errors yield `None`.
    pub fn from_error(err: &HarcurlError) -> Option<Self> {
        let (error, hint) = match err {
            HarcurlError::ReplayTimeout(_) => ("Request timed out", TIMEOUT_HINT),
            HarcurlError::ReplayFailure(_) => ("Request failed", FAILURE_HINT),
            _ => return None,
        };
        Some(Self {
            error: error.to_string(),
            message: err.to_string(),
            hint: hint.to_string(),
            curl_hint: CURL_HINT.to_string(),
        })
    }
}

/// Validate and send the request, returning the target's answer whatever its status.
pub async fn execute(
    request: &ExecuteRequest,
    settings: &ReplaySettings,
    resolver: &dyn HostResolver,
) -> Result<ExecuteResponse> {
    let target = validate_for_replay_with(&request.url, resolver).await?;
    fetch(request, &target.url, target.addrs, settings).await
}

/// Send an already validated request. Connections go to `pinned` when it is
/// non-empty; otherwise the host is resolved again and blocked addresses refused.
async fn fetch(
    request: &ExecuteRequest,
    url: &Url,
    pinned: Vec<SocketAddr>,
    settings: &ReplaySettings,
) -> Result<ExecuteResponse> {
    let method = request.method.trim().to_ascii_uppercase();
    if method.is_empty() || !method.bytes().all(|b| b.is_ascii_alphabetic()) {
        return Err(HarcurlError::InvalidArgs(format!(
            "invalid method: {}",
            request.method
        )));
    }

    let agent = build_agent(settings.timeout, pinned);
    let url = url.to_string();
    let headers = request.headers.clone();
    let body = effective_body(&method, request.body.as_deref()).map(str::to_string);
    let limit = settings.max_response_bytes;
    let timeout = settings.timeout;

    let started = Instant::now();
    let task = tokio::task::spawn_blocking(move || {
        let response = send(&agent, &method, &url, &headers, body.as_deref(), limit);
        response.map_err(|err| match err {
            HarcurlError::ReplayTimeout(_) => HarcurlError::ReplayTimeout(timeout),
            other => other,
        })
    });
    // The agent enforces the timeout; this outer bound covers DNS stalls it cannot interrupt.
    let outcome = match tokio::time::timeout(settings.timeout + Duration::from_secs(1), task).await {
        Ok(joined) => joined
            .map_err(|err| HarcurlError::ReplayFailure(format!("replay task failed: {err}")))?,
        Err(_) => Err(HarcurlError::ReplayTimeout(settings.timeout)),
    };
    let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

    match outcome {
        Ok(mut response) => {
            response.duration_ms = duration_ms;
            info!(
                url = %request.url,
                status = response.status,
                duration_ms,
                "replayed request"
            );
            Ok(response)
        }
        Err(err) => {
            warn!(url = %request.url, error = %err, duration_ms, "replay failed");
            Err(err)
        }
    }
}

/// GET and HEAD never carry a body; an empty body counts as none.
fn effective_body<'a>(method: &str, body: Option<&'a str>) -> Option<&'a str> {
    if method == "GET" || method == "HEAD" {
        return None;
    }
    body.filter(|b| !b.is_empty())
}

fn build_agent(timeout: Duration, pinned: Vec<SocketAddr>) -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout(timeout)
        .redirects(0)
        .resolver(move |netloc: &str| -> io::Result<Vec<SocketAddr>> {
            if !pinned.is_empty() {
                return Ok(pinned.clone());
            }
            let addrs: Vec<SocketAddr> = netloc.to_socket_addrs()?.collect();
            match addrs.iter().find(|addr| is_blocked_ip(addr.ip())) {
                Some(addr) => Err(io::Error::new(
                    io::ErrorKind::PermissionDenied,
                    format!("{netloc} resolved to blocked address {}", addr.ip()),
                )),
                None => Ok(addrs),
            }
        })
        .build()
}

fn send(
    agent: &ureq::Agent,
    method: &str,
    url: &str,
    headers: &BTreeMap<String, String>,
    body: Option<&str>,
    limit: Option<u64>,
) -> Result<ExecuteResponse> {
    let mut request = agent.request(method, url);
    for (name, value) in headers {
        if is_pseudo_header(name) || SKIPPED_HEADERS.iter().any(|h| name.eq_ignore_ascii_case(h)) {
            continue;
        }
        request = request.set(name, value);
    }

    let response = match body {
        Some(body) => request.send_string(body),
        None => request.call(),
    };
    let response = match response {
        Ok(resp) => resp,
        Err(ureq::Error::Status(_, resp)) => resp,
        Err(ureq::Error::Transport(err)) => {
            return Err(if is_timeout(&err) {
                HarcurlError::ReplayTimeout(Duration::ZERO)
            } else {
                HarcurlError::ReplayFailure(err.to_string())
            });
        }
    };

    let status = response.status();
    let status_text = response.status_text().to_string();
    let headers = response_headers_map(&response);
    let body = read_body(response, limit)?;

    Ok(ExecuteResponse {
        status,
        status_text,
        headers,
        body,
        duration_ms: 0,
    })
}

fn is_timeout(err: &ureq::Transport) -> bool {
    std::error::Error::source(err)
        .and_then(|source| source.downcast_ref::<io::Error>())
        .is_some_and(|io_err| {
            matches!(
                io_err.kind(),
                io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
            )
        })
}

fn read_body(response: ureq::Response, limit: Option<u64>) -> Result<String> {
    let mut bytes = Vec::new();
    let mut reader = response.into_reader();
    let read = match limit {
        Some(limit) => reader.take(limit).read_to_end(&mut bytes),
        None => reader.read_to_end(&mut bytes),
    };
    read.map_err(|err| match err.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => {
            HarcurlError::ReplayTimeout(Duration::ZERO)
        }
        _ => HarcurlError::ReplayFailure(format!("failed to read response body: {err}")),
    })?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn response_headers_map(response: &ureq::Response) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for name in response.headers_names() {
        if let Some(value) = response.header(&name) {
            out.insert(name.to_ascii_lowercase(), value.to_string());
        }
    }
    out
}
