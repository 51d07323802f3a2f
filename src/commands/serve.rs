use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use hyper::body::HttpBody;
use hyper::header::{HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, StatusCode};
use serde::Serialize;
use serde_json::json;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::analyze::{run_analyze, AnalyzeRequest};
use crate::error::{HarcurlError, Result};
use crate::guard::{HostResolver, SystemResolver};
use crate::matcher::{HttpMatcher, HttpMatcherOptions, Matcher};
use crate::replay::{execute, ExecuteRequest, ReplayFailurePayload, ReplaySettings};
use crate::session::SessionStore;
use crate::upload::process_upload;

pub struct ServeOptions {
    pub bind: String,
    pub port: u16,
    /// `None` disables the upload size check.
    pub max_upload_bytes: Option<u64>,
    pub tls_cert: Option<PathBuf>,
    pub tls_key: Option<PathBuf>,
    pub session_ttl: Duration,
    pub sweep_interval: Duration,
    pub matcher: HttpMatcherOptions,
    pub replay: ReplaySettings,
}

/// Everything a request handler needs. Cheap to clone.
#[derive(Clone)]
pub struct ServeState {
    store: Arc<SessionStore>,
    matcher: Arc<dyn Matcher>,
    resolver: Arc<dyn HostResolver>,
    replay: ReplaySettings,
    max_upload_bytes: Option<u64>,
}

impl ServeState {
    pub fn new(
        store: Arc<SessionStore>,
        matcher: Arc<dyn Matcher>,
        resolver: Arc<dyn HostResolver>,
        replay: ReplaySettings,
        max_upload_bytes: Option<u64>,
    ) -> Self {
        Self {
            store,
            matcher,
            resolver,
            replay,
            max_upload_bytes,
        }
    }
}

pub fn run_serve(options: &ServeOptions) -> Result<()> {
    if options.tls_cert.is_some() != options.tls_key.is_some() {
        return Err(HarcurlError::InvalidArgs(
            "--tls-cert and --tls-key must be provided together".to_string(),
        ));
    }
    if options.sweep_interval.is_zero() {
        return Err(HarcurlError::InvalidArgs(
            "session sweep interval must be greater than zero".to_string(),
        ));
    }

    let addr: SocketAddr = format!("{}:{}", options.bind, options.port)
        .parse()
        .map_err(|err| HarcurlError::InvalidArgs(format!("Invalid bind address: {err}")))?;

    if options.matcher.api_key.is_none() {
        warn!("no matcher API key configured; analyze requests may be rejected upstream");
    }

    let store = Arc::new(SessionStore::new(options.session_ttl));
    let state = ServeState::new(
        Arc::clone(&store),
        Arc::new(HttpMatcher::new(options.matcher.clone())),
        Arc::new(SystemResolver),
        options.replay,
        options.max_upload_bytes,
    );

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let shutdown_signal = Arc::new(std::sync::Mutex::new(Some(shutdown_tx)));

    let ctrlc_state = shutdown_signal.clone();
    ctrlc::set_handler(move || {
        if let Ok(mut sender) = ctrlc_state.lock() {
            if let Some(tx) = sender.take() {
                let _ = tx.send(());
            }
        }
    })
    .map_err(|err| HarcurlError::InvalidArgs(format!("Failed to set ctrl+c handler: {err}")))?;

    let scheme = if options.tls_cert.is_some() {
        "https"
    } else {
        "http"
    };
    println!("Listening on {}://{}:{}", scheme, options.bind, options.port);

    let rt = tokio::runtime::Runtime::new()
        .map_err(|err| HarcurlError::InvalidArgs(format!("Failed to start runtime: {err}")))?;

    rt.block_on(async {
        let sweeper = store.spawn_sweeper(options.sweep_interval);
        info!(
            %addr,
            model = %options.matcher.model,
            ttl_secs = options.session_ttl.as_secs(),
            "server started"
        );

        let served = match (&options.tls_cert, &options.tls_key) {
            (Some(cert), Some(key)) => serve_tls(addr, state, cert, key, shutdown_rx).await,
            _ => run_plain_server(addr, state, shutdown_rx).await,
        };

        sweeper.abort();
        let dropped = store.len();
        store.clear();
        info!(dropped_sessions = dropped, "server stopped");
        served
    })
}

async fn run_plain_server(
    addr: SocketAddr,
    state: ServeState,
    shutdown_rx: oneshot::Receiver<()>,
) -> Result<()> {
    let make_svc = make_service_fn(move |_| {
        let state = state.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |req| handle_request(req, state.clone())))
        }
    });

    let server = hyper::Server::try_bind(&addr)
        .map_err(|err| HarcurlError::InvalidArgs(format!("Bind failed: {err}")))?
        .serve(make_svc);

    server
        .with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        })
        .await
        .map_err(|err| HarcurlError::InvalidArgs(format!("Server error: {err}")))?;

    Ok(())
}

#[cfg(feature = "tls")]
async fn serve_tls(
    addr: SocketAddr,
    state: ServeState,
    cert: &std::path::Path,
    key: &std::path::Path,
    shutdown_rx: oneshot::Receiver<()>,
) -> Result<()> {
    let tls_config = tls::load_tls_config(cert, key)?;
    let acceptor = tokio_rustls::TlsAcceptor::from(Arc::new(tls_config));
    tls::run_tls_server(addr, state, acceptor, shutdown_rx).await
}

#[cfg(not(feature = "tls"))]
async fn serve_tls(
    _addr: SocketAddr,
    _state: ServeState,
    _cert: &std::path::Path,
    _key: &std::path::Path,
    _shutdown_rx: oneshot::Receiver<()>,
) -> Result<()> {
    Err(HarcurlError::InvalidArgs(
        "TLS support is not enabled in this build (enable the 'tls' feature)".to_string(),
    ))
}

#[cfg(feature = "tls")]
mod tls {
    use std::fs::File;
    use std::io::BufReader;
    use std::net::SocketAddr;
    use std::path::Path;

    use hyper::service::service_fn;
    use tokio::sync::oneshot;
    use tokio_rustls::TlsAcceptor;
    use tracing::warn;

    use super::{handle_request, ServeState};
    use crate::error::{HarcurlError, Result};

    pub(super) async fn run_tls_server(
        addr: SocketAddr,
        state: ServeState,
        tls_acceptor: TlsAcceptor,
        mut shutdown_rx: oneshot::Receiver<()>,
    ) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|err| HarcurlError::InvalidArgs(format!("Bind failed: {err}")))?;

        loop {
            tokio::select! {
                _ = &mut shutdown_rx => {
                    break;
                }
                incoming = listener.accept() => {
                    let (stream, _) = match incoming {
                        Ok(v) => v,
                        Err(err) => {
                            warn!(error = %err, "accept failed");
                            continue;
                        }
                    };
                    let tls_acceptor = tls_acceptor.clone();
                    let state = state.clone();
                    tokio::spawn(async move {
                        let tls_stream = match tls_acceptor.accept(stream).await {
                            Ok(v) => v,
                            Err(err) => {
                                warn!(error = %err, "TLS handshake failed");
                                return;
                            }
                        };
                        let service = service_fn(move |req| handle_request(req, state.clone()));
                        if let Err(err) = hyper::server::conn::Http::new()
                            .serve_connection(tls_stream, service)
                            .await
                        {
                            warn!(error = %err, "connection error");
                        }
                    });
                }
            }
        }

        Ok(())
    }

    pub(super) fn load_tls_config(cert_path: &Path, key_path: &Path) -> Result<rustls::ServerConfig> {
        let mut cert_reader = BufReader::new(File::open(cert_path)?);
        let certs = rustls_pemfile::certs(&mut cert_reader)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|err| HarcurlError::InvalidArgs(format!("Failed to read certs: {err}")))?;
        if certs.is_empty() {
            return Err(HarcurlError::InvalidArgs(
                "No certificates found in --tls-cert".to_string(),
            ));
        }

        let mut key_reader = BufReader::new(File::open(key_path)?);
        let key = rustls_pemfile::private_key(&mut key_reader)
            .map_err(|err| HarcurlError::InvalidArgs(format!("Failed to read key: {err}")))?
            .ok_or_else(|| {
                HarcurlError::InvalidArgs("No private key found in --tls-key".to_string())
            })?;

        rustls::ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .map_err(|err| HarcurlError::InvalidArgs(format!("Invalid TLS key/cert: {err}")))
    }
}

/// Route one request. Never fails at the hyper level; every error becomes a JSON response.
pub async fn handle_request(
    req: Request<Body>,
    state: ServeState,
) -> std::result::Result<Response<Body>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    debug!(%method, %path, "request");

    let response = match (&method, path.as_str()) {
        (&Method::GET, "/health") => json_response(
            StatusCode::OK,
            &json!({"status": "ok", "sessions": state.store.len()}),
        ),
        (&Method::POST, "/api/upload") => handle_upload(req, &state).await,
        (&Method::POST, "/api/analyze") => handle_analyze(req, &state).await,
        (&Method::POST, "/api/execute") => handle_execute(req, &state).await,
        _ => error_response(
            StatusCode::NOT_FOUND,
            "not_found",
            &format!("No route for {method} {path}"),
        ),
    };

    if response.status().is_server_error() {
        warn!(%method, %path, status = response.status().as_u16(), "request failed");
    }
    Ok(response)
}

async fn handle_upload(req: Request<Body>, state: &ServeState) -> Response<Body> {
    let content_type = req
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_ascii_lowercase();
    if !content_type.contains("json") && !content_type.contains("har") {
        return error_response(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "unsupported_media_type",
            "Upload a HAR capture (application/json)",
        );
    }

    let bytes = match read_body(req, state.max_upload_bytes).await {
        Ok(bytes) => bytes,
        Err(response) => return response,
    };

    let store = Arc::clone(&state.store);
    match tokio::task::spawn_blocking(move || process_upload(&bytes, &store)).await {
        Ok(Ok(upload)) => json_response(StatusCode::OK, &upload),
        Ok(Err(err)) => harcurl_error_response(&err),
        Err(err) => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal",
            &format!("upload task failed: {err}"),
        ),
    }
}

async fn handle_analyze(req: Request<Body>, state: &ServeState) -> Response<Body> {
    let request: AnalyzeRequest = match read_json(req).await {
        Ok(request) => request,
        Err(response) => return response,
    };
    match run_analyze(&state.store, state.matcher.as_ref(), &request).await {
        Ok(analysis) => json_response(StatusCode::OK, &analysis),
        Err(err) => harcurl_error_response(&err),
    }
}

async fn handle_execute(req: Request<Body>, state: &ServeState) -> Response<Body> {
    let request: ExecuteRequest = match read_json(req).await {
        Ok(request) => request,
        Err(response) => return response,
    };
    match execute(&request, &state.replay, state.resolver.as_ref()).await {
        Ok(result) => json_response(StatusCode::OK, &result),
        Err(err) => harcurl_error_response(&err),
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(
    req: Request<Body>,
) -> std::result::Result<T, Response<Body>> {
    let bytes = read_body(req, None).await?;
    serde_json::from_slice(&bytes).map_err(|err| {
        error_response(
            StatusCode::BAD_REQUEST,
            "invalid_request",
            &format!("Invalid request body: {err}"),
        )
    })
}

/// Collect the body, answering 413 as soon as it is known to exceed `limit`.
async fn read_body(
    req: Request<Body>,
    limit: Option<u64>,
) -> std::result::Result<Bytes, Response<Body>> {
    let too_large = || {
        error_response(
            StatusCode::PAYLOAD_TOO_LARGE,
            "payload_too_large",
            "Capture exceeds the maximum upload size",
        )
    };

    if let Some(limit) = limit {
        let declared = req
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        if declared.is_some_and(|len| len > limit) {
            return Err(too_large());
        }
    }

    let mut body = req.into_body();
    let mut buf: Vec<u8> = Vec::new();
    while let Some(chunk) = body.data().await {
        let chunk = chunk.map_err(|err| {
            error_response(
                StatusCode::BAD_REQUEST,
                "invalid_request",
                &format!("Failed to read request body: {err}"),
            )
        })?;
        if limit.is_some_and(|limit| (buf.len() + chunk.len()) as u64 > limit) {
            return Err(too_large());
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(Bytes::from(buf))
}

fn status_for(err: &HarcurlError) -> StatusCode {
    match err {
        HarcurlError::MalformedInput(_)
        | HarcurlError::SchemaViolation(_)
        | HarcurlError::Json(_)
        | HarcurlError::InvalidArgs(_)
        | HarcurlError::InvalidUrl(_)
        | HarcurlError::SchemeNotAllowed(_)
        | HarcurlError::BlockedHost(_)
        | HarcurlError::BlockedIp(_) => StatusCode::BAD_REQUEST,
        HarcurlError::NotFound(_) => StatusCode::NOT_FOUND,
        HarcurlError::InvalidMatchIndex { .. }
        | HarcurlError::MatcherContractViolation(_)
        | HarcurlError::Matcher(_)
        | HarcurlError::ReplayFailure(_) => StatusCode::BAD_GATEWAY,
        HarcurlError::ReplayTimeout(_) => StatusCode::REQUEST_TIMEOUT,
        HarcurlError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn harcurl_error_response(err: &HarcurlError) -> Response<Body> {
    let status = status_for(err);
    match ReplayFailurePayload::from_error(err) {
        Some(payload) => json_response(status, &payload),
        None => error_response(status, err.kind(), &err.to_string()),
    }
}

fn error_response(status: StatusCode, kind: &str, message: &str) -> Response<Body> {
    json_response(status, &json!({"error": kind, "message": message}))
}

fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Response<Body> {
    let (status, body) = match serde_json::to_vec(value) {
        Ok(body) => (status, body),
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("{{\"error\":\"internal\",\"message\":\"{err}\"}}").into_bytes(),
        ),
    };
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::{MatchRequest, MatchResult, TokenUsage};
    use async_trait::async_trait;
    use serde_json::Value;

    struct FixedMatcher(i64);

    #[async_trait]
    impl Matcher for FixedMatcher {
        async fn select(&self, _request: MatchRequest<'_>) -> Result<MatchResult> {
            Ok(MatchResult {
                index: self.0,
                explanation: "fixed".to_string(),
                reasoning: String::new(),
                candidates: Vec::new(),
                usage: TokenUsage::default(),
                model: "fixed-model".to_string(),
            })
        }

        fn model(&self) -> &str {
            "fixed-model"
        }
    }

    fn state(index: i64, max_upload_bytes: Option<u64>) -> ServeState {
        ServeState::new(
            Arc::new(SessionStore::default()),
            Arc::new(FixedMatcher(index)),
            Arc::new(SystemResolver),
            ReplaySettings::default(),
            max_upload_bytes,
        )
    }

    fn post(path: &str, content_type: &str, body: impl Into<Body>) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(path)
            .header(CONTENT_TYPE, content_type)
            .body(body.into())
            .unwrap()
    }

    async fn send(state: &ServeState, req: Request<Body>) -> (StatusCode, Value) {
        let response = handle_request(req, state.clone()).await.unwrap();
        let status = response.status();
        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn capture() -> String {
        json!({"log": {"entries": [
            {
                "request": {"method": "GET", "url": "https://app.test/", "headers": []},
                "response": {"status": 200, "content": {"size": 10, "mimeType": "text/html"}}
            },
            {
                "request": {"method": "GET", "url": "https://app.test/api/me", "headers": [
                    {"name": "Cookie", "value": "sid=abc"}
                ]},
                "response": {"status": 200, "content": {"size": 80, "mimeType": "application/json"}}
            }
        ]}})
        .to_string()
    }

    #[tokio::test]
    async fn health_reports_session_count() {
        let state = state(1, None);
        let req = Request::get("/health").body(Body::empty()).unwrap();
        let (status, body) = send(&state, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["sessions"], 0);
    }

    #[tokio::test]
    async fn upload_then_analyze() {
        let state = state(1, None);
        let (status, upload) = send(&state, post("/api/upload", "application/json", capture())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(upload["stats"]["total"], 2);
        assert_eq!(upload["stats"]["kept"], 1);
        assert_eq!(upload["breakdown"]["html"], 1);
        assert_eq!(upload["allEntries"].as_array().unwrap().len(), 2);

        let session_id = upload["sessionId"].as_str().unwrap();
        let analyze = json!({"sessionId": session_id, "description": "current user"});
        let (status, body) = send(
            &state,
            post("/api/analyze", "application/json", analyze.to_string()),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["matchedEntry"]["index"], 1);
        assert_eq!(body["model"], "fixed-model");
        assert!(body["curl"].as_str().unwrap().contains("Cookie: [REDACTED]"));
        assert_eq!(body["request"]["headers"]["cookie"], "sid=abc");
        assert_eq!(body["totalEntries"], 2);
        assert_eq!(body["entriesAnalyzed"], 1);
    }

    #[tokio::test]
    async fn upload_checks_media_type_and_size() {
        let state = state(0, Some(64));
        let (status, body) = send(&state, post("/api/upload", "text/plain", capture())).await;
        assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert_eq!(body["error"], "unsupported_media_type");

        let (status, _) = send(&state, post("/api/upload", "application/json", capture())).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn upload_errors_are_bad_requests() {
        let state = state(0, None);
        let (status, body) = send(&state, post("/api/upload", "application/har+json", "{oops")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "malformed_input");

        let (status, body) =
            send(&state, post("/api/upload", "application/json", r#"{"log": 1}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "schema_violation");
    }

    #[tokio::test]
    async fn analyze_maps_matcher_and_session_errors() {
        let state = state(0, None);
        let missing = json!({"sessionId": "gone", "description": "x"}).to_string();
        let (status, body) = send(&state, post("/api/analyze", "application/json", missing)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "not_found");

        let (_, upload) = send(&state, post("/api/upload", "application/json", capture())).await;
        let req = json!({"sessionId": upload["sessionId"], "description": "x"}).to_string();
        let (status, body) = send(&state, post("/api/analyze", "application/json", req)).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"], "invalid_match_index");
    }

    #[tokio::test]
    async fn execute_rejects_private_targets() {
        let state = state(0, None);
        let req = json!({"url": "http://169.254.169.254/latest", "method": "GET"}).to_string();
        let (status, body) = send(&state, post("/api/execute", "application/json", req)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "blocked_ip");
    }

    #[tokio::test]
    async fn unknown_routes_are_json_404s() {
        let state = state(0, None);
        let req = Request::get("/api/upload").body(Body::empty()).unwrap();
        let (status, body) = send(&state, req).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "not_found");
    }

    #[test]
    fn replay_errors_use_structured_payloads() {
        let response = harcurl_error_response(&HarcurlError::ReplayTimeout(Duration::from_secs(30)));
        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
        let response =
            harcurl_error_response(&HarcurlError::ReplayFailure("refused".to_string()));
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}
