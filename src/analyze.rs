//! Match a description against a stored session and turn the winner into a
//! curl command.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::compact::{summarize, CompactEntry};
use crate::curl::{generate_curl, RequestDetails};
use crate::error::{HarcurlError, Result};
use crate::guard::assert_allowed_scheme;
use crate::matcher::{Candidate, MatchRequest, Matcher, TokenUsage};
use crate::session::SessionStore;

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeRequest {
    pub session_id: String,
    pub description: String,
    #[serde(default = "default_true")]
    pub deduplicate: bool,
    #[serde(default = "default_true")]
    pub reasoning: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeResponse {
    pub curl: String,
    pub request: RequestDetails,
    pub matched_entry: CompactEntry,
    pub explanation: String,
    pub reasoning: String,
    pub candidates: Vec<Candidate>,
    pub usage: TokenUsage,
    pub model: String,
    /// Entries in the capture before filtering.
    pub total_entries: usize,
    /// Filtered entries the summary was built from.
    pub entries_analyzed: usize,
    /// Lines in the summary after deduplication.
    pub summary_lines: usize,
    pub latency_ms: u64,
}

pub async fn run_analyze(
    store: &SessionStore,
    matcher: &dyn Matcher,
    request: &AnalyzeRequest,
) -> Result<AnalyzeResponse> {
    let description = request.description.trim();
    if description.is_empty() {
        return Err(HarcurlError::InvalidArgs(
            "description must not be empty".to_string(),
        ));
    }

    let session = store.get(&request.session_id)?;
    let summary = summarize(&session.compact, request.deduplicate);

    let started = Instant::now();
    let result = matcher
        .select(MatchRequest {
            summary: &summary.text,
            description,
            reasoning: request.reasoning,
        })
        .await?;
    let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

    let matched = usize::try_from(result.index)
        .ok()
        .and_then(|index| session.entry_by_index(index))
        .ok_or_else(|| {
            warn!(
                session_id = %session.id,
                index = result.index,
                "matcher picked an entry outside the session"
            );
            HarcurlError::InvalidMatchIndex {
                index: result.index,
                available: session.entries.len(),
            }
        })?;

    assert_allowed_scheme(&matched.entry.request.url)?;

    let model = if result.model.is_empty() {
        matcher.model().to_string()
    } else {
        result.model
    };

    info!(
        session_id = %session.id,
        index = matched.index,
        model = %model,
        latency_ms,
        input_tokens = result.usage.input_tokens,
        output_tokens = result.usage.output_tokens,
        "analysis complete"
    );

    Ok(AnalyzeResponse {
        curl: generate_curl(&matched.entry),
        request: RequestDetails::from_entry(&matched.entry),
        matched_entry: CompactEntry::new(matched.index, &matched.entry),
        explanation: result.explanation,
        reasoning: result.reasoning,
        candidates: result.candidates,
        usage: result.usage,
        model,
        total_entries: session.total_entries,
        entries_analyzed: session.entries.len(),
        summary_lines: summary.unique_count,
        latency_ms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::MatchResult;
    use crate::upload::process_upload;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    struct ScriptedMatcher {
        index: i64,
        seen: Mutex<Option<(String, bool)>>,
    }

    impl ScriptedMatcher {
        fn picking(index: i64) -> Self {
            Self {
                index,
                seen: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl Matcher for ScriptedMatcher {
        async fn select(&self, request: MatchRequest<'_>) -> Result<MatchResult> {
            *self.seen.lock().unwrap() = Some((request.summary.to_string(), request.reasoning));
            Ok(MatchResult {
                index: self.index,
                explanation: "Creates the order".to_string(),
                reasoning: String::new(),
                candidates: Vec::new(),
                usage: TokenUsage {
                    input_tokens: 100,
                    output_tokens: 20,
                },
                model: String::new(),
            })
        }

        fn model(&self) -> &str {
            "scripted"
        }
    }

    fn upload(store: &SessionStore) -> String {
        let har = json!({"log": {"entries": [
            {
                "request": {"method": "GET", "url": "https://shop.test/", "headers": []},
                "response": {"status": 200, "content": {"size": 900, "mimeType": "text/html"}}
            },
            {
                "request": {"method": "GET", "url": "https://shop.test/api/items?page=1", "headers": []},
                "response": {"status": 200, "content": {"size": 300, "mimeType": "application/json"}}
            },
            {
                "request": {"method": "GET", "url": "https://shop.test/api/items?page=2", "headers": []},
                "response": {"status": 200, "content": {"size": 300, "mimeType": "application/json"}}
            },
            {
                "request": {
                    "method": "POST",
                    "url": "https://shop.test/api/orders",
                    "headers": [
                        {"name": ":authority", "value": "shop.test"},
                        {"name": "Authorization", "value": "Bearer secret"},
                        {"name": "Content-Type", "value": "application/json"}
                    ],
                    "postData": {"mimeType": "application/json", "text": "{\"sku\":\"A1\"}"}
                },
                "response": {"status": 201, "content": {"size": 50, "mimeType": "application/json"}}
            }
        ]}});
        process_upload(&serde_json::to_vec(&har).unwrap(), store)
            .unwrap()
            .session_id
    }

    fn request(session_id: &str) -> AnalyzeRequest {
        AnalyzeRequest {
            session_id: session_id.to_string(),
            description: "place an order".to_string(),
            deduplicate: true,
            reasoning: false,
        }
    }

    #[tokio::test]
    async fn builds_the_command_for_the_matched_entry() {
        let store = SessionStore::default();
        let id = upload(&store);
        let matcher = ScriptedMatcher::picking(3);

        let response = run_analyze(&store, &matcher, &request(&id)).await.unwrap();
        assert_eq!(response.matched_entry.index, 3);
        assert_eq!(response.matched_entry.method, "POST");
        assert!(response.curl.contains("'https://shop.test/api/orders'"));
        assert!(response.curl.contains("Authorization: [REDACTED]"));
        assert!(response.curl.contains("--data-raw '{\"sku\":\"A1\"}'"));
        assert_eq!(
            response.request.headers.get("authorization").map(String::as_str),
            Some("Bearer secret")
        );
        assert!(!response.request.headers.contains_key(":authority"));
        assert_eq!(response.model, "scripted");
        assert_eq!(response.usage.total(), 120);
        assert_eq!(response.total_entries, 4);
        assert_eq!(response.entries_analyzed, 3);
        assert_eq!(response.summary_lines, 2);

        let (summary, reasoning) = matcher.seen.lock().unwrap().clone().unwrap();
        assert!(!reasoning);
        assert!(summary.contains("[x2]"));
        assert!(!summary.contains("shop.test/ →"));
    }

    #[tokio::test]
    async fn index_outside_the_filtered_set_fails_loudly() {
        let store = SessionStore::default();
        let id = upload(&store);

        for index in [0, 4, 99] {
            let err = run_analyze(&store, &ScriptedMatcher::picking(index), &request(&id))
                .await
                .unwrap_err();
            assert!(
                matches!(err, HarcurlError::InvalidMatchIndex { available: 3, .. }),
                "{index}: {err}"
            );
        }
    }

    #[tokio::test]
    async fn unknown_session_is_not_found() {
        let store = SessionStore::default();
        let err = run_analyze(&store, &ScriptedMatcher::picking(0), &request("nope"))
            .await
            .unwrap_err();
        assert!(matches!(err, HarcurlError::NotFound(_)));
    }

    #[tokio::test]
    async fn dedup_flag_controls_the_summary() {
        let store = SessionStore::default();
        let id = upload(&store);
        let matcher = ScriptedMatcher::picking(1);
        let mut req = request(&id);
        req.deduplicate = false;

        let response = run_analyze(&store, &matcher, &req).await.unwrap();
        assert_eq!(response.summary_lines, 3);
        let (summary, _) = matcher.seen.lock().unwrap().clone().unwrap();
        assert!(summary.contains("page=1"));
        assert!(summary.contains("page=2"));
    }

    #[test]
    fn flags_default_to_true() {
        let req: AnalyzeRequest =
            serde_json::from_value(json!({"sessionId": "s", "description": "d"})).unwrap();
        assert!(req.deduplicate);
        assert!(req.reasoning);
    }
}
