use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use super::{parse_match_payload, MatchRequest, MatchResult, Matcher, TokenUsage};
use crate::error::{HarcurlError, Result};

const SYSTEM_PROMPT: &str = "You identify which HTTP request in a browser capture performs the \
action a user describes. Each line of the capture summary has the form \
`[index] METHOD url -> STATUS (mime, size)`; lines ending in `[xN]` stand for N calls to the \
same endpoint with different parameter values. Reply with a single JSON object and nothing \
else: {\"index\": <index of the best request>, \"explanation\": <one or two sentences>, \
\"reasoning\": <your step-by-step reasoning>, \"candidates\": [{\"index\": <n>, \"url\": <url>, \
\"reason\": <why>, \"confidence\": <0-100>}]}. List up to five candidates, best first. Only use \
indices that appear in the summary.";

const NO_REASONING: &str = "Set \"reasoning\" to an empty string.";

#[derive(Debug, Clone)]
pub struct HttpMatcherOptions {
    /// OpenAI-compatible chat completions URL.
    pub endpoint: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
    pub max_tokens: u32,
}

/// Matcher backed by an OpenAI-compatible chat completions API.
pub struct HttpMatcher {
    options: HttpMatcherOptions,
    agent: ureq::Agent,
}

impl HttpMatcher {
    pub fn new(options: HttpMatcherOptions) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(options.timeout).build();
        Self { options, agent }
    }

    fn request_body(&self, request: &MatchRequest<'_>) -> Value {
        let mut system = SYSTEM_PROMPT.to_string();
        if !request.reasoning {
            system.push(' ');
            system.push_str(NO_REASONING);
        }
        let user = format!(
            "Capture summary:\n{}\n\nThe user is looking for: {}",
            request.summary, request.description
        );
        json!({
            "model": self.options.model,
            "max_tokens": self.options.max_tokens,
            "temperature": 0,
            "response_format": {"type": "json_object"},
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
        })
    }
}

#[async_trait]
impl Matcher for HttpMatcher {
    async fn select(&self, request: MatchRequest<'_>) -> Result<MatchResult> {
        let body = self.request_body(&request);
        let agent = self.agent.clone();
        let endpoint = self.options.endpoint.clone();
        let api_key = self.options.api_key.clone();

        let response = tokio::task::spawn_blocking(move || {
            call_api(&agent, &endpoint, api_key.as_deref(), &body)
        })
        .await
        .map_err(|err| HarcurlError::Matcher(format!("matcher task failed: {err}")))??;

        let mut result = parse_completion(&response)?;
        if result.model.is_empty() {
            result.model = self.options.model.clone();
        }
        if !request.reasoning {
            result.reasoning.clear();
        }
        Ok(result)
    }

    fn model(&self) -> &str {
        &self.options.model
    }
}

fn call_api(
    agent: &ureq::Agent,
    endpoint: &str,
    api_key: Option<&str>,
    body: &Value,
) -> Result<Value> {
    let mut request = agent.post(endpoint).set("content-type", "application/json");
    if let Some(key) = api_key {
        request = request.set("authorization", &format!("Bearer {key}"));
    }

    match request.send_json(body) {
        Ok(response) => response
            .into_json::<Value>()
            .map_err(|err| HarcurlError::Matcher(format!("unreadable API response: {err}"))),
        Err(ureq::Error::Status(code, response)) => {
            let text = response.into_string().unwrap_or_default();
            Err(HarcurlError::Matcher(format!("API error ({code}): {text}")))
        }
        Err(ureq::Error::Transport(err)) => Err(HarcurlError::Matcher(err.to_string())),
    }
}

/// Pull the match out of a chat completions response.
fn parse_completion(response: &Value) -> Result<MatchResult> {
    let content = response
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            HarcurlError::MatcherContractViolation("response has no message content".to_string())
        })?;
    debug!(chars = content.len(), "matcher replied");

    let object = extract_json_object(content).ok_or_else(|| {
        HarcurlError::MatcherContractViolation("reply does not contain a JSON object".to_string())
    })?;
    let payload: Value = serde_json::from_str(object).map_err(|err| {
        HarcurlError::MatcherContractViolation(format!("reply is not valid JSON: {err}"))
    })?;

    let mut result = parse_match_payload(&payload)?;
    result.usage = TokenUsage {
        input_tokens: response
            .pointer("/usage/prompt_tokens")
            .and_then(Value::as_u64)
            .unwrap_or(0),
        output_tokens: response
            .pointer("/usage/completion_tokens")
            .and_then(Value::as_u64)
            .unwrap_or(0),
    };
    result.model = response
        .get("model")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    Ok(result)
}

/// The outermost `{...}` span, tolerating code fences or prose around it.
fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}
