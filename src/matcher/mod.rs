//! The classification step, modelled as a single capability: given the
//! compact summary and the user's description, pick one entry.
//!
//! Implementations return loosely shaped JSON, so every payload goes through
//! [`parse_match_payload`] before anything downstream trusts it.

mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{HarcurlError, Result};

pub use http::{HttpMatcher, HttpMatcherOptions};

#[derive(Debug, Clone, Copy)]
pub struct MatchRequest<'a> {
    pub summary: &'a str,
    pub description: &'a str,
    pub reasoning: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Candidate {
    pub index: usize,
    pub url: String,
    pub reason: String,
    /// 0-100.
    pub confidence: u8,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// A validated matcher answer. `index` is still unchecked against the session.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub index: i64,
    pub explanation: String,
    pub reasoning: String,
    pub candidates: Vec<Candidate>,
    pub usage: TokenUsage,
    pub model: String,
}

#[async_trait]
pub trait Matcher: Send + Sync {
    async fn select(&self, request: MatchRequest<'_>) -> Result<MatchResult>;

    /// Model identifier reported when a response does not name one.
    fn model(&self) -> &str;
}

/// Validate the JSON object a matcher produced.
///
/// `index` must be an integer; a negative one is reported as an invalid index
/// rather than a shape error. `explanation`, `reasoning` and `candidates` are
/// optional, but when present they must have the right types. Candidate
/// confidences are clamped into 0-100.
pub fn parse_match_payload(payload: &Value) -> Result<MatchResult> {
    let Some(obj) = payload.as_object() else {
        return Err(contract("response is not a JSON object"));
    };

    let index = match obj.get("index") {
        Some(value) => integer(value).ok_or_else(|| contract("'index' is not an integer"))?,
        None => return Err(contract("missing numeric 'index'")),
    };
    if index < 0 {
        return Err(HarcurlError::InvalidMatchIndex {
            index,
            available: 0,
        });
    }

    let explanation = optional_string(obj.get("explanation"), "explanation")?;
    let reasoning = optional_string(obj.get("reasoning"), "reasoning")?;

    let candidates = match obj.get("candidates") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .map(parse_candidate)
            .collect::<Result<Vec<_>>>()?,
        Some(_) => return Err(contract("'candidates' is not an array")),
    };

    Ok(MatchResult {
        index,
        explanation,
        reasoning,
        candidates,
        usage: TokenUsage::default(),
        model: String::new(),
    })
}

fn parse_candidate(value: &Value) -> Result<Candidate> {
    let Some(obj) = value.as_object() else {
        return Err(contract("candidate is not an object"));
    };
    let index = obj
        .get("index")
        .and_then(integer)
        .and_then(|i| usize::try_from(i).ok())
        .ok_or_else(|| contract("candidate 'index' is not a non-negative integer"))?;
    let confidence = match obj.get("confidence") {
        Some(value) => value
            .as_f64()
            .ok_or_else(|| contract("candidate 'confidence' is not a number"))?,
        None => 0.0,
    };

    Ok(Candidate {
        index,
        url: optional_string(obj.get("url"), "candidate url")?,
        reason: optional_string(obj.get("reason"), "candidate reason")?,
        confidence: confidence.round().clamp(0.0, 100.0) as u8,
    })
}

fn integer(value: &Value) -> Option<i64> {
    if let Some(i) = value.as_i64() {
        return Some(i);
    }
    let f = value.as_f64()?;
    if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

fn optional_string(value: Option<&Value>, field: &str) -> Result<String> {
    match value {
        None | Some(Value::Null) => Ok(String::new()),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(contract(&format!("'{field}' is not a string"))),
    }
}

fn contract(message: &str) -> HarcurlError {
    HarcurlError::MatcherContractViolation(message.to_string())
}
