use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use super::{build_prompt, ProviderOutcome, SummaryProvider, PROVIDER_TIMEOUT};

pub const CLAUDE_URL: &str = "https://api.anthropic.com/v1/messages";
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic Messages API provider.
pub struct ClaudeProvider {
    http: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
}

impl ClaudeProvider {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(super::USER_AGENT)
            .connect_timeout(Duration::from_secs(10))
            .timeout(PROVIDER_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            api_key: api_key.into(),
            model: model.into(),
            endpoint: CLAUDE_URL.to_string(),
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[derive(Serialize)]
struct Msg<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct Req<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<Msg<'a>>,
}

/// Two tokens per word, capped at 1500.
pub fn max_tokens_for(word_limit: usize) -> u32 {
    (word_limit.saturating_mul(2) as u32).min(1_500)
}

/// Pull `content[0].text` out of a response body.
pub fn parse_response(body: &str) -> ProviderOutcome {
    let v: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(e) => return ProviderOutcome::Failure(format!("malformed JSON: {e}")),
    };
    match v.pointer("/content/0/text").and_then(Value::as_str) {
        Some(text) if !text.trim().is_empty() => ProviderOutcome::Success(text.to_string()),
        Some(_) => ProviderOutcome::Failure("empty completion".to_string()),
        None => {
            let api_err = v
                .pointer("/error/message")
                .and_then(Value::as_str)
                .unwrap_or("Invalid response format from Claude");
            ProviderOutcome::Failure(api_err.to_string())
        }
    }
}

#[async_trait]
impl SummaryProvider for ClaudeProvider {
    fn name(&self) -> &'static str {
        "claude"
    }

    fn is_configured(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    async fn summarize(&self, content: &str, word_limit: usize) -> ProviderOutcome {
        if !self.is_configured() {
            return ProviderOutcome::Skipped("no API key");
        }
        let prompt = build_prompt(content, word_limit);
        let req = Req {
            model: &self.model,
            max_tokens: max_tokens_for(word_limit),
            messages: vec![Msg {
                role: "user",
                content: &prompt,
            }],
        };

        let resp = match self
            .http
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&req)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return ProviderOutcome::Failure(format!("request failed: {e}")),
        };

        let status = resp.status();
        if !status.is_success() {
            return ProviderOutcome::Failure(format!("HTTP {status}"));
        }
        match resp.text().await {
            Ok(body) => parse_response(&body),
            Err(e) => ProviderOutcome::Failure(format!("reading body: {e}")),
        }
    }
}
