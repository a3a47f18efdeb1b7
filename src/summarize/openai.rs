use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use super::{build_prompt, ProviderOutcome, SummaryProvider, PROVIDER_TIMEOUT};

pub const OPENAI_URL: &str = "https://api.openai.com/v1/chat/completions";

const SYSTEM_PROMPT: &str =
    "You are a professional news summarizer. Create clear, accurate, and objective summaries.";

/// OpenAI Chat Completions provider.
pub struct OpenAiProvider {
    http: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
}

impl OpenAiProvider {
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
            endpoint: OPENAI_URL.to_string(),
        })
    }

    /// Point at a different base URL (proxies, local mocks).
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
    messages: Vec<Msg<'a>>,
    temperature: f32,
    max_tokens: u32,
}

/// Roughly 1.5 tokens per word, capped at 1000.
pub fn max_tokens_for(word_limit: usize) -> u32 {
    ((word_limit as f64 * 1.5) as u32).min(1_000)
}

/// Pull `choices[0].message.content` out of a response body.
pub fn parse_response(body: &str) -> ProviderOutcome {
    let v: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(e) => return ProviderOutcome::Failure(format!("malformed JSON: {e}")),
    };
    match v
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
    {
        Some(text) if !text.trim().is_empty() => ProviderOutcome::Success(text.to_string()),
        Some(_) => ProviderOutcome::Failure("empty completion".to_string()),
        None => ProviderOutcome::Failure("Invalid response format from OpenAI".to_string()),
    }
}

#[async_trait]
impl SummaryProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
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
            messages: vec![
                Msg {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                Msg {
                    role: "user",
                    content: &prompt,
                },
            ],
            temperature: 0.3,
            max_tokens: max_tokens_for(word_limit),
        };

        let resp = match self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_first_choice() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"Short summary."}}]}"#;
        assert_eq!(
            parse_response(body),
            ProviderOutcome::Success("Short summary.".into())
        );
    }

    #[test]
    fn missing_field_and_bad_json_are_failures() {
        assert!(matches!(
            parse_response(r#"{"choices":[]}"#),
            ProviderOutcome::Failure(_)
        ));
        assert!(matches!(
            parse_response(r#"{"choices":[{"message":{"content":42}}]}"#),
            ProviderOutcome::Failure(_)
        ));
        assert!(matches!(parse_response("<html>"), ProviderOutcome::Failure(_)));
    }

    #[test]
    fn token_budget_is_capped() {
        assert_eq!(max_tokens_for(100), 150);
        assert_eq!(max_tokens_for(700), 1_000);
    }

    #[tokio::test]
    async fn unconfigured_provider_skips() {
        let p = OpenAiProvider::new("", "gpt-3.5-turbo").unwrap();
        assert!(!p.is_configured());
        assert!(matches!(
            p.summarize("text", 100).await,
            ProviderOutcome::Skipped(_)
        ));
    }
}
