//! OpenAI chat-completions oracle
//!
//! One completion per call. Network failures, 5xx and 429 are retried by the
//! configured retry policy; anything else is returned to the caller.

use crate::execution::RetryPolicy;
use crate::oracle::{OracleError, TradeOracle, SYSTEM_PROMPT};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const OPENAI_API_BASE: &str = "https://api.openai.com/v1";
const MAX_TOKENS: u32 = 256;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: MessageContent,
}

#[derive(Debug, Deserialize)]
struct MessageContent {
    #[serde(default)]
    content: Option<String>,
}

pub struct OpenAiOracle {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    retry: RetryPolicy,
}

impl OpenAiOracle {
    pub fn new(
        api_key: String,
        model: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            api_key,
            model: model.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            retry,
        })
    }

    async fn complete(&self, prompt: &str) -> Result<String, OracleError> {
        let request = ChatRequest {
            model: &self.model,
            max_tokens: MAX_TOKENS,
            temperature: 0.0,
            messages: vec![
                Message {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                Message {
                    role: "user",
                    content: prompt,
                },
            ],
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let code = status.as_u16();
            if code == 429 || status.is_server_error() {
                return Err(OracleError::Transient(format!("HTTP {}: {}", code, body)));
            }
            return Err(OracleError::Api { status: code, body });
        }

        let completion: ChatResponse = response
            .json()
            .await
            .map_err(|e| OracleError::Decode(e.to_string()))?;

        let text = completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(OracleError::Empty)?;

        Ok(strip_code_fence(&text).to_string())
    }
}

/// Drop a surrounding ``` block if the model wrapped its answer in one
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    if !trimmed.starts_with("```") {
        return trimmed;
    }
    let without_open = trimmed.trim_start_matches("```");
    // Language tag on the opening fence
    let body = match without_open.find('\n') {
        Some(idx) => &without_open[idx + 1..],
        None => without_open,
    };
    body.trim_end_matches("```").trim()
}

#[async_trait]
impl TradeOracle for OpenAiOracle {
    async fn invoke(&self, prompt: &str) -> Result<String, OracleError> {
        self.retry
            .run("oracle completion", OracleError::is_transient, || {
                self.complete(prompt)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn oracle(base_url: &str, max_attempts: u32) -> OpenAiOracle {
        OpenAiOracle::new(
            "sk-test".to_string(),
            "gpt-4o-mini",
            base_url,
            Duration::from_secs(5),
            RetryPolicy::new(max_attempts, Duration::from_millis(1)),
        )
        .unwrap()
    }

    const COMPLETION: &str =
        r#"{"choices":[{"index":0,"message":{"role":"assistant","content":"buy BTC 24\nsell ETH"}}]}"#;

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("buy BTC 24"), "buy BTC 24");
        assert_eq!(strip_code_fence("```\nbuy BTC 24\n```"), "buy BTC 24");
        assert_eq!(strip_code_fence("```text\nsell all\n```"), "sell all");
    }

    #[tokio::test]
    async fn test_invoke_sends_system_prompt() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer sk-test")
            .match_body(Matcher::AllOf(vec![
                Matcher::PartialJson(serde_json::json!({"model": "gpt-4o-mini"})),
                Matcher::Regex(r#""role":"system""#.to_string()),
                Matcher::Regex(r#""role":"user","content":"\[\]""#.to_string()),
            ]))
            .with_status(200)
            .with_body(COMPLETION)
            .create_async()
            .await;

        let text = oracle(&server.url(), 1).invoke("[]").await.unwrap();

        mock.assert_async().await;
        assert_eq!(text, "buy BTC 24\nsell ETH");
    }

    #[tokio::test]
    async fn test_rate_limit_retried() {
        let mut server = mockito::Server::new_async().await;
        let limited = server
            .mock("POST", "/chat/completions")
            .with_status(429)
            .with_body("slow down")
            .expect(3)
            .create_async()
            .await;

        let err = oracle(&server.url(), 3).invoke("[]").await.unwrap_err();

        limited.assert_async().await;
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_auth_error_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .with_status(401)
            .with_body(r#"{"error":{"message":"Incorrect API key"}}"#)
            .expect(1)
            .create_async()
            .await;

        let err = oracle(&server.url(), 3).invoke("[]").await.unwrap_err();

        mock.assert_async().await;
        assert!(matches!(err, OracleError::Api { status: 401, .. }));
    }

    #[tokio::test]
    async fn test_empty_choices() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(r#"{"choices":[]}"#)
            .create_async()
            .await;

        let err = oracle(&server.url(), 1).invoke("[]").await.unwrap_err();
        assert!(matches!(err, OracleError::Empty));
    }
}
