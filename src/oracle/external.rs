use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use super::{JudgmentOracle, PromptKind};
use crate::cache::JudgmentCache;
use crate::{CtxgraphError, Result};

const SYSTEM_PROMPT: &str =
    "You are a careful knowledge-graph reasoning assistant. Follow the requested output format exactly.";

/// Request structure for the chat-completions API
#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

/// Response structure from the chat-completions API
#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// One failed attempt, with whether another try may succeed.
struct AttemptError {
    error: CtxgraphError,
    retryable: bool,
}

fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Judgment oracle backed by an OpenAI-compatible chat-completions endpoint
///
/// Rate limits and server errors are retried with exponential backoff.
/// Replies are optionally cached by prompt kind and payload.
pub struct ExternalOracleJudge {
    client: Client,
    api_key: String,
    endpoint: String,
    model: String,
    max_retries: usize,
    cache: Option<Arc<JudgmentCache>>,
}

impl ExternalOracleJudge {
    /// Create a new judge
    ///
    /// # Arguments
    ///
    /// * `api_key` - Bearer token for the endpoint
    /// * `endpoint` - Full chat-completions URL
    /// * `model` - Model name (e.g., "gpt-4o-mini")
    /// * `timeout` - Per-request timeout
    pub fn new(api_key: String, endpoint: String, model: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            CtxgraphError::OracleUnavailable(format!("Failed to build HTTP client: {}", e))
        })?;

        Ok(Self {
            client,
            api_key,
            endpoint,
            model,
            max_retries: 2,
            cache: None,
        })
    }

    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_cache(mut self, cache: Option<Arc<JudgmentCache>>) -> Self {
        self.cache = cache;
        self
    }

    /// Single API request
    async fn complete(&self, payload: &str) -> std::result::Result<String, AttemptError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: payload,
                },
            ],
            temperature: 0.0,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| AttemptError {
                retryable: e.is_timeout() || e.is_connect(),
                error: CtxgraphError::OracleUnavailable(format!("Network error: {}", e)),
            })?;

        let status = response.status();

        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());

            return Err(AttemptError {
                retryable: is_retryable_status(status),
                error: CtxgraphError::OracleUnavailable(format!(
                    "Oracle API error {}: {}",
                    status, body
                )),
            });
        }

        let result: ChatResponse = response.json().await.map_err(|e| AttemptError {
            retryable: false,
            error: CtxgraphError::OracleUnavailable(format!("Failed to parse response: {}", e)),
        })?;

        result
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| AttemptError {
                retryable: false,
                error: CtxgraphError::OracleUnavailable("Empty response from oracle API".to_string()),
            })
    }

    async fn complete_with_retry(&self, kind: PromptKind, payload: &str) -> Result<String> {
        let start = std::time::Instant::now();
        let mut attempt = 0;
        let mut delay = Duration::from_secs(1);

        loop {
            match self.complete(payload).await {
                Ok(reply) => {
                    log::debug!(
                        "Oracle {} call took {:?} (attempt {})",
                        kind.as_str(),
                        start.elapsed(),
                        attempt + 1
                    );
                    return Ok(reply);
                }
                Err(e) if e.retryable && attempt < self.max_retries => {
                    log::warn!(
                        "Retry {}/{} after error: {}",
                        attempt + 1,
                        self.max_retries,
                        e.error
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                    attempt += 1;
                }
                Err(e) => return Err(e.error),
            }
        }
    }
}

#[async_trait]
impl JudgmentOracle for ExternalOracleJudge {
    async fn judge(&self, kind: PromptKind, payload: &str) -> Result<String> {
        if let Some(cache) = &self.cache {
            if let Some(cached) = cache.get(kind, payload) {
                log::debug!("Cache hit for {} judgment", kind.as_str());
                return Ok(cached);
            }
        }

        let reply = self.complete_with_retry(kind, payload).await?;

        if let Some(cache) = &self.cache {
            cache.put(kind, payload, reply.clone());
        }

        Ok(reply)
    }

    fn name(&self) -> &'static str {
        "external"
    }
}
