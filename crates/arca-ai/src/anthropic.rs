//! Claude Messages API client implementing [`TextOracle`].

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{OracleError, TextOracle};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5-20250929";

/// HTTP oracle backed by Anthropic's `/v1/messages` endpoint.
pub struct AnthropicOracle {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    messages: [Message<'a>; 1],
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

impl AnthropicOracle {
    /// Create a client. `base_url` defaults to the public API; a trailing
    /// slash is ignored.
    pub fn new(api_key: String, model: String, base_url: Option<String>) -> Result<Self, OracleError> {
        // Transport-level ceiling; the classifier applies its own per-call timeout.
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url
                .as_deref()
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            api_key,
            model,
            max_tokens: 1024,
        })
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    fn request_body<'a>(&'a self, prompt: &'a str) -> MessagesRequest<'a> {
        MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            temperature: 0.0,
            messages: [Message {
                role: "user",
                content: prompt,
            }],
        }
    }
}

#[async_trait]
impl TextOracle for AnthropicOracle {
    async fn generate(&self, prompt: &str) -> Result<String, OracleError> {
        let url = format!("{}/v1/messages", self.base_url);
        debug!(url = %url, model = %self.model, prompt_chars = prompt.len(), "calling oracle");

        let resp = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&self.request_body(prompt))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(OracleError::Server {
                status: status.as_u16(),
                body,
            });
        }

        let body: MessagesResponse = resp.json().await?;
        Ok(extract_text(body))
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Concatenated text blocks. May be empty; judging the output is the
/// classifier's job.
fn extract_text(body: MessagesResponse) -> String {
    body.content
        .into_iter()
        .filter(|block| block.kind == "text")
        .map(|block| block.text)
        .collect()
}
