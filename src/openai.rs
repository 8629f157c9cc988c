// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Client for OpenAI-compatible chat completions with image input

use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::LabelerConfig;
use crate::{AtlasError, Result};

/// Longest slice of an error body kept in error messages
const ERROR_BODY_LIMIT: usize = 220;

/// Chat completions API client
pub struct OpenAiClient {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: Vec<ContentPart>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Serialize)]
struct ImageUrl {
    url: String,
}

impl OpenAiClient {
    /// Create a client for the configured endpoint and model
    pub fn new(config: &LabelerConfig, api_key: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AtlasError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Send one prompt with one JPEG image and return the reply text
    pub async fn chat_with_image(&self, prompt: &str, image_base64: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: vec![
                    ContentPart::Text { text: prompt.to_string() },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: format!("data:image/jpeg;base64,{}", image_base64),
                        },
                    },
                ],
            }],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        debug!("Sending vision request: model={}", self.model);

        let response = self.client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message: String = body.chars().take(ERROR_BODY_LIMIT).collect();
            if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                return Err(AtlasError::Auth { status: status.as_u16(), message });
            }
            return Err(AtlasError::Status { status: status.as_u16(), message });
        }

        let body: Value = response.json().await?;
        extract_text(&body).ok_or_else(|| AtlasError::Api("response has no message content".to_string()))
    }

    /// `chat_with_image` with up to `retries` immediate retries on transient
    /// failures
    pub async fn chat_with_retry(&self, prompt: &str, image_base64: &str, retries: u32) -> Result<String> {
        let mut attempt = 0;
        loop {
            match self.chat_with_image(prompt, image_base64).await {
                Ok(text) => return Ok(text),
                Err(e) if attempt < retries && e.is_transient() => {
                    attempt += 1;
                    warn!("Retrying labeling request (attempt {}): {}", attempt + 1, e);
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Pull the assistant text out of a chat completions response.
///
/// `content` is either a plain string or a list of parts, of which the
/// `text` parts are joined.
pub fn extract_text(body: &Value) -> Option<String> {
    let content = body
        .get("choices")?
        .as_array()?
        .first()?
        .get("message")?
        .get("content")?;

    match content {
        Value::String(s) => Some(s.clone()),
        Value::Array(parts) => {
            let text: Vec<&str> = parts
                .iter()
                .filter(|p| p.get("type").and_then(Value::as_str) == Some("text"))
                .filter_map(|p| p.get("text").and_then(Value::as_str))
                .collect();
            if text.is_empty() {
                None
            } else {
                Some(text.join("\n"))
            }
        }
        _ => None,
    }
}
