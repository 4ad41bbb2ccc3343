//! HTTP-backed collaborator adapters (push gateway, OpenAI-compatible coach)

use super::traits::*;
use crate::error::CollaboratorError;
use async_trait::async_trait;
use parc_types::{Notification, UserId};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

const DEFAULT_OPENAI_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_MAX_TOKENS: u32 = 300;
const HTTP_TIMEOUT_SECS: u64 = 30;

const COACH_SYSTEM_PROMPT: &str = "You are a warm, practical fasting coach. The user is in the \
middle of a fast and is fighting a craving right now. Reply in at most four short sentences: \
acknowledge the feeling, give one concrete thing to do in the next five minutes, and remind \
them why they started. Never give medical advice; if they feel unwell, tell them to eat and \
consult a professional.";

fn build_http_client() -> Result<Client, CollaboratorError> {
    Client::builder()
        .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
        .build()
        .map_err(|e| CollaboratorError::Unavailable(format!("failed to build HTTP client: {}", e)))
}

fn truncate(value: &str, max_chars: usize) -> String {
    let mut chars = value.chars();
    let truncated: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{}...", truncated)
    } else {
        truncated
    }
}

async fn reject(response: reqwest::Response) -> CollaboratorError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    CollaboratorError::Rejected {
        status,
        message: truncate(&body, 320),
    }
}

/// Push delivery through an HTTP push gateway
///
/// The gateway owns provider credentials, retries, and deep-link URLs.
#[derive(Debug, Clone)]
pub struct WebhookPush {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl WebhookPush {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>) -> Result<Self, CollaboratorError> {
        Ok(Self {
            client: build_http_client()?,
            endpoint: endpoint.into(),
            api_key,
        })
    }

    async fn post(&self, recipients: &[UserId], notification: &Notification) -> CollaboratorResult<()> {
        let payload = json!({
            "recipients": recipients,
            "title": notification.title,
            "body": notification.body,
            "kind": notification.kind,
            "data": notification.data,
        });

        let mut request = self.client.post(&self.endpoint).json(&payload);
        if let Some(api_key) = self.api_key.as_deref() {
            request = request.bearer_auth(api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| CollaboratorError::Transport(format!("push gateway request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(reject(response).await);
        }
        Ok(())
    }
}

#[async_trait]
impl PushDelivery for WebhookPush {
    async fn send(&self, user_id: &UserId, notification: &Notification) -> CollaboratorResult<()> {
        self.post(std::slice::from_ref(user_id), notification).await
    }

    async fn send_batch(
        &self,
        user_ids: &[UserId],
        notification: &Notification,
    ) -> CollaboratorResult<()> {
        if user_ids.is_empty() {
            return Ok(());
        }
        self.post(user_ids, notification).await
    }
}

#[derive(Debug, Deserialize)]
struct OpenAiMessage {
    content: Value,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

/// Craving coach backed by an OpenAI-compatible chat completions API
#[derive(Debug, Clone)]
pub struct OpenAiCoach {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: Option<f32>,
}

impl OpenAiCoach {
    pub fn new(
        endpoint: Option<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        max_tokens: Option<u32>,
        temperature: Option<f32>,
    ) -> Result<Self, CollaboratorError> {
        Ok(Self {
            client: build_http_client()?,
            endpoint: endpoint.unwrap_or_else(|| DEFAULT_OPENAI_ENDPOINT.to_string()),
            api_key: api_key.into(),
            model: model.into(),
            max_tokens: max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            temperature,
        })
    }

    fn payload(&self, user_id: &UserId, description: &str) -> Value {
        let prompt = if description.trim().is_empty() {
            "I'm struggling with a craving right now.".to_string()
        } else {
            format!("I'm struggling with a craving right now: {}", description.trim())
        };

        let mut payload = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": COACH_SYSTEM_PROMPT },
                { "role": "user", "content": prompt },
            ],
            "max_tokens": self.max_tokens,
            "user": user_id.as_str(),
        });
        if let Some(temp) = self.temperature {
            payload["temperature"] = json!(temp);
        }
        payload
    }
}

#[async_trait]
impl CravingCoach for OpenAiCoach {
    async fn craving_help(&self, user_id: &UserId, description: &str) -> CollaboratorResult<String> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&self.payload(user_id, description))
            .send()
            .await
            .map_err(|e| CollaboratorError::Transport(format!("coach request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(reject(response).await);
        }

        let body: OpenAiResponse = response
            .json()
            .await
            .map_err(|e| CollaboratorError::InvalidResponse(e.to_string()))?;

        let text = body
            .choices
            .first()
            .map(|choice| extract_text(&choice.message.content))
            .unwrap_or_default();

        let text = text.trim();
        if text.is_empty() {
            return Err(CollaboratorError::InvalidResponse(
                "coach returned no text".to_string(),
            ));
        }
        Ok(text.to_string())
    }
}

fn extract_text(content: &Value) -> String {
    match content {
        Value::String(text) => text.clone(),
        Value::Array(parts) => parts
            .iter()
            .filter_map(|part| part.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("\n"),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_text_handles_parts() {
        assert_eq!(extract_text(&json!("hi")), "hi");
        assert_eq!(
            extract_text(&json!([{ "type": "text", "text": "a" }, { "text": "b" }])),
            "a\nb"
        );
        assert_eq!(extract_text(&json!(null)), "");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("abcdef", 3), "abc...");
        assert_eq!(truncate("abc", 3), "abc");
    }

    #[test]
    fn test_coach_payload_includes_description() {
        let coach = OpenAiCoach::new(None, "key", "gpt-4o-mini", None, Some(0.4)).unwrap();
        let payload = coach.payload(&UserId::new("u"), "sugar urge ");
        assert_eq!(payload["model"], "gpt-4o-mini");
        assert_eq!(payload["max_tokens"], DEFAULT_MAX_TOKENS);
        assert!(payload["messages"][1]["content"]
            .as_str()
            .unwrap()
            .ends_with("sugar urge"));
        assert!(payload.get("temperature").is_some());
    }
}
