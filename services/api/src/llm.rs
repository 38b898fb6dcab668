//! Language model port for the chatbot
//!
//! The chatbot only depends on [`LlmClient`]. `main` wires in [`GeminiClient`] when
//! `GEMINI_API_KEY` is set and [`DisabledLlm`] otherwise, so handlers always have a client.

use async_trait::async_trait;
use common::error::PortError;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::{env, sync::Arc, time::Duration};
use tracing::{info, warn};

const DEFAULT_MODEL: &str = "gemini-2.5-flash";
const DEFAULT_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub const SYSTEM_PROMPT: &str = "You are the assistant of a specialty coffee shop.

Your job:
- Recommend drinks and food from the menu in a friendly, professional tone
- Answer questions about the menu, prices and store policies
- Help customers look up their orders and delivery status

Rules:
- Keep answers short and easy to read
- Never invent products, prices or order details; only use the data you are given
- When you are unsure, offer to hand the conversation over to a staff member

Store facts:
- Menu: coffee (espresso, latte, cappuccino, cold brew), tea, blended drinks, juices and smoothies, pastries, snacks, combos, whole-bean coffee
- Opening hours: 7:00 - 23:00 every day
- Quality issues can be reported within 24 hours for an exchange";

/// Who produced a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTurn {
    pub role: TurnRole,
    pub content: String,
}

/// Text generation port
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Answer `prompt` given earlier turns of the same conversation
    async fn generate(&self, prompt: &str, history: &[ChatTurn]) -> Result<String, PortError>;

    fn is_enabled(&self) -> bool {
        true
    }

    async fn shutdown(&self) {}
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub model: String,
    pub api_url: String,
}

impl LlmConfig {
    /// Read the Gemini settings; `None` when no API key is configured
    ///
    /// # Environment Variables
    /// - `GEMINI_API_KEY`: API key (optional)
    /// - `GEMINI_MODEL`: model name (default: gemini-2.5-flash)
    /// - `GEMINI_API_URL`: API base URL (default: the public v1beta endpoint)
    pub fn from_env() -> Option<Self> {
        let api_key = env::var("GEMINI_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())?;

        Some(Self {
            api_key,
            model: env::var("GEMINI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            api_url: env::var("GEMINI_API_URL")
                .unwrap_or_else(|_| DEFAULT_API_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
        })
    }
}

/// Gemini `generateContent` over REST
pub struct GeminiClient {
    http: reqwest::Client,
    config: LlmConfig,
}

impl GeminiClient {
    pub fn new(config: LlmConfig) -> Result<Self, PortError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| PortError::Unavailable(format!("http client: {}", e)))?;

        info!("Gemini client initialized with model {}", config.model);
        Ok(Self { http, config })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.api_url, self.config.model
        )
    }
}

/// Request body with the system prompt, prior turns and the new prompt
pub fn build_request_body(history: &[ChatTurn], prompt: &str) -> Value {
    let mut contents: Vec<Value> = history
        .iter()
        .map(|turn| {
            let role = match turn.role {
                TurnRole::User => "user",
                TurnRole::Assistant => "model",
            };
            json!({ "role": role, "parts": [{ "text": turn.content }] })
        })
        .collect();

    contents.push(json!({ "role": "user", "parts": [{ "text": prompt }] }));

    json!({
        "systemInstruction": { "parts": [{ "text": SYSTEM_PROMPT }] },
        "contents": contents,
    })
}

/// Concatenated text parts of the first candidate
pub fn extract_text(response: &Value) -> Result<String, PortError> {
    let parts = response
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)
        .ok_or_else(|| PortError::InvalidResponse("no candidate content".to_string()))?;

    let text: String = parts
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect();

    if text.trim().is_empty() {
        return Err(PortError::InvalidResponse("empty completion".to_string()));
    }
    Ok(text.trim().to_string())
}

#[async_trait]
impl LlmClient for GeminiClient {
    async fn generate(&self, prompt: &str, history: &[ChatTurn]) -> Result<String, PortError> {
        let response = self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", &self.config.api_key)
            .json(&build_request_body(history, prompt))
            .send()
            .await
            .map_err(|e| PortError::Upstream(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PortError::Upstream(format!("gemini returned {}: {}", status, body)));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| PortError::InvalidResponse(e.to_string()))?;

        extract_text(&body)
    }
}

/// Used when no model is configured; every call fails so callers fall back
pub struct DisabledLlm;

#[async_trait]
impl LlmClient for DisabledLlm {
    async fn generate(&self, _prompt: &str, _history: &[ChatTurn]) -> Result<String, PortError> {
        Err(PortError::Unavailable("no language model configured".to_string()))
    }

    fn is_enabled(&self) -> bool {
        false
    }
}

/// Pick the client for the current environment
pub fn llm_from_env() -> Result<Arc<dyn LlmClient>, PortError> {
    match LlmConfig::from_env() {
        Some(config) => Ok(Arc::new(GeminiClient::new(config)?)),
        None => {
            warn!("GEMINI_API_KEY not set, chatbot will answer with fallback messages");
            Ok(Arc::new(DisabledLlm))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_request_body_maps_roles() {
        let history = vec![
            ChatTurn {
                role: TurnRole::User,
                content: "Hi".to_string(),
            },
            ChatTurn {
                role: TurnRole::Assistant,
                content: "Hello! How can I help?".to_string(),
            },
        ];

        let body = build_request_body(&history, "Do you have oat milk?");
        let contents = body["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(contents[2]["role"], "user");
        assert_eq!(contents[2]["parts"][0]["text"], "Do you have oat milk?");
        assert!(body["systemInstruction"]["parts"][0]["text"].is_string());
    }

    #[test]
    fn test_extract_text() {
        let response = json!({
            "candidates": [{
                "content": { "parts": [{ "text": "We do, " }, { "text": "for every drink." }] }
            }]
        });
        assert_eq!(extract_text(&response).unwrap(), "We do, for every drink.");

        assert!(extract_text(&json!({ "candidates": [] })).is_err());
        assert!(extract_text(&json!({
            "candidates": [{ "content": { "parts": [{ "text": "  " }] } }]
        }))
        .is_err());
    }

    #[tokio::test]
    async fn test_disabled_client_fails() {
        let client = DisabledLlm;
        assert!(!client.is_enabled());
        assert!(client.generate("hello", &[]).await.is_err());
    }

    #[test]
    #[serial]
    fn test_config_requires_key() {
        unsafe {
            env::remove_var("GEMINI_API_KEY");
        }
        assert!(LlmConfig::from_env().is_none());

        unsafe {
            env::set_var("GEMINI_API_KEY", "test-key");
            env::set_var("GEMINI_API_URL", "http://localhost:9999/v1/");
        }
        let config = LlmConfig::from_env().unwrap();
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.api_url, "http://localhost:9999/v1");

        unsafe {
            env::remove_var("GEMINI_API_KEY");
            env::remove_var("GEMINI_API_URL");
        }
    }
}
