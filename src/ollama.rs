//! Ollama chat client
//!
//! Talks to a local Ollama server's /api/chat endpoint with format=json so
//! the model is constrained to machine-parseable output.

use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Inference backend capability: system instruction + user message in, raw
/// model output out. Implemented by [`OllamaClient`] and by test mocks.
#[async_trait]
pub trait ReplyBackend: Send + Sync {
    async fn chat(&self, system_prompt: &str, message: &str) -> Result<String>;
}

pub struct OllamaClient {
    base_url: String,
    model: String,
    client: Client,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    stream: bool,
    format: &'static str,
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}

impl OllamaClient {
    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            // Local inference can be slow on first load
            client: Client::builder()
                .timeout(Duration::from_secs(300))
                .connect_timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    fn build_request(&self, system_prompt: &str, message: &str) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: vec![
                Message {
                    role: "system",
                    content: system_prompt.to_string(),
                },
                Message {
                    role: "user",
                    content: message.to_string(),
                },
            ],
            stream: false,
            format: "json",
        }
    }
}

#[async_trait]
impl ReplyBackend for OllamaClient {
    async fn chat(&self, system_prompt: &str, message: &str) -> Result<String> {
        let url = format!("{}/api/chat", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&self.build_request(system_prompt, message))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::Backend(format!(
                "Ollama returned {}. Is the server running? (ollama serve)",
                response.status()
            )));
        }

        let chat: ChatResponse = response.json().await?;
        Ok(chat.message.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_url_trailing_slash_trimmed() {
        let client = OllamaClient::new("http://192.168.1.100:11434/", "llama3.1:8b");
        assert_eq!(client.base_url, "http://192.168.1.100:11434");
    }

    #[test]
    fn test_request_shape() {
        let client = OllamaClient::new("http://localhost:11434", "llama3.1:8b");
        let req = client.build_request("You are Alex.", "Hi");
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"format\":\"json\""));
        assert!(json.contains("\"stream\":false"));
        assert!(json.contains("llama3.1:8b"));
        assert!(json.contains("\"role\":\"system\""));
        assert!(json.contains("\"role\":\"user\""));
    }

    #[test]
    fn test_response_deserializes() {
        let json = r#"{"message":{"role":"assistant","content":"{\"Happy\":\"Hi!\"}"}}"#;
        let resp: ChatResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.message.content, "{\"Happy\":\"Hi!\"}");
    }

    #[test]
    fn test_response_with_extra_fields() {
        let json = r#"{"model":"llama3.1:8b","message":{"role":"assistant","content":"x"},"done":true,"eval_count":42}"#;
        let resp: ChatResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.message.content, "x");
    }
}
