//! Language model fallback for messages no local rule answers.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("language model request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("language model rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("language model returned no text")]
    EmptyResponse,
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn generate(&self, system_prompt: &str, message: &str) -> Result<String, LlmError>;
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 2],
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'a str,
    parts: [Part<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

impl GenerateResponse {
    fn first_text(self) -> Option<String> {
        self.candidates.into_iter().next()?.content?.parts.into_iter().next()?.text.filter(|t| !t.trim().is_empty())
    }
}

/// Google Gemini `generateContent` client.
pub struct GeminiClient {
    client: Client,
    url: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> Result<Self, LlmError> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self { client, url: url.into(), api_key: api_key.into() })
    }
}

#[async_trait]
impl LanguageModel for GeminiClient {
    async fn generate(&self, system_prompt: &str, message: &str) -> Result<String, LlmError> {
        // The system prompt travels as a leading user turn.
        let body = GenerateRequest {
            contents: [
                Content { role: "user", parts: [Part { text: system_prompt }] },
                Content { role: "user", parts: [Part { text: message }] },
            ],
        };
        let response = self.client.post(&self.url).header("X-goog-api-key", &self.api_key).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(LlmError::Rejected { status: status.as_u16(), message });
        }
        let parsed: GenerateResponse = response.json().await?;
        debug!(candidates = parsed.candidates.len(), "language model answered");
        parsed.first_text().ok_or(LlmError::EmptyResponse)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tokio::sync::Mutex;

    /// Answers with a fixed text and remembers the prompts it saw.
    pub(crate) struct FakeModel {
        pub reply: Option<String>,
        pub prompts: Mutex<Vec<String>>,
    }

    impl FakeModel {
        pub fn answering(reply: &str) -> Self { Self { reply: Some(reply.into()), prompts: Mutex::new(vec![]) } }
        pub fn failing() -> Self { Self { reply: None, prompts: Mutex::new(vec![]) } }
    }

    #[async_trait]
    impl LanguageModel for FakeModel {
        async fn generate(&self, _system_prompt: &str, message: &str) -> Result<String, LlmError> {
            self.prompts.lock().await.push(message.to_string());
            self.reply.clone().ok_or(LlmError::EmptyResponse)
        }
    }

    #[test]
    fn test_request_shape() {
        let body = GenerateRequest {
            contents: [
                Content { role: "user", parts: [Part { text: "rules" }] },
                Content { role: "user", parts: [Part { text: "hi" }] },
            ],
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["contents"][0]["parts"][0]["text"], "rules");
        assert_eq!(json["contents"][1]["role"], "user");
        assert_eq!(json["contents"][1]["parts"][0]["text"], "hi");
    }

    #[test]
    fn test_first_text_extraction() {
        let parsed: GenerateResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"Hello!"}],"role":"model"}}]}"#,
        ).unwrap();
        assert_eq!(parsed.first_text().as_deref(), Some("Hello!"));
        let empty: GenerateResponse = serde_json::from_str(r#"{"candidates":[]}"#).unwrap();
        assert_eq!(empty.first_text(), None);
    }
}
