//! Gemini `generateContent` client.

use std::time::Duration;

use anyhow::{Result, anyhow};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use reqwest::Client;
use serde::{Deserialize, Serialize};

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";
const API_TIMEOUT_SECS: u64 = 60;

pub struct GeminiClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

impl GenerateResponse {
    /// Text of the first candidate, parts concatenated.
    fn first_text(self) -> Option<String> {
        let content = self.candidates.into_iter().next()?.content?;
        let text: String = content.parts.into_iter().filter_map(|p| p.text).collect();
        Some(text)
    }
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            model: model.into(),
            base_url: GEMINI_API_BASE.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Sends a text prompt. With `json_output` the model is constrained to JSON.
    pub async fn generate(&self, prompt: &str, json_output: bool) -> Result<String> {
        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: Some(prompt.to_string()),
                    inline_data: None,
                }],
            }],
            generation_config: json_output.then(|| GenerationConfig {
                response_mime_type: "application/json".to_string(),
            }),
        };

        self.send(&request).await
    }

    /// Asks the model about an attached file (image or audio).
    pub async fn describe(&self, instruction: &str, mime_type: &str, bytes: &[u8]) -> Result<String> {
        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![
                    Part {
                        text: Some(instruction.to_string()),
                        inline_data: None,
                    },
                    Part {
                        text: None,
                        inline_data: Some(InlineData {
                            mime_type: mime_type.to_string(),
                            data: B64.encode(bytes),
                        }),
                    },
                ],
            }],
            generation_config: None,
        };

        self.send(&request).await
    }

    async fn send(&self, request: &GenerateRequest) -> Result<String> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(request)
            .timeout(Duration::from_secs(API_TIMEOUT_SECS))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!("Gemini API error: {}", response.status()));
        }

        let body: GenerateResponse = response.json().await?;
        body.first_text()
            .ok_or_else(|| anyhow!("Gemini returned no candidates"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_mode_sets_response_mime_type() {
        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: Some("hi".into()),
                    inline_data: None,
                }],
            }],
            generation_config: Some(GenerationConfig {
                response_mime_type: "application/json".into(),
            }),
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["generationConfig"]["responseMimeType"], "application/json");
        assert_eq!(value["contents"][0]["parts"][0]["text"], "hi");
        assert!(value["contents"][0]["parts"][0].get("inlineData").is_none());
    }

    #[test]
    fn first_candidate_parts_are_joined() {
        let body: GenerateResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"{\"message\":"},{"text":"\"hi\"}"}]}}]}"#,
        )
        .unwrap();
        assert_eq!(body.first_text().as_deref(), Some(r#"{"message":"hi"}"#));
    }

    #[test]
    fn blocked_prompt_has_no_text() {
        let body: GenerateResponse =
            serde_json::from_str(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#).unwrap();
        assert!(body.first_text().is_none());
    }
}
