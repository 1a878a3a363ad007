use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::sync::Arc;

use crate::core::config::LlmConfig;

#[async_trait]
pub trait LlmClient: Send + Sync + Debug {
    async fn chat(&self, system: &str, user: &str) -> Result<String>;
}

/// Builds the backend client for the active provider. Returns `Ok(None)` when
/// no credential is configured, so the call is never attempted.
pub fn create_llm(config: &LlmConfig) -> Result<Option<Arc<dyn LlmClient>>> {
    let Some(api_key) = config.api_key() else {
        return match config.provider.as_str() {
            "gemini" | "openai" => Ok(None),
            other => Err(anyhow!("Unknown LLM provider: {}", other)),
        };
    };

    let client: Arc<dyn LlmClient> = match config.provider.as_str() {
        "gemini" => {
            let model = config.gemini.as_ref().map(|c| c.model.as_str()).unwrap_or("");
            Arc::new(GeminiClient::new(
                api_key,
                model,
                config.temperature,
                config.max_output_tokens,
            ))
        }
        "openai" => {
            let base_url = config.openai.as_ref().and_then(|c| c.base_url.as_deref());
            let model = config.openai.as_ref().map(|c| c.model.as_str()).unwrap_or("");
            Arc::new(OpenAIClient::new(
                api_key,
                model,
                base_url,
                config.temperature,
                config.max_output_tokens,
            ))
        }
        other => return Err(anyhow!("Unknown LLM provider: {}", other)),
    };
    log::info!("Using {} for AI hints", config.provider);
    Ok(Some(client))
}

// --- Gemini ---
#[derive(Debug)]
struct GeminiClient {
    api_key: String,
    model: String,
    temperature: f32,
    max_output_tokens: u32,
    client: reqwest::Client,
}

impl GeminiClient {
    fn new(api_key: &str, model: &str, temperature: f32, max_output_tokens: u32) -> Self {
        Self {
            api_key: api_key.to_string(),
            model: model.to_string(),
            temperature,
            max_output_tokens,
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiSystemInstruction>,
    #[serde(rename = "generationConfig")]
    generation_config: GeminiGenerationConfig,
}

#[derive(Serialize)]
struct GeminiContent {
    role: String,
    parts: Vec<GeminiPart>,
}

#[derive(Serialize)]
struct GeminiSystemInstruction {
    parts: Vec<GeminiPart>,
}

#[derive(Serialize)]
struct GeminiPart {
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
    error: Option<GeminiError>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContentResponse>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct GeminiContentResponse {
    #[serde(default)]
    parts: Vec<GeminiPartResponse>,
}

#[derive(Deserialize)]
struct GeminiPartResponse {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize, Debug)]
struct GeminiError {
    message: String,
}

impl GeminiClient {
    fn build_request(&self, system: &str, user: &str) -> GeminiRequest {
        GeminiRequest {
            contents: vec![GeminiContent {
                role: "user".to_string(),
                parts: vec![GeminiPart { text: user.to_string() }],
            }],
            system_instruction: Some(GeminiSystemInstruction {
                parts: vec![GeminiPart { text: system.to_string() }],
            }),
            generation_config: GeminiGenerationConfig {
                temperature: self.temperature,
                max_output_tokens: self.max_output_tokens,
            },
        }
    }
}

fn gemini_text(result: GeminiResponse) -> Result<String> {
    if let Some(err) = result.error {
        return Err(anyhow!("Gemini API returned error: {}", err.message));
    }

    let candidates = result.candidates.unwrap_or_default();
    let Some(first) = candidates.first() else {
        return Err(anyhow!("Gemini response has no candidates"));
    };

    match &first.content {
        // Multi-part answers are concatenated; an empty string is a valid answer.
        Some(content) if !content.parts.is_empty() => {
            Ok(content.parts.iter().map(|p| p.text.as_str()).collect())
        }
        _ => {
            let reason = first.finish_reason.as_deref().unwrap_or("UNKNOWN");
            Err(anyhow!("Gemini response empty. Finish reason: {}", reason))
        }
    }
}

#[async_trait]
impl LlmClient for GeminiClient {
    async fn chat(&self, system: &str, user: &str) -> Result<String> {
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent",
            self.model
        );

        let resp = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&self.build_request(system, user))
            .send()
            .await?;

        if !resp.status().is_success() {
            let error_text = resp.text().await?;
            return Err(anyhow!("Gemini API error: {}", error_text));
        }

        let response_text = resp.text().await?;
        let result: GeminiResponse = serde_json::from_str(&response_text).map_err(|e| {
            anyhow!("Failed to parse Gemini response: {}. Body: {}", e, response_text)
        })?;

        gemini_text(result)
    }
}

// --- OpenAI ---

#[derive(Debug)]
struct OpenAIClient {
    api_key: String,
    model: String,
    base_url: String,
    temperature: f32,
    max_tokens: u32,
    client: reqwest::Client,
}

impl OpenAIClient {
    fn new(
        api_key: &str,
        model: &str,
        base_url: Option<&str>,
        temperature: f32,
        max_tokens: u32,
    ) -> Self {
        Self {
            api_key: api_key.to_string(),
            model: model.to_string(),
            base_url: base_url
                .unwrap_or("https://api.openai.com/v1")
                .trim_end_matches('/')
                .to_string(),
            temperature,
            max_tokens,
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct OpenAIMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessageResponse,
}

#[derive(Deserialize)]
struct OpenAIMessageResponse {
    content: Option<String>,
}

#[async_trait]
impl LlmClient for OpenAIClient {
    async fn chat(&self, system: &str, user: &str) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);

        let request_body = OpenAIRequest {
            model: self.model.clone(),
            messages: vec![
                OpenAIMessage { role: "system".to_string(), content: system.to_string() },
                OpenAIMessage { role: "user".to_string(), content: user.to_string() },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request_body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let error_text = resp.text().await?;
            return Err(anyhow!("OpenAI API error: {}", error_text));
        }

        let result: OpenAIResponse = resp.json().await?;
        result
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| anyhow!("OpenAI response empty or missing content"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keyed(provider: &str) -> LlmConfig {
        let mut config = LlmConfig { provider: provider.to_string(), ..LlmConfig::default() };
        config.set_api_key("key".to_string());
        config
    }

    #[test]
    fn test_create_llm_without_key_is_none() -> Result<()> {
        assert!(create_llm(&LlmConfig::default())?.is_none());
        Ok(())
    }

    #[test]
    fn test_create_llm_with_key() -> Result<()> {
        assert!(create_llm(&keyed("gemini"))?.is_some());
        assert!(create_llm(&keyed("openai"))?.is_some());
        Ok(())
    }

    #[test]
    fn test_create_llm_unknown_provider() {
        let config = LlmConfig { provider: "mystery".to_string(), ..LlmConfig::default() };
        assert!(create_llm(&config).is_err());
    }

    #[test]
    fn test_gemini_request_carries_generation_config() -> Result<()> {
        let client = GeminiClient::new("key", "model", 0.7, 100);
        let body = serde_json::to_value(client.build_request("coach", "step"))?;

        assert_eq!(body["generationConfig"]["maxOutputTokens"], 100);
        let temperature = body["generationConfig"]["temperature"].as_f64().unwrap_or_default();
        assert!((temperature - 0.7).abs() < 1e-6);
        assert_eq!(body["contents"][0]["parts"][0]["text"], "step");
        assert_eq!(body["system_instruction"]["parts"][0]["text"], "coach");
        Ok(())
    }

    #[test]
    fn test_gemini_response_parsing_safety_block() {
        let json = r#"{
            "candidates": [
                {
                    "finishReason": "SAFETY",
                    "index": 0
                }
            ]
        }"#;

        let result: GeminiResponse = serde_json::from_str(json).unwrap();
        let err = gemini_text(result).unwrap_err();
        assert!(err.to_string().contains("SAFETY"));
    }

    #[test]
    fn test_gemini_response_parsing_api_error() {
        let json = r#"{ "error": { "code": 400, "message": "API key not valid" } }"#;

        let result: GeminiResponse = serde_json::from_str(json).unwrap();
        let err = gemini_text(result).unwrap_err();
        assert!(err.to_string().contains("API key not valid"));
    }

    #[test]
    fn test_gemini_response_parsing_success() {
        let json = r#"{
            "candidates": [
                {
                    "content": {
                        "parts": [
                            { "text": "Запитайте " },
                            { "text": "про бюджет." }
                        ],
                        "role": "model"
                    },
                    "finishReason": "STOP",
                    "index": 0
                }
            ]
        }"#;

        let result: GeminiResponse = serde_json::from_str(json).unwrap();
        assert_eq!(gemini_text(result).unwrap(), "Запитайте про бюджет.");
    }

    #[test]
    fn test_openai_response_parsing_success() {
        let json = r#"{
            "id": "chatcmpl-123",
            "object": "chat.completion",
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": "Offer two meeting slots."
                },
                "finish_reason": "stop"
            }]
        }"#;

        let result: OpenAIResponse = serde_json::from_str(json).unwrap();
        assert_eq!(
            result.choices[0].message.content.as_deref(),
            Some("Offer two meeting slots.")
        );
    }
}
