// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Ollama API client, the default classification backend

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::classifier::{ClassificationService, ClassifierInput};
use crate::config::EngineConfig;
use crate::{DocuflowError, Result};

/// Ollama API client
pub struct OllamaClient {
    client: Client,
    base_url: String,
    text_model: String,
    vision_model: String,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    images: Option<Vec<&'a str>>,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Deserialize)]
struct TagsResponse {
    models: Vec<ModelInfo>,
}

#[derive(Deserialize)]
struct ModelInfo {
    name: String,
}

impl OllamaClient {
    /// Create a client using the first entry of each model priority list
    pub fn new(engine: &EngineConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(engine.timeout_secs))
            .build()?;

        // Normalize URL
        let base_url = engine.url
            .trim_end_matches('/')
            .replace("/api/generate", "")
            .replace("/api/chat", "");

        Ok(Self {
            client,
            base_url,
            text_model: engine.models.text.first().cloned().unwrap_or_default(),
            vision_model: engine.models.vision.first().cloned().unwrap_or_default(),
        })
    }

    /// Check if the service is reachable
    pub async fn health_check(&self) -> Result<()> {
        let url = format!("{}/api/tags", self.base_url);

        self.client
            .get(&url)
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| {
                DocuflowError::ServiceUnavailable(format!(
                    "Cannot connect to Ollama at {}: {}",
                    self.base_url, e
                ))
            })?;

        Ok(())
    }

    /// List available models
    pub async fn list_models(&self) -> Result<Vec<String>> {
        let url = format!("{}/api/tags", self.base_url);

        let response = self.client
            .get(&url)
            .send()
            .await?;

        let tags: TagsResponse = response.json().await?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    /// Pick the best available text and vision models
    pub async fn select_models(&mut self, engine: &EngineConfig) -> Result<()> {
        let available = self.list_models().await?;
        self.text_model = select_model(&engine.models.text, &available);
        self.vision_model = select_model(&engine.models.vision, &available);
        info!("Connected to: {} (vision: {})", self.text_model, self.vision_model);
        Ok(())
    }

    pub fn text_model(&self) -> &str {
        &self.text_model
    }

    pub fn vision_model(&self) -> &str {
        &self.vision_model
    }

    async fn post_generate(&self, request: &GenerateRequest<'_>) -> Result<String> {
        let url = format!("{}/api/generate", self.base_url);

        debug!("Sending request to Ollama: model={}", request.model);

        let response = self.client
            .post(&url)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        let result: GenerateResponse = response.json().await?;
        Ok(result.response)
    }
}

#[async_trait]
impl ClassificationService for OllamaClient {
    async fn generate(&self, prompt: &str, input: &ClassifierInput) -> Result<String> {
        let request = match input {
            ClassifierInput::Text(text) => GenerateRequest {
                model: &self.text_model,
                prompt: format!("{}\n\nCONTENT:\n{}", prompt, text),
                stream: false,
                images: None,
            },
            ClassifierInput::Image(encoded) => GenerateRequest {
                model: &self.vision_model,
                prompt: prompt.to_string(),
                stream: false,
                images: Some(vec![encoded.as_str()]),
            },
        };

        self.post_generate(&request).await
    }
}

/// Map a failed HTTP status to the error taxonomy
fn classify_status(status: StatusCode, body: &str) -> DocuflowError {
    let lowered = body.to_ascii_lowercase();
    let throttled = ["quota", "rate limit", "429"].iter().any(|needle| lowered.contains(needle));
    if status == StatusCode::TOO_MANY_REQUESTS || throttled {
        DocuflowError::RateLimited(format!("{} {}", status, body.trim()))
    } else {
        DocuflowError::ServiceUnavailable(format!("Ollama returned status {}", status))
    }
}

/// First priority entry that is available, then any stable model, then the top priority
pub fn select_model(priorities: &[String], available: &[String]) -> String {
    let is_available = |wanted: &str| {
        available.iter().find(|m| *m == wanted || m.starts_with(&format!("{}:", wanted)))
    };

    if let Some(found) = priorities.iter().find_map(|p| is_available(p)) {
        return found.clone();
    }

    if let Some(stable) = available.iter().find(|m| !m.contains("exp") && !m.contains("preview")) {
        warn!("No preferred model available, falling back to {}", stable);
        return stable.clone();
    }

    priorities.first().cloned().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_select_model_prefers_priority_order() {
        let available = names(&["mistral:latest", "llama3.2:3b", "gemma2:9b"]);
        let chosen = select_model(&names(&["llama3.2:3b", "mistral"]), &available);
        assert_eq!(chosen, "llama3.2:3b");

        let chosen = select_model(&names(&["phi3", "mistral"]), &available);
        assert_eq!(chosen, "mistral:latest");
    }

    #[test]
    fn test_select_model_skips_experimental_fallbacks() {
        let available = names(&["qwen-exp:1b", "phi3-preview", "tinyllama:latest"]);
        assert_eq!(select_model(&names(&["llava"]), &available), "tinyllama:latest");
        assert_eq!(select_model(&names(&["llava"]), &[]), "llava");
    }

    #[test]
    fn test_quota_errors_are_rate_limits() {
        assert!(classify_status(StatusCode::TOO_MANY_REQUESTS, "").is_rate_limit());
        assert!(classify_status(StatusCode::FORBIDDEN, "Quota exceeded for project").is_rate_limit());
        assert!(classify_status(StatusCode::BAD_GATEWAY, r#"{"error": "upstream returned 429"}"#).is_rate_limit());
        assert!(!classify_status(StatusCode::INTERNAL_SERVER_ERROR, "model crashed").is_rate_limit());
    }

    #[test]
    fn test_url_is_normalized() {
        let mut engine = crate::AppConfig::default().ai_engine;
        engine.url = "http://localhost:11434/api/generate/".to_string();
        let client = OllamaClient::new(&engine).unwrap();
        assert_eq!(client.base_url, "http://localhost:11434");
        assert_eq!(client.text_model(), "llama3.2:3b");
        assert_eq!(client.vision_model(), engine.models.vision[0]);
    }
}
