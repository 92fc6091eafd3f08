// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Document classification
//!
//! Two seams live here. [`ClassificationService`] is the raw remote backend
//! (prompt in, free-form text out). [`Classifier`] is what the pipeline talks
//! to: it always yields a [`ClassificationResult`], degrading to a sentinel
//! when the backend misbehaves. [`DocumentAnalyst`] bridges the two and owns
//! the retry policy.

pub mod content;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, error, warn};

use crate::config::{AppConfig, ScheduleConfig};
use crate::processor::PendingFile;
use crate::Result;

pub use content::ClassifierInput;

/// Category of the sentinel returned on a hard service failure
pub const ERROR_CATEGORY: &str = "ERROR";

/// Category of the sentinel returned when no usable payload was produced
pub const UNSORTED_CATEGORY: &str = "UNSORTED";

/// Structured metadata extracted from a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationResult {
    #[serde(default, deserialize_with = "lenient_string")]
    pub category: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub new_filename: String,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub is_expense: bool,
    #[serde(default, deserialize_with = "lenient_text")]
    pub vendor: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub amount: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub date: Option<String>,
}

impl ClassificationResult {
    /// Metadata with just a category and a proposed name
    pub fn named(category: &str, new_filename: &str) -> Self {
        Self {
            category: category.to_string(),
            new_filename: new_filename.to_string(),
            is_expense: false,
            vendor: None,
            amount: None,
            date: None,
        }
    }

    /// Sentinel for a non-retryable service failure
    pub fn failed() -> Self {
        Self::named(ERROR_CATEGORY, "Processing_Failed")
    }

    /// Sentinel for a response that never parsed
    pub fn unsorted() -> Self {
        Self::named(UNSORTED_CATEGORY, "Unknown_Doc")
    }

    /// Whether this result belongs in the finance ledger
    pub fn is_financial(&self) -> bool {
        self.is_expense || self.amount.as_deref().is_some_and(|a| !a.trim().is_empty())
    }
}

/// Accepts `true`, `"true"`, `"yes"` and friends; anything else is false
fn lenient_bool<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<bool, D::Error> {
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Bool(b) => b,
        serde_json::Value::String(s) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "yes" | "1"),
        serde_json::Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        _ => false,
    })
}

/// Keeps strings and numbers as text, drops nulls
fn lenient_text<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Option<String>, D::Error> {
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(s) => Some(s),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    })
}

/// Like [`lenient_text`], with null and other shapes as the empty string
fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    Ok(lenient_text(deserializer)?.unwrap_or_default())
}

/// Raw classification backend
#[async_trait]
pub trait ClassificationService: Send + Sync {
    /// Send the instruction and the document content, return the raw reply
    async fn generate(&self, prompt: &str, input: &ClassifierInput) -> Result<String>;
}

/// Maps a pending file to metadata; never fails
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn analyze(&self, file: &PendingFile) -> ClassificationResult;
}

/// Extract the outermost brace-delimited span of a free-form reply
pub fn extract_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}

/// Parse a service reply into metadata; `None` is a soft failure
pub fn parse_response(text: &str) -> Option<ClassificationResult> {
    let payload = extract_json(text).unwrap_or(text);
    let value: serde_json::Value = serde_json::from_str(payload).ok()?;
    match value.as_object() {
        Some(obj) if !obj.is_empty() => serde_json::from_value(value).ok(),
        _ => None,
    }
}

/// [`Classifier`] over any [`ClassificationService`], with bounded retries
pub struct DocumentAnalyst<S> {
    service: S,
    prompt: String,
    attempts: u32,
    schedule: ScheduleConfig,
    max_excerpt_chars: usize,
}

impl<S: ClassificationService> DocumentAnalyst<S> {
    pub fn new(service: S, config: &AppConfig) -> Self {
        Self {
            service,
            prompt: config.prompt.clone(),
            attempts: config.ai_engine.classify_attempts.max(1),
            schedule: config.schedule.clone(),
            max_excerpt_chars: config.ai_engine.max_excerpt_chars,
        }
    }

    /// Run the retry policy against already prepared input
    pub async fn classify(&self, input: &ClassifierInput) -> ClassificationResult {
        for attempt in 1..=self.attempts {
            match self.service.generate(&self.prompt, input).await {
                Ok(text) => {
                    if let Some(result) = parse_response(&text) {
                        return result;
                    }
                    debug!("Unparsable classifier reply (attempt {}/{})", attempt, self.attempts);
                }
                Err(e) if e.is_rate_limit() => {
                    if attempt < self.attempts {
                        let wait = self.schedule.backoff_for(attempt);
                        warn!("Rate limit hit. Pausing {:?}...", wait);
                        tokio::time::sleep(wait).await;
                    } else {
                        warn!("Rate limit hit on final attempt");
                    }
                }
                Err(e) => {
                    error!("Analysis error: {}", e);
                    return ClassificationResult::failed();
                }
            }
        }

        ClassificationResult::unsorted()
    }
}

#[async_trait]
impl<S: ClassificationService> Classifier for DocumentAnalyst<S> {
    async fn analyze(&self, file: &PendingFile) -> ClassificationResult {
        let input = match content::prepare_input(file, self.max_excerpt_chars) {
            Ok(input) => input,
            Err(e) => {
                error!("Cannot read {:?}: {}", file.path, e);
                return ClassificationResult::failed();
            }
        };
        self.classify(&input).await
    }
}
