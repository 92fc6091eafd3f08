// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Configuration management for Docuflow

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Prefix of every session output directory
pub const SESSION_PREFIX: &str = "Organized_Batch_";

/// Audit ledger file name inside the session root
pub const AUDIT_LOG_NAME: &str = "Audit_Log.csv";

/// Finance ledger file name inside the session root
pub const FINANCE_REPORT_NAME: &str = "Financial_Report.csv";

/// Main application configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    /// Directory to ingest files from
    pub source_dir: String,

    /// Where session folders are created (defaults to the source directory)
    #[serde(default)]
    pub output_root: Option<String>,

    /// Classification engine configuration
    pub ai_engine: EngineConfig,

    /// Delays and retry budgets of the pipeline
    #[serde(default)]
    pub schedule: ScheduleConfig,

    /// Extensions (with leading dot) never treated as input
    #[serde(default = "default_excluded_extensions")]
    pub excluded_extensions: Vec<String>,

    /// Instruction sent with every classification request
    #[serde(default = "default_prompt")]
    pub prompt: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EngineConfig {
    pub url: String,
    pub models: ModelConfig,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_attempts")]
    pub classify_attempts: u32,
    #[serde(default = "default_excerpt")]
    pub max_excerpt_chars: usize,
}

/// Model priority lists, first available entry wins
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ModelConfig {
    pub text: Vec<String>,
    #[serde(default = "default_vision_models")]
    pub vision: Vec<String>,
}

/// Scheduling policy, all values in milliseconds
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ScheduleConfig {
    /// Base step of the rate-limit backoff (multiplied by the attempt number)
    #[serde(default = "default_backoff")]
    pub rate_limit_backoff_ms: u64,
    /// Pause after every processed file
    #[serde(default = "default_cooldown")]
    pub cooldown_ms: u64,
    /// Pause between move attempts on permission errors
    #[serde(default = "default_move_delay")]
    pub move_retry_delay_ms: u64,
    #[serde(default = "default_attempts")]
    pub move_attempts: u32,
    /// Creation events closer than this to the last accepted one are dropped
    #[serde(default = "default_debounce")]
    pub debounce_ms: u64,
    /// Wait between accepting an event and processing the file
    #[serde(default = "default_settle")]
    pub settle_ms: u64,
}

// Default value functions
fn default_timeout() -> u64 { 120 }
fn default_attempts() -> u32 { 3 }
fn default_excerpt() -> usize { 4000 }
fn default_backoff() -> u64 { 15_000 }
fn default_cooldown() -> u64 { 4_000 }
fn default_move_delay() -> u64 { 1_000 }
fn default_debounce() -> u64 { 1_000 }
fn default_settle() -> u64 { 2_000 }

fn default_text_models() -> Vec<String> {
    vec!["llama3.2:3b", "llama3.1:8b", "mistral", "gemma2"]
        .into_iter().map(String::from).collect()
}

fn default_vision_models() -> Vec<String> {
    vec!["llama3.2-vision", "llava", "moondream"]
        .into_iter().map(String::from).collect()
}

fn default_excluded_extensions() -> Vec<String> {
    vec![".tmp", ".crdownload", ".part", ".partial", ".download", ".py", ".csv"]
        .into_iter().map(String::from).collect()
}

fn default_prompt() -> String {
    "ROLE: Enterprise Document Processor.\n\
     TASK:\n\
     1. Classify file into: [INVOICE, RESUME, CONTRACT, ID_CARD, BANK_STMT, OTHER].\n\
     2. Create a clean filename (Format: 'Category_Entity_Date').\n\
     3. If financial, set 'is_expense': true and extract Vendor, Amount, Date.\n\
     \n\
     OUTPUT JSON ONLY:\n\
     {\"category\": \"INVOICE\", \"new_filename\": \"Invoice_AWS_2025\", \"is_expense\": true, \
     \"vendor\": \"AWS\", \"amount\": \"100\", \"date\": \"2025-01-01\"}".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            source_dir: "./inbox".to_string(),
            output_root: None,
            ai_engine: EngineConfig {
                url: "http://localhost:11434".to_string(),
                models: ModelConfig {
                    text: default_text_models(),
                    vision: default_vision_models(),
                },
                timeout_secs: default_timeout(),
                classify_attempts: default_attempts(),
                max_excerpt_chars: default_excerpt(),
            },
            schedule: ScheduleConfig::default(),
            excluded_extensions: default_excluded_extensions(),
            prompt: default_prompt(),
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            rate_limit_backoff_ms: default_backoff(),
            cooldown_ms: default_cooldown(),
            move_retry_delay_ms: default_move_delay(),
            move_attempts: default_attempts(),
            debounce_ms: default_debounce(),
            settle_ms: default_settle(),
        }
    }
}

impl ScheduleConfig {
    /// A schedule without any waiting, for tests and dry runs
    pub fn immediate() -> Self {
        Self {
            rate_limit_backoff_ms: 0,
            cooldown_ms: 0,
            move_retry_delay_ms: 0,
            settle_ms: 0,
            ..Self::default()
        }
    }

    /// Backoff before retrying after the given (1-based) rate-limited attempt
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.rate_limit_backoff_ms.saturating_mul(u64::from(attempt)))
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn move_retry_delay(&self) -> Duration {
        Duration::from_millis(self.move_retry_delay_ms)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

impl AppConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> crate::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = serde_json::from_str(&content)
                .map_err(|e| crate::DocuflowError::Config(format!("Failed to parse config: {}", e)))?;
            Ok(config)
        } else {
            tracing::info!("Config file not found at {:?}, using defaults", path);
            Ok(Self::default())
        }
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: &Path) -> crate::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check the values that would make the pipeline misbehave
    pub fn validate(&self) -> crate::Result<()> {
        if self.ai_engine.classify_attempts == 0 {
            return Err(crate::DocuflowError::Config("classify_attempts must be at least 1".to_string()));
        }
        if self.schedule.move_attempts == 0 {
            return Err(crate::DocuflowError::Config("move_attempts must be at least 1".to_string()));
        }
        if self.ai_engine.models.text.is_empty() {
            return Err(crate::DocuflowError::Config("at least one text model is required".to_string()));
        }
        if let Some(bad) = self.excluded_extensions.iter().find(|e| !e.starts_with('.')) {
            return Err(crate::DocuflowError::Config(format!(
                "excluded extension '{}' must start with a dot", bad
            )));
        }
        Ok(())
    }

    /// Whether an extension (with leading dot, any case) is never ingested
    pub fn is_excluded(&self, extension: &str) -> bool {
        self.excluded_extensions.iter().any(|e| e.eq_ignore_ascii_case(extension))
    }

    pub fn source_path(&self) -> PathBuf {
        PathBuf::from(&self.source_dir)
    }

    /// Output root, falling back to the source directory
    pub fn output_path(&self) -> PathBuf {
        self.output_root
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| self.source_path())
    }
}

/// The output directory of one run and its ledger files
#[derive(Debug, Clone)]
pub struct Session {
    pub root: PathBuf,
    pub audit_log: PathBuf,
    pub finance_report: PathBuf,
    pub started_at: DateTime<Local>,
}

impl Session {
    /// Create the timestamped session directory under `output_root`
    pub fn create(output_root: &Path, started_at: DateTime<Local>) -> crate::Result<Self> {
        let id = started_at.format("%Y-%m-%d_%H-%M");
        let root = output_root.join(format!("{}{}", SESSION_PREFIX, id));
        std::fs::create_dir_all(&root)?;
        Ok(Self::at(root, started_at))
    }

    /// Describe an existing session directory without touching the filesystem
    pub fn at(root: PathBuf, started_at: DateTime<Local>) -> Self {
        Self {
            audit_log: root.join(AUDIT_LOG_NAME),
            finance_report: root.join(FINANCE_REPORT_NAME),
            root,
            started_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.schedule.backoff_for(1), Duration::from_secs(15));
        assert_eq!(config.schedule.backoff_for(2), Duration::from_secs(30));
        assert_eq!(config.schedule.cooldown(), Duration::from_secs(4));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let json = r#"{
            "source_dir": "/tmp/in",
            "ai_engine": { "url": "http://host:1234", "models": { "text": ["phi3"] } }
        }"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.ai_engine.classify_attempts, 3);
        assert_eq!(config.ai_engine.max_excerpt_chars, 4000);
        assert_eq!(config.schedule.debounce_ms, 1000);
        assert_eq!(config.output_path(), PathBuf::from("/tmp/in"));
        assert!(config.is_excluded(".CSV"));
        assert!(!config.is_excluded(".pdf"));
    }

    #[test]
    fn test_validate_rejects_zero_attempts() {
        let mut config = AppConfig::default();
        config.schedule.move_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_session_layout() {
        let dir = tempfile::tempdir().unwrap();
        let started = Local.with_ymd_and_hms(2025, 12, 1, 9, 5, 0).unwrap();
        let session = Session::create(dir.path(), started).unwrap();

        assert_eq!(session.root, dir.path().join("Organized_Batch_2025-12-01_09-05"));
        assert!(session.root.is_dir());
        assert_eq!(session.audit_log, session.root.join("Audit_Log.csv"));
        assert_eq!(session.finance_report, session.root.join("Financial_Report.csv"));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut config = AppConfig::default();
        config.output_root = Some("/srv/out".to_string());
        config.save(&path).unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded.output_root.as_deref(), Some("/srv/out"));
        assert_eq!(loaded.ai_engine.models.vision, config.ai_engine.models.vision);
    }
}
