// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Error types for Docuflow

use thiserror::Error;

/// Result type alias for Docuflow operations
pub type Result<T> = std::result::Result<T, DocuflowError>;

/// Docuflow error types
#[derive(Error, Debug)]
pub enum DocuflowError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("File system error: {0}")]
    FileSystem(#[from] std::io::Error),

    #[error("API error: {0}")]
    Api(#[from] reqwest::Error),

    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    /// The classification service refused the request because a quota was exceeded
    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Classification service not available: {0}")]
    ServiceUnavailable(String),

    #[error("Classification error: {0}")]
    Classification(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Ledger error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("PDF error: {0}")]
    Pdf(String),
}

impl DocuflowError {
    /// Whether a retry after a pause could succeed
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, Self::RateLimited(_))
    }
}
