// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Docuflow: watched-folder document classifier
//!
//! Files dropped into a source directory are classified by an AI service,
//! renamed, and moved into category folders of a per-run session directory,
//! with an audit log and a financial report kept alongside.

pub mod classifier;
pub mod config;
pub mod error;
pub mod ledger;
pub mod ollama;
pub mod pipeline;
pub mod placement;
pub mod processor;
pub mod watcher;

pub use config::AppConfig;
pub use error::{DocuflowError, Result};
