// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Naming and placement of classified files

use std::path::{Path, PathBuf};

use crate::classifier::ClassificationResult;
use crate::Result;

/// Category used when the classifier gave none
pub const DEFAULT_CATEGORY: &str = "OTHER";

/// File stem used when nothing survives sanitization
pub const DEFAULT_STEM: &str = "Doc";

/// Where a file will be moved to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationPath {
    /// Normalized category, also the folder name
    pub category: String,
    /// Sanitized stem before any dedup suffix
    pub stem: String,
    /// Final file name including suffix and extension
    pub file_name: String,
    pub path: PathBuf,
}

/// Uppercase, spaces to underscores, `OTHER` when empty
///
/// The category becomes a folder name, so anything that could act as a path
/// component (separators, dots) is dropped.
pub fn normalize_category(raw: &str) -> String {
    let normalized: String = raw
        .trim()
        .to_uppercase()
        .replace(' ', "_")
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, '_' | '-'))
        .collect();

    if normalized.is_empty() {
        DEFAULT_CATEGORY.to_string()
    } else {
        normalized
    }
}

/// Keep alphanumerics, space, underscore and hyphen; `Doc` when empty
pub fn sanitize_filename(raw: &str) -> String {
    let clean: String = raw
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '_' | '-'))
        .collect();

    let clean = clean.trim();
    if clean.is_empty() {
        DEFAULT_STEM.to_string()
    } else {
        clean.to_string()
    }
}

/// Compute a collision-free destination, creating the category folder
pub fn place(result: &ClassificationResult, suffix: &str, dest_root: &Path) -> Result<DestinationPath> {
    let category = normalize_category(&result.category);
    let stem = sanitize_filename(&result.new_filename);

    let folder = dest_root.join(&category);
    std::fs::create_dir_all(&folder)?;

    let (file_name, path) = free_name(&folder, &stem, suffix);

    Ok(DestinationPath { category, stem, file_name, path })
}

/// First of `stem.ext`, `stem_1.ext`, `stem_2.ext`, ... that does not exist
fn free_name(folder: &Path, stem: &str, suffix: &str) -> (String, PathBuf) {
    let mut file_name = format!("{}{}", stem, suffix);
    let mut path = folder.join(&file_name);
    let mut uniq = 1u32;

    // symlink_metadata also sees dangling links
    while path.symlink_metadata().is_ok() {
        file_name = format!("{}_{}{}", stem, uniq, suffix);
        path = folder.join(&file_name);
        uniq += 1;
    }

    (file_name, path)
}
