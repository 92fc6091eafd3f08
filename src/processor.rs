// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Per-file processing: classify, place, log, move
//!
//! A file walks `Discovered → Classifying → Placing → Moving` and ends either
//! `Moved` (now under the session root) or `Stuck` (still at its source).
//! Both end states write exactly one audit row. Files are never retried once
//! they are stuck.

use chrono::{DateTime, Local};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::classifier::Classifier;
use crate::config::{AppConfig, ScheduleConfig, Session};
use crate::ledger::{AuditStatus, Ledger};
use crate::placement::{self, DestinationPath};

/// OS junk that is never a document
const SKIP_NAMES: [&str; 3] = ["desktop.ini", "thumbs.db", ".ds_store"];

/// A path observed as newly present in the source directory
#[derive(Debug, Clone)]
pub struct PendingFile {
    pub path: PathBuf,
    /// Extension with leading dot, as written on disk (may be empty)
    pub suffix: String,
    /// Lowercased `suffix`, used for matching
    pub extension: String,
    pub discovered_at: DateTime<Local>,
}

impl PendingFile {
    pub fn new(path: PathBuf) -> Self {
        let suffix = path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        Self {
            extension: suffix.to_lowercase(),
            suffix,
            path,
            discovered_at: Local::now(),
        }
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Why a path never entered processing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotAFile,
    InsideOutput,
    Excluded,
    Hidden,
}

/// Processing stages, logged as the file moves through them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    Discovered,
    Classifying,
    Placing,
    Moving,
    Moved,
    Stuck,
}

/// What happened to one path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    Skipped(SkipReason),
    /// Dry run: where the file would have gone
    Planned(DestinationPath),
    Moved(DestinationPath),
    Stuck { path: PathBuf, reason: String },
}

/// Drives single files through the pipeline
pub struct FileProcessor {
    classifier: Arc<dyn Classifier>,
    ledger: Ledger,
    session: Session,
    schedule: ScheduleConfig,
    excluded_extensions: Vec<String>,
    dry_run: bool,
    counter: usize,
}

impl FileProcessor {
    pub fn new(config: &AppConfig, session: Session, classifier: Arc<dyn Classifier>) -> Self {
        Self {
            classifier,
            ledger: Ledger::new(&session),
            session,
            schedule: config.schedule.clone(),
            excluded_extensions: config.excluded_extensions.clone(),
            dry_run: false,
            counter: 0,
        }
    }

    /// Classify and place without moving files or writing ledgers
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Number of files that entered processing so far
    pub fn processed_count(&self) -> usize {
        self.counter
    }

    /// Decide whether a path is input at all
    pub fn skip_reason(&self, path: &Path) -> Option<SkipReason> {
        if !path.is_file() {
            return Some(SkipReason::NotAFile);
        }
        if is_inside(path, &self.session.root) {
            return Some(SkipReason::InsideOutput);
        }

        let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
        if name.starts_with('.') || SKIP_NAMES.iter().any(|n| name.eq_ignore_ascii_case(n)) {
            return Some(SkipReason::Hidden);
        }

        let pending = PendingFile::new(path.to_path_buf());
        if self.excluded_extensions.iter().any(|e| e.eq_ignore_ascii_case(&pending.extension)) {
            return Some(SkipReason::Excluded);
        }

        None
    }

    /// Run one path through the pipeline
    pub async fn process(&mut self, path: &Path) -> ProcessOutcome {
        if let Some(reason) = self.skip_reason(path) {
            debug!("Skipping {:?}: {:?}", path, reason);
            return ProcessOutcome::Skipped(reason);
        }

        let pending = PendingFile::new(path.to_path_buf());
        self.counter += 1;
        info!("[{}] Analyzing: {}...", self.counter, pending.file_name());
        transition(&pending, FileState::Discovered);

        let outcome = self.run(&pending).await;

        // Rate limit cool-down
        tokio::time::sleep(self.schedule.cooldown()).await;

        outcome
    }

    async fn run(&self, pending: &PendingFile) -> ProcessOutcome {
        let original = pending.file_name();

        transition(pending, FileState::Classifying);
        let result = self.classifier.analyze(pending).await;

        transition(pending, FileState::Placing);
        let dest = match placement::place(&result, &pending.suffix, &self.session.root) {
            Ok(dest) => dest,
            Err(e) => {
                let category = placement::normalize_category(&result.category);
                return self.stuck(pending, &category, "", format!("cannot place file: {}", e));
            }
        };

        if self.dry_run {
            info!("DRY RUN: Would move {} to {}/{}", original, dest.category, dest.file_name);
            return ProcessOutcome::Planned(dest);
        }

        self.ledger.record_finance(&result, &dest.file_name);

        transition(pending, FileState::Moving);
        match move_with_retry(&pending.path, &dest.path, self.schedule.move_attempts, self.schedule.move_retry_delay()).await {
            Ok(()) => {
                transition(pending, FileState::Moved);
                info!("MOVED TO: {} | NAME: {}", dest.category, dest.file_name);
                self.ledger.record_event(&original, &dest.category, &dest.file_name, AuditStatus::Success);
                ProcessOutcome::Moved(dest)
            }
            Err(e) => self.stuck(pending, &dest.category, &dest.file_name, format!("move failed: {}", e)),
        }
    }

    fn stuck(&self, pending: &PendingFile, category: &str, final_name: &str, reason: String) -> ProcessOutcome {
        transition(pending, FileState::Stuck);
        error!("Failed to process {:?}: {}", pending.path, reason);
        if !self.dry_run {
            self.ledger.record_event(&pending.file_name(), category, final_name, AuditStatus::Failed);
        }
        ProcessOutcome::Stuck { path: pending.path.clone(), reason }
    }
}

fn transition(pending: &PendingFile, state: FileState) {
    debug!("{:?} -> {:?}", pending.path, state);
}

/// Whether `path` lies under `dir`, comparing canonical forms when possible
fn is_inside(path: &Path, dir: &Path) -> bool {
    let path = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    let dir = dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf());
    path.starts_with(&dir)
}

/// Move a file, retrying only on permission errors
pub async fn move_with_retry(src: &Path, dest: &Path, attempts: u32, delay: Duration) -> io::Result<()> {
    retry_on_permission(attempts, delay, || move_file(src, dest)).await
}

/// Run `op` up to `attempts` times, pausing between permission failures
pub async fn retry_on_permission<F>(attempts: u32, delay: Duration, mut op: F) -> io::Result<()>
where
    F: FnMut() -> io::Result<()>,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match op() {
            Ok(()) => return Ok(()),
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied && attempt < attempts => {
                warn!("Permission denied (attempt {}/{}), retrying in {:?}", attempt, attempts, delay);
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Rename, falling back to copy and delete across filesystems
fn move_file(src: &Path, dest: &Path) -> io::Result<()> {
    match std::fs::rename(src, dest) {
        Ok(()) => Ok(()),
        Err(e) if is_cross_device(&e) => copy_then_remove(src, dest),
        Err(e) => Err(e),
    }
}

/// Copy to `dest` and delete `src`; on failure only `src` remains
fn copy_then_remove(src: &Path, dest: &Path) -> io::Result<()> {
    if let Err(e) = std::fs::copy(src, dest) {
        let _ = std::fs::remove_file(dest);
        return Err(e);
    }
    if let Err(e) = std::fs::remove_file(src) {
        let _ = std::fs::remove_file(dest);
        return Err(e);
    }
    Ok(())
}

fn is_cross_device(e: &io::Error) -> bool {
    // EXDEV on unix, ERROR_NOT_SAME_DEVICE on windows
    let code = if cfg!(windows) { 17 } else { 18 };
    e.raw_os_error() == Some(code)
}
