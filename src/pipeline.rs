// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Startup backlog scan and the live watch loop
//!
//! Both feed the same [`FileProcessor`] inline, so at most one file is in
//! flight and the classification service never sees concurrent calls.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::{AppConfig, ScheduleConfig};
use crate::processor::{FileProcessor, PendingFile, ProcessOutcome};
use crate::watcher::{Debouncer, FileWatcher, WatchEvent};
use crate::{DocuflowError, Result};

/// How long the live loop blocks waiting for an event before rechecking shutdown
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Anything that yields watch events
pub trait EventSource {
    fn next_event(&self, timeout: Duration) -> Option<WatchEvent>;
}

impl EventSource for FileWatcher {
    fn next_event(&self, timeout: Duration) -> Option<WatchEvent> {
        FileWatcher::next_event(self, timeout)
    }
}

/// Counts of a batch run
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchSummary {
    pub moved: usize,
    pub planned: usize,
    pub stuck: usize,
    pub skipped: usize,
}

impl BatchSummary {
    fn add(&mut self, outcome: &ProcessOutcome) {
        match outcome {
            ProcessOutcome::Moved(_) => self.moved += 1,
            ProcessOutcome::Planned(_) => self.planned += 1,
            ProcessOutcome::Stuck { .. } => self.stuck += 1,
            ProcessOutcome::Skipped(_) => self.skipped += 1,
        }
    }
}

/// Regular files directly under `source`, minus excluded extensions, by name
pub fn scan_existing(source: &Path, config: &AppConfig) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(source)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .filter(|p| !config.is_excluded(&PendingFile::new(p.clone()).extension))
        .collect();

    files.sort();
    Ok(files)
}

/// Drain a backlog sequentially
pub async fn run_batch(processor: &mut FileProcessor, files: &[PathBuf]) -> BatchSummary {
    let mut summary = BatchSummary::default();

    if files.is_empty() {
        info!("Folder is empty.");
        return summary;
    }

    info!("Found {} files. Processing batch...", files.len());
    for path in files {
        let outcome = processor.process(path).await;
        summary.add(&outcome);
    }

    info!(
        "Batch done: {} moved, {} stuck, {} skipped",
        summary.moved, summary.stuck, summary.skipped
    );
    summary
}

/// Process debounced creation events until `shutdown` flips to true
pub async fn run_live<E: EventSource>(
    events: &E,
    processor: &mut FileProcessor,
    schedule: &ScheduleConfig,
    shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let mut debouncer = Debouncer::new(schedule.debounce());

    loop {
        if *shutdown.borrow() {
            break;
        }

        let Some(event) = events.next_event(POLL_INTERVAL) else {
            continue;
        };

        match event {
            WatchEvent::FileCreated(path) => {
                if !debouncer.accept(Instant::now()) {
                    debug!("Debounced event for {:?}", path);
                    continue;
                }

                // Give the producer time to finish writing
                tokio::time::sleep(schedule.settle()).await;

                match processor.process(&path).await {
                    ProcessOutcome::Stuck { path, reason } => {
                        error!("File left in place: {:?} ({})", path, reason);
                    }
                    outcome => debug!("Processed {:?}: {:?}", path, outcome),
                }
            }
            WatchEvent::DirectoryCreated(path) => {
                debug!("Ignoring new directory {:?}", path);
            }
            WatchEvent::Error(e) => {
                warn!("Watch error: {}", e);
            }
            WatchEvent::Disconnected => {
                return Err(DocuflowError::Watch(notify::Error::generic("watcher disconnected")));
            }
        }
    }

    info!("Docuflow stopped.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{ClassificationResult, Classifier};
    use crate::config::Session;
    use async_trait::async_trait;
    use chrono::Local;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    struct CountingClassifier {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Classifier for CountingClassifier {
        async fn analyze(&self, _file: &crate::processor::PendingFile) -> ClassificationResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            ClassificationResult::named("OTHER", "Doc")
        }
    }

    /// Replays events, then requests shutdown
    struct ScriptedEvents {
        events: Mutex<VecDeque<WatchEvent>>,
        shutdown: watch::Sender<bool>,
    }

    impl EventSource for ScriptedEvents {
        fn next_event(&self, _timeout: Duration) -> Option<WatchEvent> {
            let next = self.events.lock().unwrap().pop_front();
            if next.is_none() {
                let _ = self.shutdown.send(true);
            }
            next
        }
    }

    fn setup() -> (tempfile::TempDir, PathBuf, AppConfig, FileProcessor, Arc<CountingClassifier>) {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("inbox");
        std::fs::create_dir_all(&source).unwrap();

        let mut config = AppConfig::default();
        config.schedule = ScheduleConfig::immediate();
        let session = Session::create(&source, Local::now()).unwrap();
        let classifier = Arc::new(CountingClassifier { calls: AtomicUsize::new(0) });
        let processor = FileProcessor::new(&config, session, classifier.clone());
        (dir, source, config, processor, classifier)
    }

    #[test]
    fn test_scan_existing_is_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.pdf", "a.txt", "run.py", "Audit_Log.csv", "c.jpg"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        std::fs::create_dir(dir.path().join("subdir")).unwrap();

        let config = AppConfig::default();
        let files = scan_existing(dir.path(), &config).unwrap();
        let names: Vec<_> = files.iter().map(|p| p.file_name().unwrap().to_string_lossy().into_owned()).collect();
        assert_eq!(names, vec!["a.txt", "b.pdf", "c.jpg"]);
    }

    #[tokio::test]
    async fn test_batch_drains_backlog() {
        let (_dir, source, config, mut processor, classifier) = setup();
        for name in ["one.txt", "two.txt", "three.txt"] {
            std::fs::write(source.join(name), b"x").unwrap();
        }

        let files = scan_existing(&source, &config).unwrap();
        let summary = run_batch(&mut processor, &files).await;

        assert_eq!(summary.moved, 3);
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 3);
        assert!(scan_existing(&source, &config).unwrap().is_empty());
        let other = processor.session().root.join("OTHER");
        for name in ["Doc.txt", "Doc_1.txt", "Doc_2.txt"] {
            assert!(other.join(name).exists(), "missing {}", name);
        }
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let (_dir, _source, _config, mut processor, _classifier) = setup();
        assert_eq!(run_batch(&mut processor, &[]).await, BatchSummary::default());
    }

    #[tokio::test]
    async fn test_burst_of_events_processes_once() {
        let (_dir, source, config, mut processor, classifier) = setup();
        let first = source.join("report.txt");
        let second = source.join("report2.txt");
        std::fs::write(&first, b"x").unwrap();
        std::fs::write(&second, b"y").unwrap();

        let (tx, rx) = watch::channel(false);
        let events = ScriptedEvents {
            events: Mutex::new(VecDeque::from(vec![
                WatchEvent::FileCreated(first.clone()),
                WatchEvent::FileCreated(second.clone()),
            ])),
            shutdown: tx,
        };

        let mut schedule = config.schedule.clone();
        schedule.debounce_ms = 60_000;
        run_live(&events, &mut processor, &schedule, rx).await.unwrap();

        assert_eq!(classifier.calls.load(Ordering::SeqCst), 1);
        assert!(!first.exists());
        assert!(second.exists());
    }

    #[tokio::test]
    async fn test_directories_and_errors_do_not_consume_debounce() {
        let (_dir, source, config, mut processor, classifier) = setup();
        let file = source.join("late.txt");
        std::fs::write(&file, b"x").unwrap();

        let (tx, rx) = watch::channel(false);
        let events = ScriptedEvents {
            events: Mutex::new(VecDeque::from(vec![
                WatchEvent::DirectoryCreated(source.join("new_folder")),
                WatchEvent::Error("transient".to_string()),
                WatchEvent::FileCreated(file.clone()),
            ])),
            shutdown: tx,
        };

        let mut schedule = config.schedule.clone();
        schedule.debounce_ms = 60_000;
        run_live(&events, &mut processor, &schedule, rx).await.unwrap();

        assert_eq!(classifier.calls.load(Ordering::SeqCst), 1);
        assert!(!file.exists());
    }

    #[tokio::test]
    async fn test_shutdown_before_any_event() {
        let (_dir, _source, config, mut processor, classifier) = setup();
        let (tx, rx) = watch::channel(true);
        let events = ScriptedEvents { events: Mutex::new(VecDeque::new()), shutdown: tx };

        run_live(&events, &mut processor, &config.schedule, rx).await.unwrap();
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_disconnected_watcher_is_an_error() {
        let (_dir, _source, config, mut processor, _classifier) = setup();
        let (tx, rx) = watch::channel(false);
        let events = ScriptedEvents {
            events: Mutex::new(VecDeque::from(vec![WatchEvent::Disconnected])),
            shutdown: tx,
        };

        assert!(run_live(&events, &mut processor, &config.schedule, rx).await.is_err());
    }
}
