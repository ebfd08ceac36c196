//! # Processor Module
//!
//! Handles one document at a time: classify it, then file it.
//!
//! ## Outcomes
//! - **Success** - barcode read, moved to `done/<identifier>.pdf`
//! - **NotFound** - no barcode, moved to `error/` under its own name
//! - **Skipped** - gone before it could be read, unchanged since last
//!   time, or unreadable while it may still be being written
//! - **Failed** - unreadable document or a failed move; the original is
//!   moved to `error/` if at all possible
//!
//! Every outcome sends exactly one status line through the event channel.

mod ledger;
mod mover;
mod opener;

pub use ledger::ProcessedLedger;
pub use mover::move_into;
pub use opener::{FolderOpener, NoopFolderOpener, SystemFolderOpener};

use crate::config::Directories;
use crate::core::classifier::Classify;
use crate::error::{DocumentOpenError, ProcessError};
use crate::events::{EventSender, StatusLevel};
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, error, info, warn};

/// Why a document was left alone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The file no longer exists
    Missing,
    /// Same modification time as when it was last handled
    Unchanged,
    /// Could not be opened, but was modified within the retry window
    Incomplete,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Missing => write!(f, "missing"),
            SkipReason::Unchanged => write!(f, "unchanged"),
            SkipReason::Incomplete => write!(f, "still being written, will retry"),
        }
    }
}

/// Result of handling one document
#[derive(Debug)]
pub enum ProcessingOutcome {
    Success { identifier: String, destination: PathBuf },
    NotFound { destination: PathBuf },
    Skipped { reason: SkipReason },
    Failed { error: ProcessError },
}

/// Classifies documents and moves them to the done or error directory
pub struct FileProcessor<C: Classify> {
    classifier: C,
    directories: Directories,
    events: EventSender,
    opener: Box<dyn FolderOpener>,
    auto_open_error_folder: bool,
    skip_unchanged: bool,
    retry_window: Option<Duration>,
    ledger: ProcessedLedger,
}

impl<C: Classify> FileProcessor<C> {
    /// A processor that opens the error folder with the system file
    /// browser and does not skip unchanged files.
    pub fn new(classifier: C, directories: Directories, events: EventSender) -> Self {
        Self {
            classifier,
            directories,
            events,
            opener: Box::new(SystemFolderOpener),
            auto_open_error_folder: true,
            skip_unchanged: false,
            retry_window: None,
            ledger: ProcessedLedger::new(),
        }
    }

    pub fn with_folder_opener(mut self, opener: impl FolderOpener + 'static) -> Self {
        self.opener = Box::new(opener);
        self
    }

    pub fn with_auto_open_error_folder(mut self, enabled: bool) -> Self {
        self.auto_open_error_folder = enabled;
        self
    }

    /// Skip documents whose modification time matches the ledger.
    pub fn set_skip_unchanged(&mut self, enabled: bool) {
        self.skip_unchanged = enabled;
    }

    /// Documents that fail to open within `window` of their last
    /// modification are skipped as incomplete rather than failed, so a
    /// later pass can retry them. `None` fails them straight away.
    pub fn set_retry_window(&mut self, window: Option<Duration>) {
        self.retry_window = window;
    }

    pub fn directories(&self) -> &Directories {
        &self.directories
    }

    pub fn ledger(&self) -> &ProcessedLedger {
        &self.ledger
    }

    pub fn events(&self) -> &EventSender {
        &self.events
    }

    /// Handle one document.
    pub fn process(&mut self, path: &Path) -> ProcessingOutcome {
        let name = display_name(path);

        let modified = match std::fs::metadata(path).and_then(|meta| meta.modified()) {
            Ok(modified) => modified,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return self.skip(&name, SkipReason::Missing),
            Err(e) => {
                return self.fail(
                    path,
                    &name,
                    ProcessError::Metadata {
                        path: path.to_path_buf(),
                        source: e,
                    },
                )
            }
        };

        if self.skip_unchanged && self.ledger.is_unchanged(path, modified) {
            return self.skip(&name, SkipReason::Unchanged);
        }

        let identifier = match self.classifier.classify(path) {
            Ok(found) => found.and_then(|id| done_file_name(&id.identifier).map(|file| (id.identifier, file))),
            Err(DocumentOpenError::NotFound { .. }) => return self.skip(&name, SkipReason::Missing),
            Err(e @ (DocumentOpenError::Unreadable { .. } | DocumentOpenError::Corrupt { .. }))
                if self.is_recent(modified) =>
            {
                debug!("{} is not readable yet: {}", path.display(), e);
                return self.skip(&name, SkipReason::Incomplete);
            }
            Err(e) => return self.fail(path, &name, e.into()),
        };

        match identifier {
            Some((identifier, file_name)) => match move_into(path, &self.directories.done, &file_name) {
                Ok(destination) => {
                    info!("{} -> {}", path.display(), destination.display());
                    self.events.status(
                        StatusLevel::Info,
                        format!("Processed {} -> {}", name, file_name.to_string_lossy()),
                    );
                    self.ledger.record(path.to_path_buf(), modified);
                    ProcessingOutcome::Success { identifier, destination }
                }
                Err(e) => self.fail(path, &name, e.into()),
            },
            None => {
                let file_name = path.file_name().map(OsStr::to_os_string).unwrap_or_else(|| name.clone().into());
                match move_into(path, &self.directories.error, &file_name) {
                    Ok(destination) => {
                        warn!("No barcode in {}, moved to {}", path.display(), destination.display());
                        self.events.status(
                            StatusLevel::Warning,
                            format!("No barcode found in {}, moved to the error folder", name),
                        );
                        self.ledger.record(path.to_path_buf(), modified);
                        self.open_error_folder();
                        ProcessingOutcome::NotFound { destination }
                    }
                    Err(e) => self.fail(path, &name, e.into()),
                }
            }
        }
    }

    /// Modified within the retry window. A timestamp in the future counts
    /// as recent.
    fn is_recent(&self, modified: SystemTime) -> bool {
        self.retry_window
            .is_some_and(|window| modified.elapsed().map_or(true, |age| age < window))
    }

    fn skip(&self, name: &str, reason: SkipReason) -> ProcessingOutcome {
        info!("Skipped {} ({})", name, reason);
        self.events
            .status(StatusLevel::Info, format!("Skipped {} ({})", name, reason));
        ProcessingOutcome::Skipped { reason }
    }

    /// Report a failure after one attempt to move the original into the
    /// error directory. A failed recovery is logged, not returned.
    fn fail(&self, path: &Path, name: &str, error: ProcessError) -> ProcessingOutcome {
        error!("Failed to process {}: {}", path.display(), error);

        let recovery = match path.file_name() {
            Some(file_name) if path.exists() => Some(move_into(path, &self.directories.error, file_name)),
            _ => None,
        };

        match recovery {
            Some(Ok(destination)) => {
                info!("Moved {} to {}", path.display(), destination.display());
                self.events.status(
                    StatusLevel::Error,
                    format!("Failed to process {}: {}; moved to the error folder", name, error),
                );
                self.open_error_folder();
            }
            Some(Err(move_error)) => {
                error!("Could not move {} to the error folder: {}", path.display(), move_error);
                self.events.status(
                    StatusLevel::Error,
                    format!("Failed to process {}: {}; could not move it: {}", name, error, move_error),
                );
            }
            None => {
                self.events
                    .status(StatusLevel::Error, format!("Failed to process {}: {}", name, error));
            }
        }

        ProcessingOutcome::Failed { error }
    }

    fn open_error_folder(&self) {
        if !self.auto_open_error_folder {
            return;
        }
        if let Err(e) = self.opener.open(&self.directories.error) {
            warn!("Could not open {}: {}", self.directories.error.display(), e);
        }
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// `<identifier>.pdf` with characters that are not allowed in file names
/// replaced by `_`. `None` if nothing usable is left.
pub fn done_file_name(identifier: &str) -> Option<OsString> {
    let cleaned: String = identifier
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.trim();

    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        return None;
    }
    Some(OsString::from(format!("{}.pdf", cleaned)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::barcode::BoundingBox;
    use crate::core::classifier::Identification;
    use crate::core::raster::CandidateSource;
    use crate::events::{Event, EventChannel, EventReceiver};
    use std::collections::HashMap;
    use std::fs::{self, File};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    /// Answers by file name: an identifier, "no barcode", or corrupt
    #[derive(Default)]
    struct FakeClassifier {
        answers: HashMap<String, Option<String>>,
        calls: Arc<AtomicUsize>,
    }

    impl FakeClassifier {
        fn answer(mut self, file: &str, identifier: Option<&str>) -> Self {
            self.answers.insert(file.to_string(), identifier.map(str::to_string));
            self
        }
    }

    impl Classify for FakeClassifier {
        fn classify(&self, path: &Path) -> Result<Option<Identification>, DocumentOpenError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let name = path.file_name().unwrap().to_string_lossy().into_owned();
            match self.answers.get(&name) {
                Some(answer) => Ok(answer.clone().map(|identifier| Identification {
                    identifier,
                    source: CandidateSource::PageRender { page: 1 },
                    bounds: BoundingBox {
                        top: 0,
                        left: 0,
                        width: 10,
                        height: 10,
                    },
                })),
                None => Err(DocumentOpenError::Corrupt {
                    path: path.to_path_buf(),
                    reason: "not a PDF".to_string(),
                }),
            }
        }
    }

    #[derive(Clone, Default)]
    struct RecordingOpener {
        opened: Arc<Mutex<Vec<PathBuf>>>,
    }

    impl FolderOpener for RecordingOpener {
        fn open(&self, directory: &Path) -> io::Result<()> {
            self.opened.lock().unwrap().push(directory.to_path_buf());
            Ok(())
        }
    }

    struct Fixture {
        _temp: TempDir,
        directories: Directories,
        receiver: EventReceiver,
        opener: RecordingOpener,
    }

    impl Fixture {
        fn new() -> (Self, EventSender) {
            let temp = TempDir::new().unwrap();
            let directories = Directories {
                processing: temp.path().join("processing"),
                error: temp.path().join("error"),
                done: temp.path().join("done"),
            };
            fs::create_dir_all(&directories.processing).unwrap();
            let (sender, receiver) = EventChannel::new();
            (
                Self {
                    _temp: temp,
                    directories,
                    receiver,
                    opener: RecordingOpener::default(),
                },
                sender,
            )
        }

        fn processor(&self, sender: EventSender, classifier: FakeClassifier) -> FileProcessor<FakeClassifier> {
            FileProcessor::new(classifier, self.directories.clone(), sender).with_folder_opener(self.opener.clone())
        }

        fn input(&self, name: &str, contents: &[u8]) -> PathBuf {
            let path = self.directories.processing.join(name);
            fs::write(&path, contents).unwrap();
            path
        }

        fn statuses(&self) -> Vec<String> {
            self.receiver
                .drain()
                .into_iter()
                .filter_map(|event| match event {
                    Event::Status(status) => Some(status.message),
                    _ => None,
                })
                .collect()
        }
    }

    #[test]
    fn success_moves_to_done_under_identifier() {
        let (fixture, sender) = Fixture::new();
        let mut processor = fixture.processor(sender, FakeClassifier::default().answer("a.pdf", Some("12345")));
        let path = fixture.input("a.pdf", b"original bytes");

        let outcome = processor.process(&path);

        match outcome {
            ProcessingOutcome::Success { identifier, destination } => {
                assert_eq!(identifier, "12345");
                assert_eq!(destination, fixture.directories.done.join("12345.pdf"));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert!(!path.exists());
        assert_eq!(fs::read(fixture.directories.done.join("12345.pdf")).unwrap(), b"original bytes");
        assert_eq!(fixture.statuses().len(), 1);
        assert_eq!(processor.ledger().len(), 1);
    }

    #[test]
    fn not_found_moves_to_error_and_opens_folder() {
        let (fixture, sender) = Fixture::new();
        let mut processor = fixture.processor(sender, FakeClassifier::default().answer("b.pdf", None));
        let path = fixture.input("b.pdf", b"no barcode here");

        let outcome = processor.process(&path);

        assert!(matches!(outcome, ProcessingOutcome::NotFound { .. }));
        assert!(fixture.directories.error.join("b.pdf").exists());
        assert!(!fixture.directories.done.exists());
        assert_eq!(*fixture.opener.opened.lock().unwrap(), vec![fixture.directories.error.clone()]);
        assert_eq!(fixture.statuses().len(), 1);
    }

    #[test]
    fn auto_open_can_be_disabled() {
        let (fixture, sender) = Fixture::new();
        let mut processor = fixture
            .processor(sender, FakeClassifier::default().answer("b.pdf", None))
            .with_auto_open_error_folder(false);
        let path = fixture.input("b.pdf", b"no barcode here");

        processor.process(&path);
        assert!(fixture.opener.opened.lock().unwrap().is_empty());
    }

    #[test]
    fn missing_path_is_skipped() {
        let (fixture, sender) = Fixture::new();
        let classifier = FakeClassifier::default();
        let calls = classifier.calls.clone();
        let mut processor = fixture.processor(sender, classifier);

        let outcome = processor.process(&fixture.directories.processing.join("ghost.pdf"));

        assert!(matches!(outcome, ProcessingOutcome::Skipped { reason: SkipReason::Missing }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(fixture.statuses().len(), 1);
    }

    #[test]
    fn invalid_pdf_fails_into_error_directory() {
        let (fixture, sender) = Fixture::new();
        let mut processor = fixture.processor(sender, FakeClassifier::default());
        let path = fixture.input("junk.pdf", b"not a pdf at all");

        let outcome = processor.process(&path);

        assert!(matches!(
            outcome,
            ProcessingOutcome::Failed {
                error: ProcessError::Document(DocumentOpenError::Corrupt { .. })
            }
        ));
        assert!(!path.exists());
        assert_eq!(fs::read(fixture.directories.error.join("junk.pdf")).unwrap(), b"not a pdf at all");
        assert!(!fixture.directories.done.exists());
        assert!(processor.ledger().is_empty());

        let statuses = fixture.statuses();
        assert_eq!(statuses.len(), 1);
        assert!(statuses[0].contains("junk.pdf"));
    }

    #[test]
    fn fresh_unreadable_file_is_left_for_retry() {
        let (fixture, sender) = Fixture::new();
        let mut processor = fixture.processor(sender, FakeClassifier::default());
        processor.set_retry_window(Some(Duration::from_secs(60)));
        let path = fixture.input("scan.pdf", b"%PDF-1.5 half of it");

        let outcome = processor.process(&path);

        assert!(matches!(outcome, ProcessingOutcome::Skipped { reason: SkipReason::Incomplete }));
        assert!(path.exists());
        assert!(!fixture.directories.error.exists());
        assert!(processor.ledger().is_empty());

        let statuses = fixture.statuses();
        assert_eq!(statuses.len(), 1);
        assert!(statuses[0].contains("still being written"));
    }

    #[test]
    fn old_unreadable_file_fails_despite_retry_window() {
        let (fixture, sender) = Fixture::new();
        let mut processor = fixture.processor(sender, FakeClassifier::default());
        processor.set_retry_window(Some(Duration::from_secs(60)));
        let path = fixture.input("junk.pdf", b"not a pdf at all");
        File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(SystemTime::now() - Duration::from_secs(3600))
            .unwrap();

        assert!(matches!(processor.process(&path), ProcessingOutcome::Failed { .. }));
        assert!(fixture.directories.error.join("junk.pdf").exists());
    }

    #[test]
    fn unchanged_file_is_skipped_without_second_move() {
        let (fixture, sender) = Fixture::new();
        let classifier = FakeClassifier::default().answer("a.pdf", Some("777"));
        let calls = classifier.calls.clone();
        let mut processor = fixture.processor(sender, classifier);
        processor.set_skip_unchanged(true);

        let stamp = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let path = fixture.input("a.pdf", b"first");
        File::options().write(true).open(&path).unwrap().set_modified(stamp).unwrap();
        assert!(matches!(processor.process(&path), ProcessingOutcome::Success { .. }));

        // the same document shows up again with the same timestamp
        fixture.input("a.pdf", b"first");
        File::options().write(true).open(&path).unwrap().set_modified(stamp).unwrap();

        let outcome = processor.process(&path);
        assert!(matches!(outcome, ProcessingOutcome::Skipped { reason: SkipReason::Unchanged }));
        assert!(path.exists());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(fixture.statuses().len(), 2);
    }

    #[test]
    fn changed_file_is_processed_again() {
        let (fixture, sender) = Fixture::new();
        let mut processor = fixture.processor(sender, FakeClassifier::default().answer("a.pdf", Some("777")));
        processor.set_skip_unchanged(true);

        let path = fixture.input("a.pdf", b"first");
        File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(100))
            .unwrap();
        processor.process(&path);

        fixture.input("a.pdf", b"second");
        File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(200))
            .unwrap();

        assert!(matches!(processor.process(&path), ProcessingOutcome::Success { .. }));
        assert_eq!(fs::read(fixture.directories.done.join("777.pdf")).unwrap(), b"second");
    }

    #[test]
    fn dedup_is_off_by_default() {
        let (fixture, sender) = Fixture::new();
        let classifier = FakeClassifier::default().answer("a.pdf", Some("1"));
        let calls = classifier.calls.clone();
        let mut processor = fixture.processor(sender, classifier);

        let stamp = SystemTime::UNIX_EPOCH + Duration::from_secs(5_000);
        for _ in 0..2 {
            let path = fixture.input("a.pdf", b"same");
            File::options().write(true).open(&path).unwrap().set_modified(stamp).unwrap();
            processor.process(&path);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unusable_identifier_counts_as_not_found() {
        let (fixture, sender) = Fixture::new();
        let mut processor = fixture.processor(sender, FakeClassifier::default().answer("c.pdf", Some("..")));
        let path = fixture.input("c.pdf", b"dots");

        assert!(matches!(processor.process(&path), ProcessingOutcome::NotFound { .. }));
        assert!(fixture.directories.error.join("c.pdf").exists());
    }

    #[test]
    fn done_file_name_replaces_reserved_characters() {
        assert_eq!(done_file_name("INV/2024:07"), Some(OsString::from("INV_2024_07.pdf")));
        assert_eq!(done_file_name("a\u{1d}b"), Some(OsString::from("a_b.pdf")));
        assert_eq!(done_file_name("12345"), Some(OsString::from("12345.pdf")));
        assert_eq!(done_file_name("   "), None);
        assert_eq!(done_file_name("."), None);
    }

    #[test]
    fn failed_move_to_done_recovers_into_error() {
        let (fixture, sender) = Fixture::new();
        // a regular file where the done directory should be
        fs::write(&fixture.directories.done, b"in the way").unwrap();
        let mut processor = fixture.processor(sender, FakeClassifier::default().answer("a.pdf", Some("9")));
        let path = fixture.input("a.pdf", b"payload");

        let outcome = processor.process(&path);

        assert!(matches!(outcome, ProcessingOutcome::Failed { error: ProcessError::Move(_) }));
        assert!(fixture.directories.error.join("a.pdf").exists());
        assert_eq!(fixture.statuses().len(), 1);
    }
}
