//! # Directory Watcher Module
//!
//! Keeps feeding new PDFs in the processing directory to a
//! [`FileProcessor`] on a background thread.
//!
//! ## Strategies
//! - **Events** - filesystem notifications for created or renamed-in
//!   files; each one is processed after a short settle delay
//! - **Polling** - re-list the directory on a fixed interval; unchanged
//!   files are skipped through the processor's ledger. A file modified
//!   within the settle delay waits for the next listing unless its size
//!   and timestamp have stopped changing
//!
//! Both start with one full pass over files already present. A document
//! that cannot be opened shortly after it was written is retried (on the
//! next listing, or after another settle delay) until the retry window
//! runs out, and only then moved to the error directory.
//!
//! ## Example
//! ```rust,ignore
//! use barcode_pdf::core::watcher::{DirectoryWatcher, WatchStrategy};
//!
//! let watcher = DirectoryWatcher::new(directories, WatchStrategy::default(), sender);
//! let handle = watcher.start(processor)?;
//! // ...
//! handle.stop(); // waits for the document in flight
//! ```

use crate::config::{Directories, WatchConfig, WatchMode};
use crate::core::classifier::Classify;
use crate::core::processor::{FileProcessor, ProcessingOutcome, SkipReason};
use crate::core::scanner::{list_pdfs, PdfFilter};
use crate::error::WatchSetupError;
use crate::events::{Event, EventSender, PassEvent, PassSummary, StatusLevel, WatcherEvent};
use crossbeam_channel::{select, unbounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use notify::event::{ModifyKind, RenameMode};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime};
use tracing::{debug, error, info, warn};

/// How the processing directory is monitored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchStrategy {
    Events { settle_delay: Duration },
    Polling { interval: Duration, settle_delay: Duration },
}

/// Shortest pause between retries of an incomplete document in events mode
const RETRY_PAUSE: Duration = Duration::from_millis(500);

impl WatchStrategy {
    pub fn from_config(config: &WatchConfig) -> Self {
        match config.mode {
            WatchMode::Events => WatchStrategy::Events {
                settle_delay: config.settle_delay(),
            },
            WatchMode::Polling => WatchStrategy::Polling {
                interval: config.poll_interval(),
                settle_delay: config.settle_delay(),
            },
        }
    }

    fn label(&self) -> &'static str {
        match self {
            WatchStrategy::Events { .. } => "events",
            WatchStrategy::Polling { .. } => "polling",
        }
    }
}

impl Default for WatchStrategy {
    fn default() -> Self {
        Self::from_config(&WatchConfig::default())
    }
}

/// What the notify callback hands to the worker
enum Signal {
    Detected(PathBuf),
    Failed(String),
}

/// Sets up the directories and starts the background worker
pub struct DirectoryWatcher {
    directories: Directories,
    strategy: WatchStrategy,
    events: EventSender,
    filter: PdfFilter,
    retry_window: Duration,
}

impl DirectoryWatcher {
    pub fn new(directories: Directories, strategy: WatchStrategy, events: EventSender) -> Self {
        Self {
            directories,
            strategy,
            events,
            filter: PdfFilter::new(),
            retry_window: WatchConfig::default().retry_window(),
        }
    }

    /// How long after its last write an unreadable document keeps being
    /// retried
    pub fn with_retry_window(mut self, window: Duration) -> Self {
        self.retry_window = window;
        self
    }

    /// Leave dot-files in the processing directory alone
    pub fn with_skip_hidden(mut self, skip: bool) -> Self {
        self.filter = self.filter.with_skip_hidden(skip);
        self
    }

    /// Check the processing directory and create the error and done
    /// directories if they are missing.
    pub fn prepare_directories(directories: &Directories) -> Result<(), WatchSetupError> {
        let processing = &directories.processing;
        if !processing.exists() {
            return Err(WatchSetupError::DirectoryNotFound {
                path: processing.clone(),
            });
        }
        if !processing.is_dir() {
            return Err(WatchSetupError::NotADirectory {
                path: processing.clone(),
            });
        }

        for dir in [&directories.error, &directories.done] {
            std::fs::create_dir_all(dir).map_err(|e| WatchSetupError::CreateDir {
                path: dir.clone(),
                source: e,
            })?;
        }
        Ok(())
    }

    /// Start watching. The initial pass runs on the worker thread.
    ///
    /// Setup errors are reported on the event channel as well as returned.
    pub fn start<C: Classify + 'static>(self, processor: FileProcessor<C>) -> Result<WatchHandle, WatchSetupError> {
        match self.spawn(processor) {
            Ok(handle) => Ok(handle),
            Err(e) => {
                error!("Watcher not started: {}", e);
                self.events
                    .status(StatusLevel::Error, format!("Watcher not started: {}", e));
                Err(e)
            }
        }
    }

    fn spawn<C: Classify + 'static>(&self, mut processor: FileProcessor<C>) -> Result<WatchHandle, WatchSetupError> {
        Self::prepare_directories(&self.directories)?;
        let directory = self.directories.processing.clone();

        // armed before the initial pass so files dropped meanwhile are seen
        let notifications = match self.strategy {
            WatchStrategy::Events { .. } => Some(self.arm_notifications(&directory)?),
            WatchStrategy::Polling { .. } => None,
        };
        processor.set_skip_unchanged(matches!(self.strategy, WatchStrategy::Polling { .. }));
        processor.set_retry_window(Some(self.retry_window));

        let (stop_tx, stop_rx) = unbounded::<()>();
        let strategy = self.strategy;
        let filter = self.filter.clone();
        let events = self.events.clone();
        let worker_dir = directory.clone();

        info!("Watching {} ({})", directory.display(), strategy.label());
        self.events.send(Event::Watcher(WatcherEvent::Started {
            path: directory.clone(),
            mode: strategy.label().to_string(),
        }));

        let worker = thread::Builder::new()
            .name("barcode-pdf-watcher".to_string())
            .spawn(move || {
                let mut worker = Worker {
                    processor,
                    directory: worker_dir,
                    filter,
                    stop: stop_rx,
                    events,
                };
                match (strategy, notifications) {
                    (WatchStrategy::Events { settle_delay }, Some((watcher, signals))) => {
                        worker.run_events(settle_delay, signals);
                        drop(watcher);
                    }
                    (WatchStrategy::Polling { interval, settle_delay }, _) => {
                        worker.run_polling(interval, Settling::new(settle_delay))
                    }
                    (WatchStrategy::Events { .. }, None) => {}
                }
                worker.finish();
            })
            .map_err(|e| WatchSetupError::WatchFailed {
                path: directory.clone(),
                reason: e.to_string(),
            })?;

        Ok(WatchHandle {
            stop: Some(stop_tx),
            worker: Some(worker),
            directory,
        })
    }

    fn arm_notifications(&self, directory: &Path) -> Result<(RecommendedWatcher, Receiver<Signal>), WatchSetupError> {
        let (tx, rx) = unbounded();
        let filter = self.filter.clone();

        let mut watcher = notify::recommended_watcher(move |result: notify::Result<notify::Event>| {
            let signal = match result {
                Ok(event) => match detected_path(&event, &filter) {
                    Some(path) => Signal::Detected(path),
                    None => return,
                },
                Err(e) => Signal::Failed(e.to_string()),
            };
            let _ = tx.send(signal);
        })
        .map_err(|e| WatchSetupError::WatchFailed {
            path: directory.to_path_buf(),
            reason: e.to_string(),
        })?;

        watcher
            .watch(directory, RecursiveMode::NonRecursive)
            .map_err(|e| WatchSetupError::WatchFailed {
                path: directory.to_path_buf(),
                reason: e.to_string(),
            })?;

        Ok((watcher, rx))
    }
}

/// A new document announced by a notify event: created, or renamed into
/// the directory.
fn detected_path(event: &notify::Event, filter: &PdfFilter) -> Option<PathBuf> {
    let arrived = matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(ModifyKind::Name(RenameMode::To | RenameMode::Both | RenameMode::Any))
    );
    if !arrived {
        return None;
    }
    event
        .paths
        .last()
        .filter(|path| filter.should_include(path))
        .cloned()
}

/// State owned by the background thread
struct Worker<C: Classify> {
    processor: FileProcessor<C>,
    directory: PathBuf,
    filter: PdfFilter,
    stop: Receiver<()>,
    events: EventSender,
}

impl<C: Classify> Worker<C> {
    fn run_polling(&mut self, interval: Duration, mut settling: Settling) {
        loop {
            pass_until(
                &mut self.processor,
                &self.directory,
                &self.filter,
                Some(&self.stop),
                Some(&mut settling),
                |_, _, _| {},
            );
            if self.sleep(interval) {
                return;
            }
        }
    }

    fn run_events(&mut self, settle_delay: Duration, signals: Receiver<Signal>) {
        pass_until(&mut self.processor, &self.directory, &self.filter, Some(&self.stop), None, |_, _, _| {});

        let stop = &self.stop;
        loop {
            select! {
                recv(stop) -> _ => return,
                recv(signals) -> signal => match signal {
                    Ok(Signal::Detected(path)) => {
                        debug!("Detected {}", path.display());
                        self.events.send(Event::Watcher(WatcherEvent::FileDetected { path: path.clone() }));
                        let mut delay = settle_delay;
                        loop {
                            if sleep_or_stop(stop, delay) {
                                return;
                            }
                            match self.processor.process(&path) {
                                ProcessingOutcome::Skipped { reason: SkipReason::Incomplete } => {
                                    delay = settle_delay.max(RETRY_PAUSE);
                                }
                                _ => break,
                            }
                        }
                    }
                    Ok(Signal::Failed(message)) => {
                        warn!("Watch error: {}", message);
                        self.events.send(Event::Watcher(WatcherEvent::Error { message }));
                    }
                    Err(_) => return,
                },
            }
        }
    }

    fn sleep(&self, duration: Duration) -> bool {
        sleep_or_stop(&self.stop, duration)
    }

    fn finish(self) {
        info!("Stopped watching {}", self.directory.display());
        self.events
            .send(Event::Watcher(WatcherEvent::Stopped { path: self.directory }));
    }
}

/// Wait for `duration` unless stopped first. Returns true on stop.
fn sleep_or_stop(stop: &Receiver<()>, duration: Duration) -> bool {
    match stop.recv_timeout(duration) {
        Err(RecvTimeoutError::Timeout) => false,
        Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
    }
}

/// Size and modification time of a listed file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    len: u64,
    modified: SystemTime,
}

/// Holds back files that are still changing between polling passes
struct Settling {
    quiet: Duration,
    previous: HashMap<PathBuf, FileStamp>,
}

impl Settling {
    fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            previous: HashMap::new(),
        }
    }

    /// Ready once untouched for the quiet period, or unchanged since the
    /// previous listing. Files that cannot be inspected are left to the
    /// processor, which reports them.
    fn is_ready(&mut self, path: &Path) -> bool {
        let Ok(meta) = std::fs::metadata(path) else {
            return true;
        };
        let Ok(modified) = meta.modified() else {
            return true;
        };
        if modified.elapsed().is_ok_and(|age| age >= self.quiet) {
            self.previous.remove(path);
            return true;
        }
        let stamp = FileStamp {
            len: meta.len(),
            modified,
        };
        self.previous.insert(path.to_path_buf(), stamp) == Some(stamp)
    }

    /// Drop stamps of files that are no longer listed
    fn retain_listed(&mut self, listed: &[PathBuf]) {
        self.previous.retain(|path, _| listed.contains(path));
    }
}

fn stop_requested(stop: &Receiver<()>) -> bool {
    !matches!(stop.try_recv(), Err(TryRecvError::Empty))
}

/// Process every PDF in `directory` accepted by `filter`, in file-name
/// order.
///
/// `on_progress` is called with `(current, total, path)` before each
/// document.
pub fn run_pass<C, F>(
    processor: &mut FileProcessor<C>,
    directory: &Path,
    filter: &PdfFilter,
    on_progress: F,
) -> PassSummary
where
    C: Classify,
    F: FnMut(usize, usize, &Path),
{
    pass_until(processor, directory, filter, None, None, on_progress)
}

fn pass_until<C, F>(
    processor: &mut FileProcessor<C>,
    directory: &Path,
    filter: &PdfFilter,
    stop: Option<&Receiver<()>>,
    mut settling: Option<&mut Settling>,
    mut on_progress: F,
) -> PassSummary
where
    C: Classify,
    F: FnMut(usize, usize, &Path),
{
    let events = processor.events().clone();
    events.send(Event::Pass(PassEvent::Started {
        directory: directory.to_path_buf(),
    }));

    let documents = match list_pdfs(directory, filter) {
        Ok(documents) => documents,
        Err(e) => {
            warn!("Cannot list {}: {}", directory.display(), e);
            events.send(Event::Watcher(WatcherEvent::Error {
                message: format!("Cannot list {}: {}", directory.display(), e),
            }));
            Vec::new()
        }
    };

    if let Some(settling) = settling.as_deref_mut() {
        settling.retain_listed(&documents);
    }

    let total = documents.len();
    let mut summary = PassSummary::default();
    for (index, path) in documents.iter().enumerate() {
        if stop.is_some_and(stop_requested) {
            info!("Pass over {} interrupted", directory.display());
            break;
        }
        if let Some(settling) = settling.as_deref_mut() {
            if !settling.is_ready(path) {
                debug!("{} is still changing, leaving it for the next pass", path.display());
                continue;
            }
        }
        on_progress(index + 1, total, path);
        tally(&mut summary, &processor.process(path));
    }

    if summary.processed > 0 {
        debug!("Pass over {} done: {:?}", directory.display(), summary);
    }
    events.send(Event::Pass(PassEvent::Completed { summary }));
    summary
}

fn tally(summary: &mut PassSummary, outcome: &ProcessingOutcome) {
    summary.processed += 1;
    match outcome {
        ProcessingOutcome::Success { .. } => summary.succeeded += 1,
        ProcessingOutcome::NotFound { .. } => summary.not_found += 1,
        ProcessingOutcome::Skipped { .. } => summary.skipped += 1,
        ProcessingOutcome::Failed { .. } => summary.failed += 1,
    }
}

/// A running watch session. Stopping, or dropping, waits for the worker to
/// finish the document in hand.
pub struct WatchHandle {
    stop: Option<Sender<()>>,
    worker: Option<JoinHandle<()>>,
    directory: PathBuf,
}

impl WatchHandle {
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|worker| !worker.is_finished())
    }

    /// Signal the worker and join it.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        // closing the channel is the stop signal
        self.stop.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("Watcher thread for {} panicked", self.directory.display());
            }
        }
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
