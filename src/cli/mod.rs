//! # CLI Module
//!
//! Command-line interface for the barcode PDF router.
//!
//! ## Usage
//! ```bash
//! # Process what is there, then keep watching until Ctrl+C
//! barcode-pdf watch
//!
//! # Override directories and use polling
//! barcode-pdf watch --processing /scans/in --done /scans/done --mode polling
//!
//! # One pass with a progress bar
//! barcode-pdf once
//!
//! # Read barcodes without moving anything
//! barcode-pdf identify a.pdf b.pdf --output json
//!
//! # Print a cover-sheet label
//! barcode-pdf label INV-000123 cover.png --module-width 3
//! ```

use barcode_pdf::config::{AppConfig, Directories, WatchMode};
use barcode_pdf::core::barcode::code128;
use barcode_pdf::core::classifier::{Classify, DocumentClassifier};
use barcode_pdf::core::processor::FileProcessor;
use barcode_pdf::core::scanner::PdfFilter;
use barcode_pdf::core::watcher::{run_pass, DirectoryWatcher, WatchStrategy};
use barcode_pdf::error::Result;
use barcode_pdf::events::{Event, EventChannel, EventReceiver, PassEvent, StatusLevel, StatusMessage, WatcherEvent};
use clap::{Args, Parser, Subcommand, ValueEnum};
use console::{style, Term};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::thread;

/// Barcode PDF - file scanned documents by their barcode
#[derive(Parser, Debug)]
#[command(name = "barcode-pdf")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Process existing documents, then watch for new ones until Ctrl+C
    Watch {
        #[command(flatten)]
        directories: DirectoryArgs,

        /// How new documents are detected
        #[arg(short, long)]
        mode: Option<Mode>,

        /// Do not open the error folder when a document lands there
        #[arg(long)]
        no_open_error_folder: bool,
    },

    /// Process the documents currently in the processing directory once
    Once {
        #[command(flatten)]
        directories: DirectoryArgs,

        /// Do not open the error folder when a document lands there
        #[arg(long)]
        no_open_error_folder: bool,
    },

    /// Read the barcode of PDFs without moving them
    Identify {
        /// Documents to read
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Output format
        #[arg(short, long, default_value = "pretty")]
        output: OutputFormat,
    },

    /// Write a CODE-128 label image
    Label {
        /// Text to encode
        payload: String,

        /// Output image (format from the extension, e.g. .png)
        output: PathBuf,

        /// Width of one module in pixels
        #[arg(long, default_value = "3")]
        module_width: u32,

        /// Bar height in pixels
        #[arg(long, default_value = "80")]
        height: u32,
    },
}

#[derive(Args, Debug, Default)]
struct DirectoryArgs {
    /// Directory to read documents from
    #[arg(long)]
    processing: Option<PathBuf>,

    /// Directory for documents without a readable barcode
    #[arg(long)]
    error: Option<PathBuf>,

    /// Directory for identified documents
    #[arg(long)]
    done: Option<PathBuf>,
}

impl DirectoryArgs {
    fn apply(self, directories: &mut Directories) {
        if let Some(path) = self.processing {
            directories.processing = path;
        }
        if let Some(path) = self.error {
            directories.error = path;
        }
        if let Some(path) = self.done {
            directories.done = path;
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    /// Filesystem notifications
    Events,
    /// Re-scan every few seconds
    Polling,
}

impl From<Mode> for WatchMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Events => WatchMode::Events,
            Mode::Polling => WatchMode::Polling,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Human-readable output with colors
    Pretty,
    /// JSON output for scripting
    Json,
}

/// Run the CLI
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let mut config = AppConfig::load_or_default(cli.config.as_deref())?;
    barcode_pdf::init_tracing(&config.logging.filter);

    match cli.command {
        Commands::Watch {
            directories,
            mode,
            no_open_error_folder,
        } => {
            directories.apply(&mut config.directories);
            if let Some(mode) = mode {
                config.watch.mode = mode.into();
            }
            if no_open_error_folder {
                config.options.auto_open_error_folder = false;
            }
            run_watch(config)
        }
        Commands::Once {
            directories,
            no_open_error_folder,
        } => {
            directories.apply(&mut config.directories);
            if no_open_error_folder {
                config.options.auto_open_error_folder = false;
            }
            run_once(config)
        }
        Commands::Identify { paths, output } => run_identify(config, paths, output),
        Commands::Label {
            payload,
            output,
            module_width,
            height,
        } => run_label(&payload, output, module_width, height),
    }
}

fn print_header(term: &Term) {
    term.write_line(&format!(
        "{} {}",
        style("Barcode PDF").bold().cyan(),
        style(concat!("v", env!("CARGO_PKG_VERSION"))).dim()
    ))
    .ok();
    term.write_line("").ok();
}

fn format_status(status: &StatusMessage) -> String {
    let level = match status.level {
        StatusLevel::Info => style(status.level.to_string()).green(),
        StatusLevel::Warning => style(status.level.to_string()).yellow(),
        StatusLevel::Error => style(status.level.to_string()).red().bold(),
    };
    format!(
        "{} {:>5} {}",
        style(status.timestamp.format("%H:%M:%S")).dim(),
        level,
        status.message
    )
}

fn run_watch(config: AppConfig) -> Result<()> {
    let term = Term::stderr();
    print_header(&term);

    let (sender, receiver) = EventChannel::new();
    let processor = FileProcessor::new(
        DocumentClassifier::new(config.raster),
        config.directories.clone(),
        sender.clone(),
    )
    .with_auto_open_error_folder(config.options.auto_open_error_folder);

    let printer = spawn_printer(receiver, term.clone());

    let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
    ctrlc::set_handler(move || {
        let _ = stop_tx.try_send(());
    })?;

    let watcher = DirectoryWatcher::new(
        config.directories.clone(),
        WatchStrategy::from_config(&config.watch),
        sender,
    )
    .with_retry_window(config.watch.retry_window())
    .with_skip_hidden(config.options.skip_hidden_files);
    let handle = watcher.start(processor)?;

    term.write_line(&format!("{}", style("Press Ctrl+C to stop.").dim()))
        .ok();
    let _ = stop_rx.recv();

    term.write_line("Stopping...").ok();
    handle.stop();
    printer.join().ok();
    Ok(())
}

/// Print status lines and watcher events until every sender is gone.
fn spawn_printer(receiver: EventReceiver, term: Term) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        for event in receiver.iter() {
            match event {
                Event::Status(status) => {
                    term.write_line(&format_status(&status)).ok();
                }
                Event::Watcher(WatcherEvent::Started { path, mode }) => {
                    term.write_line(&format!(
                        "{} Watching {} ({})",
                        style("●").green(),
                        style(path.display()).cyan(),
                        mode
                    ))
                    .ok();
                }
                Event::Watcher(WatcherEvent::Stopped { path }) => {
                    term.write_line(&format!("{} Stopped watching {}", style("○").dim(), path.display()))
                        .ok();
                }
                Event::Watcher(WatcherEvent::Error { message }) => {
                    term.write_line(&format!("{} {}", style("!").red().bold(), message))
                        .ok();
                }
                Event::Pass(PassEvent::Completed { summary }) if summary.processed > 0 => {
                    term.write_line(&format!(
                        "  {} done, {} without barcode, {} failed, {} skipped",
                        style(summary.succeeded).cyan(),
                        style(summary.not_found).yellow(),
                        style(summary.failed).red(),
                        style(summary.skipped).dim()
                    ))
                    .ok();
                }
                _ => {}
            }
        }
    })
}

fn run_once(config: AppConfig) -> Result<()> {
    let term = Term::stderr();
    print_header(&term);

    DirectoryWatcher::prepare_directories(&config.directories)?;

    let (sender, receiver) = EventChannel::new();
    let mut processor = FileProcessor::new(
        DocumentClassifier::new(config.raster),
        config.directories.clone(),
        sender,
    )
    .with_auto_open_error_folder(config.options.auto_open_error_folder);

    let progress = ProgressBar::new(0);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓░"),
    );

    let progress_clone = progress.clone();
    let event_thread = thread::spawn(move || {
        for event in receiver.iter() {
            match event {
                Event::Status(status) => progress_clone.println(format_status(&status)),
                Event::Pass(PassEvent::Completed { .. }) => progress_clone.finish_and_clear(),
                _ => {}
            }
        }
    });

    let filter = PdfFilter::new().with_skip_hidden(config.options.skip_hidden_files);
    let summary = run_pass(&mut processor, &config.directories.processing, &filter, |current, total, path| {
        progress.set_length(total as u64);
        progress.set_position(current.saturating_sub(1) as u64);
        progress.set_message(
            path.file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
        );
    });

    drop(processor);
    event_thread.join().ok();

    term.write_line("").ok();
    term.write_line(&format!("{} Pass complete", style("✓").green().bold()))
        .ok();
    term.write_line(&format!("  {} documents filed", style(summary.succeeded).cyan()))
        .ok();
    term.write_line(&format!("  {} without a barcode", style(summary.not_found).yellow()))
        .ok();
    term.write_line(&format!("  {} failed", style(summary.failed).red()))
        .ok();
    if summary.skipped > 0 {
        term.write_line(&format!("  {} skipped", style(summary.skipped).dim()))
            .ok();
    }
    Ok(())
}

fn run_identify(config: AppConfig, paths: Vec<PathBuf>, output: OutputFormat) -> Result<()> {
    let classifier = DocumentClassifier::new(config.raster);
    let mut results = Vec::with_capacity(paths.len());

    for path in paths {
        let result = classifier.classify(&path);
        match output {
            OutputFormat::Pretty => {
                let line = match &result {
                    Ok(Some(found)) => format!(
                        "{} {} {} ({})",
                        style("✓").green(),
                        path.display(),
                        style(&found.identifier).cyan().bold(),
                        style(found.source).dim()
                    ),
                    Ok(None) => format!("{} {} {}", style("○").yellow(), path.display(), style("no barcode").dim()),
                    Err(e) => format!("{} {}", style("✗").red(), e),
                };
                println!("{}", line);
            }
            OutputFormat::Json => {
                let entry = match result {
                    Ok(found) => serde_json::json!({ "path": path, "identification": found }),
                    Err(e) => serde_json::json!({ "path": path, "error": e.to_string() }),
                };
                results.push(entry);
            }
        }
    }

    if matches!(output, OutputFormat::Json) {
        println!(
            "{}",
            serde_json::to_string_pretty(&results).unwrap_or_else(|_| "[]".to_string())
        );
    }
    Ok(())
}

fn run_label(payload: &str, output: PathBuf, module_width: u32, height: u32) -> Result<()> {
    let label = code128::render(payload, module_width, height)?;
    label.save(&output)?;

    let term = Term::stderr();
    term.write_line(&format!(
        "{} Wrote {} ({}x{})",
        style("✓").green().bold(),
        output.display(),
        label.width(),
        label.height()
    ))
    .ok();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn directory_overrides_replace_only_given_paths() {
        let mut directories = Directories::default();
        DirectoryArgs {
            processing: Some(PathBuf::from("/scans/in")),
            ..DirectoryArgs::default()
        }
        .apply(&mut directories);

        assert_eq!(directories.processing, PathBuf::from("/scans/in"));
        assert_eq!(directories.done, PathBuf::from("done"));
    }

    #[test]
    fn parses_watch_flags() {
        let cli = Cli::parse_from(["barcode-pdf", "watch", "--mode", "polling", "--no-open-error-folder"]);
        match cli.command {
            Commands::Watch {
                mode,
                no_open_error_folder,
                ..
            } => {
                assert!(matches!(mode, Some(Mode::Polling)));
                assert!(no_open_error_folder);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
