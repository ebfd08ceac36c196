//! Event type definitions for status reporting.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// All events emitted by the document pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    /// One human-readable line per terminal document action
    Status(StatusMessage),
    /// Directory pass events
    Pass(PassEvent),
    /// Directory watcher events
    Watcher(WatcherEvent),
}

/// Severity of a status line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusLevel {
    Info,
    Warning,
    Error,
}

/// A status line for the user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusMessage {
    pub level: StatusLevel,
    pub message: String,
    pub timestamp: DateTime<Local>,
}

/// Events from the directory watcher
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WatcherEvent {
    /// Watcher started monitoring a folder
    Started { path: PathBuf, mode: String },
    /// Watcher stopped monitoring a folder
    Stopped { path: PathBuf },
    /// A new PDF was detected
    FileDetected { path: PathBuf },
    /// An error occurred
    Error { message: String },
}

/// Events around one full pass over the processing directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PassEvent {
    /// A pass has started
    Started { directory: PathBuf },
    /// A pass completed
    Completed { summary: PassSummary },
}

/// Counts of outcomes from one pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassSummary {
    /// Number of PDFs handed to the processor
    pub processed: usize,
    /// Documents filed under their barcode
    pub succeeded: usize,
    /// Documents without a readable barcode
    pub not_found: usize,
    /// Documents skipped (unchanged or vanished)
    pub skipped: usize,
    /// Documents that failed
    pub failed: usize,
}

impl std::fmt::Display for StatusLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatusLevel::Info => write!(f, "INFO"),
            StatusLevel::Warning => write!(f, "WARN"),
            StatusLevel::Error => write!(f, "ERROR"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_are_serializable() {
        let event = Event::Status(StatusMessage {
            level: StatusLevel::Warning,
            message: "No barcode found in scan.pdf".to_string(),
            timestamp: Local::now(),
        });

        let json = serde_json::to_string(&event).unwrap();
        let deserialized: Event = serde_json::from_str(&json).unwrap();

        match deserialized {
            Event::Status(status) => {
                assert_eq!(status.level, StatusLevel::Warning);
                assert_eq!(status.message, "No barcode found in scan.pdf");
            }
            _ => panic!("Wrong event type"),
        }
    }

    #[test]
    fn pass_summary_is_serializable() {
        let summary = PassSummary {
            processed: 12,
            succeeded: 10,
            not_found: 1,
            skipped: 0,
            failed: 1,
        };

        let json = serde_json::to_string(&summary).unwrap();
        assert!(json.contains("\"succeeded\":10"));
    }
}
