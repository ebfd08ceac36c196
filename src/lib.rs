//! # Barcode PDF
//!
//! Files scanned PDFs by the CODE-128 barcode printed on them.
//!
//! Documents dropped into a processing directory are read, their barcode
//! decoded, and the file moved to `done/<barcode>.pdf`. Documents without
//! a readable barcode go to an error directory.
//!
//! ## Architecture
//! The library is split into a core engine (GUI-agnostic) and presentation layers:
//! - `core` - Rasterizing, decoding, classifying and filing documents
//! - `events` - Status lines and lifecycle events (GUI-ready)
//! - `config` - TOML settings
//! - `error` - Error types with path context

pub mod config;
pub mod core;
pub mod error;
pub mod events;

// Re-export commonly used types at the crate root
pub use error::{BarcodePdfError, Result};

/// Initialize tracing for the library
///
/// `RUST_LOG` wins when set; otherwise `default_filter` is used. Calling
/// this twice leaves the first subscriber in place.
pub fn init_tracing(default_filter: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
