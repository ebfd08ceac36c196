//! # Core Module
//!
//! The GUI-agnostic document pipeline.
//!
//! ## Modules
//! - `raster` - Turns a PDF into candidate grayscale images
//! - `barcode` - Reads CODE-128 barcodes from an image
//! - `classifier` - Finds a document's identifier
//! - `processor` - Files a document under its identifier
//! - `scanner` - Lists PDFs in the processing directory
//! - `watcher` - Keeps processing new documents as they arrive

pub mod barcode;
pub mod classifier;
pub mod processor;
pub mod raster;
pub mod scanner;
pub mod watcher;

// Re-export commonly used types
pub use barcode::{BarcodeDecoder, BarcodeMatch, BoundingBox};
pub use classifier::{Classify, DocumentClassifier, Identification};
pub use processor::{FileProcessor, ProcessingOutcome, SkipReason};
pub use raster::{CandidateImage, CandidateSource, PageRasterizer, RasterConfig};
pub use watcher::{run_pass, DirectoryWatcher, WatchHandle, WatchStrategy};
