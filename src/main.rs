//! # barcode-pdf CLI
//!
//! Command-line launcher for the barcode PDF router.
//!
//! ## Usage
//! ```bash
//! barcode-pdf watch --processing ~/scans/in --mode polling
//! barcode-pdf once
//! barcode-pdf identify invoice.pdf --output json
//! barcode-pdf label INV-000123 cover.png
//! ```

mod cli;

use barcode_pdf::Result;

fn main() -> Result<()> {
    cli::run()
}
