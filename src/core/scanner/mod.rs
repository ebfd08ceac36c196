//! # Scanner Module
//!
//! Lists the PDF documents sitting in the processing directory.
//!
//! Only the directory itself is read; subdirectories are ignored. Results
//! are sorted by file name so a pass handles documents in a stable order.

mod filter;

pub use filter::PdfFilter;

use std::io;
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

/// Regular `.pdf` files directly inside `directory`, by file name.
///
/// Entries that vanish or cannot be read while listing are skipped; only a
/// failure to read the directory itself is an error.
pub fn list_pdfs(directory: &Path, filter: &PdfFilter) -> io::Result<Vec<PathBuf>> {
    std::fs::read_dir(directory)?;

    let mut documents = Vec::new();
    for entry in WalkDir::new(directory)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        match entry {
            Ok(entry) if entry.file_type().is_file() && filter.should_include(entry.path()) => {
                documents.push(entry.into_path());
            }
            Ok(_) => {}
            Err(e) => warn!("Skipping entry in {}: {}", directory.display(), e),
        }
    }
    Ok(documents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;
    use assert_fs::TempDir;

    #[test]
    fn lists_pdfs_in_name_order() {
        let temp = TempDir::new().unwrap();
        temp.child("b.pdf").write_str("b").unwrap();
        temp.child("a.PDF").write_str("a").unwrap();
        temp.child("notes.txt").write_str("n").unwrap();
        temp.child("nested/c.pdf").write_str("c").unwrap();
        temp.child("folder.pdf").create_dir_all().unwrap();

        let found = list_pdfs(temp.path(), &PdfFilter::new()).unwrap();
        let names: Vec<_> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();

        assert_eq!(names, vec!["a.PDF", "b.pdf"]);
    }

    #[test]
    fn empty_directory_lists_nothing() {
        let temp = TempDir::new().unwrap();
        assert!(list_pdfs(temp.path(), &PdfFilter::new()).unwrap().is_empty());
    }

    #[test]
    fn missing_directory_is_error() {
        let temp = TempDir::new().unwrap();
        assert!(list_pdfs(&temp.path().join("absent"), &PdfFilter::new()).is_err());
    }
}
