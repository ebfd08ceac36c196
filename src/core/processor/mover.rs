//! Moving documents into the done and error directories.

use crate::error::MoveError;
use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Move `source` into `directory` as `file_name`, creating the directory if
/// needed. An existing file of the same name is replaced.
///
/// Rename is tried first; across filesystems the file is copied, the copy's
/// size checked against the source, and only then is the source removed.
pub fn move_into(source: &Path, directory: &Path, file_name: &OsStr) -> Result<PathBuf, MoveError> {
    fs::create_dir_all(directory).map_err(|e| MoveError::CreateDir {
        path: directory.to_path_buf(),
        source: e,
    })?;

    let destination = directory.join(file_name);
    let move_error = |e: io::Error| MoveError::Move {
        from: source.to_path_buf(),
        to: destination.clone(),
        source: e,
    };

    if fs::rename(source, &destination).is_ok() {
        return Ok(destination);
    }

    let expected = fs::metadata(source).map_err(move_error)?.len();
    fs::copy(source, &destination).map_err(move_error)?;

    let actual = fs::metadata(&destination).map_err(move_error)?.len();
    if actual != expected {
        let _ = fs::remove_file(&destination);
        return Err(MoveError::VerifyFailed {
            to: destination,
            expected,
            actual,
        });
    }

    fs::remove_file(source).map_err(move_error)?;
    Ok(destination)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn moves_and_creates_directory() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("scan.pdf");
        fs::write(&source, b"%PDF-1.5 body").unwrap();
        let done = temp.path().join("out/done");

        let destination = move_into(&source, &done, OsStr::new("12345.pdf")).unwrap();

        assert_eq!(destination, done.join("12345.pdf"));
        assert!(!source.exists());
        assert_eq!(fs::read(&destination).unwrap(), b"%PDF-1.5 body");
    }

    #[test]
    fn replaces_existing_destination() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("new.pdf");
        fs::write(&source, b"new").unwrap();
        fs::write(temp.path().join("42.pdf"), b"old").unwrap();

        let done = temp.path().to_path_buf();
        let destination = move_into(&source, &done, OsStr::new("42.pdf")).unwrap();

        assert_eq!(fs::read(destination).unwrap(), b"new");
    }

    #[test]
    fn missing_source_is_move_error() {
        let temp = TempDir::new().unwrap();
        let result = move_into(&temp.path().join("gone.pdf"), temp.path(), OsStr::new("x.pdf"));
        assert!(matches!(result, Err(MoveError::Move { .. })));
    }
}
