//! Opening a directory in the platform file browser.

use std::io;
use std::path::Path;
use std::process::{Command, Stdio};

/// Shows a directory to the user. Best effort: callers log failures.
pub trait FolderOpener: Send {
    fn open(&self, directory: &Path) -> io::Result<()>;
}

/// Spawns the platform file browser and does not wait for it
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemFolderOpener;

impl SystemFolderOpener {
    fn program() -> &'static str {
        if cfg!(target_os = "windows") {
            "explorer"
        } else if cfg!(target_os = "macos") {
            "open"
        } else {
            "xdg-open"
        }
    }
}

impl FolderOpener for SystemFolderOpener {
    fn open(&self, directory: &Path) -> io::Result<()> {
        Command::new(Self::program())
            .arg(directory)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map(|_| ())
    }
}

/// Does nothing; for headless runs and tests
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopFolderOpener;

impl FolderOpener for NoopFolderOpener {
    fn open(&self, _directory: &Path) -> io::Result<()> {
        Ok(())
    }
}
