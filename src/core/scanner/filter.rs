//! Which directory entries count as documents.

use std::path::Path;

/// Accepts paths with a `.pdf` extension, in any letter case
#[derive(Debug, Clone, Default)]
pub struct PdfFilter {
    /// Skip names starting with `.`
    skip_hidden: bool,
}

impl PdfFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Leave out dot-files, such as lock files some scanners write first
    pub fn with_skip_hidden(mut self, skip: bool) -> Self {
        self.skip_hidden = skip;
        self
    }

    pub fn should_include(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        if self.skip_hidden && name.starts_with('.') {
            return false;
        }
        path.extension()
            .and_then(|e| e.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("pdf"))
            .unwrap_or(false)
    }
}
