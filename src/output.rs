//! The single file the merged report is written to.
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::error::{ReportError, Result};

#[derive(Debug, Clone)]
pub struct OutputSink {
    path: PathBuf,
}

impl OutputSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create or truncate the file so an unwritable destination is caught
    /// before any remote work starts. Leaves the file empty.
    pub async fn prepare(&self) -> Result<()> {
        fs::write(&self.path, b"").await.map_err(|source| self.error(source))
    }

    pub async fn write(&self, content: &str) -> Result<()> {
        fs::write(&self.path, content).await.map_err(|source| self.error(source))
    }

    fn error(&self, source: std::io::Error) -> ReportError {
        ReportError::Sink {
            path: self.path.clone(),
            source,
        }
    }
}
