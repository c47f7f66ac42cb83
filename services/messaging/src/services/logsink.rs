use std::io;
use std::path::{Path, PathBuf};

use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::error;

/// Append-only text log for query results.
///
/// Every entry is written with its own open/append/close and followed by
/// one blank line.
#[derive(Debug, Clone)]
pub struct LogSink {
    path: PathBuf,
}

impl LogSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&self, entry: &str) -> io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        let text = format!("{}\n\n", entry.trim_end_matches(|c: char| c == '\n' || c == '\r'));
        file.write_all(text.as_bytes()).await?;
        file.flush().await
    }

    /// Like [`append`](Self::append) but reports failures instead of returning them.
    pub async fn append_or_report(&self, entry: &str) -> bool {
        match self.append(entry).await {
            Ok(()) => true,
            Err(e) => {
                error!(path = %self.path.display(), error = %e, "failed to write log entry");
                false
            }
        }
    }
}
