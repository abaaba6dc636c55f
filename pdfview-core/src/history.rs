use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

/// Newline-delimited list of opened documents, most recent first, without duplicates.
#[derive(Debug, Clone)]
pub struct HistoryLog {
    path: PathBuf,
}

impl HistoryLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entries(&self) -> Result<Vec<String>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to read history file {:?}", self.path))
            }
        };
        Ok(raw
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Moves `entry` to the front and rewrites the file.
    pub fn record(&self, entry: &str) -> Result<()> {
        let entry = entry.trim();
        if entry.is_empty() {
            return Ok(());
        }
        let mut entries = self.entries()?;
        entries.retain(|existing| existing != entry);
        entries.insert(0, entry.to_string());

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create history directory {:?}", parent))?;
        }
        let mut payload = entries.join("\n");
        payload.push('\n');
        fs::write(&self.path, payload)
            .with_context(|| format!("failed to write history file {:?}", self.path))?;
        debug!(entries = entries.len(), "history updated");
        Ok(())
    }
}
