use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, instrument, warn};

use crate::backend::DocumentBackend;

/// Plain-text dump of a document, one line per page, used for full-text lookups.
/// Only one build runs at a time.
#[derive(Debug, Clone)]
pub struct ReverseIndex {
    cache_path: PathBuf,
    building: Arc<AtomicBool>,
}

struct BuildGuard<'a>(&'a AtomicBool);

impl Drop for BuildGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl ReverseIndex {
    pub fn for_document(cache_dir: &Path, document: &Path) -> Self {
        let name = document
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());
        Self {
            cache_path: cache_dir.join(format!("{name}.txt")),
            building: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn cache_path(&self) -> &Path {
        &self.cache_path
    }

    pub fn is_building(&self) -> bool {
        self.building.load(Ordering::SeqCst)
    }

    /// True when the cache exists and is not older than `document`.
    pub fn is_fresh(&self, document: &Path) -> bool {
        let modified = |path: &Path| fs::metadata(path).and_then(|meta| meta.modified()).ok();
        match (modified(&self.cache_path), modified(document)) {
            (Some(cache), Some(source)) => cache >= source,
            (Some(_), None) => true,
            _ => false,
        }
    }

    /// Writes the index unless another build is in flight; returns whether it ran.
    #[instrument(skip(self, backend), fields(path = ?self.cache_path))]
    pub fn build(&self, backend: &dyn DocumentBackend) -> Result<bool> {
        if self
            .building
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(false);
        }
        let _guard = BuildGuard(&self.building);

        let mut payload = String::new();
        for page in 0..backend.info().page_count {
            let text = backend.page_text(page).unwrap_or_else(|err| {
                warn!("failed to extract text of page {}: {err:#}", page);
                String::new()
            });
            let flattened = text.split_whitespace().collect::<Vec<_>>().join(" ");
            payload.push_str(&format!("{}\t{}\n", page + 1, flattened));
        }

        if let Some(parent) = self.cache_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create index directory {:?}", parent))?;
        }
        fs::write(&self.cache_path, payload)
            .with_context(|| format!("failed to write index {:?}", self.cache_path))?;
        info!(pages = backend.info().page_count, "reverse index written");
        Ok(true)
    }
}
