use std::collections::HashMap;
use std::ops::Range;
use std::sync::Arc;

use anyhow::Result;
use tracing::debug;

use crate::backend::Bitmap;

/// Rendered pages at a single scale. A lookup at another scale drops everything first.
#[derive(Debug, Default)]
pub struct RenderCache {
    scale_milli: Option<u32>,
    entries: HashMap<usize, Arc<Bitmap>>,
}

impl RenderCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, page_index: usize) -> bool {
        self.entries.contains_key(&page_index)
    }

    pub fn pages(&self) -> Vec<usize> {
        let mut pages: Vec<_> = self.entries.keys().copied().collect();
        pages.sort_unstable();
        pages
    }

    pub fn recorded_scale(&self) -> Option<f32> {
        self.scale_milli.map(|milli| milli as f32 / 1000.0)
    }

    /// Records `scale`, clearing every entry when it differs from the recorded one.
    pub fn prepare_scale(&mut self, scale: f32) -> bool {
        let milli = quantize_scale(scale);
        if self.scale_milli == Some(milli) {
            return false;
        }
        if !self.entries.is_empty() {
            debug!(
                old = ?self.recorded_scale(),
                new = scale,
                "scale changed, clearing render cache"
            );
        }
        self.entries.clear();
        self.scale_milli = Some(milli);
        true
    }

    pub fn get(&self, page_index: usize, scale: f32) -> Option<Arc<Bitmap>> {
        if self.scale_milli != Some(quantize_scale(scale)) {
            return None;
        }
        self.entries.get(&page_index).cloned()
    }

    pub fn get_or_insert_with<F>(
        &mut self,
        page_index: usize,
        scale: f32,
        render: F,
    ) -> Result<Arc<Bitmap>>
    where
        F: FnOnce() -> Result<Bitmap>,
    {
        self.prepare_scale(scale);
        if let Some(bitmap) = self.entries.get(&page_index) {
            return Ok(Arc::clone(bitmap));
        }
        let bitmap = Arc::new(render()?);
        self.entries.insert(page_index, Arc::clone(&bitmap));
        Ok(bitmap)
    }

    pub fn invalidate_page(&mut self, page_index: usize) -> bool {
        self.entries.remove(&page_index).is_some()
    }

    pub fn invalidate_all(&mut self) {
        self.entries.clear();
    }

    /// Drops every entry outside `visible` and returns the evicted page indices.
    pub fn prune(&mut self, visible: &Range<usize>) -> Vec<usize> {
        let mut evicted: Vec<usize> = self
            .entries
            .keys()
            .copied()
            .filter(|index| !visible.contains(index))
            .collect();
        evicted.sort_unstable();
        for index in &evicted {
            self.entries.remove(index);
        }
        evicted
    }
}

fn quantize_scale(scale: f32) -> u32 {
    let scaled = (scale * 1000.0).round();
    if !scaled.is_finite() || scaled <= 0.0 {
        1
    } else if scaled > u32::MAX as f32 {
        u32::MAX
    } else {
        scaled as u32
    }
}
