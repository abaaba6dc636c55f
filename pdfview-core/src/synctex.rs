use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ViewerError;

/// How long the forward-search marker stays on screen.
pub const SYNCTEX_MARKER_DURATION: Duration = Duration::from_secs(5);

const PREFIX: &str = "synctex_info=";

/// Forward-search target: a 1-based page and a page-space position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SynctexInfo {
    pub page: usize,
    pub x: f32,
    pub y: f32,
}

impl SynctexInfo {
    pub fn page_index(&self) -> usize {
        self.page.saturating_sub(1)
    }
}

impl FromStr for SynctexInfo {
    type Err = ViewerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ViewerError::InvalidSynctex(s.to_string());
        let raw = s.trim();
        let raw = raw.strip_prefix(PREFIX).unwrap_or(raw);
        let parts: Vec<&str> = raw.split(':').collect();
        let [page, x, y] = parts.as_slice() else {
            return Err(invalid());
        };
        let page: usize = page.trim().parse().map_err(|_| invalid())?;
        if page == 0 {
            return Err(invalid());
        }
        Ok(Self {
            page,
            x: x.trim().parse().map_err(|_| invalid())?,
            y: y.trim().parse().map_err(|_| invalid())?,
        })
    }
}

impl fmt::Display for SynctexInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}:{}:{}", PREFIX, self.page, self.x, self.y)
    }
}
