use std::collections::HashMap;
use std::fmt;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr};

use crate::backend::{DocumentId, DocumentInfo};
use crate::error::ViewerError;
use crate::geometry::Rotation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ReadMode {
    #[default]
    FitWidth,
    FitHeight,
    FitCustomize,
    Presentation,
}

impl ReadMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ReadMode::FitWidth => "fit_to_width",
            ReadMode::FitHeight => "fit_to_height",
            ReadMode::FitCustomize => "fit_to_customize",
            ReadMode::Presentation => "fit_to_presentation",
        }
    }
}

impl fmt::Display for ReadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReadMode {
    type Err = ViewerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fit_to_width" | "fit_width" => Ok(ReadMode::FitWidth),
            "fit_to_height" | "fit_height" => Ok(ReadMode::FitHeight),
            "fit_to_customize" | "fit_customize" => Ok(ReadMode::FitCustomize),
            "fit_to_presentation" | "presentation" => Ok(ReadMode::Presentation),
            other => Err(ViewerError::InvalidSessionData(other.to_string())),
        }
    }
}

/// Viewport snapshot in the host's colon-delimited session format:
/// `scrollOffset:scale:readMode:inverted[:rotation[:startPageIndex]]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionData {
    pub scroll_offset: f32,
    pub scale: f32,
    pub read_mode: ReadMode,
    pub inverted: bool,
    pub rotation: Rotation,
    pub start_page_index: Option<usize>,
}

impl Default for SessionData {
    fn default() -> Self {
        Self {
            scroll_offset: 0.0,
            scale: 1.0,
            read_mode: ReadMode::FitWidth,
            inverted: false,
            rotation: Rotation::Deg0,
            start_page_index: None,
        }
    }
}

impl fmt::Display for SessionData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}:{}",
            self.scroll_offset,
            self.scale,
            self.read_mode,
            if self.inverted { "True" } else { "False" },
            self.rotation.degrees()
        )?;
        if let Some(start) = self.start_page_index {
            write!(f, ":{}", start)?;
        }
        Ok(())
    }
}

impl FromStr for SessionData {
    type Err = ViewerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ViewerError::InvalidSessionData(s.to_string());
        let fields: Vec<&str> = s.trim().split(':').collect();
        if !(4..=6).contains(&fields.len()) {
            return Err(invalid());
        }
        let scroll_offset: f32 = fields[0].parse().map_err(|_| invalid())?;
        let scale: f32 = fields[1].parse().map_err(|_| invalid())?;
        if !scroll_offset.is_finite() || !scale.is_finite() || scale <= 0.0 {
            return Err(invalid());
        }
        let read_mode: ReadMode = fields[2].parse().map_err(|_| invalid())?;
        let inverted = match fields[3] {
            "True" | "true" | "1" => true,
            "False" | "false" | "0" => false,
            _ => return Err(invalid()),
        };
        let rotation = match fields.get(4) {
            Some(raw) => raw
                .parse::<i32>()
                .ok()
                .and_then(Rotation::from_degrees)
                .ok_or_else(invalid)?,
            None => Rotation::Deg0,
        };
        let start_page_index = match fields.get(5) {
            Some(raw) => Some(raw.parse().map_err(|_| invalid())?),
            None => None,
        };
        Ok(Self {
            scroll_offset: scroll_offset.max(0.0),
            scale,
            read_mode,
            inverted,
            rotation,
            start_page_index,
        })
    }
}

/// Stack of remembered scroll offsets walked with previous/next, plus the single slot used
/// by save/jump-back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedPositions {
    stack: Vec<f32>,
    cursor: isize,
    remembered: Option<f32>,
}

impl Default for SavedPositions {
    fn default() -> Self {
        Self {
            stack: Vec::new(),
            cursor: -1,
            remembered: None,
        }
    }
}

impl SavedPositions {
    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    pub fn save(&mut self, offset: f32) {
        self.remembered = Some(offset);
        self.cursor = self.stack.len() as isize;
        self.stack.push(offset);
    }

    /// Returns the remembered offset and remembers `current` in its place.
    pub fn swap(&mut self, current: f32) -> Option<f32> {
        let target = self.remembered?;
        self.remembered = Some(current);
        Some(target)
    }

    pub fn previous(&mut self, current: f32) -> Option<f32> {
        if self.cursor < 0 {
            return None;
        }
        if self.cursor + 1 == self.stack.len() as isize {
            self.stack.push(current);
        }
        let target = self.stack.get(self.cursor as usize).copied();
        self.cursor -= 1;
        target
    }

    pub fn next(&mut self) -> Option<f32> {
        if self.cursor + 2 >= self.stack.len() as isize {
            return None;
        }
        self.cursor += 1;
        self.stack.get(self.cursor as usize + 1).copied()
    }
}

#[serde_as]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedDocumentState {
    #[serde_as(as = "Option<DisplayFromStr>")]
    #[serde(default)]
    pub session: Option<SessionData>,
    #[serde(default)]
    pub saved_positions: SavedPositions,
    #[serde(default)]
    pub trim_margin: bool,
}

pub trait StateStore: Send + Sync {
    fn load(&self, doc: &DocumentInfo) -> Result<Option<PersistedDocumentState>>;
    fn save(&self, doc: &DocumentInfo, state: &PersistedDocumentState) -> Result<()>;
}

pub struct FileStateStore {
    root: PathBuf,
}

impl FileStateStore {
    pub fn new(root: PathBuf) -> Result<Self> {
        fs::create_dir_all(&root)
            .with_context(|| format!("failed to create state directory at {:?}", root))?;
        Ok(Self { root })
    }

    fn state_path(&self, doc: &DocumentInfo) -> PathBuf {
        self.root.join(format!("{}.json", doc.id))
    }
}

impl StateStore for FileStateStore {
    fn load(&self, doc: &DocumentInfo) -> Result<Option<PersistedDocumentState>> {
        let path = self.state_path(doc);
        if !path.exists() {
            return Ok(None);
        }
        let mut file =
            File::open(&path).with_context(|| format!("failed to open state file {:?}", path))?;
        let mut buf = String::new();
        file.read_to_string(&mut buf)?;
        let state = serde_json::from_str(&buf)
            .with_context(|| format!("failed to decode state file {:?}", path))?;
        Ok(Some(state))
    }

    fn save(&self, doc: &DocumentInfo, state: &PersistedDocumentState) -> Result<()> {
        let path = self.state_path(doc);
        let tmp = path.with_extension("json.tmp");
        let payload = serde_json::to_string_pretty(state)?;
        let mut file = File::create(&tmp)
            .with_context(|| format!("failed to open temp state file {:?}", tmp))?;
        file.write_all(payload.as_bytes())?;
        file.flush()?;
        fs::rename(tmp, path)?;
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryStateStore {
    inner: Mutex<HashMap<DocumentId, PersistedDocumentState>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self, doc: &DocumentInfo) -> Result<Option<PersistedDocumentState>> {
        Ok(self.inner.lock().get(&doc.id).cloned())
    }

    fn save(&self, doc: &DocumentInfo, state: &PersistedDocumentState) -> Result<()> {
        self.inner.lock().insert(doc.id, state.clone());
        Ok(())
    }
}
