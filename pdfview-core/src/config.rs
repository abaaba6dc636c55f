use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr};
use tracing::warn;

use crate::backend::Color;
use crate::overlay::links::DEFAULT_MARKER_LETTERS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DarkModePolicy {
    /// Invert when the host theme is dark.
    #[default]
    Follow,
    Force,
    Ignore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeMode {
    #[default]
    Light,
    Dark,
}

/// Colours of the surrounding UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostTheme {
    pub mode: ThemeMode,
    pub background: Color,
    pub foreground: Color,
}

impl Default for HostTheme {
    fn default() -> Self {
        Self {
            mode: ThemeMode::Light,
            background: Color::WHITE,
            foreground: Color::BLACK,
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub marker_letters: String,
    pub marker_font_size: f32,
    #[serde_as(as = "DisplayFromStr")]
    pub marker_color: Color,
    pub dark_mode: DarkModePolicy,
    pub dark_exclude_image: bool,
    pub default_zoom: f32,
    pub zoom_step: f32,
    pub scroll_ratio: f32,
    pub page_padding: f32,
    #[serde_as(as = "DisplayFromStr")]
    pub highlight_color: Color,
    #[serde_as(as = "DisplayFromStr")]
    pub underline_color: Color,
    #[serde_as(as = "DisplayFromStr")]
    pub strikeout_color: Color,
    #[serde_as(as = "DisplayFromStr")]
    pub squiggly_color: Color,
    #[serde_as(as = "DisplayFromStr")]
    pub text_annot_color: Color,
    #[serde_as(as = "DisplayFromStr")]
    pub inline_text_color: Color,
    pub inline_text_font_size: f32,
    #[serde_as(as = "DisplayFromStr")]
    pub search_highlight_color: Color,
    #[serde_as(as = "DisplayFromStr")]
    pub selection_color: Color,
    #[serde_as(as = "DisplayFromStr")]
    pub link_mark_color: Color,
    pub notify_file_changed: bool,
    pub store_history: bool,
    pub show_progress: bool,
    pub annot_author: String,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            marker_letters: DEFAULT_MARKER_LETTERS.to_string(),
            marker_font_size: 8.0,
            marker_color: Color::rgb(0xFF, 0xC5, 0x24),
            dark_mode: DarkModePolicy::Follow,
            dark_exclude_image: true,
            default_zoom: 1.0,
            zoom_step: 0.2,
            scroll_ratio: 0.05,
            page_padding: 10.0,
            highlight_color: Color::rgb(0xFF, 0xC5, 0x24),
            underline_color: Color::rgb(0x11, 0xAA, 0x00),
            strikeout_color: Color::rgb(0xDD, 0x22, 0x22),
            squiggly_color: Color::rgb(0x22, 0x66, 0xDD),
            text_annot_color: Color::rgb(0xFF, 0xC5, 0x24),
            inline_text_color: Color::rgb(0x00, 0x00, 0x00),
            inline_text_font_size: 15.0,
            search_highlight_color: Color::rgb(0xFF, 0xE0, 0x66),
            selection_color: Color::rgb(0x66, 0x99, 0xFF),
            link_mark_color: Color::rgb(0x33, 0x66, 0xFF),
            notify_file_changed: true,
            store_history: true,
            show_progress: true,
            annot_author: "pdfview".to_string(),
        }
    }
}

/// Typed answer to a config lookup by name.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    Color(Color),
    Float(f32),
    Str(String),
    Bool(bool),
}

impl ViewerConfig {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {:?}", path))?;
        let config: ViewerConfig = toml::from_str(&raw)
            .with_context(|| format!("failed to parse config file {:?}", path))?;
        Ok(config.sanitized())
    }

    /// Replaces values that would break the viewport math with their defaults.
    pub fn sanitized(mut self) -> Self {
        let defaults = Self::default();
        if !(self.zoom_step.is_finite() && self.zoom_step > 0.0) {
            warn!(zoom_step = self.zoom_step, "ignoring invalid zoom step");
            self.zoom_step = defaults.zoom_step;
        }
        if !(self.scroll_ratio.is_finite() && self.scroll_ratio > 0.0 && self.scroll_ratio <= 1.0) {
            warn!(scroll_ratio = self.scroll_ratio, "ignoring invalid scroll ratio");
            self.scroll_ratio = defaults.scroll_ratio;
        }
        if !(self.default_zoom.is_finite() && self.default_zoom > 0.0) {
            self.default_zoom = defaults.default_zoom;
        }
        if !(self.page_padding.is_finite() && self.page_padding >= 0.0) {
            self.page_padding = defaults.page_padding;
        }
        if !(self.marker_font_size.is_finite() && self.marker_font_size > 0.0) {
            self.marker_font_size = defaults.marker_font_size;
        }
        if !(self.inline_text_font_size.is_finite() && self.inline_text_font_size > 0.0) {
            self.inline_text_font_size = defaults.inline_text_font_size;
        }
        self
    }

    pub fn value(&self, name: &str) -> Option<ConfigValue> {
        let key = name.replace('-', "_");
        let serialized = serde_json::to_value(self).ok()?;
        match serialized.get(&key)? {
            serde_json::Value::Bool(flag) => Some(ConfigValue::Bool(*flag)),
            serde_json::Value::Number(number) => {
                number.as_f64().map(|n| ConfigValue::Float(n as f32))
            }
            serde_json::Value::String(text) => Some(match text.parse::<Color>() {
                Ok(color) if text.starts_with('#') => ConfigValue::Color(color),
                _ => ConfigValue::Str(text.clone()),
            }),
            _ => None,
        }
    }
}
