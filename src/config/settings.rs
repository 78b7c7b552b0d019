//! User settings and preferences for pastemark
//!
//! This module defines the `Settings` struct that holds all user-configurable
//! options, with serde support for JSON persistence.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::formula::resolution::{DEFAULT_TARGET_DPI, MIN_DEVICE_PIXEL_RATIO};

// ─────────────────────────────────────────────────────────────────────────────
// Theme Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Available color themes for the preview.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    /// Get a display label for the theme.
    pub fn label(&self) -> &'static str {
        match self {
            Theme::Light => "Light",
            Theme::Dark => "Dark",
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Formula Settings
// ─────────────────────────────────────────────────────────────────────────────

/// Defaults applied to every formula occurrence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormulaSettings {
    /// Resolution the pasted image is assumed to be displayed at
    pub target_dpi: u32,

    /// Encoding quality in `[0, 1]`
    pub quality: f32,

    /// Device pixel ratio of the capture surface (floor 1.0)
    pub device_pixel_ratio: f32,

    /// Bounded wait for layout to settle when the typesetter cannot signal completion
    pub settle_delay_ms: u64,

    /// Font used to rasterize formulas (system fonts are probed when unset)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_path: Option<PathBuf>,
}

impl Default for FormulaSettings {
    fn default() -> Self {
        Self {
            target_dpi: DEFAULT_TARGET_DPI,
            quality: 1.0,
            device_pixel_ratio: MIN_DEVICE_PIXEL_RATIO,
            settle_delay_ms: 100,
            font_path: None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Export Settings
// ─────────────────────────────────────────────────────────────────────────────

/// Persistent export preferences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportSettings {
    /// Base font size of the exported fragment (px)
    pub base_font_size: f32,

    /// Last directory used for HTML export
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_export_directory: Option<PathBuf>,

    /// Seconds a confirmation or error message stays visible
    pub toast_duration_secs: f64,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            base_font_size: 16.0,
            last_export_directory: None,
            toast_duration_secs: 2.0,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Main Settings Struct
// ─────────────────────────────────────────────────────────────────────────────

/// User preferences and application settings.
///
/// This struct is serialized to JSON and persisted to the user's config directory.
/// All fields have sensible defaults via the `Default` trait and `#[serde(default)]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Color theme of the preview
    pub theme: Theme,

    /// Syntax highlighting theme name (syntect)
    pub syntax_theme: String,

    /// Formula rasterization defaults
    pub formula: FormulaSettings,

    /// Export preferences
    pub export: ExportSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            theme: Theme::default(),
            syntax_theme: String::from("InspiredGitHub"),
            formula: FormulaSettings::default(),
            export: ExportSettings::default(),
        }
    }
}

impl Settings {
    // ─────────────────────────────────────────────────────────────────────────
    // Validation Constants and Sanitization
    // ─────────────────────────────────────────────────────────────────────────

    /// Minimum allowed target DPI.
    pub const MIN_TARGET_DPI: u32 = 36;
    /// Maximum allowed target DPI.
    pub const MAX_TARGET_DPI: u32 = 1200;
    /// Maximum device pixel ratio.
    pub const MAX_DEVICE_PIXEL_RATIO: f32 = 8.0;
    /// Maximum settle delay.
    pub const MAX_SETTLE_DELAY_MS: u64 = 2000;
    /// Minimum allowed export font size.
    pub const MIN_FONT_SIZE: f32 = 8.0;
    /// Maximum allowed export font size.
    pub const MAX_FONT_SIZE: f32 = 72.0;

    /// Sanitize settings by clamping values to valid ranges.
    ///
    /// This is useful after loading settings from a file that might have
    /// been manually edited with invalid values.
    pub fn sanitize(&mut self) {
        self.formula.target_dpi = self
            .formula
            .target_dpi
            .clamp(Self::MIN_TARGET_DPI, Self::MAX_TARGET_DPI);

        self.formula.quality = if self.formula.quality.is_finite() {
            self.formula.quality.clamp(0.0, 1.0)
        } else {
            1.0
        };

        self.formula.device_pixel_ratio = if self.formula.device_pixel_ratio.is_finite() {
            self.formula
                .device_pixel_ratio
                .clamp(MIN_DEVICE_PIXEL_RATIO, Self::MAX_DEVICE_PIXEL_RATIO)
        } else {
            MIN_DEVICE_PIXEL_RATIO
        };

        self.formula.settle_delay_ms = self.formula.settle_delay_ms.min(Self::MAX_SETTLE_DELAY_MS);

        self.export.base_font_size = self
            .export
            .base_font_size
            .clamp(Self::MIN_FONT_SIZE, Self::MAX_FONT_SIZE);

        if !(self.export.toast_duration_secs > 0.0) {
            self.export.toast_duration_secs = ExportSettings::default().toast_duration_secs;
        }
    }

    /// Load settings and sanitize them to ensure validity.
    ///
    /// This is a convenience method that deserializes and then sanitizes.
    pub fn from_json_sanitized(json: &str) -> Result<Self, serde_json::Error> {
        let mut settings: Self = serde_json::from_str(json)?;
        settings.sanitize();
        Ok(settings)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();

        assert_eq!(settings.theme, Theme::Light);
        assert_eq!(settings.formula.target_dpi, 96);
        assert_eq!(settings.formula.quality, 1.0);
        assert_eq!(settings.formula.device_pixel_ratio, 1.0);
        assert!(settings.formula.font_path.is_none());
        assert_eq!(settings.export.base_font_size, 16.0);
    }

    #[test]
    fn test_sanitize_clamps_formula_values() {
        let mut settings = Settings::default();
        settings.formula.target_dpi = 0;
        settings.formula.quality = 3.0;
        settings.formula.device_pixel_ratio = 0.25;
        settings.formula.settle_delay_ms = 60_000;

        settings.sanitize();

        assert_eq!(settings.formula.target_dpi, Settings::MIN_TARGET_DPI);
        assert_eq!(settings.formula.quality, 1.0);
        assert_eq!(settings.formula.device_pixel_ratio, 1.0);
        assert_eq!(settings.formula.settle_delay_ms, Settings::MAX_SETTLE_DELAY_MS);
    }

    #[test]
    fn test_sanitize_replaces_non_finite() {
        let mut settings = Settings::default();
        settings.formula.quality = f32::NAN;
        settings.formula.device_pixel_ratio = f32::INFINITY;
        settings.export.toast_duration_secs = -1.0;

        settings.sanitize();

        assert_eq!(settings.formula.quality, 1.0);
        assert_eq!(settings.formula.device_pixel_ratio, 1.0);
        assert_eq!(settings.export.toast_duration_secs, 2.0);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let settings = Settings::from_json_sanitized(r#"{"theme": "dark"}"#).unwrap();
        assert_eq!(settings.theme, Theme::Dark);
        assert_eq!(settings.formula, FormulaSettings::default());
    }

    #[test]
    fn test_nested_partial_json() {
        let settings =
            Settings::from_json_sanitized(r#"{"formula": {"target_dpi": 192}}"#).unwrap();
        assert_eq!(settings.formula.target_dpi, 192);
        assert_eq!(settings.formula.quality, 1.0);
    }

    #[test]
    fn test_settings_serialization_roundtrip() {
        let mut settings = Settings::default();
        settings.theme = Theme::Dark;
        settings.formula.font_path = Some(PathBuf::from("/fonts/math.ttf"));

        let json = serde_json::to_string_pretty(&settings).unwrap();
        let loaded: Settings = serde_json::from_str(&json).unwrap();
        assert_eq!(settings, loaded);
    }

    #[test]
    fn test_theme_label() {
        assert_eq!(Theme::Light.label(), "Light");
        assert_eq!(Theme::Dark.label(), "Dark");
    }
}
