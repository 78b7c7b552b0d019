//! Export Options and Configuration
//!
//! This module defines the typography that the export transform writes onto
//! the fragment as inline styles. Options are derived
//! from the theme palette so the pasted fragment looks like the preview.

use serde::{Deserialize, Serialize};

use crate::preview::style::{MONO_FONT_STACK, SANS_FONT_STACK};
use crate::theme::ThemeColors;

// ─────────────────────────────────────────────────────────────────────────────
// Export Options
// ─────────────────────────────────────────────────────────────────────────────

/// Typography and colors inlined into the export fragment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportOptions {
    /// Body font stack
    pub font_family: String,
    /// Code font stack
    pub mono_font_family: String,
    /// Body font size in px
    pub font_size: f32,
    /// Unitless line height
    pub line_height: f32,
    /// Body text color (`#rrggbb`)
    pub text_color: String,
    /// Page background (`#rrggbb`)
    pub background_color: String,

    /// Inline code background
    pub code_background: String,
    /// Inline code text color
    pub code_color: String,

    /// Table cell border color
    pub table_border: String,
    /// Header cell background
    pub table_header_background: String,

    /// Block quote left border color
    pub quote_border: String,
    /// Block quote text color
    pub quote_color: String,

    /// Heading text color
    pub heading_color: String,
    /// h1 font size in px
    pub heading_base_size: f32,
    /// Size decrease per heading level in px
    pub heading_step: f32,
    /// Smallest heading size in px
    pub heading_min_size: f32,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self::from_colors(&ThemeColors::light(), 16.0)
    }
}

impl ExportOptions {
    /// Options matching a palette and body font size.
    pub fn from_colors(colors: &ThemeColors, font_size: f32) -> Self {
        Self {
            font_family: SANS_FONT_STACK.to_string(),
            mono_font_family: MONO_FONT_STACK.to_string(),
            font_size,
            line_height: 1.6,
            text_color: colors.text.primary.to_css(),
            background_color: colors.base.background.to_css(),
            code_background: colors.base.background_tertiary.to_css(),
            code_color: colors.text.code.to_css(),
            table_border: colors.markdown.table_border.to_css(),
            table_header_background: colors.markdown.table_header_bg.to_css(),
            quote_border: colors.markdown.blockquote_border.to_css(),
            quote_color: colors.markdown.blockquote_text.to_css(),
            heading_color: colors.markdown.heading.to_css(),
            heading_base_size: 28.0,
            heading_step: 4.0,
            heading_min_size: 14.0,
        }
    }

    /// Font size of heading `level` (1-6): base minus one step per level,
    /// never below the floor.
    pub fn heading_size(&self, level: u8) -> f32 {
        let steps = level.clamp(1, 6).saturating_sub(1) as f32;
        (self.heading_base_size - steps * self.heading_step).max(self.heading_min_size)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heading_sizes_descend_to_floor() {
        let options = ExportOptions::default();
        let sizes: Vec<f32> = (1..=6).map(|l| options.heading_size(l)).collect();
        assert_eq!(sizes, vec![28.0, 24.0, 20.0, 16.0, 14.0, 14.0]);
    }

    #[test]
    fn test_options_follow_palette() {
        let dark = ExportOptions::from_colors(&ThemeColors::dark(), 18.0);
        assert_eq!(dark.font_size, 18.0);
        assert_eq!(dark.text_color, ThemeColors::dark().text.primary.to_css());
        assert_ne!(dark.background_color, ExportOptions::default().background_color);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let options: ExportOptions = serde_json::from_str(r#"{"font_size": 12.0}"#).unwrap();
        assert_eq!(options.font_size, 12.0);
        assert_eq!(options.heading_base_size, 28.0);
    }
}
