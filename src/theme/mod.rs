//! Theme palettes for the preview and the export fragment
//!
//! The preview's style sheet and the export transform's baseline typography
//! are both derived from a `ThemeColors` palette. The `Theme` enum in
//! `config::settings` (Light/Dark) selects which palette to use.
//!
//! # Theme Files
//!
//! - `light.rs` - Light palette
//! - `dark.rs` - Dark palette

pub mod dark;
pub mod light;

use crate::config::Theme;
use std::fmt;

// ─────────────────────────────────────────────────────────────────────────────
// Color
// ─────────────────────────────────────────────────────────────────────────────

/// An opaque sRGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    /// Create a color from its components.
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Opaque white, the capture background.
    pub const WHITE: Rgb = Rgb::new(255, 255, 255);

    /// Lowercase hex digits without the leading `#` (used for class names).
    pub fn hex(&self) -> String {
        format!("{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    /// CSS color value (`#rrggbb`).
    pub fn to_css(&self) -> String {
        format!("#{}", self.hex())
    }

    /// Perceived luminance in `[0, 255]`.
    pub fn luminance(&self) -> f32 {
        0.299 * self.r as f32 + 0.587 * self.g as f32 + 0.114 * self.b as f32
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_css())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Theme Colors
// ─────────────────────────────────────────────────────────────────────────────

/// Complete palette used to style the preview.
#[derive(Debug, Clone, PartialEq)]
pub struct ThemeColors {
    /// Base colors (backgrounds, borders)
    pub base: BaseColors,
    /// Text colors for various contexts
    pub text: TextColors,
    /// Colors for rendered markdown elements
    pub markdown: MarkdownColors,
}

impl ThemeColors {
    /// Create theme colors for the given theme variant.
    pub fn from_theme(theme: Theme) -> Self {
        match theme {
            Theme::Light => light::palette(),
            Theme::Dark => dark::palette(),
        }
    }

    /// Get the light theme colors.
    pub fn light() -> Self {
        light::palette()
    }

    /// Get the dark theme colors.
    pub fn dark() -> Self {
        dark::palette()
    }

    /// Check if this is a dark theme.
    pub fn is_dark(&self) -> bool {
        self.base.background.luminance() < 128.0
    }
}

/// Base colors for backgrounds and borders.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BaseColors {
    /// Primary background color
    pub background: Rgb,
    /// Tertiary background (inline code)
    pub background_tertiary: Rgb,
    /// Primary border color
    pub border: Rgb,
}

/// Text colors for various contexts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextColors {
    /// Primary text color (main content)
    pub primary: Rgb,
    /// Muted text color (quotes, hints)
    pub muted: Rgb,
    /// Link text color
    pub link: Rgb,
    /// Inline code text color
    pub code: Rgb,
    /// Error indicator color
    pub error: Rgb,
}

/// Colors specific to rendered markdown elements.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarkdownColors {
    /// Heading text color (H1-H6)
    pub heading: Rgb,
    /// Block quote border color
    pub blockquote_border: Rgb,
    /// Block quote text color
    pub blockquote_text: Rgb,
    /// Code block background color
    pub code_block_bg: Rgb,
    /// Code block border color
    pub code_block_border: Rgb,
    /// Horizontal rule color
    pub horizontal_rule: Rgb,
    /// Table border color
    pub table_border: Rgb,
    /// Table header background
    pub table_header_bg: Rgb,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rgb_to_css() {
        assert_eq!(Rgb::new(255, 128, 64).to_css(), "#ff8040");
        assert_eq!(Rgb::new(0, 1, 2).hex(), "000102");
    }

    #[test]
    fn test_light_is_not_dark() {
        assert!(!ThemeColors::light().is_dark());
        assert!(ThemeColors::dark().is_dark());
    }

    #[test]
    fn test_from_theme() {
        assert_eq!(ThemeColors::from_theme(Theme::Dark), ThemeColors::dark());
        assert_eq!(ThemeColors::from_theme(Theme::Light), ThemeColors::light());
    }
}
