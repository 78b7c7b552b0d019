//! Syntax Highlighting Module
//!
//! This module integrates syntect for code block syntax highlighting in the
//! preview. Highlighted segments carry a resolved foreground color; the
//! preview turns each color into a style-sheet class so the live document
//! stays style-sheet dependent until export flattens it.
//!
//! # Example
//! ```ignore
//! use crate::markdown::syntax::highlight_code;
//!
//! let lines = highlight_code("fn main() {}\n", "rust", "InspiredGitHub");
//! ```

use log::{debug, warn};
use syntect::easy::HighlightLines;
use syntect::highlighting::{FontStyle, Style, Theme, ThemeSet};
use syntect::parsing::{SyntaxReference, SyntaxSet};
use syntect::util::LinesWithEndings;

use crate::theme::Rgb;

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

/// Default dark theme name from syntect's built-in themes
pub const DEFAULT_DARK_THEME: &str = "base16-ocean.dark";

/// Default light theme name from syntect's built-in themes
pub const DEFAULT_LIGHT_THEME: &str = "InspiredGitHub";

/// Color used when a theme defines no foreground
const FALLBACK_FOREGROUND: Rgb = Rgb::new(51, 51, 51);

// ─────────────────────────────────────────────────────────────────────────────
// Highlighted Segment
// ─────────────────────────────────────────────────────────────────────────────

/// A segment of highlighted text with its associated color.
#[derive(Debug, Clone, PartialEq)]
pub struct HighlightedSegment {
    /// The text content of this segment (may end with a newline)
    pub text: String,
    /// Foreground color for this segment
    pub foreground: Rgb,
    /// Whether this segment should be bold
    pub bold: bool,
    /// Whether this segment should be italic
    pub italic: bool,
}

impl HighlightedSegment {
    /// Create a new highlighted segment.
    pub fn new(text: impl Into<String>, foreground: Rgb) -> Self {
        Self {
            text: text.into(),
            foreground,
            bold: false,
            italic: false,
        }
    }
}

/// A line of highlighted segments.
#[derive(Debug, Clone, PartialEq)]
pub struct HighlightedLine {
    /// The segments that make up this line
    pub segments: Vec<HighlightedSegment>,
}

impl HighlightedLine {
    /// Create an unhighlighted line with a single segment.
    pub fn plain(text: &str, color: Rgb) -> Self {
        Self {
            segments: vec![HighlightedSegment::new(text, color)],
        }
    }
}

/// Result of highlighting a code block.
#[derive(Debug, Clone, PartialEq)]
pub enum Highlighted {
    /// A syntax was found; lines carry token colors
    Tokens(Vec<HighlightedLine>),
    /// No syntax for the language; render as plain text
    Plain,
}

// ─────────────────────────────────────────────────────────────────────────────
// Syntax Highlighter
// ─────────────────────────────────────────────────────────────────────────────

/// Syntax highlighter that caches syntect sets for performance.
pub struct SyntaxHighlighter {
    syntax_set: SyntaxSet,
    theme_set: ThemeSet,
}

impl Default for SyntaxHighlighter {
    fn default() -> Self {
        Self::new()
    }
}

impl SyntaxHighlighter {
    /// Create a new syntax highlighter with default syntax and theme sets.
    ///
    /// Loading is relatively expensive, so the highlighter should be cached
    /// and reused (see [`get_highlighter`]).
    pub fn new() -> Self {
        debug!("Loading syntect syntax and theme sets");
        let syntax_set = SyntaxSet::load_defaults_newlines();
        let theme_set = ThemeSet::load_defaults();
        debug!(
            "Loaded {} syntaxes and {} themes",
            syntax_set.syntaxes().len(),
            theme_set.themes.len()
        );
        Self {
            syntax_set,
            theme_set,
        }
    }

    /// Get available theme names.
    pub fn available_themes(&self) -> Vec<&str> {
        self.theme_set.themes.keys().map(|s| s.as_str()).collect()
    }

    /// Get a theme by name, falling back to the light or dark default.
    pub fn get_theme(&self, name: &str, dark_mode: bool) -> Option<&Theme> {
        let fallback = if dark_mode {
            DEFAULT_DARK_THEME
        } else {
            DEFAULT_LIGHT_THEME
        };
        self.theme_set
            .themes
            .get(name)
            .or_else(|| self.theme_set.themes.get(fallback))
    }

    /// Highlight code with the specified language and theme.
    pub fn highlight(&self, code: &str, language: &str, theme: &Theme) -> Highlighted {
        let Some(syntax) = self.find_syntax_for_language(language) else {
            debug!("No syntax found for language: {:?}", language);
            return Highlighted::Plain;
        };

        let default_color = theme
            .settings
            .foreground
            .map(syntect_to_rgb)
            .unwrap_or(FALLBACK_FOREGROUND);
        let mut highlighter = HighlightLines::new(syntax, theme);
        let mut lines = Vec::new();

        for line in LinesWithEndings::from(code) {
            match highlighter.highlight_line(line, &self.syntax_set) {
                Ok(ranges) => {
                    let segments = ranges
                        .into_iter()
                        .map(|(style, text)| style_to_segment(style, text))
                        .collect();
                    lines.push(HighlightedLine { segments });
                }
                Err(e) => {
                    warn!("Failed to highlight line: {}", e);
                    lines.push(HighlightedLine::plain(line, default_color));
                }
            }
        }

        Highlighted::Tokens(lines)
    }

    /// Find syntax definition for a language identifier.
    ///
    /// Tries the alias table (as an extension), then the syntax name, then a
    /// case-insensitive name match.
    fn find_syntax_for_language(&self, language: &str) -> Option<&SyntaxReference> {
        if language.is_empty() {
            return None;
        }

        let lang_lower = language.to_lowercase();

        let extension = match lang_lower.as_str() {
            "rust" | "rs" => "rs",
            "python" | "py" => "py",
            "javascript" | "js" => "js",
            "typescript" | "ts" => "ts",
            "c" => "c",
            "cpp" | "c++" | "cxx" => "cpp",
            "csharp" | "c#" | "cs" => "cs",
            "java" => "java",
            "go" | "golang" => "go",
            "ruby" | "rb" => "rb",
            "php" => "php",
            "html" | "htm" => "html",
            "css" => "css",
            "json" => "json",
            "yaml" | "yml" => "yaml",
            "xml" => "xml",
            "markdown" | "md" => "md",
            "sql" => "sql",
            "shell" | "sh" | "bash" | "zsh" => "sh",
            "latex" | "tex" => "tex",
            "haskell" | "hs" => "hs",
            "diff" | "patch" => "diff",
            other => other,
        };

        if let Some(syntax) = self.syntax_set.find_syntax_by_extension(extension) {
            return Some(syntax);
        }

        if let Some(syntax) = self.syntax_set.find_syntax_by_name(language) {
            return Some(syntax);
        }

        self.syntax_set
            .syntaxes()
            .iter()
            .find(|syntax| syntax.name.to_lowercase() == lang_lower)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Helper Functions
// ─────────────────────────────────────────────────────────────────────────────

/// Convert a syntect color to an opaque `Rgb`.
pub fn syntect_to_rgb(color: syntect::highlighting::Color) -> Rgb {
    Rgb::new(color.r, color.g, color.b)
}

fn style_to_segment(style: Style, text: &str) -> HighlightedSegment {
    HighlightedSegment {
        text: text.to_string(),
        foreground: syntect_to_rgb(style.foreground),
        bold: style.font_style.contains(FontStyle::BOLD),
        italic: style.font_style.contains(FontStyle::ITALIC),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Global Highlighter Instance
// ─────────────────────────────────────────────────────────────────────────────

use std::sync::OnceLock;

static HIGHLIGHTER: OnceLock<SyntaxHighlighter> = OnceLock::new();

/// Get or create the global syntax highlighter.
pub fn get_highlighter() -> &'static SyntaxHighlighter {
    HIGHLIGHTER.get_or_init(SyntaxHighlighter::new)
}

/// Highlight code with a theme name using the global highlighter.
///
/// Returns `Highlighted::Plain` when neither the named theme nor the
/// default theme exists, or when the language is unknown.
pub fn highlight_code(code: &str, language: &str, theme_name: &str, dark_mode: bool) -> Highlighted {
    let highlighter = get_highlighter();
    match highlighter.get_theme(theme_name, dark_mode) {
        Some(theme) => highlighter.highlight(code, language, theme),
        None => Highlighted::Plain,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_available_themes() {
        let highlighter = get_highlighter();
        let themes = highlighter.available_themes();
        assert!(themes.contains(&DEFAULT_DARK_THEME));
        assert!(themes.contains(&DEFAULT_LIGHT_THEME));
    }

    #[test]
    fn test_highlight_rust_code_keeps_newlines() {
        let code = "fn main() {\n    println!(\"Hello\");\n}\n";
        match highlight_code(code, "rust", DEFAULT_LIGHT_THEME, false) {
            Highlighted::Tokens(lines) => {
                assert_eq!(lines.len(), 3);
                let joined: String = lines
                    .iter()
                    .flat_map(|l| l.segments.iter().map(|s| s.text.as_str()))
                    .collect();
                assert_eq!(joined, code);
            }
            Highlighted::Plain => panic!("Rust should be recognized"),
        }
    }

    #[test]
    fn test_highlight_unknown_language_is_plain() {
        assert_eq!(
            highlight_code("some text", "unknownlang123", DEFAULT_LIGHT_THEME, false),
            Highlighted::Plain
        );
        assert_eq!(
            highlight_code("some text", "", DEFAULT_LIGHT_THEME, false),
            Highlighted::Plain
        );
    }

    #[test]
    fn test_unknown_theme_falls_back() {
        let highlighter = get_highlighter();
        assert!(highlighter.get_theme("no-such-theme", true).is_some());
    }

    #[test]
    fn test_language_aliases() {
        let highlighter = get_highlighter();
        for (alias, canonical) in [("rs", "rust"), ("py", "python"), ("js", "javascript")] {
            let a = highlighter.find_syntax_for_language(alias);
            let b = highlighter.find_syntax_for_language(canonical);
            if let (Some(a), Some(b)) = (a, b) {
                assert_eq!(a.name, b.name, "{} should map like {}", alias, canonical);
            }
        }
    }

    #[test]
    fn test_syntect_to_rgb() {
        let color = syntect::highlighting::Color {
            r: 255,
            g: 128,
            b: 64,
            a: 255,
        };
        assert_eq!(syntect_to_rgb(color), Rgb::new(255, 128, 64));
    }
}
