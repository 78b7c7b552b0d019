//! Formula requests and lifecycle states

use std::fmt;

use super::resolution::DEFAULT_TARGET_DPI;

// ─────────────────────────────────────────────────────────────────────────────
// Display Mode
// ─────────────────────────────────────────────────────────────────────────────

/// Whether a formula is typeset as a block or inline with text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DisplayMode {
    Block,
    #[default]
    Inline,
}

impl DisplayMode {
    /// `true` for block (display) math.
    pub fn is_block(self) -> bool {
        matches!(self, DisplayMode::Block)
    }

    /// Block when `display` is set, inline otherwise.
    pub fn from_display(display: bool) -> Self {
        if display {
            DisplayMode::Block
        } else {
            DisplayMode::Inline
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Font Size Context
// ─────────────────────────────────────────────────────────────────────────────

/// Font size inherited from the text surrounding a formula, in CSS px.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FontSizeContext(f32);

impl FontSizeContext {
    /// Wrap a pixel size; non-positive or non-finite sizes are rejected.
    pub fn from_px(px: f32) -> Option<Self> {
        (px.is_finite() && px > 0.0).then_some(Self(px))
    }

    /// Parse `"16px"`, `"12pt"` or a bare number (px).
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        let (number, factor) = if let Some(n) = value.strip_suffix("px") {
            (n, 1.0)
        } else if let Some(n) = value.strip_suffix("pt") {
            (n, 96.0 / 72.0)
        } else {
            (value, 1.0)
        };
        number
            .trim()
            .parse::<f32>()
            .ok()
            .and_then(|n| Self::from_px(n * factor))
    }

    /// Size in CSS px.
    pub fn px(self) -> f32 {
        self.0
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Formula Request
// ─────────────────────────────────────────────────────────────────────────────

/// Everything that determines the rendering of one formula occurrence.
///
/// Two requests are the same request exactly when all fields are equal; any
/// change invalidates in-flight work for the occurrence.
#[derive(Debug, Clone, PartialEq)]
pub struct FormulaRequest {
    /// Math markup (TeX)
    pub source: String,
    /// Block or inline
    pub display_mode: DisplayMode,
    /// Font size of the surrounding text
    pub font_size_context: Option<FontSizeContext>,
    /// Resolution of the paste target
    pub target_dpi: u32,
    /// Encoding quality in `[0, 1]`
    pub quality: f32,
}

impl FormulaRequest {
    /// Create a request with default DPI (96) and quality (1.0).
    pub fn new(source: impl Into<String>, display_mode: DisplayMode) -> Self {
        Self {
            source: source.into(),
            display_mode,
            font_size_context: None,
            target_dpi: DEFAULT_TARGET_DPI,
            quality: 1.0,
        }
    }

    /// Set the inherited font size.
    pub fn with_font_size(mut self, context: Option<FontSizeContext>) -> Self {
        self.font_size_context = context;
        self
    }

    /// Set the target DPI; zero falls back to the default.
    pub fn with_target_dpi(mut self, dpi: u32) -> Self {
        self.target_dpi = if dpi == 0 { DEFAULT_TARGET_DPI } else { dpi };
        self
    }

    /// Set the quality, clamped to `[0, 1]` (non-finite becomes 1.0).
    pub fn with_quality(mut self, quality: f32) -> Self {
        self.quality = if quality.is_finite() {
            quality.clamp(0.0, 1.0)
        } else {
            1.0
        };
        self
    }

    /// `true` when there is nothing to typeset.
    pub fn is_empty(&self) -> bool {
        self.source.trim().is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Formula State
// ─────────────────────────────────────────────────────────────────────────────

/// A successfully rasterized formula.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedFormula {
    /// Self-contained `data:` URI of the encoded image
    pub data_uri: String,
    /// Display width in CSS px (the staging container's width)
    pub width: u32,
    /// Display height in CSS px
    pub height: u32,
    /// Intrinsic bitmap width
    pub pixel_width: u32,
    /// Intrinsic bitmap height
    pub pixel_height: u32,
}

/// What is shown when no image could be produced.
#[derive(Debug, Clone, PartialEq)]
pub enum FallbackContent {
    /// Typeset markup (MathML) rendered directly inline
    Markup(String),
    /// The raw source text
    Text(String),
}

/// Lifecycle state of one formula occurrence.
#[derive(Debug, Clone, PartialEq)]
pub enum FormulaState {
    Loading,
    Rendered(RenderedFormula),
    Fallback(FallbackContent),
    /// Image generation failed; `fallback` is displayed with an indicator
    Error {
        detail: String,
        fallback: FallbackContent,
    },
}

impl FormulaState {
    /// `true` once the state can no longer change for the current request.
    pub fn is_settled(&self) -> bool {
        !matches!(self, FormulaState::Loading)
    }

    /// Short name for logs and messages.
    pub fn label(&self) -> &'static str {
        match self {
            FormulaState::Loading => "loading",
            FormulaState::Rendered(_) => "rendered",
            FormulaState::Fallback(_) => "fallback",
            FormulaState::Error { .. } => "error",
        }
    }
}

impl fmt::Display for FormulaState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
