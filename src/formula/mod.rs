//! Formula rasterization pipeline
//!
//! Turns a math source into a fixed-size bitmap whose display size does not
//! depend on the viewing device or the paste target's assumed resolution.
//!
//! # Pipeline
//!
//! - `resolution` - device pixel ratio and target DPI to a capture scale
//! - `typeset` - math source to a measurable glyph run (plus MathML markup)
//! - `staging` - self-styled off-screen container, measurement, recentering
//! - `raster` - capture to a bitmap and encode with format fallback
//! - `lifecycle` - per-occurrence state machine with supersession
//! - `actions` - copy-source and save-image actions on a rendered formula

pub mod actions;
pub mod glyphs;
pub mod lifecycle;
pub mod raster;
pub mod request;
pub mod resolution;
pub mod staging;
pub mod typeset;

use std::fmt;

pub use lifecycle::{FormulaController, OccurrenceId};
pub use request::{
    DisplayMode, FallbackContent, FontSizeContext, FormulaRequest, FormulaState, RenderedFormula,
};
pub use typeset::{KatexTypesetter, LayoutSignal, Typesetter};

/// Errors raised inside the formula pipeline.
///
/// None of these are fatal: the lifecycle controller maps each one to a
/// `Fallback` or `Error` state for the affected occurrence.
#[derive(Debug, Clone, PartialEq)]
pub enum FormulaError {
    /// The math source could not be typeset
    Typeset(String),
    /// The staging container could not be captured to a bitmap
    Capture(String),
    /// Every image encoder failed
    Encode(String),
    /// Staging element bookkeeping failed (e.g. detached twice)
    Staging(String),
}

impl fmt::Display for FormulaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormulaError::Typeset(msg) => write!(f, "Typesetting failed: {}", msg),
            FormulaError::Capture(msg) => write!(f, "Capture failed: {}", msg),
            FormulaError::Encode(msg) => write!(f, "Image encoding failed: {}", msg),
            FormulaError::Staging(msg) => write!(f, "Staging cleanup failed: {}", msg),
        }
    }
}

impl std::error::Error for FormulaError {}
