//! Live preview module for pastemark
//!
//! This module holds the rendered preview of a markdown document: an arena
//! document tree, the style sheet that styles it, and the formula
//! placeholders that the formula controller fills in.
//!
//! # Architecture
//!
//! - `dom.rs` - Arena document tree and deterministic serialization
//! - `style.rs` - Selectors, cascade and computed styles
//! - `document.rs` - Markdown to preview conversion and formula placeholders

pub mod document;
pub mod dom;
pub mod style;

pub use document::{FormulaOccurrence, PreviewDocument, PreviewOptions, Selection};
pub use dom::{Declarations, Dom, Element, NodeData, NodeId};
pub use style::{Selector, Stylesheet};
