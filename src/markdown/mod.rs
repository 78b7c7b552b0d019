//! Markdown parsing and syntax highlighting
//!
//! This module adapts the comrak parser (CommonMark + GFM + dollar math) and
//! the syntect highlighter for the preview. Math segments come out of the
//! parser as a typed variant; code blocks come out of the highlighter as
//! colored segments.

mod parser;
pub mod syntax;

pub use parser::{
    parse_markdown, parse_markdown_with_options, HeadingLevel, ListType, MarkdownDocument,
    MarkdownNode, MarkdownNodeType, MarkdownOptions, TableAlignment,
};
pub use syntax::{get_highlighter, highlight_code, Highlighted, HighlightedLine, HighlightedSegment};
