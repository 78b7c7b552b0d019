//! Document Export Module for pastemark
//!
//! This module turns the settled preview into a portable HTML fragment and
//! commits it to the clipboard or to a standalone file.
//!
//! # Supported Export Formats
//!
//! - **HTML File**: Complete HTML document wrapping the portable fragment
//! - **Clipboard HTML**: Portable fragment for pasting into word processors and mail clients
//!
//! # Architecture
//!
//! - `options.rs` - Typography inlined into the fragment
//! - `html.rs` - Export transform and style injection
//! - `clipboard.rs` - Tiered clipboard writer

pub mod clipboard;
pub mod html;
pub mod options;

pub use clipboard::{ArboardBackend, ClipboardBackend, ClipboardError, ClipboardWriter, CopyOutcome};
pub use html::{export_fragment, generate_html_document, inject_portable_styles};
pub use options::ExportOptions;
