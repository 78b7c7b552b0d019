//! Clipboard Operations for HTML Export
//!
//! The exported fragment is committed through a tiered strategy: a
//! structured HTML write first, then a copy of the rendered preview
//! selection, and finally guidance for copying by hand. Every outcome
//! carries a message for the user.

// - enum_variant_names: Error variants follow standard naming convention
#![allow(clippy::enum_variant_names)]

use arboard::{Clipboard, Set};
#[cfg(target_os = "linux")]
use arboard::SetExtLinux;
use log::{info, warn};

use crate::preview::Selection;

// ─────────────────────────────────────────────────────────────────────────────
// Clipboard Error
// ─────────────────────────────────────────────────────────────────────────────

/// Errors that can occur during clipboard operations.
#[derive(Debug, Clone, PartialEq)]
pub enum ClipboardError {
    /// Failed to access clipboard
    AccessError(String),
    /// Failed to set clipboard content
    WriteError(String),
}

impl std::fmt::Display for ClipboardError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClipboardError::AccessError(msg) => write!(f, "Clipboard access error: {}", msg),
            ClipboardError::WriteError(msg) => write!(f, "Clipboard write error: {}", msg),
        }
    }
}

impl std::error::Error for ClipboardError {}

impl From<arboard::Error> for ClipboardError {
    fn from(err: arboard::Error) -> Self {
        ClipboardError::WriteError(err.to_string())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Backends
// ─────────────────────────────────────────────────────────────────────────────

/// A system clipboard.
pub trait ClipboardBackend {
    /// Write `html` with the HTML content type, `alt_text` as plain text.
    fn write_html(&mut self, html: &str, alt_text: &str) -> Result<(), ClipboardError>;

    /// Copy the rendered preview selection.
    fn copy_selection(&mut self, selection: &Selection) -> Result<(), ClipboardError>;

    /// Write plain text.
    fn write_text(&mut self, text: &str) -> Result<(), ClipboardError>;
}

/// Clipboard backed by arboard.
///
/// The handle is opened on first use and kept for the backend's lifetime.
/// On X11 and Wayland the contents are only served while the writing process
/// is alive, so a process that exits right after copying should use
/// [`ArboardBackend::serving`].
#[derive(Default)]
pub struct ArboardBackend {
    clipboard: Option<Clipboard>,
    /// Block each write until another application replaces the contents
    serve_until_replaced: bool,
}

impl ArboardBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend whose writes keep serving the clipboard until it is
    /// overwritten. Only Linux needs this; elsewhere it behaves like `new`.
    pub fn serving() -> Self {
        Self {
            clipboard: None,
            serve_until_replaced: true,
        }
    }

    pub fn serves_until_replaced(&self) -> bool {
        self.serve_until_replaced
    }

    fn set(&mut self) -> Result<Set<'_>, ClipboardError> {
        let serve = self.serve_until_replaced;
        let set = self.clipboard()?.set();
        #[cfg(target_os = "linux")]
        let set = if serve { set.wait() } else { set };
        #[cfg(not(target_os = "linux"))]
        let _ = serve;
        Ok(set)
    }

    fn clipboard(&mut self) -> Result<&mut Clipboard, ClipboardError> {
        if self.clipboard.is_none() {
            let clipboard =
                Clipboard::new().map_err(|e| ClipboardError::AccessError(e.to_string()))?;
            self.clipboard = Some(clipboard);
        }
        self.clipboard
            .as_mut()
            .ok_or_else(|| ClipboardError::AccessError("clipboard unavailable".to_string()))
    }
}

impl ClipboardBackend for ArboardBackend {
    fn write_html(&mut self, html: &str, alt_text: &str) -> Result<(), ClipboardError> {
        self.set()?.html(html, Some(alt_text))?;
        Ok(())
    }

    fn copy_selection(&mut self, selection: &Selection) -> Result<(), ClipboardError> {
        self.set()?.text(selection.text.as_str())?;
        Ok(())
    }

    fn write_text(&mut self, text: &str) -> Result<(), ClipboardError> {
        self.set()?.text(text)?;
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Clipboard Writer
// ─────────────────────────────────────────────────────────────────────────────

/// Which tier committed the copy.
#[derive(Debug, Clone, PartialEq)]
pub enum CopyOutcome {
    /// The fragment went out as HTML
    Html,
    /// The rendered preview selection was copied instead
    Selection,
    /// Nothing could be written; the user has to copy `selection` by hand
    Manual {
        selection: Selection,
        guidance: String,
    },
}

impl CopyOutcome {
    /// Message shown to the user.
    pub fn message(&self) -> &str {
        match self {
            CopyOutcome::Html => "Copied as HTML",
            CopyOutcome::Selection => "Copied preview selection",
            CopyOutcome::Manual { guidance, .. } => guidance,
        }
    }

    pub fn is_copied(&self) -> bool {
        !matches!(self, CopyOutcome::Manual { .. })
    }
}

/// Commits export fragments through the tiers of a backend.
pub struct ClipboardWriter<'a, B: ClipboardBackend + ?Sized> {
    backend: &'a mut B,
}

impl<'a, B: ClipboardBackend + ?Sized> ClipboardWriter<'a, B> {
    pub fn new(backend: &'a mut B) -> Self {
        Self { backend }
    }

    /// Commit `fragment`, falling back to `selection` of the live preview.
    ///
    /// The first tier that succeeds wins. When all fail the outcome is
    /// [`CopyOutcome::Manual`]; this never fails silently.
    pub fn commit(&mut self, fragment: &str, selection: &Selection) -> CopyOutcome {
        let html_error = match self.backend.write_html(fragment, &selection.text) {
            Ok(()) => {
                info!("Copied {} bytes of HTML to clipboard", fragment.len());
                return CopyOutcome::Html;
            }
            Err(e) => e,
        };
        warn!("HTML clipboard write failed, copying selection: {}", html_error);

        let selection_error = match self.backend.copy_selection(selection) {
            Ok(()) => {
                info!("Copied preview selection to clipboard");
                return CopyOutcome::Selection;
            }
            Err(e) => e,
        };
        warn!("Selection copy failed: {}", selection_error);

        CopyOutcome::Manual {
            selection: selection.clone(),
            guidance: format!(
                "Copy failed ({}). Select the preview and copy it manually with Ctrl+C (Cmd+C on macOS).",
                selection_error
            ),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Test Backend
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// In-memory backend recording what was written, with failing tiers.
    #[derive(Debug, Default)]
    pub struct RecordingBackend {
        pub html: Option<(String, String)>,
        pub selection: Option<Selection>,
        pub text: Option<String>,
        pub fail_html: bool,
        pub fail_selection: bool,
        pub fail_text: bool,
        pub attempts: Vec<&'static str>,
    }

    impl RecordingBackend {
        pub fn failing() -> Self {
            Self {
                fail_html: true,
                fail_selection: true,
                fail_text: true,
                ..Self::default()
            }
        }
    }

    impl ClipboardBackend for RecordingBackend {
        fn write_html(&mut self, html: &str, alt_text: &str) -> Result<(), ClipboardError> {
            self.attempts.push("html");
            if self.fail_html {
                return Err(ClipboardError::AccessError("no html support".to_string()));
            }
            self.html = Some((html.to_string(), alt_text.to_string()));
            Ok(())
        }

        fn copy_selection(&mut self, selection: &Selection) -> Result<(), ClipboardError> {
            self.attempts.push("selection");
            if self.fail_selection {
                return Err(ClipboardError::WriteError("copy rejected".to_string()));
            }
            self.selection = Some(selection.clone());
            Ok(())
        }

        fn write_text(&mut self, text: &str) -> Result<(), ClipboardError> {
            self.attempts.push("text");
            if self.fail_text {
                return Err(ClipboardError::WriteError("copy rejected".to_string()));
            }
            self.text = Some(text.to_string());
            Ok(())
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::testing::RecordingBackend;
    use super::*;

    fn selection() -> Selection {
        Selection {
            text: "Hello".to_string(),
            html: "<p>Hello</p>".to_string(),
        }
    }

    #[test]
    fn test_clipboard_error_display() {
        let err = ClipboardError::AccessError("test".to_string());
        assert!(err.to_string().contains("test"));
    }

    #[test]
    fn test_html_tier_wins() {
        let mut backend = RecordingBackend::default();
        let outcome = ClipboardWriter::new(&mut backend).commit("<div>x</div>", &selection());
        assert_eq!(outcome, CopyOutcome::Html);
        assert_eq!(
            backend.html,
            Some(("<div>x</div>".to_string(), "Hello".to_string()))
        );
        assert_eq!(backend.attempts, vec!["html"]);
    }

    #[test]
    fn test_falls_through_to_selection() {
        let mut backend = RecordingBackend {
            fail_html: true,
            ..RecordingBackend::default()
        };
        let outcome = ClipboardWriter::new(&mut backend).commit("<div>x</div>", &selection());
        assert_eq!(outcome, CopyOutcome::Selection);
        assert!(outcome.is_copied());
        assert_eq!(backend.selection, Some(selection()));
        assert_eq!(backend.attempts, vec!["html", "selection"]);
    }

    #[test]
    fn test_all_tiers_failing_gives_guidance() {
        let mut backend = RecordingBackend::failing();
        let outcome = ClipboardWriter::new(&mut backend).commit("<div>x</div>", &selection());
        assert!(!outcome.is_copied());
        match &outcome {
            CopyOutcome::Manual { selection: s, guidance } => {
                assert_eq!(s, &selection());
                assert!(guidance.contains("manually"));
            }
            other => panic!("expected manual outcome, got {:?}", other),
        }
        assert!(!outcome.message().is_empty());
    }

    #[test]
    fn test_serving_backend_waits_for_replacement() {
        assert!(ArboardBackend::serving().serves_until_replaced());
        assert!(!ArboardBackend::new().serves_until_replaced());
    }

    #[test]
    fn test_outcome_messages() {
        assert_eq!(CopyOutcome::Html.message(), "Copied as HTML");
        assert_eq!(CopyOutcome::Selection.message(), "Copied preview selection");
    }
}
