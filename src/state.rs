//! Application state management for pastemark
//!
//! This module defines the central `AppState` struct tying together the
//! settings, the live preview, the formula controller and the transient
//! toast message shown after user actions.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use crate::config::Settings;
use crate::error::{Error, Result};
use crate::export::{
    export_fragment, generate_html_document, ClipboardBackend, ClipboardWriter, CopyOutcome,
    ExportOptions,
};
use crate::formula::lifecycle::DefaultController;
use crate::formula::raster::{Capture, GlyphCapture};
use crate::formula::{
    actions, FormulaController, FormulaState, KatexTypesetter, OccurrenceId, Typesetter,
};
use crate::preview::{PreviewDocument, PreviewOptions, Selection};

// ─────────────────────────────────────────────────────────────────────────────
// Toast
// ─────────────────────────────────────────────────────────────────────────────

/// A transient confirmation or error message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Toast {
    /// Message text, `None` when nothing is shown
    pub message: Option<String>,
    /// When the message should expire (seconds on the caller's clock)
    pub expires_at: Option<f64>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Application State
// ─────────────────────────────────────────────────────────────────────────────

/// Central application state.
pub struct AppState<T, C> {
    /// User settings
    pub settings: Settings,
    /// Preview of the loaded document
    pub preview: Option<PreviewDocument>,
    /// Formula lifecycle controller
    pub controller: FormulaController<T, C>,
    /// Current toast
    pub toast: Toast,
}

impl AppState<KatexTypesetter, GlyphCapture> {
    /// State with the default typesetter and capture.
    pub fn new(settings: Settings) -> Self {
        let controller = DefaultController::from_settings(&settings.formula);
        Self::with_controller(settings, controller)
    }
}

impl<T: Typesetter + 'static, C: Capture + 'static> AppState<T, C> {
    pub fn with_controller(settings: Settings, controller: FormulaController<T, C>) -> Self {
        Self {
            settings,
            preview: None,
            controller,
            toast: Toast::default(),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Document
    // ─────────────────────────────────────────────────────────────────────────

    /// Build the preview for `markdown`, replacing any previous document.
    ///
    /// Formulas start out loading; call [`render_formulas`](Self::render_formulas)
    /// to settle them.
    pub fn load_markdown(&mut self, markdown: &str) -> Result<()> {
        let options = PreviewOptions::from_settings(&self.settings);
        let preview = PreviewDocument::from_markdown(markdown, &options)?;
        self.controller.clear();
        info!("Loaded document with {} formula(s)", preview.formulas().len());
        self.preview = Some(preview);
        Ok(())
    }

    /// Render every formula of the preview and show the results.
    ///
    /// Returns the number of committed results.
    pub async fn render_formulas(&mut self) -> usize {
        let Some(preview) = self.preview.as_ref() else {
            return 0;
        };
        let requests = preview.requests(&self.settings.formula);
        if requests.is_empty() {
            return 0;
        }
        let committed = self.controller.render_all(requests).await;
        self.sync_formula_states();
        committed
    }

    /// Copy the controller's current states onto the preview placeholders.
    pub fn sync_formula_states(&mut self) {
        let Some(preview) = self.preview.as_mut() else {
            return;
        };
        for (id, state) in self.controller.states() {
            preview.apply_formula_state(id, &state);
        }
    }

    fn preview(&self) -> Result<&PreviewDocument> {
        self.preview
            .as_ref()
            .ok_or_else(|| Error::Application("No document loaded".to_string()))
    }

    /// Export options for the loaded document's palette.
    pub fn export_options(&self) -> Result<ExportOptions> {
        let preview = self.preview()?;
        Ok(ExportOptions::from_colors(
            preview.colors(),
            self.settings.export.base_font_size,
        ))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Export
    // ─────────────────────────────────────────────────────────────────────────

    /// Export the preview and commit it to the clipboard.
    ///
    /// Refused while formulas are loading. The outcome, including a refusal
    /// or a manual-copy fallback, is shown as a toast.
    pub fn copy_as_html<B: ClipboardBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        now: f64,
    ) -> Result<CopyOutcome> {
        let (fragment, selection) = match self.clipboard_payload() {
            Ok(exported) => exported,
            Err(e) => {
                warn!("Copy as HTML failed: {}", e);
                self.show_toast(e.to_string(), now);
                return Err(e);
            }
        };

        let outcome = ClipboardWriter::new(backend).commit(&fragment, &selection);
        self.show_toast(outcome.message().to_string(), now);
        Ok(outcome)
    }

    fn clipboard_payload(&self) -> Result<(String, Selection)> {
        let options = self.export_options()?;
        let preview = self.preview()?;
        Ok((export_fragment(preview, &options)?, preview.selection()))
    }

    /// Export the preview as a standalone HTML file.
    pub fn export_to_file(&mut self, path: &Path, now: f64) -> Result<PathBuf> {
        let result = self.write_export(path);
        match &result {
            Ok(path) => {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.display().to_string());
                self.settings.export.last_export_directory =
                    path.parent().map(Path::to_path_buf);
                self.show_toast(format!("Exported to {}", name), now);
            }
            Err(e) => {
                warn!("HTML export failed: {}", e);
                self.show_toast(e.to_string(), now);
            }
        }
        result
    }

    fn write_export(&self, path: &Path) -> Result<PathBuf> {
        let options = self.export_options()?;
        let fragment = export_fragment(self.preview()?, &options)?;
        let title = path.file_stem().map(|s| s.to_string_lossy().into_owned());
        let document = generate_html_document(&fragment, title.as_deref(), &options);
        fs::write(path, document).map_err(|e| Error::FileWrite {
            path: path.to_path_buf(),
            source: e,
        })?;
        info!("Exported HTML to {}", path.display());
        Ok(path.to_path_buf())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Formula Actions
    // ─────────────────────────────────────────────────────────────────────────

    /// Copy the source of formula `id` as plain text.
    pub fn copy_formula_source<B: ClipboardBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        id: OccurrenceId,
        now: f64,
    ) -> Result<()> {
        let source = self
            .preview()?
            .occurrence(id)
            .map(|o| o.source.clone())
            .ok_or_else(|| Error::FormulaUnavailable(format!("no formula #{}", id.0 + 1)))?;
        let result = actions::copy_source_text(backend, &source);
        self.report(result, now).map(|_| ())
    }

    /// Save the image of rendered formula `id` to `path`.
    pub fn save_formula_image(&mut self, id: OccurrenceId, path: &Path, now: f64) -> Result<()> {
        let result = match self.controller.state(id) {
            Some(FormulaState::Rendered(rendered)) => actions::save_formula_image(&rendered, path),
            Some(state) => Err(Error::FormulaUnavailable(format!(
                "formula #{} is {}",
                id.0 + 1,
                state.label()
            ))),
            None => Err(Error::FormulaUnavailable(format!("no formula #{}", id.0 + 1))),
        };
        self.report(result, now).map(|_| ())
    }

    /// Toast the confirmation or the error of an action.
    fn report(&mut self, result: Result<String>, now: f64) -> Result<String> {
        match &result {
            Ok(message) => self.show_toast(message.clone(), now),
            Err(e) => self.show_toast(e.to_string(), now),
        }
        result
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Toast
    // ─────────────────────────────────────────────────────────────────────────

    /// Show a temporary toast message for the configured duration.
    ///
    /// `current_time` is the caller's clock in seconds.
    pub fn show_toast(&mut self, message: impl Into<String>, current_time: f64) {
        let message = message.into();
        debug!("Toast: {}", message);
        self.toast.message = Some(message);
        self.toast.expires_at = Some(current_time + self.settings.export.toast_duration_secs);
    }

    /// Update toast state - clears expired toasts.
    pub fn update_toast(&mut self, current_time: f64) {
        if let Some(expires_at) = self.toast.expires_at {
            if current_time >= expires_at {
                self.clear_toast();
            }
        }
    }

    /// Clear any active toast message.
    pub fn clear_toast(&mut self) {
        self.toast.message = None;
        self.toast.expires_at = None;
    }

    pub fn toast_message(&self) -> Option<&str> {
        self.toast.message.as_deref()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
