//! Context actions on a rendered formula
//!
//! Both actions are synchronous and return the confirmation message shown
//! to the user.

use std::fs;
use std::path::Path;

use log::info;

use super::raster::decode_data_uri;
use super::request::RenderedFormula;
use crate::error::{Error, Result};
use crate::export::clipboard::ClipboardBackend;

/// Copy the formula's math source as plain text.
pub fn copy_source_text<B: ClipboardBackend + ?Sized>(
    backend: &mut B,
    source: &str,
) -> Result<String> {
    backend.write_text(source)?;
    info!("Copied formula source ({} chars)", source.chars().count());
    Ok("Formula source copied".to_string())
}

/// File extension for an image MIME type.
pub fn extension_for(mime_type: &str) -> &'static str {
    match mime_type {
        "image/jpeg" => "jpg",
        _ => "png",
    }
}

/// Default file name for the n-th formula's image.
pub fn suggested_file_name(index: usize, rendered: &RenderedFormula) -> String {
    let mime = rendered
        .data_uri
        .strip_prefix("data:")
        .and_then(|rest| rest.split(';').next())
        .unwrap_or("image/png");
    format!("formula-{}.{}", index + 1, extension_for(mime))
}

/// Decode the embedded image and write it to `path`.
pub fn save_formula_image(rendered: &RenderedFormula, path: &Path) -> Result<String> {
    let (_, bytes) = decode_data_uri(&rendered.data_uri)?;
    fs::write(path, &bytes).map_err(|e| Error::FileWrite {
        path: path.to_path_buf(),
        source: e,
    })?;
    info!("Saved formula image to {}", path.display());
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    Ok(format!("Saved {}", name))
}
