//! Glyph runs and the font used to measure and draw them
//!
//! A typeset formula is reduced to a `GlyphRun`: characters with a relative
//! size and a vertical shift (superscripts and subscripts).
//! Layout and drawing share one placement routine so the captured bitmap
//! matches what was measured.

use std::fs;
use std::path::{Path, PathBuf};

use fontdue::{Font, FontSettings};
use image::RgbImage;
use log::{debug, info, warn};

use super::FormulaError;
use crate::theme::Rgb;

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

/// Well-known locations probed when no font path is configured.
const SYSTEM_FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSerif.ttf",
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSerif-Regular.ttf",
    "/usr/share/fonts/liberation/LiberationSerif-Regular.ttf",
    "/System/Library/Fonts/Supplemental/Times New Roman.ttf",
    "/Library/Fonts/Arial Unicode.ttf",
    "C:\\Windows\\Fonts\\cambria.ttc",
    "C:\\Windows\\Fonts\\times.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

/// Advance width used when no font is available, in em.
const ESTIMATED_ADVANCE_EM: f32 = 0.6;
/// Ascent used when no font is available, in em.
const ESTIMATED_ASCENT_EM: f32 = 0.8;
/// Descent used when no font is available, in em.
const ESTIMATED_DESCENT_EM: f32 = 0.25;

// ─────────────────────────────────────────────────────────────────────────────
// Glyph Run
// ─────────────────────────────────────────────────────────────────────────────

/// One character of a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunGlyph {
    pub ch: char,
    /// Size relative to the base font size
    pub scale: f32,
    /// Baseline shift in em, positive raises the glyph
    pub shift: f32,
}

/// A linear sequence of glyphs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GlyphRun {
    glyphs: Vec<RunGlyph>,
}

/// Ink (painted pixel) extent relative to the run's layout box, y down.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InkBox {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl InkBox {
    pub fn width(&self) -> f32 {
        (self.right - self.left).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.bottom - self.top).max(0.0)
    }

    fn union(self, other: InkBox) -> InkBox {
        InkBox {
            left: self.left.min(other.left),
            top: self.top.min(other.top),
            right: self.right.max(other.right),
            bottom: self.bottom.max(other.bottom),
        }
    }
}

/// Size of a laid-out run, in the same units as the font size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunMetrics {
    /// Sum of advances
    pub width: f32,
    /// Highest ascent to lowest descent
    pub height: f32,
    /// Distance from the top of the layout box to the base baseline
    pub baseline: f32,
    /// Painted extent
    pub ink: InkBox,
}

#[derive(Debug, Clone, Copy)]
struct PlacedGlyph {
    ch: char,
    px: f32,
    /// Pen position
    x: f32,
    /// Baseline height above the base baseline
    rise: f32,
    ascent: f32,
    descent: f32,
    /// Ink relative to (pen, baseline), y up
    ink: Option<(f32, f32, f32, f32)>,
}

impl GlyphRun {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a glyph at base size on the base line.
    pub fn push(&mut self, ch: char) {
        self.push_scaled(ch, 1.0, 0.0);
    }

    pub fn push_scaled(&mut self, ch: char, scale: f32, shift: f32) {
        self.glyphs.push(RunGlyph { ch, scale, shift });
    }

    /// Append every glyph of `other` with an extra scale and shift.
    pub fn extend_scaled(&mut self, other: &GlyphRun, scale: f32, shift: f32) {
        for g in &other.glyphs {
            self.push_scaled(g.ch, g.scale * scale, g.shift * scale + shift);
        }
    }

    pub fn glyphs(&self) -> &[RunGlyph] {
        &self.glyphs
    }

    pub fn is_empty(&self) -> bool {
        self.glyphs.is_empty()
    }

    /// The characters of the run as a string.
    pub fn text(&self) -> String {
        self.glyphs.iter().map(|g| g.ch).collect()
    }

    fn place(&self, font: Option<&GlyphFont>, font_size: f32) -> Vec<PlacedGlyph> {
        let mut pen = 0.0;
        let mut placed = Vec::with_capacity(self.glyphs.len());
        for g in &self.glyphs {
            let px = font_size * g.scale;
            let rise = g.shift * font_size;
            let (advance, ascent, descent, ink) = match font {
                Some(font) => {
                    let metrics = font.font.metrics(g.ch, px);
                    let (ascent, descent) = font.line_extent(px);
                    let ink = (metrics.width > 0 && metrics.height > 0).then(|| {
                        (
                            metrics.xmin as f32,
                            metrics.ymin as f32,
                            (metrics.xmin + metrics.width as i32) as f32,
                            (metrics.ymin + metrics.height as i32) as f32,
                        )
                    });
                    (metrics.advance_width, ascent, descent, ink)
                }
                None => {
                    let advance = ESTIMATED_ADVANCE_EM * px;
                    let ascent = ESTIMATED_ASCENT_EM * px;
                    let descent = ESTIMATED_DESCENT_EM * px;
                    let ink = (!g.ch.is_whitespace()).then_some((0.0, -descent, advance, ascent));
                    (advance, ascent, descent, ink)
                }
            };
            placed.push(PlacedGlyph {
                ch: g.ch,
                px,
                x: pen,
                rise,
                ascent,
                descent,
                ink,
            });
            pen += advance;
        }
        placed
    }

    /// Lay out the run and report its box and ink extent.
    ///
    /// Without a font, advances and line extents are estimated from the
    /// font size and the ink box coincides with the layout box.
    pub fn measure(&self, font: Option<&GlyphFont>, font_size: f32) -> RunMetrics {
        let placed = self.place(font, font_size);
        let width = match placed.last() {
            Some(last) => {
                let advance = match font {
                    Some(font) => font.font.metrics(last.ch, last.px).advance_width,
                    None => ESTIMATED_ADVANCE_EM * last.px,
                };
                last.x + advance
            }
            None => 0.0,
        };

        let (base_ascent, base_descent) = match font {
            Some(font) => font.line_extent(font_size),
            None => (
                ESTIMATED_ASCENT_EM * font_size,
                ESTIMATED_DESCENT_EM * font_size,
            ),
        };
        let top = placed
            .iter()
            .map(|p| p.rise + p.ascent)
            .fold(base_ascent, f32::max);
        let bottom = placed
            .iter()
            .map(|p| p.rise - p.descent)
            .fold(-base_descent, f32::min);
        let baseline = top;
        let height = top - bottom;

        let ink = placed
            .iter()
            .filter_map(|p| {
                p.ink.map(|(x0, y0, x1, y1)| InkBox {
                    left: p.x + x0,
                    top: baseline - (p.rise + y1),
                    right: p.x + x1,
                    bottom: baseline - (p.rise + y0),
                })
            })
            .reduce(InkBox::union)
            .unwrap_or(InkBox {
                left: 0.0,
                top: 0.0,
                right: width,
                bottom: height,
            });

        RunMetrics {
            width,
            height,
            baseline,
            ink,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Glyph Font
// ─────────────────────────────────────────────────────────────────────────────

/// A loaded outline font.
pub struct GlyphFont {
    font: Font,
    path: PathBuf,
}

impl std::fmt::Debug for GlyphFont {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlyphFont").field("path", &self.path).finish()
    }
}

impl GlyphFont {
    /// Load a TrueType/OpenType font file.
    pub fn load(path: &Path) -> Result<Self, FormulaError> {
        let bytes = fs::read(path).map_err(|e| {
            FormulaError::Capture(format!("cannot read font {}: {}", path.display(), e))
        })?;
        Self::from_bytes(bytes, path.to_path_buf())
    }

    fn from_bytes(bytes: Vec<u8>, path: PathBuf) -> Result<Self, FormulaError> {
        let font = Font::from_bytes(bytes, FontSettings::default()).map_err(|e| {
            FormulaError::Capture(format!("invalid font {}: {}", path.display(), e))
        })?;
        Ok(Self { font, path })
    }

    /// Find a usable font: the configured path first, then system locations.
    pub fn discover(configured: Option<&Path>) -> Option<Self> {
        if let Some(path) = configured {
            match Self::load(path) {
                Ok(font) => {
                    info!("Using formula font {}", path.display());
                    return Some(font);
                }
                Err(e) => warn!("Configured formula font unusable: {}", e),
            }
        }

        for candidate in SYSTEM_FONT_CANDIDATES {
            let path = Path::new(candidate);
            if !path.exists() {
                continue;
            }
            match Self::load(path) {
                Ok(font) => {
                    debug!("Using system font {}", path.display());
                    return Some(font);
                }
                Err(e) => debug!("Skipping system font: {}", e),
            }
        }

        warn!("No formula font found; formula images are unavailable");
        None
    }

    /// Path the font was loaded from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Ascent and descent (both positive) at `px`.
    fn line_extent(&self, px: f32) -> (f32, f32) {
        match self.font.horizontal_line_metrics(px) {
            Some(lm) => (lm.ascent, -lm.descent),
            None => (ESTIMATED_ASCENT_EM * px, ESTIMATED_DESCENT_EM * px),
        }
    }

    /// Paint `run` onto `canvas` with its layout box at `origin`.
    ///
    /// `font_size` is in canvas pixels. Coverage is blended over whatever
    /// the canvas already holds.
    pub fn draw(
        &self,
        run: &GlyphRun,
        canvas: &mut RgbImage,
        origin: (f32, f32),
        font_size: f32,
        color: Rgb,
    ) {
        let baseline = origin.1 + run.measure(Some(self), font_size).baseline;
        let (width, height) = canvas.dimensions();

        for glyph in run.place(Some(self), font_size) {
            if glyph.ink.is_none() {
                continue;
            }
            let (metrics, bitmap) = self.font.rasterize(glyph.ch, glyph.px);
            // fontdue: top = baseline - height - ymin (y down)
            let glyph_top =
                baseline - glyph.rise - metrics.height as f32 - metrics.ymin as f32;
            let glyph_left = origin.0 + glyph.x + metrics.xmin as f32;

            for by in 0..metrics.height {
                for bx in 0..metrics.width {
                    let coverage = bitmap[by * metrics.width + bx];
                    if coverage == 0 {
                        continue;
                    }
                    let px = (glyph_left + bx as f32).round() as i64;
                    let py = (glyph_top + by as f32).round() as i64;
                    if px < 0 || py < 0 || px >= width as i64 || py >= height as i64 {
                        continue;
                    }
                    let pixel = canvas.get_pixel_mut(px as u32, py as u32);
                    let alpha = coverage as f32 / 255.0;
                    let target = [color.r, color.g, color.b];
                    for (channel, ink) in pixel.0.iter_mut().zip(target) {
                        *channel = (*channel as f32 * (1.0 - alpha) + ink as f32 * alpha).round()
                            as u8;
                    }
                }
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn run(text: &str) -> GlyphRun {
        let mut run = GlyphRun::new();
        for ch in text.chars() {
            run.push(ch);
        }
        run
    }

    #[test]
    fn test_estimated_measure() {
        let metrics = run("abc").measure(None, 20.0);
        assert!((metrics.width - 36.0).abs() < 1e-4);
        assert!((metrics.height - 21.0).abs() < 1e-4);
        assert!((metrics.baseline - 16.0).abs() < 1e-4);
    }

    #[test]
    fn test_estimated_ink_matches_layout_box() {
        let metrics = run("xy").measure(None, 10.0);
        assert!((metrics.ink.left - 0.0).abs() < 1e-4);
        assert!((metrics.ink.width() - metrics.width).abs() < 1e-4);
        assert!((metrics.ink.height() - metrics.height).abs() < 1e-4);
    }

    #[test]
    fn test_superscript_grows_height() {
        let plain = run("x2").measure(None, 20.0);
        let mut raised = run("x");
        raised.push_scaled('2', 0.7, 0.5);
        let raised = raised.measure(None, 20.0);
        assert!(raised.height > plain.height);
        assert!(raised.width < plain.width);
    }

    #[test]
    fn test_empty_run() {
        let metrics = GlyphRun::new().measure(None, 16.0);
        assert_eq!(metrics.width, 0.0);
        assert!(metrics.height > 0.0);
    }

    #[test]
    fn test_extend_scaled_composes() {
        let mut inner = GlyphRun::new();
        inner.push_scaled('a', 0.5, 1.0);
        let mut outer = GlyphRun::new();
        outer.extend_scaled(&inner, 0.5, 0.25);
        let g = outer.glyphs()[0];
        assert_eq!(g.scale, 0.25);
        assert_eq!(g.shift, 0.75);
    }

    #[test]
    fn test_missing_font_file() {
        let result = GlyphFont::load(Path::new("/definitely/not/here.ttf"));
        assert!(matches!(result, Err(FormulaError::Capture(_))));
    }

    #[test]
    fn test_invalid_font_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bogus.ttf");
        fs::write(&path, b"not a font").unwrap();
        assert!(GlyphFont::load(&path).is_err());
    }

    #[test]
    fn test_draw_with_system_font_paints_pixels() {
        let Some(font) = GlyphFont::discover(None) else {
            return;
        };
        let glyphs = run("E=mc");
        let metrics = glyphs.measure(Some(&font), 24.0);
        let mut canvas = RgbImage::from_pixel(
            metrics.width.ceil() as u32 + 4,
            metrics.height.ceil() as u32 + 4,
            image::Rgb([255, 255, 255]),
        );
        font.draw(&glyphs, &mut canvas, (2.0, 2.0), 24.0, Rgb::new(0, 0, 0));
        assert!(canvas.pixels().any(|p| p.0[0] < 128));
    }
}
