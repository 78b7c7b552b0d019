//! Off-screen staging of a formula before capture
//!
//! Each rasterization attempt attaches its own `StagingElement` to the
//! document-level `StagingArea`. The element carries all of its styling as
//! inline presentation attributes, is sized deterministically from the
//! request, and is detached exactly once when the guard is released or
//! dropped.

use std::cell::RefCell;
use std::rc::Rc;

use log::{debug, warn};

use super::glyphs::InkBox;
use super::request::{DisplayMode, FontSizeContext, FormulaRequest};
use super::typeset::{LayoutSignal, TypesetFormula, Typesetter};
use super::FormulaError;
use crate::preview::dom::{Declarations, Dom, Element, NodeId};

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

/// Default font size for block formulas without a size context.
pub const DEFAULT_BLOCK_FONT_SIZE: f32 = 20.0;
/// Default font size for inline formulas without a size context.
pub const DEFAULT_INLINE_FONT_SIZE: f32 = 16.0;
/// Smallest font size a block formula is staged at.
pub const MIN_BLOCK_FONT_SIZE: f32 = 18.0;
/// Smallest font size an inline formula is staged at.
pub const MIN_INLINE_FONT_SIZE: f32 = 14.0;
/// Block formulas are staged slightly larger than surrounding text.
const BLOCK_FONT_SCALE: f32 = 1.1;
/// Widest a block container may be laid out.
const BLOCK_MAX_WIDTH: f32 = 800.0;
/// Offsets at or below this many CSS px are left alone.
pub const RECENTER_TOLERANCE: f32 = 1.0;

// ─────────────────────────────────────────────────────────────────────────────
// Layout
// ─────────────────────────────────────────────────────────────────────────────

/// Padding in CSS px.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Padding {
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
    pub left: f32,
}

impl Padding {
    fn to_css(self) -> String {
        format!(
            "{}px {}px {}px {}px",
            css_number(self.top),
            css_number(self.right),
            css_number(self.bottom),
            css_number(self.left)
        )
    }
}

/// Deterministic container styling for one display mode.
#[derive(Debug, Clone, PartialEq)]
pub struct StagingLayout {
    pub mode: DisplayMode,
    pub font_size: f32,
    pub padding: Padding,
    /// Line height as a multiple of the font size
    pub line_height: f32,
    pub min_width: f32,
    pub min_height: f32,
    pub max_width: Option<f32>,
}

impl StagingLayout {
    /// Layout for a request, starting from its font size context.
    pub fn for_request(request: &FormulaRequest) -> Self {
        let mode = request.display_mode;
        let font_size = Self::base_font_size(mode, request.font_size_context);
        match mode {
            DisplayMode::Block => Self {
                mode,
                font_size,
                padding: Padding {
                    top: 16.0,
                    right: 24.0,
                    bottom: 16.0,
                    left: 24.0,
                },
                line_height: 1.5,
                min_width: 0.0,
                min_height: font_size * 1.5,
                max_width: Some(BLOCK_MAX_WIDTH),
            },
            DisplayMode::Inline => Self {
                mode,
                font_size,
                padding: Padding {
                    top: 2.0,
                    right: 4.0,
                    bottom: 2.0,
                    left: 4.0,
                },
                line_height: 1.2,
                min_width: font_size,
                min_height: font_size * 1.2,
                max_width: None,
            },
        }
    }

    /// Font size the formula is staged at, in CSS px.
    pub fn base_font_size(mode: DisplayMode, context: Option<FontSizeContext>) -> f32 {
        match (mode, context) {
            (DisplayMode::Block, Some(ctx)) => (ctx.px() * BLOCK_FONT_SCALE).max(MIN_BLOCK_FONT_SIZE),
            (DisplayMode::Inline, Some(ctx)) => ctx.px().max(MIN_INLINE_FONT_SIZE),
            (DisplayMode::Block, None) => DEFAULT_BLOCK_FONT_SIZE,
            (DisplayMode::Inline, None) => DEFAULT_INLINE_FONT_SIZE,
        }
    }

    /// Every style the container needs, as inline declarations.
    pub fn declarations(&self, padding: Padding) -> Declarations {
        let mut decls = Declarations::new();
        let display = if self.mode.is_block() {
            "block"
        } else {
            "inline-block"
        };
        decls.set("display", display);
        decls.set("position", "absolute");
        decls.set("left", "-10000px");
        decls.set("top", "0");
        decls.set("margin", "0");
        decls.set("padding", padding.to_css());
        decls.set("font-size", format!("{}px", css_number(self.font_size)));
        decls.set("line-height", css_number(self.line_height));
        decls.set("text-align", "center");
        decls.set("vertical-align", "middle");
        decls.set("color", "#000000");
        decls.set("background-color", "#ffffff");
        decls.set("min-width", format!("{}px", css_number(self.min_width)));
        decls.set("min-height", format!("{}px", css_number(self.min_height)));
        if let Some(max) = self.max_width {
            decls.set("max-width", format!("{}px", css_number(max)));
        }
        decls
    }
}

fn css_number(value: f32) -> String {
    let rounded = (value * 100.0).round() / 100.0;
    if rounded.fract() == 0.0 {
        format!("{}", rounded as i64)
    } else {
        format!("{}", rounded)
    }
}

/// The three size readings of a staged container, as `(width, height)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurements {
    /// Laid-out box including padding
    pub offset: (f32, f32),
    /// Box after style constraints (max-width)
    pub computed: (f32, f32),
    /// Box extended by any overflowing ink
    pub bounding: (f32, f32),
}

impl Measurements {
    /// Per-axis maximum of every source.
    pub fn max(&self) -> (f32, f32) {
        (
            self.offset.0.max(self.computed.0).max(self.bounding.0),
            self.offset.1.max(self.computed.1).max(self.bounding.1),
        )
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Staging Area
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct StagingDocument {
    dom: Dom,
    root: NodeId,
}

/// Document-level container that staging elements attach to.
#[derive(Debug, Clone)]
pub struct StagingArea {
    inner: Rc<RefCell<StagingDocument>>,
}

impl Default for StagingArea {
    fn default() -> Self {
        Self::new()
    }
}

impl StagingArea {
    pub fn new() -> Self {
        let mut dom = Dom::new();
        let root = dom.create_element(Element::new("body"));
        Self {
            inner: Rc::new(RefCell::new(StagingDocument { dom, root })),
        }
    }

    /// Attach a fresh, exclusively owned container for `request`.
    pub fn attach(&self, request: &FormulaRequest) -> StagingElement {
        let layout = StagingLayout::for_request(request);
        let padding = layout.padding;
        let mut element = Element::new("div");
        element.style = layout.declarations(padding);

        let node = {
            let mut doc = self.inner.borrow_mut();
            let root = doc.root;
            doc.dom.append_element(root, element)
        };
        debug!("Attached staging element {:?}", node);

        StagingElement {
            area: self.clone(),
            node,
            layout,
            padding,
            content: None,
            size: (0.0, 0.0),
            released: false,
        }
    }

    /// Detach `node` and free it. Detaching an element twice is an error.
    pub fn detach(&self, node: NodeId) -> Result<(), FormulaError> {
        if self.inner.borrow_mut().dom.remove(node) {
            debug!("Detached staging element {:?}", node);
            Ok(())
        } else {
            Err(FormulaError::Staging(format!(
                "staging element {:?} is not attached",
                node
            )))
        }
    }

    /// Number of containers currently attached.
    pub fn attached_count(&self) -> usize {
        let doc = self.inner.borrow();
        doc.dom.children(doc.root).len()
    }

    /// Nodes held by the staging document, its root included.
    pub fn node_count(&self) -> usize {
        self.inner.borrow().dom.node_count()
    }

    /// Arena slots of the staging document, free ones included.
    pub fn arena_len(&self) -> usize {
        self.inner.borrow().dom.arena_len()
    }

    /// Serialized markup of an attached container.
    pub fn element_html(&self, node: NodeId) -> String {
        self.inner.borrow().dom.to_html(node)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Staging Element
// ─────────────────────────────────────────────────────────────────────────────

/// Guard over one attached staging container.
///
/// Released explicitly with [`StagingElement::release`] or, failing that,
/// when dropped. Either way the container is detached once.
#[derive(Debug)]
pub struct StagingElement {
    area: StagingArea,
    node: NodeId,
    layout: StagingLayout,
    padding: Padding,
    content: Option<TypesetFormula>,
    /// Container size, fixed once content is laid out
    size: (f32, f32),
    released: bool,
}

impl StagingElement {
    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn layout(&self) -> &StagingLayout {
        &self.layout
    }

    pub fn padding(&self) -> Padding {
        self.padding
    }

    pub fn content(&self) -> Option<&TypesetFormula> {
        self.content.as_ref()
    }

    /// Container size in CSS px.
    pub fn size(&self) -> (f32, f32) {
        self.size
    }

    /// Typeset `source` into the container and lay it out.
    pub fn typeset<T: Typesetter + ?Sized>(
        &mut self,
        typesetter: &T,
        source: &str,
    ) -> Result<LayoutSignal, FormulaError> {
        let formula = typesetter.typeset(source, self.layout.mode, self.layout.font_size)?;
        let signal = formula.signal;

        let (content_w, content_h) = (formula.metrics.width, formula.metrics.height);
        self.size = (
            (content_w + self.padding.left + self.padding.right).max(self.layout.min_width),
            (content_h + self.padding.top + self.padding.bottom).max(self.layout.min_height),
        );

        {
            let mut doc = self.area.inner.borrow_mut();
            doc.dom.clear_children(self.node);
            let raw = doc.dom.create_raw(formula.markup.clone());
            doc.dom.append(self.node, raw);
        }
        self.content = Some(formula);
        Ok(signal)
    }

    /// Top-left of the content's layout box inside the container.
    pub fn content_origin(&self) -> (f32, f32) {
        let Some(content) = &self.content else {
            return (self.padding.left, self.padding.top);
        };
        let inner_w = self.size.0 - self.padding.left - self.padding.right;
        let inner_h = self.size.1 - self.padding.top - self.padding.bottom;
        (
            self.padding.left + (inner_w - content.metrics.width) / 2.0,
            self.padding.top + (inner_h - content.metrics.height) / 2.0,
        )
    }

    /// Painted extent relative to the container's top-left corner.
    pub fn ink_rect(&self) -> Option<InkBox> {
        let content = self.content.as_ref()?;
        let (x, y) = self.content_origin();
        let ink = content.metrics.ink;
        Some(InkBox {
            left: x + ink.left,
            top: y + ink.top,
            right: x + ink.right,
            bottom: y + ink.bottom,
        })
    }

    /// Read the container's size from every measurement source.
    pub fn measure(&self) -> Measurements {
        let offset = self.size;
        let computed = (
            match self.layout.max_width {
                Some(max) => offset.0.min(max),
                None => offset.0,
            },
            offset.1,
        );
        let bounding = match self.ink_rect() {
            Some(ink) => (offset.0.max(ink.right), offset.1.max(ink.bottom)),
            None => offset,
        };
        Measurements {
            offset,
            computed,
            bounding,
        }
    }

    /// Offset of the ink from true centering, `(dx, dy)`.
    pub fn centering_offset(&self) -> (f32, f32) {
        let Some(ink) = self.ink_rect() else {
            return (0.0, 0.0);
        };
        let expected_left = (self.size.0 - ink.width()) / 2.0;
        let expected_top = (self.size.1 - ink.height()) / 2.0;
        (expected_left - ink.left, expected_top - ink.top)
    }

    /// Shift padding so the ink moves toward the centre.
    ///
    /// Half of each axis' offset is added to the near side and taken from
    /// the far side, both clamped at zero. The container keeps its size.
    /// Returns `true` when padding changed.
    pub fn recenter(&mut self) -> bool {
        let (dx, dy) = self.centering_offset();
        let mut changed = false;

        if dx.abs() > RECENTER_TOLERANCE {
            self.padding.left = (self.padding.left + dx / 2.0).max(0.0);
            self.padding.right = (self.padding.right - dx / 2.0).max(0.0);
            changed = true;
        }
        if dy.abs() > RECENTER_TOLERANCE {
            self.padding.top = (self.padding.top + dy / 2.0).max(0.0);
            self.padding.bottom = (self.padding.bottom - dy / 2.0).max(0.0);
            changed = true;
        }

        if changed {
            debug!(
                "Recentered staging element {:?} by ({:.2}, {:.2})",
                self.node, dx, dy
            );
            let mut decls = self.layout.declarations(self.padding);
            decls.set("width", format!("{}px", css_number(self.size.0)));
            decls.set("height", format!("{}px", css_number(self.size.1)));
            let mut doc = self.area.inner.borrow_mut();
            if let Some(element) = doc.dom.element_mut(self.node) {
                element.style = decls;
            }
        }
        changed
    }

    /// Detach the container now.
    pub fn release(mut self) -> Result<(), FormulaError> {
        self.released = true;
        self.area.detach(self.node)
    }
}

impl Drop for StagingElement {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Err(e) = self.area.detach(self.node) {
            warn!("{}", e);
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
