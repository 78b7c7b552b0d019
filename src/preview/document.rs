//! The live preview document
//!
//! Built from the markdown AST: ordinary blocks and inlines become elements
//! styled through the preview style sheet, code blocks become highlighted
//! token spans, and every math segment becomes a placeholder element tracked
//! as a `FormulaOccurrence`. Placeholders are rewritten in place as formula
//! states settle.

use log::debug;

use super::dom::{Dom, Element, NodeId};
use super::style::Stylesheet;
use crate::config::{FormulaSettings, Settings};
use crate::error::Result;
use crate::formula::{
    DisplayMode, FallbackContent, FontSizeContext, FormulaRequest, FormulaState, OccurrenceId,
};
use crate::markdown::{
    highlight_code, parse_markdown, Highlighted, ListType, MarkdownNode, MarkdownNodeType,
    TableAlignment,
};
use crate::theme::ThemeColors;

/// Class of the preview's root element.
pub const PREVIEW_CLASS: &str = "preview";
/// Class of an inline formula placeholder.
pub const MATH_INLINE_CLASS: &str = "math-inline";
/// Class of a block formula placeholder.
pub const MATH_BLOCK_CLASS: &str = "math-block";

const STATE_CLASSES: &[&str] = &["math-loading", "math-rendered", "math-fallback", "math-error"];

// ─────────────────────────────────────────────────────────────────────────────
// Types
// ─────────────────────────────────────────────────────────────────────────────

/// One math segment of the preview.
#[derive(Debug, Clone, PartialEq)]
pub struct FormulaOccurrence {
    pub id: OccurrenceId,
    /// Placeholder element
    pub node: NodeId,
    pub source: String,
    pub display_mode: DisplayMode,
    /// Computed font size of the surrounding text
    pub font_size_context: Option<FontSizeContext>,
}

/// A selection of the rendered preview.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Selection {
    /// Plain text of the selected nodes
    pub text: String,
    /// Live markup of the selected nodes
    pub html: String,
}

/// What the preview needs from the settings.
#[derive(Debug, Clone)]
pub struct PreviewOptions {
    pub colors: ThemeColors,
    pub syntax_theme: String,
    pub base_font_size: f32,
}

impl PreviewOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            colors: ThemeColors::from_theme(settings.theme),
            syntax_theme: settings.syntax_theme.clone(),
            base_font_size: settings.export.base_font_size,
        }
    }
}

/// The rendered preview tree.
#[derive(Debug, Clone)]
pub struct PreviewDocument {
    dom: Dom,
    root: NodeId,
    stylesheet: Stylesheet,
    colors: ThemeColors,
    formulas: Vec<FormulaOccurrence>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Construction
// ─────────────────────────────────────────────────────────────────────────────

impl PreviewDocument {
    /// Parse `markdown` and build the preview.
    pub fn from_markdown(markdown: &str, options: &PreviewOptions) -> Result<Self> {
        let document = parse_markdown(markdown)?;

        let mut dom = Dom::new();
        let mut root_element = Element::new("div");
        root_element.classes.push(PREVIEW_CLASS.to_string());
        let root = dom.create_element(root_element);

        let mut builder = Builder {
            dom,
            stylesheet: Stylesheet::for_theme(&options.colors, options.base_font_size),
            options,
            formulas: Vec::new(),
        };
        builder.children(root, &document.root);

        let Builder {
            dom,
            stylesheet,
            mut formulas,
            ..
        } = builder;

        for occurrence in &mut formulas {
            if let Some(parent) = dom.parent(occurrence.node) {
                occurrence.font_size_context = stylesheet
                    .computed_style(&dom, parent)
                    .get("font-size")
                    .and_then(FontSizeContext::parse);
            }
        }

        let mut preview = Self {
            dom,
            root,
            stylesheet,
            colors: options.colors.clone(),
            formulas,
        };
        for id in preview.formula_ids() {
            preview.apply_formula_state(id, &FormulaState::Loading);
        }
        debug!(
            "Built preview with {} nodes and {} formula(s)",
            preview.dom.descendants(root).len(),
            preview.formulas.len()
        );
        Ok(preview)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    pub fn dom(&self) -> &Dom {
        &self.dom
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn stylesheet(&self) -> &Stylesheet {
        &self.stylesheet
    }

    pub fn colors(&self) -> &ThemeColors {
        &self.colors
    }

    pub fn formulas(&self) -> &[FormulaOccurrence] {
        &self.formulas
    }

    pub fn occurrence(&self, id: OccurrenceId) -> Option<&FormulaOccurrence> {
        self.formulas.iter().find(|o| o.id == id)
    }

    fn formula_ids(&self) -> Vec<OccurrenceId> {
        self.formulas.iter().map(|o| o.id).collect()
    }

    /// Computed style of a live node.
    pub fn computed_style(&self, node: NodeId) -> super::dom::Declarations {
        self.stylesheet.computed_style(&self.dom, node)
    }

    /// Serialized live preview, classes included.
    pub fn serialize(&self) -> String {
        self.dom.to_html(self.root)
    }

    /// Select the whole rendered preview.
    pub fn selection(&self) -> Selection {
        Selection {
            text: self.dom.text_content(self.root),
            html: self.dom.inner_html(self.root),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Formulas
    // ─────────────────────────────────────────────────────────────────────────

    /// The rendering request for an occurrence under `settings`.
    pub fn request_for(
        occurrence: &FormulaOccurrence,
        settings: &FormulaSettings,
    ) -> FormulaRequest {
        FormulaRequest::new(occurrence.source.clone(), occurrence.display_mode)
            .with_font_size(occurrence.font_size_context)
            .with_target_dpi(settings.target_dpi)
            .with_quality(settings.quality)
    }

    /// Occurrences whose placeholder still shows the loading state.
    pub fn loading_occurrences(&self) -> Vec<OccurrenceId> {
        self.formulas
            .iter()
            .filter(|o| {
                self.dom
                    .element(o.node)
                    .is_some_and(|e| e.has_class("math-loading"))
            })
            .map(|o| o.id)
            .collect()
    }

    /// Requests for every occurrence.
    pub fn requests(&self, settings: &FormulaSettings) -> Vec<(OccurrenceId, FormulaRequest)> {
        self.formulas
            .iter()
            .map(|o| (o.id, Self::request_for(o, settings)))
            .collect()
    }

    /// Rewrite an occurrence's placeholder to show `state`.
    pub fn apply_formula_state(&mut self, id: OccurrenceId, state: &FormulaState) {
        let Some(occurrence) = self.occurrence(id).cloned() else {
            return;
        };
        let node = occurrence.node;
        let block = occurrence.display_mode.is_block();

        self.dom.clear_children(node);
        if let Some(element) = self.dom.element_mut(node) {
            element.classes.retain(|c| !STATE_CLASSES.contains(&c.as_str()));
            element.attrs.clear();
            element.style = Default::default();
            element.classes.push(format!("math-{}", state.label()));
            if block {
                element.style.set("text-align", "center");
            }
        }

        match state {
            FormulaState::Loading => {
                if let Some(element) = self.dom.element_mut(node) {
                    element.set_attr("aria-busy", "true");
                }
                self.dom.append_text(node, occurrence.source.clone());
            }
            FormulaState::Rendered(rendered) => {
                let mut img = Element::new("img");
                img.set_attr("src", rendered.data_uri.clone());
                img.set_attr("width", rendered.width.to_string());
                img.set_attr("height", rendered.height.to_string());
                img.set_attr("alt", occurrence.source.clone());
                if block {
                    img.style.set("display", "block");
                    img.style.set("margin", "0 auto");
                } else {
                    img.style.set("vertical-align", "middle");
                }
                self.dom.append_element(node, img);
            }
            FormulaState::Fallback(content) => {
                self.append_fallback(node, content);
            }
            FormulaState::Error { detail, fallback } => {
                self.append_fallback(node, fallback);
                let mut indicator = Element::new("span");
                indicator.set_attr("title", detail.clone());
                indicator.style.set("color", self.colors.text.error.to_css());
                indicator.style.set("font-size", "0.8em");
                let indicator = self.dom.append_element(node, indicator);
                self.dom
                    .append_text(indicator, " \u{26A0} image generation failed");
            }
        }
    }

    fn append_fallback(&mut self, node: NodeId, content: &FallbackContent) {
        match content {
            FallbackContent::Markup(markup) => {
                let raw = self.dom.create_raw(markup.clone());
                self.dom.append(node, raw);
            }
            FallbackContent::Text(text) => {
                self.dom.append_text(node, text.clone());
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Builder
// ─────────────────────────────────────────────────────────────────────────────

struct Builder<'a> {
    dom: Dom,
    stylesheet: Stylesheet,
    options: &'a PreviewOptions,
    formulas: Vec<FormulaOccurrence>,
}

impl Builder<'_> {
    fn children(&mut self, parent: NodeId, node: &MarkdownNode) {
        for child in &node.children {
            self.node(parent, child);
        }
    }

    fn wrap(&mut self, parent: NodeId, tag: &str, node: &MarkdownNode) -> NodeId {
        let id = self.dom.append_element(parent, Element::new(tag));
        self.children(id, node);
        id
    }

    fn node(&mut self, parent: NodeId, node: &MarkdownNode) {
        match &node.node_type {
            MarkdownNodeType::Document | MarkdownNodeType::Other => self.children(parent, node),
            MarkdownNodeType::Paragraph => {
                self.wrap(parent, "p", node);
            }
            MarkdownNodeType::Heading { level } => {
                self.wrap(parent, &format!("h{}", level.level()), node);
            }
            MarkdownNodeType::BlockQuote => {
                self.wrap(parent, "blockquote", node);
            }
            MarkdownNodeType::List { list_type, .. } => match list_type {
                ListType::Bullet => {
                    self.wrap(parent, "ul", node);
                }
                ListType::Ordered { start, .. } => {
                    let mut ol = Element::new("ol");
                    if *start != 1 {
                        ol.set_attr("start", start.to_string());
                    }
                    let id = self.dom.append_element(parent, ol);
                    self.children(id, node);
                }
            },
            MarkdownNodeType::Item => {
                self.wrap(parent, "li", node);
            }
            MarkdownNodeType::TaskItem { checked } => {
                let li = self.dom.append_element(parent, Element::new("li"));
                let mut checkbox = Element::new("input");
                checkbox.set_attr("type", "checkbox");
                checkbox.set_attr("disabled", "");
                if *checked {
                    checkbox.set_attr("checked", "");
                }
                self.dom.append_element(li, checkbox);
                self.dom.append_text(li, " ");
                self.children(li, node);
            }
            MarkdownNodeType::CodeBlock { language, literal } => {
                self.code_block(parent, language, literal);
            }
            MarkdownNodeType::HtmlBlock(html) | MarkdownNodeType::HtmlInline(html) => {
                let raw = self.dom.create_raw(html.clone());
                self.dom.append(parent, raw);
            }
            MarkdownNodeType::ThematicBreak => {
                self.dom.append_element(parent, Element::new("hr"));
            }
            MarkdownNodeType::Table { alignments, .. } => {
                let table = self.dom.append_element(parent, Element::new("table"));
                for row in &node.children {
                    self.table_row(table, row, alignments);
                }
            }
            MarkdownNodeType::TableRow { .. } | MarkdownNodeType::TableCell => {
                self.children(parent, node)
            }
            MarkdownNodeType::Text(text) => {
                self.dom.append_text(parent, text.clone());
            }
            MarkdownNodeType::SoftBreak => {
                self.dom.append_text(parent, " ");
            }
            MarkdownNodeType::LineBreak => {
                self.dom.append_element(parent, Element::new("br"));
            }
            MarkdownNodeType::Code(code) => {
                let id = self.dom.append_element(parent, Element::new("code"));
                self.dom.append_text(id, code.clone());
            }
            MarkdownNodeType::Emphasis => {
                self.wrap(parent, "em", node);
            }
            MarkdownNodeType::Strong => {
                self.wrap(parent, "strong", node);
            }
            MarkdownNodeType::Strikethrough => {
                self.wrap(parent, "del", node);
            }
            MarkdownNodeType::Link { url, title } => {
                let mut a = Element::new("a");
                a.set_attr("href", url.clone());
                if !title.is_empty() {
                    a.set_attr("title", title.clone());
                }
                let id = self.dom.append_element(parent, a);
                self.children(id, node);
            }
            MarkdownNodeType::Image { url, title } => {
                let mut img = Element::new("img");
                img.set_attr("src", url.clone());
                img.set_attr("alt", node.text_content());
                if !title.is_empty() {
                    img.set_attr("title", title.clone());
                }
                self.dom.append_element(parent, img);
            }
            MarkdownNodeType::FootnoteReference(name) => {
                let sup = self.dom.append_element(parent, Element::new("sup"));
                let mut a = Element::new("a");
                a.set_attr("href", format!("#fn-{}", name));
                let a = self.dom.append_element(sup, a);
                self.dom.append_text(a, name.clone());
            }
            MarkdownNodeType::FootnoteDefinition(name) => {
                let mut div = Element::new("div");
                div.classes.push("footnote".to_string());
                div.set_attr("id", format!("fn-{}", name));
                let id = self.dom.append_element(parent, div);
                self.children(id, node);
            }
            MarkdownNodeType::Math { display, literal } => {
                let display_mode = DisplayMode::from_display(*display);
                let (tag, class) = if display_mode.is_block() {
                    ("div", MATH_BLOCK_CLASS)
                } else {
                    ("span", MATH_INLINE_CLASS)
                };
                let mut element = Element::new(tag);
                element.classes.push(class.to_string());
                let id = self.dom.append_element(parent, element);
                self.formulas.push(FormulaOccurrence {
                    id: OccurrenceId(self.formulas.len()),
                    node: id,
                    source: literal.trim().to_string(),
                    display_mode,
                    font_size_context: None,
                });
            }
        }
    }

    fn table_row(&mut self, table: NodeId, row: &MarkdownNode, alignments: &[TableAlignment]) {
        let header = matches!(row.node_type, MarkdownNodeType::TableRow { header: true });
        let tr = self.dom.append_element(table, Element::new("tr"));
        let tag = if header { "th" } else { "td" };
        for (column, cell) in row.children.iter().enumerate() {
            let mut element = Element::new(tag);
            if let Some(align) = alignments.get(column).and_then(|a| a.css()) {
                element.style.set("text-align", align);
            }
            let id = self.dom.append_element(tr, element);
            self.children(id, cell);
        }
    }

    /// `pre > code.language-x > span.hl-rrggbb` per token.
    fn code_block(&mut self, parent: NodeId, language: &str, literal: &str) {
        let pre = self.dom.append_element(parent, Element::new("pre"));
        let mut code = Element::new("code");
        if !language.is_empty() {
            code.classes.push(format!("language-{}", language));
        }
        let code = self.dom.append_element(pre, code);

        let highlighted = highlight_code(
            literal,
            language,
            &self.options.syntax_theme,
            self.options.colors.is_dark(),
        );
        match highlighted {
            Highlighted::Plain => {
                self.dom.append_text(code, literal);
            }
            Highlighted::Tokens(lines) => {
                for segment in lines.iter().flat_map(|l| l.segments.iter()) {
                    if segment.text.is_empty() {
                        continue;
                    }
                    let mut span = Element::new("span");
                    span.classes.push(self.stylesheet.token_class(segment.foreground));
                    if segment.bold {
                        span.classes.push("hl-b".to_string());
                    }
                    if segment.italic {
                        span.classes.push("hl-i".to_string());
                    }
                    let span = self.dom.append_element(code, span);
                    self.dom.append_text(span, segment.text.clone());
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
    use crate::formula::RenderedFormula;

    fn options() -> PreviewOptions {
        PreviewOptions::from_settings(&Settings::default())
    }

    fn preview(markdown: &str) -> PreviewDocument {
        PreviewDocument::from_markdown(markdown, &options()).unwrap()
    }

    #[test]
    fn test_basic_blocks() {
        let doc = preview("# Title\n\nHello *world*\n\n---\n");
        assert_eq!(
            doc.serialize(),
            "<div class=\"preview\"><h1>Title</h1><p>Hello <em>world</em></p><hr></div>"
        );
    }

    #[test]
    fn test_formula_placeholders_are_typed() {
        let doc = preview("Energy $E=mc^2$ here\n\n$$\\int_0^1 x\\,dx$$\n");
        let formulas = doc.formulas();
        assert_eq!(formulas.len(), 2);
        assert_eq!(formulas[0].source, "E=mc^2");
        assert_eq!(formulas[0].display_mode, DisplayMode::Inline);
        assert_eq!(formulas[1].display_mode, DisplayMode::Block);
        assert!(doc.dom().is_tag(formulas[1].node, "div"));
    }

    #[test]
    fn test_font_size_context_from_parent() {
        let doc = preview("# Heading $x$\n\nBody $y$\n");
        let sizes: Vec<_> = doc
            .formulas()
            .iter()
            .map(|o| o.font_size_context.map(|c| c.px()))
            .collect();
        assert_eq!(sizes, vec![Some(32.0), Some(16.0)]);
    }

    #[test]
    fn test_placeholders_start_loading() {
        let doc = preview("$a+b$");
        let html = doc.serialize();
        assert!(html.contains("class=\"math-inline math-loading\""));
        assert!(html.contains("aria-busy=\"true\""));
        assert!(html.contains("a+b"));
    }

    #[test]
    fn test_apply_rendered_state() {
        let mut doc = preview("$$x$$");
        let rendered = RenderedFormula {
            data_uri: "data:image/png;base64,AAAA".to_string(),
            width: 40,
            height: 30,
            pixel_width: 54,
            pixel_height: 40,
        };
        doc.apply_formula_state(OccurrenceId(0), &FormulaState::Rendered(rendered));
        let html = doc.serialize();
        assert!(html.contains(
            "<img src=\"data:image/png;base64,AAAA\" width=\"40\" height=\"30\" alt=\"x\" style=\"display: block; margin: 0 auto\">"
        ));
        assert!(!html.contains("aria-busy"));
    }

    #[test]
    fn test_reapplying_states_does_not_grow_the_tree() {
        let mut doc = preview("Inline $x$ here");
        let rendered = FormulaState::Rendered(RenderedFormula {
            data_uri: "data:image/png;base64,AAAA".to_string(),
            width: 10,
            height: 12,
            pixel_width: 14,
            pixel_height: 16,
        });
        let loading = FormulaState::Loading;
        doc.apply_formula_state(OccurrenceId(0), &rendered);
        let settled = doc.dom().node_count();
        let arena = doc.dom().arena_len();
        for _ in 0..500 {
            doc.apply_formula_state(OccurrenceId(0), &loading);
            doc.apply_formula_state(OccurrenceId(0), &rendered);
        }
        assert_eq!(doc.dom().node_count(), settled);
        assert!(doc.dom().arena_len() <= arena + 1);
        assert!(doc.loading_occurrences().is_empty());
    }

    #[test]
    fn test_apply_error_state_shows_indicator() {
        let mut doc = preview("$x$");
        doc.apply_formula_state(
            OccurrenceId(0),
            &FormulaState::Error {
                detail: "png: boom".to_string(),
                fallback: FallbackContent::Text("x".to_string()),
            },
        );
        let html = doc.serialize();
        assert!(html.contains("math-error"));
        assert!(html.contains("image generation failed"));
        assert!(html.contains("title=\"png: boom\""));
    }

    #[test]
    fn test_code_block_tokens() {
        let doc = preview("```rust\nfn main() {}\n```\n");
        let html = doc.serialize();
        assert!(html.contains("<pre><code class=\"language-rust\"><span class=\"hl-"));
        assert_eq!(doc.dom().text_content(doc.root()), "fn main() {}\n");
    }

    #[test]
    fn test_code_block_without_language_is_plain() {
        let doc = preview("```\nline1\nline2\n```\n");
        assert_eq!(
            doc.serialize(),
            "<div class=\"preview\"><pre><code>line1\nline2\n</code></pre></div>"
        );
    }

    #[test]
    fn test_table_header_and_alignment() {
        let doc = preview("| a | b |\n|:-:|---|\n| 1 | 2 |\n");
        let html = doc.serialize();
        assert!(html.contains("<table><tr><th style=\"text-align: center\">a</th><th>b</th></tr>"));
        assert!(html.contains("<tr><td style=\"text-align: center\">1</td><td>2</td></tr>"));
    }

    #[test]
    fn test_task_list() {
        let doc = preview("- [x] done\n");
        assert!(doc
            .serialize()
            .contains("<input type=\"checkbox\" disabled=\"\" checked=\"\">"));
    }

    #[test]
    fn test_requests_use_settings() {
        let doc = preview("$x$");
        let settings = FormulaSettings {
            target_dpi: 192,
            quality: 0.5,
            ..FormulaSettings::default()
        };
        let requests = doc.requests(&settings);
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].1.target_dpi, 192);
        assert_eq!(requests[0].1.quality, 0.5);
        assert_eq!(
            requests[0].1.font_size_context.map(|c| c.px()),
            Some(16.0)
        );
    }

    #[test]
    fn test_selection_of_rendered_preview() {
        let doc = preview("Hello **there**");
        let selection = doc.selection();
        assert_eq!(selection.text, "Hello there");
        assert_eq!(selection.html, "<p>Hello <strong>there</strong></p>");
    }
}
