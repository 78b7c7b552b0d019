//! Preview style sheet and computed styles
//!
//! The live preview is styled by class and tag rules, like a page with a
//! linked style sheet. Computed values are resolved per node by cascading
//! matching rules and inheriting text properties from ancestors; the export
//! transform reads them from the live tree and writes them onto its clone.

use super::dom::{Declarations, Dom, NodeData, NodeId};
use crate::theme::{Rgb, ThemeColors};

/// Properties a node takes from its parent when it sets none itself.
pub const INHERITED_PROPERTIES: &[&str] = &[
    "color",
    "font-family",
    "font-size",
    "font-style",
    "font-weight",
    "line-height",
    "white-space",
];

/// Proportional font stack used for body text.
pub const SANS_FONT_STACK: &str =
    "-apple-system, BlinkMacSystemFont, 'Segoe UI', 'Noto Sans', Helvetica, Arial, sans-serif";

/// Monospace font stack used for code.
pub const MONO_FONT_STACK: &str =
    "'JetBrains Mono', Consolas, 'Liberation Mono', Menlo, Courier, monospace";

/// Heading sizes relative to the base font size, h1 to h6.
const HEADING_SCALE: [f32; 6] = [2.0, 1.5, 1.25, 1.0, 0.875, 0.85];

// ─────────────────────────────────────────────────────────────────────────────
// Selectors
// ─────────────────────────────────────────────────────────────────────────────

/// A rule selector.
#[derive(Debug, Clone, PartialEq)]
pub enum Selector {
    Tag(String),
    Class(String),
    /// `ancestor target`
    Descendant(Box<Selector>, Box<Selector>),
}

impl Selector {
    pub fn tag(tag: &str) -> Self {
        Selector::Tag(tag.to_string())
    }

    pub fn class(class: &str) -> Self {
        Selector::Class(class.to_string())
    }

    pub fn descendant(ancestor: Selector, target: Selector) -> Self {
        Selector::Descendant(Box::new(ancestor), Box::new(target))
    }

    /// Tag selectors weigh 1, class selectors 10; descendants add up.
    pub fn specificity(&self) -> u32 {
        match self {
            Selector::Tag(_) => 1,
            Selector::Class(_) => 10,
            Selector::Descendant(a, b) => a.specificity() + b.specificity(),
        }
    }

    pub fn matches(&self, dom: &Dom, node: NodeId) -> bool {
        match self {
            Selector::Tag(tag) => dom.is_tag(node, tag),
            Selector::Class(class) => dom.element(node).is_some_and(|e| e.has_class(class)),
            Selector::Descendant(ancestor, target) => {
                target.matches(dom, node) && dom.ancestors(node).any(|a| ancestor.matches(dom, a))
            }
        }
    }
}

/// A selector with its declarations.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub selector: Selector,
    pub declarations: Declarations,
}

// ─────────────────────────────────────────────────────────────────────────────
// Stylesheet
// ─────────────────────────────────────────────────────────────────────────────

/// Ordered rules; later rules win between equal specificities.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Stylesheet {
    rules: Vec<Rule>,
}

impl Stylesheet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_rule<'a>(
        &mut self,
        selector: Selector,
        declarations: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) {
        self.rules.push(Rule {
            selector,
            declarations: Declarations::from_pairs(declarations),
        });
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Whether any rule targets `class`.
    pub fn has_class_rule(&self, class: &str) -> bool {
        self.rules
            .iter()
            .any(|r| matches!(&r.selector, Selector::Class(c) if c == class))
    }

    /// Resolve every property that applies to `node`.
    ///
    /// Inherited properties come from the parent's computed style, then
    /// matching rules apply in specificity order, then the inline style.
    pub fn computed_style(&self, dom: &Dom, node: NodeId) -> Declarations {
        let mut computed = Declarations::new();
        if let Some(parent) = dom.parent(node) {
            let inherited = self.computed_style(dom, parent);
            for (property, value) in inherited.iter() {
                if INHERITED_PROPERTIES.contains(&property) {
                    computed.set(property, value);
                }
            }
        }

        let NodeData::Element(element) = dom.data(node) else {
            return computed;
        };

        let mut matching: Vec<(u32, usize, &Rule)> = self
            .rules
            .iter()
            .enumerate()
            .filter(|(_, rule)| rule.selector.matches(dom, node))
            .map(|(order, rule)| (rule.selector.specificity(), order, rule))
            .collect();
        matching.sort_by_key(|(specificity, order, _)| (*specificity, *order));

        for (_, _, rule) in matching {
            computed.merge(&rule.declarations);
        }
        computed.merge(&element.style);
        computed
    }

    /// Class name carrying a token color, registered on first use.
    pub fn token_class(&mut self, color: Rgb) -> String {
        let class = format!("hl-{}", color.hex());
        if !self.has_class_rule(&class) {
            let value = color.to_css();
            self.add_rule(Selector::class(&class), [("color", value.as_str())]);
        }
        class
    }

    /// The preview style sheet for a palette.
    pub fn for_theme(colors: &ThemeColors, base_font_size: f32) -> Self {
        let mut sheet = Stylesheet::new();
        let px = |scale: f32| format!("{}px", (base_font_size * scale).round());

        let text = colors.text.primary.to_css();
        let background = colors.base.background.to_css();
        let base = px(1.0);
        sheet.add_rule(
            Selector::class("preview"),
            [
                ("font-family", SANS_FONT_STACK),
                ("font-size", base.as_str()),
                ("line-height", "1.6"),
                ("color", text.as_str()),
                ("background-color", background.as_str()),
            ],
        );

        let heading = colors.markdown.heading.to_css();
        for (index, scale) in HEADING_SCALE.iter().enumerate() {
            let size = px(*scale);
            sheet.add_rule(
                Selector::tag(&format!("h{}", index + 1)),
                [
                    ("font-size", size.as_str()),
                    ("font-weight", "600"),
                    ("color", heading.as_str()),
                    ("margin", "24px 0 16px 0"),
                ],
            );
        }

        sheet.add_rule(Selector::tag("p"), [("margin", "0 0 16px 0")]);
        let link = colors.text.link.to_css();
        sheet.add_rule(Selector::tag("a"), [("color", link.as_str())]);

        let code_bg = colors.base.background_tertiary.to_css();
        let code_color = colors.text.code.to_css();
        let code_size = px(0.9);
        sheet.add_rule(
            Selector::tag("code"),
            [
                ("font-family", MONO_FONT_STACK),
                ("font-size", code_size.as_str()),
                ("background-color", code_bg.as_str()),
                ("color", code_color.as_str()),
                ("padding", "2px 4px"),
                ("border-radius", "3px"),
            ],
        );

        let block_bg = colors.markdown.code_block_bg.to_css();
        let block_border = format!("1px solid {}", colors.markdown.code_block_border.to_css());
        sheet.add_rule(
            Selector::tag("pre"),
            [
                ("background-color", block_bg.as_str()),
                ("border", block_border.as_str()),
                ("border-radius", "4px"),
                ("padding", "12px 16px"),
                ("margin", "0 0 16px 0"),
                ("font-family", MONO_FONT_STACK),
                ("font-size", code_size.as_str()),
                ("line-height", "1.45"),
                ("white-space", "pre"),
                ("overflow-x", "auto"),
            ],
        );
        sheet.add_rule(
            Selector::descendant(Selector::tag("pre"), Selector::tag("code")),
            [
                ("background-color", "transparent"),
                ("padding", "0"),
                ("color", text.as_str()),
            ],
        );

        let quote_border = format!("4px solid {}", colors.markdown.blockquote_border.to_css());
        let quote_text = colors.markdown.blockquote_text.to_css();
        sheet.add_rule(
            Selector::tag("blockquote"),
            [
                ("border-left", quote_border.as_str()),
                ("color", quote_text.as_str()),
                ("padding", "0 16px"),
                ("margin", "0 0 16px 0"),
                ("font-style", "italic"),
            ],
        );

        let table_border = format!("1px solid {}", colors.markdown.table_border.to_css());
        let header_bg = colors.markdown.table_header_bg.to_css();
        sheet.add_rule(
            Selector::tag("table"),
            [("border-collapse", "collapse"), ("margin", "0 0 16px 0")],
        );
        for cell in ["th", "td"] {
            sheet.add_rule(
                Selector::tag(cell),
                [("border", table_border.as_str()), ("padding", "6px 13px")],
            );
        }
        sheet.add_rule(
            Selector::tag("th"),
            [("background-color", header_bg.as_str()), ("font-weight", "600")],
        );

        let rule = format!("1px solid {}", colors.markdown.horizontal_rule.to_css());
        sheet.add_rule(
            Selector::tag("hr"),
            [("border", "0"), ("border-top", rule.as_str()), ("margin", "24px 0")],
        );

        sheet.add_rule(
            Selector::class("math-block"),
            [("display", "block"), ("text-align", "center"), ("margin", "16px 0")],
        );
        let muted = colors.text.muted.to_css();
        sheet.add_rule(Selector::class("math-loading"), [("color", muted.as_str())]);
        let error = colors.text.error.to_css();
        sheet.add_rule(Selector::class("math-error"), [("color", error.as_str())]);
        sheet.add_rule(Selector::class("hl-b"), [("font-weight", "bold")]);
        sheet.add_rule(Selector::class("hl-i"), [("font-style", "italic")]);

        sheet
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preview::dom::Element;

    fn element(tag: &str, classes: &[&str]) -> Element {
        let mut el = Element::new(tag);
        el.classes = classes.iter().map(|c| c.to_string()).collect();
        el
    }

    #[test]
    fn test_specificity_order() {
        let mut sheet = Stylesheet::new();
        sheet.add_rule(Selector::class("x"), [("color", "red")]);
        sheet.add_rule(Selector::tag("span"), [("color", "blue")]);

        let mut dom = Dom::new();
        let id = dom.create_element(element("span", &["x"]));
        assert_eq!(sheet.computed_style(&dom, id).get("color"), Some("red"));
    }

    #[test]
    fn test_inline_style_wins() {
        let mut sheet = Stylesheet::new();
        sheet.add_rule(Selector::class("x"), [("color", "red")]);
        let mut dom = Dom::new();
        let mut el = element("span", &["x"]);
        el.style.set("color", "green");
        let id = dom.create_element(el);
        assert_eq!(sheet.computed_style(&dom, id).get("color"), Some("green"));
    }

    #[test]
    fn test_inheritance_only_for_text_properties() {
        let mut sheet = Stylesheet::new();
        sheet.add_rule(
            Selector::tag("div"),
            [("color", "red"), ("background-color", "black")],
        );
        let mut dom = Dom::new();
        let root = dom.create_element(element("div", &[]));
        let span = dom.append_element(root, element("span", &[]));
        let text = dom.append_text(span, "hi");

        let style = sheet.computed_style(&dom, text);
        assert_eq!(style.get("color"), Some("red"));
        assert_eq!(style.get("background-color"), None);
    }

    #[test]
    fn test_descendant_selector() {
        let mut sheet = Stylesheet::new();
        sheet.add_rule(Selector::tag("code"), [("padding", "2px")]);
        sheet.add_rule(
            Selector::descendant(Selector::tag("pre"), Selector::tag("code")),
            [("padding", "0")],
        );
        let mut dom = Dom::new();
        let pre = dom.create_element(element("pre", &[]));
        let in_pre = dom.append_element(pre, element("code", &[]));
        let loose = dom.create_element(element("code", &[]));

        assert_eq!(sheet.computed_style(&dom, in_pre).get("padding"), Some("0"));
        assert_eq!(sheet.computed_style(&dom, loose).get("padding"), Some("2px"));
    }

    #[test]
    fn test_token_class_registered_once() {
        let mut sheet = Stylesheet::new();
        let a = sheet.token_class(Rgb::new(255, 0, 16));
        let b = sheet.token_class(Rgb::new(255, 0, 16));
        assert_eq!(a, "hl-ff0010");
        assert_eq!(a, b);
        assert_eq!(sheet.rules().len(), 1);
    }

    #[test]
    fn test_theme_sheet_heading_sizes() {
        let sheet = Stylesheet::for_theme(&ThemeColors::light(), 16.0);
        let mut dom = Dom::new();
        let h1 = dom.create_element(element("h1", &[]));
        let h6 = dom.create_element(element("h6", &[]));
        assert_eq!(sheet.computed_style(&dom, h1).get("font-size"), Some("32px"));
        assert_eq!(sheet.computed_style(&dom, h6).get("font-size"), Some("14px"));
    }
}
