//! Markdown parser implementation using comrak
//!
//! This module wraps comrak's parser and converts its arena AST into an owned
//! tree of typed nodes. Math segments (`$…$` and `$$…$$`) surface as the
//! dedicated `MarkdownNodeType::Math` variant, so nothing downstream has to
//! inspect attributes or class names to recognise a formula.

use comrak::{
    nodes::{
        AstNode, ListDelimType, ListType as ComrakListType, NodeValue,
        TableAlignment as ComrakTableAlignment,
    },
    parse_document, Arena, Options,
};

use crate::error::Result;

// ─────────────────────────────────────────────────────────────────────────────
// Public Types
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration options for markdown parsing.
#[derive(Debug, Clone)]
pub struct MarkdownOptions {
    /// Enable GitHub Flavored Markdown tables
    pub tables: bool,
    /// Enable strikethrough syntax (~~text~~)
    pub strikethrough: bool,
    /// Enable autolink URLs and emails
    pub autolink: bool,
    /// Enable task lists (- [ ] and - [x])
    pub tasklist: bool,
    /// Enable footnotes
    pub footnotes: bool,
    /// Enable `$inline$` and `$$display$$` math
    pub math: bool,
}

impl Default for MarkdownOptions {
    fn default() -> Self {
        Self {
            tables: true,
            strikethrough: true,
            autolink: true,
            tasklist: true,
            footnotes: true,
            math: true,
        }
    }
}

impl MarkdownOptions {
    /// Convert to comrak Options.
    fn to_comrak_options(&self) -> Options {
        let mut options = Options::default();

        options.extension.strikethrough = self.strikethrough;
        options.extension.table = self.tables;
        options.extension.autolink = self.autolink;
        options.extension.tasklist = self.tasklist;
        options.extension.footnotes = self.footnotes;
        options.extension.math_dollars = self.math;

        options
    }
}

/// Heading level (H1-H6)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadingLevel {
    H1 = 1,
    H2 = 2,
    H3 = 3,
    H4 = 4,
    H5 = 5,
    H6 = 6,
}

impl HeadingLevel {
    /// Numeric level (1-6).
    pub fn level(self) -> u8 {
        self as u8
    }
}

impl From<u8> for HeadingLevel {
    fn from(level: u8) -> Self {
        match level {
            1 => HeadingLevel::H1,
            2 => HeadingLevel::H2,
            3 => HeadingLevel::H3,
            4 => HeadingLevel::H4,
            5 => HeadingLevel::H5,
            _ => HeadingLevel::H6,
        }
    }
}

/// List type (ordered or unordered)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListType {
    Bullet,
    Ordered { start: u32, delimiter: char },
}

/// Table cell alignment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TableAlignment {
    #[default]
    None,
    Left,
    Center,
    Right,
}

impl TableAlignment {
    /// CSS `text-align` value, if any.
    pub fn css(self) -> Option<&'static str> {
        match self {
            TableAlignment::None => None,
            TableAlignment::Left => Some("left"),
            TableAlignment::Center => Some("center"),
            TableAlignment::Right => Some("right"),
        }
    }
}

impl From<ComrakTableAlignment> for TableAlignment {
    fn from(align: ComrakTableAlignment) -> Self {
        match align {
            ComrakTableAlignment::None => TableAlignment::None,
            ComrakTableAlignment::Left => TableAlignment::Left,
            ComrakTableAlignment::Center => TableAlignment::Center,
            ComrakTableAlignment::Right => TableAlignment::Right,
        }
    }
}

/// Represents the type of a markdown node.
#[derive(Debug, Clone, PartialEq)]
pub enum MarkdownNodeType {
    /// Root document node
    Document,
    /// Block quote (>)
    BlockQuote,
    /// List container
    List { list_type: ListType, tight: bool },
    /// List item
    Item,
    /// Code block with optional language
    CodeBlock { language: String, literal: String },
    /// HTML block
    HtmlBlock(String),
    /// Paragraph
    Paragraph,
    /// Heading (H1-H6)
    Heading { level: HeadingLevel },
    /// Thematic break (horizontal rule)
    ThematicBreak,
    /// Table
    Table {
        alignments: Vec<TableAlignment>,
        num_columns: usize,
    },
    /// Table row
    TableRow { header: bool },
    /// Table cell
    TableCell,
    /// Inline text content
    Text(String),
    /// Task list marker
    TaskItem { checked: bool },
    /// Soft line break
    SoftBreak,
    /// Hard line break
    LineBreak,
    /// Inline code
    Code(String),
    /// Inline HTML
    HtmlInline(String),
    /// Emphasis (italic)
    Emphasis,
    /// Strong emphasis (bold)
    Strong,
    /// Strikethrough
    Strikethrough,
    /// Link
    Link { url: String, title: String },
    /// Image
    Image { url: String, title: String },
    /// Footnote reference
    FootnoteReference(String),
    /// Footnote definition
    FootnoteDefinition(String),
    /// Math segment (`$…$` inline, `$$…$$` display)
    Math { display: bool, literal: String },
    /// Anything the preview does not render specially
    Other,
}

/// A node in the markdown AST with position information.
#[derive(Debug, Clone)]
pub struct MarkdownNode {
    /// The type of this node
    pub node_type: MarkdownNodeType,
    /// Child nodes
    pub children: Vec<MarkdownNode>,
    /// Start line in source (1-indexed)
    pub start_line: usize,
    /// End line in source (1-indexed)
    pub end_line: usize,
}

impl MarkdownNode {
    fn new(node_type: MarkdownNodeType, start_line: usize, end_line: usize) -> Self {
        Self {
            node_type,
            children: Vec::new(),
            start_line,
            end_line,
        }
    }

    /// Get all text content from this node and its descendants.
    pub fn text_content(&self) -> String {
        let mut text = String::new();
        self.collect_text(&mut text);
        text
    }

    fn collect_text(&self, output: &mut String) {
        match &self.node_type {
            MarkdownNodeType::Text(t) => output.push_str(t),
            MarkdownNodeType::Code(t) => output.push_str(t),
            MarkdownNodeType::Math { literal, .. } => output.push_str(literal),
            MarkdownNodeType::SoftBreak => output.push(' '),
            MarkdownNodeType::LineBreak => output.push('\n'),
            _ => {}
        }
        for child in &self.children {
            child.collect_text(output);
        }
    }

    /// Count math segments in this subtree.
    pub fn math_count(&self) -> usize {
        let own = usize::from(matches!(self.node_type, MarkdownNodeType::Math { .. }));
        own + self.children.iter().map(MarkdownNode::math_count).sum::<usize>()
    }
}

/// A parsed markdown document.
#[derive(Debug, Clone)]
pub struct MarkdownDocument {
    /// Root node of the AST
    pub root: MarkdownNode,
}

// ─────────────────────────────────────────────────────────────────────────────
// Public API Functions
// ─────────────────────────────────────────────────────────────────────────────

/// Parse markdown text into an AST document.
///
/// # Example
/// ```ignore
/// let doc = parse_markdown("Energy: $E=mc^2$")?;
/// assert_eq!(doc.root.math_count(), 1);
/// ```
pub fn parse_markdown(markdown: &str) -> Result<MarkdownDocument> {
    parse_markdown_with_options(markdown, &MarkdownOptions::default())
}

/// Parse markdown text with custom options.
pub fn parse_markdown_with_options(
    markdown: &str,
    options: &MarkdownOptions,
) -> Result<MarkdownDocument> {
    let arena = Arena::new();
    let comrak_options = options.to_comrak_options();

    let root = parse_document(&arena, markdown, &comrak_options);

    Ok(MarkdownDocument {
        root: convert_node(root),
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Internal Conversion Functions
// ─────────────────────────────────────────────────────────────────────────────

/// Convert a comrak AST node to our MarkdownNode structure.
fn convert_node<'a>(node: &'a AstNode<'a>) -> MarkdownNode {
    let ast = node.data.borrow();
    let sourcepos = ast.sourcepos;

    let mut markdown_node = MarkdownNode::new(
        convert_node_value(&ast.value),
        sourcepos.start.line,
        sourcepos.end.line,
    );

    for child in node.children() {
        markdown_node.children.push(convert_node(child));
    }

    markdown_node
}

/// Convert a comrak NodeValue to our MarkdownNodeType.
fn convert_node_value(value: &NodeValue) -> MarkdownNodeType {
    match value {
        NodeValue::Document => MarkdownNodeType::Document,
        NodeValue::BlockQuote => MarkdownNodeType::BlockQuote,
        NodeValue::List(list) => {
            let list_type = match list.list_type {
                ComrakListType::Bullet => ListType::Bullet,
                ComrakListType::Ordered => ListType::Ordered {
                    start: list.start as u32,
                    delimiter: if list.delimiter == ListDelimType::Period {
                        '.'
                    } else {
                        ')'
                    },
                },
            };
            MarkdownNodeType::List {
                list_type,
                tight: list.tight,
            }
        }
        NodeValue::Item(_) => MarkdownNodeType::Item,
        NodeValue::CodeBlock(code) => MarkdownNodeType::CodeBlock {
            language: code
                .info
                .split_whitespace()
                .next()
                .unwrap_or_default()
                .to_string(),
            literal: code.literal.clone(),
        },
        NodeValue::HtmlBlock(html) => MarkdownNodeType::HtmlBlock(html.literal.clone()),
        NodeValue::Paragraph => MarkdownNodeType::Paragraph,
        NodeValue::Heading(heading) => MarkdownNodeType::Heading {
            level: HeadingLevel::from(heading.level),
        },
        NodeValue::ThematicBreak => MarkdownNodeType::ThematicBreak,
        NodeValue::Table(table) => MarkdownNodeType::Table {
            alignments: table
                .alignments
                .iter()
                .map(|a| TableAlignment::from(*a))
                .collect(),
            num_columns: table.num_columns,
        },
        NodeValue::TableRow(header) => MarkdownNodeType::TableRow { header: *header },
        NodeValue::TableCell => MarkdownNodeType::TableCell,
        NodeValue::Text(text) => MarkdownNodeType::Text(text.clone()),
        NodeValue::TaskItem(checked) => MarkdownNodeType::TaskItem {
            checked: checked.map(|c| c == 'x' || c == 'X').unwrap_or(false),
        },
        NodeValue::SoftBreak => MarkdownNodeType::SoftBreak,
        NodeValue::LineBreak => MarkdownNodeType::LineBreak,
        NodeValue::Code(code) => MarkdownNodeType::Code(code.literal.clone()),
        NodeValue::HtmlInline(html) => MarkdownNodeType::HtmlInline(html.clone()),
        NodeValue::Emph => MarkdownNodeType::Emphasis,
        NodeValue::Strong => MarkdownNodeType::Strong,
        NodeValue::Strikethrough => MarkdownNodeType::Strikethrough,
        NodeValue::Link(link) => MarkdownNodeType::Link {
            url: link.url.clone(),
            title: link.title.clone(),
        },
        NodeValue::Image(image) => MarkdownNodeType::Image {
            url: image.url.clone(),
            title: image.title.clone(),
        },
        NodeValue::FootnoteReference(ref_data) => {
            MarkdownNodeType::FootnoteReference(ref_data.name.clone())
        }
        NodeValue::FootnoteDefinition(def) => {
            MarkdownNodeType::FootnoteDefinition(def.name.clone())
        }
        NodeValue::Math(math) => MarkdownNodeType::Math {
            display: math.display_math,
            literal: math.literal.clone(),
        },
        _ => MarkdownNodeType::Other,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn find<'a>(
        node: &'a MarkdownNode,
        pred: &dyn Fn(&MarkdownNodeType) -> bool,
    ) -> Option<&'a MarkdownNode> {
        if pred(&node.node_type) {
            return Some(node);
        }
        node.children.iter().find_map(|c| find(c, pred))
    }

    #[test]
    fn test_parse_empty_document() {
        let doc = parse_markdown("").unwrap();
        assert!(doc.root.children.is_empty());
    }

    #[test]
    fn test_parse_heading_h2() {
        let doc = parse_markdown("## Subtitle").unwrap();
        assert_eq!(
            doc.root.children[0].node_type,
            MarkdownNodeType::Heading {
                level: HeadingLevel::H2
            }
        );
    }

    #[test]
    fn test_parse_inline_math() {
        let doc = parse_markdown("Energy $E=mc^2$ here").unwrap();
        let math = find(&doc.root, &|t| matches!(t, MarkdownNodeType::Math { .. })).unwrap();
        assert_eq!(
            math.node_type,
            MarkdownNodeType::Math {
                display: false,
                literal: "E=mc^2".to_string()
            }
        );
    }

    #[test]
    fn test_parse_display_math() {
        let doc = parse_markdown("$$\\frac{a}{b}$$").unwrap();
        let math = find(&doc.root, &|t| matches!(t, MarkdownNodeType::Math { .. })).unwrap();
        match &math.node_type {
            MarkdownNodeType::Math { display, literal } => {
                assert!(*display);
                assert_eq!(literal.trim(), "\\frac{a}{b}");
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_math_disabled() {
        let options = MarkdownOptions {
            math: false,
            ..MarkdownOptions::default()
        };
        let doc = parse_markdown_with_options("Price $5 and $6", &options).unwrap();
        assert_eq!(doc.root.math_count(), 0);
    }

    #[test]
    fn test_math_count() {
        let doc = parse_markdown("$a$ and $b$\n\n$$c$$").unwrap();
        assert_eq!(doc.root.math_count(), 3);
    }

    #[test]
    fn test_parse_code_block_language() {
        let doc = parse_markdown("```rust ignore\nfn main() {}\n```").unwrap();
        match &doc.root.children[0].node_type {
            MarkdownNodeType::CodeBlock { language, literal } => {
                assert_eq!(language, "rust");
                assert_eq!(literal, "fn main() {}\n");
            }
            other => panic!("Expected code block, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_table_with_alignment() {
        let markdown =
            "| Left | Center | Right |\n|:-----|:------:|------:|\n| L    | C      | R     |";
        let doc = parse_markdown(markdown).unwrap();

        let table = find(&doc.root, &|t| matches!(t, MarkdownNodeType::Table { .. })).unwrap();
        if let MarkdownNodeType::Table { alignments, .. } = &table.node_type {
            assert_eq!(alignments.len(), 3);
            assert_eq!(alignments[0], TableAlignment::Left);
            assert_eq!(alignments[1], TableAlignment::Center);
            assert_eq!(alignments[2], TableAlignment::Right);
        }
    }

    #[test]
    fn test_parse_blockquote() {
        let doc = parse_markdown("> This is a quote").unwrap();
        assert!(matches!(
            doc.root.children[0].node_type,
            MarkdownNodeType::BlockQuote
        ));
    }

    #[test]
    fn test_parse_task_list() {
        let doc = parse_markdown("- [x] done\n- [ ] todo").unwrap();
        let task = find(&doc.root, &|t| matches!(t, MarkdownNodeType::TaskItem { .. })).unwrap();
        assert_eq!(task.node_type, MarkdownNodeType::TaskItem { checked: true });
    }

    #[test]
    fn test_text_content_includes_math() {
        let doc = parse_markdown("Hello **world** $x$!").unwrap();
        let text = doc.root.text_content();
        assert!(text.contains("Hello"));
        assert!(text.contains("world"));
        assert!(text.contains('x'));
    }

    #[test]
    fn test_parse_malformed_markdown() {
        let inputs = [
            "# Unclosed heading",
            "```\nunclosed code block",
            "| broken | table",
            "$unclosed math",
            "$$\nunclosed display",
        ];

        for input in inputs {
            assert!(parse_markdown(input).is_ok(), "Failed to parse: {}", input);
        }
    }

    #[test]
    fn test_source_position() {
        let doc = parse_markdown("# Heading\n\nParagraph").unwrap();
        assert_eq!(doc.root.children[0].start_line, 1);
        assert_eq!(doc.root.children[1].start_line, 3);
    }
}
