//! Portable HTML Export
//!
//! This module flattens the live preview into an HTML fragment that renders
//! the same way without any style sheet: computed styles are copied from the
//! live tree onto a clone, newlines inside code become `<br>`, the fragment
//! is wrapped in a container with baseline typography, and per-tag inline
//! styles are injected into the serialized markup.

use log::{debug, info};
use regex::{Captures, Regex};

use super::options::ExportOptions;
use crate::error::{Error, Result};
use crate::preview::dom::{escape_attr, escape_text, Dom, Element, NodeData, NodeId};
use crate::preview::PreviewDocument;

/// Computed properties copied from a live `pre` onto its clone.
const PRE_PROPERTIES: &[&str] = &[
    "background-color",
    "border",
    "border-radius",
    "padding",
    "margin",
    "font-family",
    "font-size",
    "line-height",
    "white-space",
    "overflow-x",
    "color",
];

/// Computed properties copied from a live `pre > code` onto its clone.
const PRE_CODE_PROPERTIES: &[&str] = &[
    "font-family",
    "font-size",
    "color",
    "background-color",
    "padding",
];

// ─────────────────────────────────────────────────────────────────────────────
// Fragment Export
// ─────────────────────────────────────────────────────────────────────────────

/// Export the settled preview as a portable fragment.
///
/// Refuses with [`Error::FormulasPending`] while any formula placeholder is
/// still loading; nothing is produced in that case. The live preview is
/// never modified.
pub fn export_fragment(preview: &PreviewDocument, options: &ExportOptions) -> Result<String> {
    let pending = preview.loading_occurrences();
    if !pending.is_empty() {
        info!("Export refused: {} formula(s) still rendering", pending.len());
        return Err(Error::FormulasPending {
            count: pending.len(),
        });
    }

    let live = preview.dom();
    let mut cloned = live.clone_subtree(preview.root());

    // Computed values exist only on the live tree; write them onto the clone.
    for original in live.descendants(preview.root()) {
        let Some(&copy) = cloned.mapping.get(&original) else {
            continue;
        };
        let in_pre = live.ancestors(original).any(|a| live.is_tag(a, "pre"));
        let properties: &[&str] = if live.is_tag(original, "pre") {
            PRE_PROPERTIES
        } else if in_pre && live.is_tag(original, "code") {
            PRE_CODE_PROPERTIES
        } else if in_pre && is_token(live, original) {
            &["color"]
        } else {
            continue;
        };

        let computed = preview.computed_style(original);
        if let Some(element) = cloned.dom.element_mut(copy) {
            for property in properties {
                if let Some(value) = computed.get(property) {
                    element.style.set(property, value);
                }
            }
        }
    }

    let code_blocks: Vec<NodeId> = cloned
        .dom
        .descendants(cloned.root)
        .into_iter()
        .filter(|&id| cloned.dom.is_tag(id, "pre"))
        .collect();
    for pre in code_blocks {
        rewrite_newlines(&mut cloned.dom, pre);
    }

    for id in cloned.dom.descendants(cloned.root) {
        match cloned.dom.data(id) {
            NodeData::Element(_) => {
                if let Some(element) = cloned.dom.element_mut(id) {
                    element.classes.clear();
                }
            }
            NodeData::Raw(markup) => {
                let stripped = strip_class_attributes(markup);
                let replacement = cloned.dom.create_raw(stripped);
                cloned.dom.replace_with(id, &[replacement]);
            }
            NodeData::Text(_) => {}
        }
    }

    if let Some(container) = cloned.dom.element_mut(cloned.root) {
        container.tag = "div".to_string();
        container.attrs.clear();
        container.style.set("font-family", options.font_family.clone());
        container.style.set("font-size", format!("{}px", options.font_size));
        container.style.set("line-height", options.line_height.to_string());
        container.style.set("color", options.text_color.clone());
        container
            .style
            .set("background-color", options.background_color.clone());
    }

    let html = inject_portable_styles(&cloned.dom.to_html(cloned.root), options);
    debug!("Exported fragment of {} bytes", html.len());
    Ok(html)
}

fn is_token(dom: &Dom, node: NodeId) -> bool {
    dom.element(node)
        .is_some_and(|e| e.tag == "span" && e.classes.iter().any(|c| c.starts_with("hl-")))
}

/// Replace newlines in the text under `pre` with `<br>` elements.
///
/// The block's final newline is dropped rather than turned into an empty
/// trailing line.
fn rewrite_newlines(dom: &mut Dom, pre: NodeId) {
    let texts: Vec<NodeId> = dom
        .descendants(pre)
        .into_iter()
        .filter(|&id| matches!(dom.data(id), NodeData::Text(_)))
        .collect();
    let last = texts.last().copied();

    for id in texts {
        let NodeData::Text(text) = dom.data(id) else {
            continue;
        };
        let mut text = text.clone();
        if Some(id) == last && text.ends_with('\n') {
            text.pop();
        }
        if !text.contains('\n') && Some(id) != last {
            continue;
        }

        let mut replacements = Vec::new();
        for (index, piece) in text.split('\n').enumerate() {
            if index > 0 {
                replacements.push(dom.create_element(Element::new("br")));
            }
            if !piece.is_empty() {
                replacements.push(dom.create_text(piece));
            }
        }
        dom.replace_with(id, &replacements);
    }
}

/// Remove `class` attributes from raw markup such as typeset MathML.
fn strip_class_attributes(markup: &str) -> String {
    match Regex::new(r#"\s+class="[^"]*""#) {
        Ok(re) => re.replace_all(markup, "").into_owned(),
        Err(e) => {
            debug!("Invalid class pattern: {}", e);
            markup.to_string()
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Style Injection
// ─────────────────────────────────────────────────────────────────────────────

/// Add inline styles to inline code, tables, quotes and headings.
///
/// Bare tags get the style attribute; tags carrying only a `style`
/// attribute get the declarations prepended unless the marker property is
/// already there. Running it twice changes nothing.
pub fn inject_portable_styles(html: &str, options: &ExportOptions) -> String {
    let code = format!(
        "font-family: {}; font-size: 0.9em; background-color: {}; color: {}; padding: 2px 4px; border-radius: 3px",
        options.mono_font_family, options.code_background, options.code_color
    );
    let mut html = inject_bare(html, "code", &code);

    let table = "border-collapse: collapse; border-spacing: 0; margin: 0 0 16px 0";
    html = inject(&html, "table", table, "border-collapse");

    let cell = format!("border: 1px solid {}; padding: 6px 13px", options.table_border);
    let header = format!(
        "{}; background-color: {}; font-weight: 600",
        cell, options.table_header_background
    );
    html = inject(&html, "th", &header, "border:");
    html = inject(&html, "td", &cell, "border:");

    let quote = format!(
        "border-left: 4px solid {}; color: {}; font-style: italic; padding: 0 16px; margin: 0 0 16px 0",
        options.quote_border, options.quote_color
    );
    html = inject(&html, "blockquote", &quote, "border-left");

    for level in 1..=6u8 {
        let heading = format!(
            "font-size: {}px; font-weight: 600; color: {}; margin: 24px 0 16px 0",
            options.heading_size(level),
            options.heading_color
        );
        html = inject(&html, &format!("h{}", level), &heading, "font-size");
    }
    html
}

/// Style every attribute-less `<tag>`.
fn inject_bare(html: &str, tag: &str, declarations: &str) -> String {
    html.replace(
        &format!("<{}>", tag),
        &format!("<{} style=\"{}\">", tag, escape_attr(declarations)),
    )
}

/// Style every `<tag>` or `<tag style="...">` lacking `marker`.
fn inject(html: &str, tag: &str, declarations: &str, marker: &str) -> String {
    let pattern = format!(r#"<{}(?: style="([^"]*)")?>"#, regex::escape(tag));
    let re = match Regex::new(&pattern) {
        Ok(re) => re,
        Err(e) => {
            debug!("Invalid injection pattern for <{}>: {}", tag, e);
            return html.to_string();
        }
    };
    let declarations = escape_attr(declarations);
    re.replace_all(html, |caps: &Captures| match caps.get(1) {
        Some(existing) if existing.as_str().contains(marker) => caps[0].to_string(),
        Some(existing) => format!(
            "<{} style=\"{}; {}\">",
            tag,
            declarations,
            existing.as_str()
        ),
        None => format!("<{} style=\"{}\">", tag, declarations),
    })
    .into_owned()
}

// ─────────────────────────────────────────────────────────────────────────────
// Standalone Document
// ─────────────────────────────────────────────────────────────────────────────

/// Wrap an exported fragment in a complete HTML document.
pub fn generate_html_document(fragment: &str, title: Option<&str>, options: &ExportOptions) -> String {
    let doc_title = title.unwrap_or("Exported Document");
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<meta name="generator" content="pastemark">
<title>{title}</title>
</head>
<body style="margin: 0; padding: 32px 24px; background-color: {background}">
{body}
</body>
</html>
"#,
        title = escape_text(doc_title),
        background = options.background_color,
        body = fragment,
    )
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
