//! Arena-backed document tree
//!
//! Nodes live in a `Vec` and refer to each other through `NodeId` indices.
//! A detached node stays in the arena until it is removed; removed slots go
//! on a free list and are reused, and the generation stored in every
//! `NodeId` makes ids of removed nodes stale rather than aliasing the next
//! occupant. Serialization is deterministic and never inserts whitespace.

use std::collections::HashMap;

// ─────────────────────────────────────────────────────────────────────────────
// Declarations
// ─────────────────────────────────────────────────────────────────────────────

/// Ordered list of CSS property declarations.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Declarations {
    entries: Vec<(String, String)>,
}

impl Declarations {
    /// Empty declaration block.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `(property, value)` pairs.
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut decls = Self::new();
        for (property, value) in pairs {
            decls.set(property, value);
        }
        decls
    }

    /// Set a property, replacing any earlier value in place.
    pub fn set(&mut self, property: &str, value: impl Into<String>) {
        let value = value.into();
        match self.entries.iter_mut().find(|(p, _)| p == property) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((property.to_string(), value)),
        }
    }

    /// Look up a property.
    pub fn get(&self, property: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(p, _)| p == property)
            .map(|(_, v)| v.as_str())
    }

    /// Apply every declaration of `other` over this block.
    pub fn merge(&mut self, other: &Declarations) {
        for (property, value) in &other.entries {
            self.set(property, value.clone());
        }
    }

    /// Iterate over declarations in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(p, v)| (p.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `property: value; property: value` form for a `style` attribute.
    pub fn to_css(&self) -> String {
        self.entries
            .iter()
            .map(|(p, v)| format!("{}: {}", p, v))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Nodes
// ─────────────────────────────────────────────────────────────────────────────

/// Index of a node inside a [`Dom`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    index: usize,
    generation: u32,
}

/// An element with classes, attributes and an inline style.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Element {
    pub tag: String,
    pub classes: Vec<String>,
    pub attrs: Vec<(String, String)>,
    pub style: Declarations,
}

impl Element {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            ..Self::default()
        }
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c == class)
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Set an attribute, replacing any earlier value.
    pub fn set_attr(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.attrs.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => entry.1 = value,
            None => self.attrs.push((name.to_string(), value)),
        }
    }
}

/// Payload of a node.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeData {
    Element(Element),
    Text(String),
    /// Markup emitted verbatim (raw HTML blocks, typeset MathML)
    Raw(String),
}

#[derive(Debug, Clone)]
struct Node {
    data: NodeData,
    generation: u32,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// Result of [`Dom::clone_subtree`].
#[derive(Debug, Clone)]
pub struct ClonedTree {
    /// The new, independent tree
    pub dom: Dom,
    /// Root of the clone inside `dom`
    pub root: NodeId,
    /// Original node → cloned node
    pub mapping: HashMap<NodeId, NodeId>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Dom
// ─────────────────────────────────────────────────────────────────────────────

/// A mutable document tree.
#[derive(Debug, Clone, Default)]
pub struct Dom {
    nodes: Vec<Node>,
    /// Slots of removed nodes, reused by the next allocation
    free: Vec<usize>,
}

const VOID_TAGS: &[&str] = &["br", "hr", "img", "input", "meta"];

impl Dom {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, data: NodeData) -> NodeId {
        if let Some(index) = self.free.pop() {
            let node = &mut self.nodes[index];
            node.data = data;
            return NodeId {
                index,
                generation: node.generation,
            };
        }
        self.nodes.push(Node {
            data,
            generation: 0,
            parent: None,
            children: Vec::new(),
        });
        NodeId {
            index: self.nodes.len() - 1,
            generation: 0,
        }
    }

    /// `true` while `id` refers to a node that has not been removed.
    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes
            .get(id.index)
            .is_some_and(|node| node.generation == id.generation)
    }

    /// Nodes currently allocated.
    pub fn node_count(&self) -> usize {
        self.nodes.len() - self.free.len()
    }

    /// Slots in the arena, free ones included.
    pub fn arena_len(&self) -> usize {
        self.nodes.len()
    }

    /// Create a detached element.
    pub fn create_element(&mut self, element: Element) -> NodeId {
        self.push(NodeData::Element(element))
    }

    /// Create a detached text node.
    pub fn create_text(&mut self, text: impl Into<String>) -> NodeId {
        self.push(NodeData::Text(text.into()))
    }

    /// Create a detached raw-markup node.
    pub fn create_raw(&mut self, markup: impl Into<String>) -> NodeId {
        self.push(NodeData::Raw(markup.into()))
    }

    pub fn data(&self, id: NodeId) -> &NodeData {
        &self.nodes[id.index].data
    }

    pub fn element(&self, id: NodeId) -> Option<&Element> {
        match &self.nodes[id.index].data {
            NodeData::Element(element) => Some(element),
            _ => None,
        }
    }

    pub fn element_mut(&mut self, id: NodeId) -> Option<&mut Element> {
        match &mut self.nodes[id.index].data {
            NodeData::Element(element) => Some(element),
            _ => None,
        }
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.index].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.index].children
    }

    /// `true` when `id` is an element with the given tag.
    pub fn is_tag(&self, id: NodeId, tag: &str) -> bool {
        self.element(id).is_some_and(|e| e.tag == tag)
    }

    /// Ancestors from the parent up to the root.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(id), move |&current| self.parent(current))
    }

    /// Append `child` as the last child of `parent`, detaching it first.
    pub fn append(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.nodes[child.index].parent = Some(parent);
        self.nodes[parent.index].children.push(child);
    }

    /// Create an element and append it in one step.
    pub fn append_element(&mut self, parent: NodeId, element: Element) -> NodeId {
        let id = self.create_element(element);
        self.append(parent, id);
        id
    }

    /// Create a text node and append it in one step.
    pub fn append_text(&mut self, parent: NodeId, text: impl Into<String>) -> NodeId {
        let id = self.create_text(text);
        self.append(parent, id);
        id
    }

    /// Remove `id` from its parent. Returns `false` if it was already detached.
    pub fn detach(&mut self, id: NodeId) -> bool {
        let Some(parent) = self.nodes[id.index].parent.take() else {
            return false;
        };
        self.nodes[parent.index].children.retain(|&c| c != id);
        true
    }

    /// Detach `id` and free it with all its descendants.
    ///
    /// Returns `false` if `id` was already removed.
    pub fn remove(&mut self, id: NodeId) -> bool {
        if !self.contains(id) {
            return false;
        }
        self.detach(id);
        for node_id in self.descendants(id) {
            let node = &mut self.nodes[node_id.index];
            node.data = NodeData::Text(String::new());
            node.parent = None;
            node.children.clear();
            node.generation = node.generation.wrapping_add(1);
            self.free.push(node_id.index);
        }
        true
    }

    /// Remove every child of `id`.
    pub fn clear_children(&mut self, id: NodeId) {
        let children = std::mem::take(&mut self.nodes[id.index].children);
        for child in children {
            self.nodes[child.index].parent = None;
            self.remove(child);
        }
    }

    /// Put `replacements` where `id` was; `id` ends up detached.
    pub fn replace_with(&mut self, id: NodeId, replacements: &[NodeId]) {
        let Some(parent) = self.parent(id) else {
            return;
        };
        for &r in replacements {
            self.detach(r);
        }
        let position = self.nodes[parent.index]
            .children
            .iter()
            .position(|&c| c == id)
            .unwrap_or(self.nodes[parent.index].children.len());
        self.detach(id);
        for (offset, &r) in replacements.iter().enumerate() {
            self.nodes[r.index].parent = Some(parent);
            self.nodes[parent.index].children.insert(position + offset, r);
        }
    }

    /// `root` and all its descendants in document order.
    pub fn descendants(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.children(id).iter().rev().copied());
        }
        out
    }

    /// Concatenated text of the subtree (raw markup excluded).
    pub fn text_content(&self, root: NodeId) -> String {
        self.descendants(root)
            .into_iter()
            .filter_map(|id| match self.data(id) {
                NodeData::Text(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Deep-clone the subtree at `root` into a fresh tree.
    pub fn clone_subtree(&self, root: NodeId) -> ClonedTree {
        let mut dom = Dom::new();
        let mut mapping = HashMap::new();
        let cloned_root = self.clone_into(root, &mut dom, &mut mapping);
        ClonedTree {
            dom,
            root: cloned_root,
            mapping,
        }
    }

    fn clone_into(
        &self,
        id: NodeId,
        target: &mut Dom,
        mapping: &mut HashMap<NodeId, NodeId>,
    ) -> NodeId {
        let copy = target.push(self.data(id).clone());
        mapping.insert(id, copy);
        for &child in self.children(id) {
            let child_copy = self.clone_into(child, target, mapping);
            target.append(copy, child_copy);
        }
        copy
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Serialization
    // ─────────────────────────────────────────────────────────────────────────

    /// Serialize the subtree at `root` (including `root`) to HTML.
    pub fn to_html(&self, root: NodeId) -> String {
        let mut out = String::new();
        self.write_html(root, &mut out);
        out
    }

    /// Serialize only the children of `root`.
    pub fn inner_html(&self, root: NodeId) -> String {
        let mut out = String::new();
        for &child in self.children(root) {
            self.write_html(child, &mut out);
        }
        out
    }

    fn write_html(&self, id: NodeId, out: &mut String) {
        match self.data(id) {
            NodeData::Text(text) => out.push_str(&escape_text(text)),
            NodeData::Raw(markup) => out.push_str(markup),
            NodeData::Element(element) => {
                out.push('<');
                out.push_str(&element.tag);
                if !element.classes.is_empty() {
                    out.push_str(" class=\"");
                    out.push_str(&escape_attr(&element.classes.join(" ")));
                    out.push('"');
                }
                for (name, value) in &element.attrs {
                    out.push(' ');
                    out.push_str(name);
                    out.push_str("=\"");
                    out.push_str(&escape_attr(value));
                    out.push('"');
                }
                if !element.style.is_empty() {
                    out.push_str(" style=\"");
                    out.push_str(&escape_attr(&element.style.to_css()));
                    out.push('"');
                }
                out.push('>');
                if VOID_TAGS.contains(&element.tag.as_str()) {
                    return;
                }
                for &child in self.children(id) {
                    self.write_html(child, out);
                }
                out.push_str("</");
                out.push_str(&element.tag);
                out.push('>');
            }
        }
    }
}

/// Escape text content.
pub fn escape_text(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Escape an attribute value.
pub fn escape_attr(s: &str) -> String {
    escape_text(s).replace('"', "&quot;")
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (Dom, NodeId) {
        let mut dom = Dom::new();
        let root = dom.create_element(Element::new("div"));
        let p = dom.append_element(root, Element::new("p"));
        dom.append_text(p, "a < b");
        let mut img = Element::new("img");
        img.set_attr("alt", "\"x\"");
        dom.append_element(root, img);
        (dom, root)
    }

    #[test]
    fn test_serialization_escapes() {
        let (dom, root) = sample();
        assert_eq!(
            dom.to_html(root),
            "<div><p>a &lt; b</p><img alt=\"&quot;x&quot;\"></div>"
        );
    }

    #[test]
    fn test_classes_and_style_serialized() {
        let mut dom = Dom::new();
        let mut el = Element::new("span");
        el.classes.push("hl-ff0000".to_string());
        el.style.set("color", "#ff0000");
        let id = dom.create_element(el);
        assert_eq!(
            dom.to_html(id),
            "<span class=\"hl-ff0000\" style=\"color: #ff0000\"></span>"
        );
    }

    #[test]
    fn test_clone_is_independent() {
        let (dom, root) = sample();
        let mut cloned = dom.clone_subtree(root);
        let p_clone = cloned.mapping[&dom.children(root)[0]];
        cloned
            .dom
            .element_mut(p_clone)
            .unwrap()
            .style
            .set("color", "red");

        assert!(dom.element(dom.children(root)[0]).unwrap().style.is_empty());
        assert_eq!(cloned.mapping.len(), dom.descendants(root).len());
    }

    #[test]
    fn test_replace_with_keeps_position() {
        let mut dom = Dom::new();
        let root = dom.create_element(Element::new("pre"));
        let first = dom.append_text(root, "a");
        let middle = dom.append_text(root, "b");
        dom.append_text(root, "c");

        let x = dom.create_text("x");
        let br = dom.create_element(Element::new("br"));
        dom.replace_with(middle, &[x, br]);

        assert_eq!(dom.to_html(root), "<pre>ax<br>c</pre>");
        assert_eq!(dom.children(root)[0], first);
        assert!(dom.parent(middle).is_none());
    }

    #[test]
    fn test_detach_twice_reports_false() {
        let (mut dom, root) = sample();
        let p = dom.children(root)[0];
        assert!(dom.detach(p));
        assert!(!dom.detach(p));
    }

    #[test]
    fn test_descendants_document_order() {
        let (dom, root) = sample();
        let tags: Vec<_> = dom
            .descendants(root)
            .into_iter()
            .filter_map(|id| dom.element(id).map(|e| e.tag.clone()))
            .collect();
        assert_eq!(tags, vec!["div", "p", "img"]);
    }

    #[test]
    fn test_text_content() {
        let (dom, root) = sample();
        assert_eq!(dom.text_content(root), "a < b");
    }

    #[test]
    fn test_removed_slots_are_reused() {
        let (mut dom, root) = sample();
        let before = dom.arena_len();
        let p = dom.children(root)[0];
        assert!(dom.remove(p));
        assert_eq!(dom.node_count(), before - 2);
        assert!(!dom.contains(p));
        assert!(!dom.remove(p));

        let q = dom.append_element(root, Element::new("p"));
        dom.append_text(q, "again");
        assert_eq!(dom.arena_len(), before);
        assert_ne!(q, p);
        assert_eq!(dom.to_html(root), "<div><img alt=\"&quot;x&quot;\"><p>again</p></div>");
    }

    #[test]
    fn test_stale_id_does_not_remove_new_occupant() {
        let mut dom = Dom::new();
        let root = dom.create_element(Element::new("body"));
        let first = dom.append_element(root, Element::new("div"));
        dom.remove(first);
        let second = dom.append_element(root, Element::new("div"));
        assert!(!dom.remove(first));
        assert_eq!(dom.children(root), &[second]);
    }

    #[test]
    fn test_repeated_clear_children_stays_bounded() {
        let mut dom = Dom::new();
        let root = dom.create_element(Element::new("span"));
        for i in 0..1000 {
            dom.clear_children(root);
            let img = dom.append_element(root, Element::new("img"));
            dom.append_text(root, i.to_string());
            assert!(dom.contains(img));
        }
        assert_eq!(dom.node_count(), 3);
        assert!(dom.arena_len() <= 4);
    }

    #[test]
    fn test_declarations_replace_in_place() {
        let mut decls = Declarations::from_pairs([("color", "red"), ("margin", "0")]);
        decls.set("color", "blue");
        assert_eq!(decls.to_css(), "color: blue; margin: 0");
    }
}
