//! Arena-backed HTML document model.
//!
//! A [`Document`] owns every node in a flat `Vec`; nodes refer to each
//! other by [`NodeId`]. Ids are only meaningful for the document that
//! produced them and do not survive serialization. Code that needs an
//! identity that is comparable across mutations uses [`NodeKey`], which is
//! derived from the node's current position and attributes every time it
//! is asked for.
//!
//! Detaching a node (e.g. when its parent's children are replaced) leaves
//! it in the arena with no parent. [`Document::is_attached`] tells the two
//! apart.

mod parser;
mod serialize;

pub use parser::{ParseError, MAX_NESTING_DEPTH};

/// Index of a node inside its owning [`Document`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// Tag name plus ordered attributes. Names are stored lowercase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementData {
    pub name: String,
    pub attributes: Vec<(String, Option<String>)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Document,
    Doctype(String),
    Element(ElementData),
    Text(String),
    Comment(String),
}

#[derive(Debug, Clone)]
struct NodeData {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    kind: NodeKind,
}

/// Structural identity of a node: child-index path from the document root
/// plus tag, id and class. Recomputed on demand, never cached.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeKey {
    pub path: Vec<usize>,
    pub tag: String,
    pub id: String,
    pub class: String,
}

/// Elements that never have children or an end tag.
pub(crate) fn is_void_element(name: &str) -> bool {
    matches!(
        name,
        "area"
            | "base"
            | "br"
            | "col"
            | "embed"
            | "hr"
            | "img"
            | "input"
            | "link"
            | "meta"
            | "param"
            | "source"
            | "track"
            | "wbr"
    )
}

/// Elements whose text content is emitted without entity escaping.
pub(crate) fn is_raw_text_element(name: &str) -> bool {
    matches!(
        name,
        "script" | "style" | "xmp" | "iframe" | "noembed" | "noframes" | "noscript" | "plaintext"
    )
}

/// Elements whose content is text up to the matching end tag, with
/// entities decoded (RCDATA).
pub(crate) fn is_rcdata_element(name: &str) -> bool {
    matches!(name, "textarea" | "title")
}

#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<NodeData>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// An empty document holding only the root node.
    pub fn new() -> Self {
        Self {
            nodes: vec![NodeData {
                parent: None,
                children: Vec::new(),
                kind: NodeKind::Document,
            }],
        }
    }

    /// Parse a complete page. Fails only when the input has no element
    /// content at all or nests deeper than [`MAX_NESTING_DEPTH`].
    pub fn parse(html: &str) -> Result<Self, ParseError> {
        let doc = parser::parse(html)?;
        if !doc.descendants(doc.root()).any(|id| doc.element(id).is_some()) {
            return Err(ParseError::Empty);
        }
        Ok(doc)
    }

    /// Parse an HTML fragment. An empty fragment yields an empty document.
    pub fn parse_fragment(html: &str) -> Result<Self, ParseError> {
        parser::parse(html)
    }

    /// Serialize back to HTML. Structure round-trips; formatting may not.
    pub fn to_html(&self) -> String {
        serialize::serialize(self, self.root(), false)
    }

    /// Serialize only the children of `id`.
    pub fn inner_html(&self, id: NodeId) -> String {
        serialize::serialize(self, id, false)
    }

    /// Serialize `id` itself, including its own tag.
    pub fn outer_html(&self, id: NodeId) -> String {
        serialize::serialize(self, id, true)
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.0].kind
    }

    pub fn element(&self, id: NodeId) -> Option<&ElementData> {
        match &self.nodes[id.0].kind {
            NodeKind::Element(data) => Some(data),
            _ => None,
        }
    }

    pub fn tag_name(&self, id: NodeId) -> Option<&str> {
        self.element(id).map(|e| e.name.as_str())
    }

    /// Attribute lookup, case-insensitive on the name. A bare attribute
    /// (`<input disabled>`) reads as the empty string.
    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.element(id)?
            .attributes
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_deref().unwrap_or(""))
    }

    /// Whitespace-separated tokens of the `class` attribute.
    pub fn classes(&self, id: NodeId) -> Vec<&str> {
        self.attr(id, "class")
            .map(|c| c.split_ascii_whitespace().collect())
            .unwrap_or_default()
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    /// Ancestors of `id`, nearest first, excluding `id` itself.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(id), move |&n| self.parent(n))
    }

    /// Pre-order descendants of `id`, excluding `id` itself.
    pub fn descendants(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        std::iter::from_fn(move || {
            let next = stack.pop()?;
            stack.extend(self.children(next).iter().rev().copied());
            Some(next)
        })
    }

    /// True when `node` is `ancestor` or lies inside it.
    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        node == ancestor || self.ancestors(node).any(|a| a == ancestor)
    }

    /// True when `id` is still reachable from the document root.
    pub fn is_attached(&self, id: NodeId) -> bool {
        id == self.root() || self.ancestors(id).any(|a| a == self.root())
    }

    /// First element with the given tag name, in document order.
    pub fn find_element(&self, name: &str) -> Option<NodeId> {
        self.descendants(self.root())
            .find(|&id| self.tag_name(id).is_some_and(|t| t.eq_ignore_ascii_case(name)))
    }

    /// Concatenated text of all descendant text nodes.
    pub fn text_content(&self, id: NodeId) -> String {
        self.descendants(id)
            .filter_map(|n| match self.kind(n) {
                NodeKind::Text(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Compute the structural key of `id` from its current state.
    pub fn structural_key(&self, id: NodeId) -> NodeKey {
        let mut path = Vec::new();
        let mut current = id;
        while let Some(parent) = self.parent(current) {
            let index = self
                .children(parent)
                .iter()
                .position(|&c| c == current)
                .unwrap_or_default();
            path.push(index);
            current = parent;
        }
        path.reverse();

        NodeKey {
            path,
            tag: self.tag_name(id).unwrap_or_default().to_string(),
            id: self.attr(id, "id").unwrap_or_default().to_string(),
            class: self.attr(id, "class").unwrap_or_default().to_string(),
        }
    }

    /// Short human-readable label, e.g. `p#intro.lead`.
    pub fn describe(&self, id: NodeId) -> String {
        let Some(tag) = self.tag_name(id) else {
            return "#text".to_string();
        };
        let mut label = tag.to_string();
        if let Some(el_id) = self.attr(id, "id").filter(|v| !v.is_empty()) {
            label.push('#');
            label.push_str(el_id);
        }
        for class in self.classes(id) {
            label.push('.');
            label.push_str(class);
        }
        label
    }

    // ---- mutation ----

    fn push(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(NodeData {
            parent: None,
            children: Vec::new(),
            kind,
        });
        id
    }

    /// Create a detached element. Names are lowercased.
    pub fn create_element(
        &mut self,
        name: &str,
        attributes: Vec<(String, Option<String>)>,
    ) -> NodeId {
        self.push(NodeKind::Element(ElementData {
            name: name.to_ascii_lowercase(),
            attributes,
        }))
    }

    pub fn create_text(&mut self, text: impl Into<String>) -> NodeId {
        self.push(NodeKind::Text(text.into()))
    }

    pub(crate) fn create_node(&mut self, kind: NodeKind) -> NodeId {
        self.push(kind)
    }

    /// Append `child` as the last child of `parent`, detaching it from any
    /// previous parent first.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
    }

    /// Remove `id` from its parent. The node stays in the arena.
    pub fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id.0].parent.take() {
            self.nodes[parent.0].children.retain(|&c| c != id);
        }
    }

    /// Detach every child of `id`.
    pub fn clear_children(&mut self, id: NodeId) {
        let children = std::mem::take(&mut self.nodes[id.0].children);
        for child in children {
            self.nodes[child.0].parent = None;
        }
    }

    /// Replace all children of `id` with a single text node.
    pub fn set_text_content(&mut self, id: NodeId, text: &str) {
        self.clear_children(id);
        if !text.is_empty() {
            let node = self.create_text(text);
            self.append_child(id, node);
        }
    }

    /// Set or overwrite an attribute. No-op on non-elements.
    pub fn set_attr(&mut self, id: NodeId, name: &str, value: &str) {
        let name = name.to_ascii_lowercase();
        if let NodeKind::Element(data) = &mut self.nodes[id.0].kind {
            match data.attributes.iter_mut().find(|(k, _)| *k == name) {
                Some((_, v)) => *v = Some(value.to_string()),
                None => data.attributes.push((name, Some(value.to_string()))),
            }
        }
    }

    pub fn remove_attr(&mut self, id: NodeId, name: &str) {
        if let NodeKind::Element(data) = &mut self.nodes[id.0].kind {
            data.attributes.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        }
    }

    /// Keep only the attributes for which `keep` returns true.
    pub fn retain_attrs(&mut self, id: NodeId, mut keep: impl FnMut(&str, Option<&str>) -> bool) {
        if let NodeKind::Element(data) = &mut self.nodes[id.0].kind {
            data.attributes.retain(|(k, v)| keep(k, v.as_deref()));
        }
    }

    /// Deep-copy the children of `source_parent` in `source` and append the
    /// copies to `parent` in this document.
    pub fn import_children(&mut self, parent: NodeId, source: &Document, source_parent: NodeId) {
        let mut work: Vec<(NodeId, NodeId)> = source
            .children(source_parent)
            .iter()
            .rev()
            .map(|&c| (c, parent))
            .collect();

        while let Some((src, dest_parent)) = work.pop() {
            let copy = self.push(source.kind(src).clone());
            self.append_child(dest_parent, copy);
            work.extend(source.children(src).iter().rev().map(|&c| (c, copy)));
        }
    }
}
