//! Scope roots and protected regions for one patch request.
//!
//! Roots decide where an operation may look for targets; the protected set
//! decides which nodes it may never touch. Both are resolved once, before
//! the first operation runs. Containment in a protected region is checked
//! fresh on every call by walking ancestors, because earlier operations can
//! move or detach nodes.

use std::collections::HashSet;

use crate::dom::{Document, NodeId};
use crate::selector::select;

/// Selectors protected on every request, regardless of caller input.
pub const DEFAULT_PROTECTED_SELECTORS: &[&str] = &[
    "head",
    "script",
    "link",
    "meta",
    "style",
    "nav",
    "[data-protect]",
];

/// Resolve the scope roots for `root_selector`, in document order.
///
/// An absent, empty, invalid or non-matching selector falls back to the
/// page's content container: `<body>` when present, else the document
/// itself.
pub fn compute_roots(doc: &Document, root_selector: Option<&str>) -> Vec<NodeId> {
    let selector = root_selector.map(str::trim).filter(|s| !s.is_empty());
    if let Some(selector) = selector {
        let mut seen = HashSet::new();
        let roots: Vec<NodeId> = select(doc, doc.root(), selector)
            .into_iter()
            .filter(|id| seen.insert(*id))
            .collect();
        if !roots.is_empty() {
            return roots;
        }
        tracing::debug!(selector, "Root selector matched nothing, using content container");
    }
    vec![content_container(doc)]
}

/// `<body>` if the page has one, otherwise the document root.
pub fn content_container(doc: &Document) -> NodeId {
    doc.find_element("body").unwrap_or_else(|| doc.root())
}

/// Nodes matched by the default protected selectors or any of `extra`.
#[derive(Debug, Clone, Default)]
pub struct ProtectedSet {
    nodes: HashSet<NodeId>,
}

impl ProtectedSet {
    /// Union of the nodes matched by every selector in `selectors`.
    /// Selectors that fail to parse contribute nothing.
    pub fn compute<'a>(doc: &Document, selectors: impl IntoIterator<Item = &'a str>) -> Self {
        let mut nodes = HashSet::new();
        for selector in selectors {
            nodes.extend(select(doc, doc.root(), selector));
        }
        Self { nodes }
    }

    /// [`DEFAULT_PROTECTED_SELECTORS`] plus `extra`.
    pub fn with_defaults(doc: &Document, extra: &[String]) -> Self {
        Self::compute(
            doc,
            DEFAULT_PROTECTED_SELECTORS
                .iter()
                .copied()
                .chain(extra.iter().map(String::as_str)),
        )
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// True iff `node` is a protected node or lies inside one.
    pub fn is_protected(&self, doc: &Document, node: NodeId) -> bool {
        self.nodes.contains(&node) || doc.ancestors(node).any(|a| self.nodes.contains(&a))
    }

    /// True iff any node in the subtree of `node` (itself included) is
    /// protected. Operations that discard children check this so they
    /// cannot wipe out a protected region from above.
    pub fn intersects_subtree(&self, doc: &Document, node: NodeId) -> bool {
        self.nodes.contains(&node) || doc.descendants(node).any(|d| self.nodes.contains(&d))
    }
}
