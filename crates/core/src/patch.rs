//! Scoped, sanitizing patch engine.
//!
//! A [`PatchRequest`] carries a page, its stylesheet and a batch of
//! operations proposed by an untrusted generator. [`PatchEngine::apply`]
//! runs them in order against one parsed [`Document`] and reports what
//! changed. Individual operations never fail the batch: anything malformed
//! or out of policy is skipped and logged at `debug`. The only hard failure
//! is a page that cannot be parsed at all, which surfaces before any
//! mutation.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::css::upsert_rule;
use crate::dom::{Document, NodeId, ParseError};
use crate::error::CoreError;
use crate::sanitize::{clean_fragment, is_event_handler_attr, is_script_url, is_url_attr};
use crate::scope::{compute_roots, ProtectedSet, DEFAULT_PROTECTED_SELECTORS};
use crate::selector::SelectorList;

/// Default operation budget when none is configured.
pub const DEFAULT_MAX_OPS: i64 = 40;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// One batch of edits against a page and its stylesheet.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchRequest {
    pub html: String,
    #[serde(default)]
    pub css: String,
    /// Raw operations. Each is decoded on its own so one malformed entry
    /// cannot reject the whole request.
    #[serde(default)]
    pub ops: Vec<Value>,
    #[serde(default)]
    pub root_selector: Option<String>,
    #[serde(default)]
    pub protected_selectors: Vec<String>,
    /// Maximum number of mutated nodes. Zero or negative is unbounded.
    #[serde(default)]
    pub max_ops: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchResult {
    pub html: String,
    pub css: String,
    pub changed_count: usize,
    pub applied_log: Vec<AppliedEntry>,
}

/// Compact record of one mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedEntry {
    pub op: String,
    pub selector: String,
    /// Short description of the mutated node (`section#a.card`), or the CSS
    /// selector for style upserts.
    pub target: String,
}

/// A class list given either as one whitespace-separated string or as an
/// array of strings.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ClassList {
    One(String),
    Many(Vec<String>),
}

impl ClassList {
    pub fn tokens(&self) -> Vec<&str> {
        match self {
            Self::One(s) => s.split_whitespace().collect(),
            Self::Many(items) => items.iter().flat_map(|s| s.split_whitespace()).collect(),
        }
    }
}

/// A decoded edit operation.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    ReplaceText {
        selector: String,
        text: String,
    },
    AppendHtml {
        selector: String,
        html: String,
    },
    ReplaceHtml {
        selector: String,
        html: String,
    },
    SetAttr {
        selector: String,
        #[serde(alias = "name")]
        attr: String,
        value: String,
    },
    AddClass {
        selector: String,
        classes: ClassList,
    },
    RemoveClass {
        selector: String,
        classes: ClassList,
    },
    UpsertStyle(StyleUpsert),
    #[serde(other)]
    Unknown,
}

/// Target and declarations of an `upsert_style` operation.
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "StyleUpsertFields")]
pub struct StyleUpsert {
    pub selector: String,
    pub rules: String,
}

/// Accepted spellings. `cssSelector` and `styleRules` win when an
/// operation carries more than one.
#[derive(Deserialize)]
struct StyleUpsertFields {
    #[serde(rename = "cssSelector")]
    css_selector: Option<String>,
    selector: Option<String>,
    #[serde(rename = "styleRules")]
    style_rules: Option<String>,
    rules: Option<String>,
    css: Option<String>,
}

impl TryFrom<StyleUpsertFields> for StyleUpsert {
    type Error = &'static str;

    fn try_from(fields: StyleUpsertFields) -> Result<Self, Self::Error> {
        let selector = fields.css_selector.or(fields.selector).ok_or("missing cssSelector")?;
        let rules = fields
            .style_rules
            .or(fields.rules)
            .or(fields.css)
            .ok_or("missing styleRules")?;
        Ok(Self { selector, rules })
    }
}

impl Operation {
    /// Decode one raw operation. `None` when the kind is missing or a
    /// field has the wrong type.
    pub fn from_value(raw: &Value) -> Option<Self> {
        Self::deserialize(raw).ok()
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::ReplaceText { .. } => "replace_text",
            Self::AppendHtml { .. } => "append_html",
            Self::ReplaceHtml { .. } => "replace_html",
            Self::SetAttr { .. } => "set_attr",
            Self::AddClass { .. } => "add_class",
            Self::RemoveClass { .. } => "remove_class",
            Self::UpsertStyle(_) => "upsert_style",
            Self::Unknown => "unknown",
        }
    }

    pub fn selector(&self) -> &str {
        match self {
            Self::ReplaceText { selector, .. }
            | Self::AppendHtml { selector, .. }
            | Self::ReplaceHtml { selector, .. }
            | Self::SetAttr { selector, .. }
            | Self::AddClass { selector, .. }
            | Self::RemoveClass { selector, .. } => selector,
            Self::UpsertStyle(style) => &style.selector,
            Self::Unknown => "",
        }
    }

    /// Operations that throw away the target's existing children.
    fn discards_children(&self) -> bool {
        matches!(self, Self::ReplaceText { .. } | Self::ReplaceHtml { .. })
    }
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Deployment-level defaults applied to patches the pipeline builds.
///
/// | Variable              | Default | Meaning                                  |
/// |-----------------------|---------|------------------------------------------|
/// | `PATCH_MAX_OPS`       | `40`    | Node budget per patch (`<= 0` unbounded) |
/// | `PATCH_ROOT_SELECTOR` | unset   | Root selector when the output has none   |
/// | `PROTECTED_SELECTORS` | empty   | Comma list added to the built-in set     |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchSettings {
    pub max_ops: i64,
    pub root_selector: Option<String>,
    pub protected_selectors: Vec<String>,
}

impl Default for PatchSettings {
    fn default() -> Self {
        Self {
            max_ops: DEFAULT_MAX_OPS,
            root_selector: None,
            protected_selectors: Vec::new(),
        }
    }
}

impl PatchSettings {
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, CoreError> {
        let max_ops = match lookup("PATCH_MAX_OPS") {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| CoreError::Validation(format!("PATCH_MAX_OPS is not an integer: {raw}")))?,
            None => DEFAULT_MAX_OPS,
        };
        let root_selector = lookup("PATCH_ROOT_SELECTOR")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        // Selectors may contain commas themselves; entries are split on `;`
        // when present, otherwise on `,`.
        let protected_selectors = lookup("PROTECTED_SELECTORS")
            .map(|raw| {
                let sep = if raw.contains(';') { ';' } else { ',' };
                raw.split(sep)
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();
        Ok(Self {
            max_ops,
            root_selector,
            protected_selectors,
        })
    }

    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a request for `html`/`css`, preferring `root_selector` over
    /// the configured one.
    pub fn request(
        &self,
        html: impl Into<String>,
        css: impl Into<String>,
        ops: Vec<Value>,
        root_selector: Option<String>,
    ) -> PatchRequest {
        PatchRequest {
            html: html.into(),
            css: css.into(),
            ops,
            root_selector: root_selector.or_else(|| self.root_selector.clone()),
            protected_selectors: self.protected_selectors.clone(),
            max_ops: self.max_ops,
        }
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Applies [`PatchRequest`]s. Holds the protected selectors every request
/// gets on top of its own.
#[derive(Debug, Clone)]
pub struct PatchEngine {
    default_protected: Vec<String>,
}

impl Default for PatchEngine {
    fn default() -> Self {
        Self::new(DEFAULT_PROTECTED_SELECTORS.iter().map(|s| s.to_string()).collect())
    }
}

impl PatchEngine {
    pub fn new(default_protected: Vec<String>) -> Self {
        Self { default_protected }
    }

    pub fn apply(&self, request: &PatchRequest) -> Result<PatchResult, ParseError> {
        let mut doc = Document::parse(&request.html)?;
        let mut css = request.css.clone();

        let roots = compute_roots(&doc, request.root_selector.as_deref());
        let protected = ProtectedSet::compute(
            &doc,
            self.default_protected
                .iter()
                .chain(&request.protected_selectors)
                .map(String::as_str),
        );
        let budget = Budget(request.max_ops);

        let mut changed = 0usize;
        let mut applied_log = Vec::new();

        for (index, raw) in request.ops.iter().enumerate() {
            if budget.exhausted(changed) {
                tracing::debug!(index, changed, "Operation budget reached, stopping");
                break;
            }
            let Some(op) = Operation::from_value(raw) else {
                skip(index, "malformed operation");
                continue;
            };
            if matches!(op, Operation::Unknown) {
                skip(index, "unknown operation kind");
                continue;
            }
            let selector = op.selector().trim();
            if selector.is_empty() {
                skip(index, "empty selector");
                continue;
            }

            if let Operation::UpsertStyle(style) = &op {
                let next = upsert_rule(&css, selector, &style.rules);
                if next == css {
                    skip(index, "stylesheet unchanged");
                } else {
                    css = next;
                    changed += 1;
                    applied_log.push(AppliedEntry {
                        op: op.kind().to_string(),
                        selector: selector.to_string(),
                        target: selector.to_string(),
                    });
                }
                continue;
            }

            let list = match SelectorList::parse(selector) {
                Ok(list) => list,
                Err(e) => {
                    tracing::debug!(index, selector, error = %e, "Skipping operation: bad selector");
                    continue;
                }
            };

            // Fragments are sanitized once per operation, then imported into
            // every candidate.
            let fragment = match &op {
                Operation::AppendHtml { html, .. } | Operation::ReplaceHtml { html, .. } => {
                    match clean_fragment(html) {
                        Ok(fragment) => Some(fragment),
                        Err(e) => {
                            tracing::debug!(index, error = %e, "Skipping operation: bad fragment");
                            continue;
                        }
                    }
                }
                _ => None,
            };

            for candidate in candidates(&doc, &roots, &list) {
                if budget.exhausted(changed) {
                    break;
                }
                if !doc.is_attached(candidate) || protected.is_protected(&doc, candidate) {
                    continue;
                }
                if matches!(op, Operation::ReplaceHtml { .. }) && roots.contains(&candidate) {
                    continue;
                }
                if op.discards_children() && protected.intersects_subtree(&doc, candidate) {
                    continue;
                }
                if mutate(&mut doc, candidate, &op, fragment.as_ref()) {
                    changed += 1;
                    applied_log.push(AppliedEntry {
                        op: op.kind().to_string(),
                        selector: selector.to_string(),
                        target: doc.describe(candidate),
                    });
                }
            }
        }

        tracing::debug!(
            ops = request.ops.len(),
            changed,
            roots = roots.len(),
            protected = protected.len(),
            "Patch applied"
        );

        Ok(PatchResult {
            html: doc.to_html(),
            css,
            changed_count: changed,
            applied_log,
        })
    }
}

/// Apply `request` with the built-in protected selectors.
pub fn apply(request: &PatchRequest) -> Result<PatchResult, ParseError> {
    PatchEngine::default().apply(request)
}

// ---- private helpers ----

#[derive(Clone, Copy)]
struct Budget(i64);

impl Budget {
    fn exhausted(self, changed: usize) -> bool {
        self.0 > 0 && i64::try_from(changed).map_or(true, |c| c >= self.0)
    }
}

fn skip(index: usize, reason: &'static str) {
    tracing::debug!(index, reason, "Skipping operation");
}

/// Matches of `list` under every root, in root order then document order,
/// with structurally identical nodes kept once.
fn candidates(doc: &Document, roots: &[NodeId], list: &SelectorList) -> Vec<NodeId> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for &root in roots {
        for node in list.query_all(doc, root) {
            if seen.insert(doc.structural_key(node)) {
                out.push(node);
            }
        }
    }
    out
}

/// Apply `op` to `node`. Returns whether the node actually changed.
fn mutate(doc: &mut Document, node: NodeId, op: &Operation, fragment: Option<&Document>) -> bool {
    match op {
        Operation::ReplaceText { text, .. } => {
            doc.set_text_content(node, text);
            true
        }
        Operation::AppendHtml { .. } => {
            let Some(fragment) = fragment else {
                return false;
            };
            if fragment.children(fragment.root()).is_empty() {
                return false;
            }
            doc.import_children(node, fragment, fragment.root());
            true
        }
        Operation::ReplaceHtml { .. } => {
            let Some(fragment) = fragment else {
                return false;
            };
            doc.clear_children(node);
            doc.import_children(node, fragment, fragment.root());
            true
        }
        Operation::SetAttr { attr, value, .. } => {
            let attr = attr.trim();
            if !is_allowed_attr_name(attr) || (is_url_attr(attr) && is_script_url(value)) {
                return false;
            }
            doc.set_attr(node, attr, value);
            true
        }
        Operation::AddClass { classes, .. } => {
            let tokens = classes.tokens();
            let current: Vec<String> = doc.classes(node).into_iter().map(String::from).collect();
            let mut next = dedup(current.iter().map(String::as_str));
            for token in tokens {
                if !next.iter().any(|c| c == token) {
                    next.push(token.to_string());
                }
            }
            write_classes(doc, node, &current, next)
        }
        Operation::RemoveClass { classes, .. } => {
            let tokens = classes.tokens();
            if tokens.is_empty() {
                return false;
            }
            let current: Vec<String> = doc.classes(node).into_iter().map(String::from).collect();
            let next: Vec<String> = dedup(current.iter().map(String::as_str))
                .into_iter()
                .filter(|c| !tokens.contains(&c.as_str()))
                .collect();
            write_classes(doc, node, &current, next)
        }
        Operation::UpsertStyle(_) | Operation::Unknown => false,
    }
}

fn dedup<'a>(tokens: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for token in tokens {
        if !out.iter().any(|c| c == token) {
            out.push(token.to_string());
        }
    }
    out
}

/// Write `next` as the class attribute when its token set differs from
/// `current`. An emptied list removes the attribute.
fn write_classes(doc: &mut Document, node: NodeId, current: &[String], next: Vec<String>) -> bool {
    let before: HashSet<&str> = current.iter().map(String::as_str).collect();
    let after: HashSet<&str> = next.iter().map(String::as_str).collect();
    if before == after {
        return false;
    }
    if next.is_empty() {
        doc.remove_attr(node, "class");
    } else {
        doc.set_attr(node, "class", &next.join(" "));
    }
    true
}

/// Attribute names a generated operation may set.
fn is_allowed_attr_name(name: &str) -> bool {
    !name.is_empty()
        && !is_event_handler_attr(name)
        && name
            .chars()
            .all(|c| !c.is_whitespace() && !c.is_control() && !matches!(c, '"' | '\'' | '>' | '<' | '/' | '='))
}
