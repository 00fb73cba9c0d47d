//! Minimal CSS selector parser and matcher.
//!
//! Covers what edit operations target in practice: comma-separated lists of
//! compound selectors (`*`, type, `#id`, `.class`, attribute selectors)
//! joined by descendant or child (`>`) combinators. Pseudo-classes and
//! sibling combinators are rejected with [`SelectorError::Unsupported`];
//! callers treat any error as "matches nothing".

use crate::dom::{Document, NodeId};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectorError {
    #[error("empty selector")]
    Empty,

    #[error("unsupported selector syntax at '{0}'")]
    Unsupported(String),

    #[error("malformed selector: {0}")]
    Malformed(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
    Descendant,
    Child,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttrOp {
    Exists,
    Equals,
    Includes,
    DashMatch,
    Prefix,
    Suffix,
    Substring,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct AttrSelector {
    name: String,
    op: AttrOp,
    value: String,
}

impl AttrSelector {
    fn matches(&self, actual: &str) -> bool {
        match self.op {
            AttrOp::Exists => true,
            AttrOp::Equals => actual == self.value,
            AttrOp::Includes => actual.split_ascii_whitespace().any(|t| t == self.value),
            AttrOp::DashMatch => {
                actual == self.value
                    || actual
                        .strip_prefix(self.value.as_str())
                        .is_some_and(|rest| rest.starts_with('-'))
            }
            AttrOp::Prefix => !self.value.is_empty() && actual.starts_with(&self.value),
            AttrOp::Suffix => !self.value.is_empty() && actual.ends_with(&self.value),
            AttrOp::Substring => !self.value.is_empty() && actual.contains(&self.value),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Compound {
    tag: Option<String>,
    ids: Vec<String>,
    classes: Vec<String>,
    attrs: Vec<AttrSelector>,
}

impl Compound {
    fn is_empty(&self) -> bool {
        self.tag.is_none() && self.ids.is_empty() && self.classes.is_empty() && self.attrs.is_empty()
    }

    fn matches(&self, doc: &Document, node: NodeId) -> bool {
        let Some(tag) = doc.tag_name(node) else {
            return false;
        };
        if let Some(want) = &self.tag {
            if want != "*" && !want.eq_ignore_ascii_case(tag) {
                return false;
            }
        }
        if !self.ids.is_empty() {
            let Some(id) = doc.attr(node, "id") else {
                return false;
            };
            if self.ids.iter().any(|want| want != id) {
                return false;
            }
        }
        if !self.classes.is_empty() {
            let classes = doc.classes(node);
            if !self.classes.iter().all(|want| classes.contains(&want.as_str())) {
                return false;
            }
        }
        self.attrs.iter().all(|a| match doc.attr(node, &a.name) {
            Some(actual) => a.matches(actual),
            None => false,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ComplexSelector {
    compounds: Vec<Compound>,
    /// `combinators[i]` joins `compounds[i]` and `compounds[i + 1]`.
    combinators: Vec<Combinator>,
}

impl ComplexSelector {
    fn matches(&self, doc: &Document, node: NodeId) -> bool {
        self.match_at(doc, node, self.compounds.len() - 1)
    }

    fn match_at(&self, doc: &Document, node: NodeId, index: usize) -> bool {
        if !self.compounds[index].matches(doc, node) {
            return false;
        }
        if index == 0 {
            return true;
        }
        match self.combinators[index - 1] {
            Combinator::Child => doc
                .parent(node)
                .is_some_and(|parent| self.match_at(doc, parent, index - 1)),
            Combinator::Descendant => doc
                .ancestors(node)
                .any(|ancestor| self.match_at(doc, ancestor, index - 1)),
        }
    }
}

/// A parsed, comma-separated selector list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorList {
    selectors: Vec<ComplexSelector>,
}

impl SelectorList {
    pub fn parse(input: &str) -> Result<Self, SelectorError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(SelectorError::Empty);
        }
        let selectors = split_top_level_commas(input)
            .into_iter()
            .map(parse_complex)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { selectors })
    }

    /// Does `node` match any selector in the list?
    pub fn matches(&self, doc: &Document, node: NodeId) -> bool {
        self.selectors.iter().any(|s| s.matches(doc, node))
    }

    /// Descendants of `scope` (not `scope` itself) matching the list, in
    /// document order. Ancestors outside `scope` still count for
    /// combinators, like `Element.querySelectorAll`.
    pub fn query_all(&self, doc: &Document, scope: NodeId) -> Vec<NodeId> {
        doc.descendants(scope)
            .filter(|&n| self.matches(doc, n))
            .collect()
    }
}

/// Parse and query in one step; an invalid selector matches nothing.
pub fn select(doc: &Document, scope: NodeId, selector: &str) -> Vec<NodeId> {
    match SelectorList::parse(selector) {
        Ok(list) => list.query_all(doc, scope),
        Err(e) => {
            tracing::debug!(selector, error = %e, "Selector rejected");
            Vec::new()
        }
    }
}

fn split_top_level_commas(input: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (i, c) in input.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '[') => depth += 1,
            (None, ']') => depth = depth.saturating_sub(1),
            (None, ',') if depth == 0 => {
                parts.push(&input[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&input[start..]);
    parts
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_' || c == '\\' || !c.is_ascii()
}

fn parse_complex(input: &str) -> Result<ComplexSelector, SelectorError> {
    let chars: Vec<char> = input.trim().chars().collect();
    if chars.is_empty() {
        return Err(SelectorError::Empty);
    }

    let mut compounds = Vec::new();
    let mut combinators = Vec::new();
    let mut current = Compound::default();
    let mut pending: Option<Combinator> = None;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() || c == '>' {
            if !current.is_empty() {
                compounds.push(std::mem::take(&mut current));
                pending = Some(Combinator::Descendant);
            }
            if c == '>' {
                if compounds.is_empty() || pending.is_none() {
                    return Err(SelectorError::Malformed("combinator without left operand"));
                }
                if pending == Some(Combinator::Child) {
                    return Err(SelectorError::Malformed("doubled child combinator"));
                }
                pending = Some(Combinator::Child);
            }
            i += 1;
            continue;
        }

        if current.is_empty() {
            if let Some(comb) = pending.take() {
                combinators.push(comb);
            }
        }

        match c {
            '*' => {
                if current.tag.is_some() || !current.is_empty() {
                    return Err(SelectorError::Malformed("misplaced universal selector"));
                }
                current.tag = Some("*".to_string());
                i += 1;
            }
            '#' | '.' => {
                let (ident, next) = read_ident(&chars, i + 1);
                if ident.is_empty() {
                    return Err(SelectorError::Malformed("missing name after # or ."));
                }
                if c == '#' {
                    current.ids.push(ident);
                } else {
                    current.classes.push(ident);
                }
                i = next;
            }
            '[' => {
                let (attr, next) = read_attr(&chars, i + 1)?;
                current.attrs.push(attr);
                i = next;
            }
            c if is_ident_char(c) => {
                if !current.is_empty() {
                    return Err(SelectorError::Malformed("type selector must come first"));
                }
                let (ident, next) = read_ident(&chars, i);
                current.tag = Some(ident.to_ascii_lowercase());
                i = next;
            }
            _ => {
                let rest: String = chars[i..].iter().collect();
                return Err(SelectorError::Unsupported(rest));
            }
        }
    }

    if current.is_empty() {
        return Err(SelectorError::Malformed("dangling combinator"));
    }
    compounds.push(current);

    Ok(ComplexSelector {
        compounds,
        combinators,
    })
}

fn read_ident(chars: &[char], mut i: usize) -> (String, usize) {
    let mut out = String::new();
    while i < chars.len() && is_ident_char(chars[i]) {
        if chars[i] == '\\' && i + 1 < chars.len() {
            out.push(chars[i + 1]);
            i += 2;
            continue;
        }
        out.push(chars[i]);
        i += 1;
    }
    (out, i)
}

fn read_attr(chars: &[char], mut i: usize) -> Result<(AttrSelector, usize), SelectorError> {
    let skip_ws = |i: &mut usize| {
        while *i < chars.len() && chars[*i].is_whitespace() {
            *i += 1;
        }
    };

    skip_ws(&mut i);
    let (name, next) = read_ident(chars, i);
    if name.is_empty() {
        return Err(SelectorError::Malformed("missing attribute name"));
    }
    i = next;
    skip_ws(&mut i);

    let op = match chars.get(i) {
        Some(']') => {
            return Ok((
                AttrSelector {
                    name: name.to_ascii_lowercase(),
                    op: AttrOp::Exists,
                    value: String::new(),
                },
                i + 1,
            ));
        }
        Some('=') => {
            i += 1;
            AttrOp::Equals
        }
        Some(&m) if chars.get(i + 1) == Some(&'=') => {
            i += 2;
            match m {
                '~' => AttrOp::Includes,
                '|' => AttrOp::DashMatch,
                '^' => AttrOp::Prefix,
                '$' => AttrOp::Suffix,
                '*' => AttrOp::Substring,
                _ => return Err(SelectorError::Malformed("unknown attribute operator")),
            }
        }
        _ => return Err(SelectorError::Malformed("unterminated attribute selector")),
    };

    skip_ws(&mut i);
    let value = match chars.get(i) {
        Some(&q) if q == '"' || q == '\'' => {
            let start = i + 1;
            let end = chars[start..]
                .iter()
                .position(|&c| c == q)
                .map(|p| start + p)
                .ok_or(SelectorError::Malformed("unterminated quoted value"))?;
            i = end + 1;
            chars[start..end].iter().collect()
        }
        _ => {
            let (ident, next) = read_ident(chars, i);
            i = next;
            ident
        }
    };
    skip_ws(&mut i);
    if chars.get(i) != Some(&']') {
        return Err(SelectorError::Malformed("unterminated attribute selector"));
    }

    Ok((
        AttrSelector {
            name: name.to_ascii_lowercase(),
            op,
            value,
        },
        i + 1,
    ))
}
