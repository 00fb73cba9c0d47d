use super::{is_raw_text_element, is_void_element, Document, NodeId, NodeKind};

/// Serialize `id`. With `include_self` false only the children are
/// written (the document root is never written itself).
pub(super) fn serialize(doc: &Document, id: NodeId, include_self: bool) -> String {
    let mut out = String::new();
    if include_self {
        write_node(doc, id, None, &mut out);
    } else {
        let raw = doc.tag_name(id).filter(|name| is_raw_text_element(name));
        for &child in doc.children(id) {
            write_node(doc, child, raw, &mut out);
        }
    }
    out
}

/// `Open` carries the name of the enclosing raw-text element, if any.
enum Step<'a> {
    Open(NodeId, Option<&'a str>),
    Close(NodeId),
}

fn write_node<'a>(doc: &'a Document, id: NodeId, raw_parent: Option<&'a str>, out: &mut String) {
    // Explicit stack: depth is bounded by the parser, but imported and
    // mutated trees go through here too.
    let mut stack = vec![Step::Open(id, raw_parent)];

    while let Some(step) = stack.pop() {
        match step {
            Step::Close(node) => {
                if let Some(name) = doc.tag_name(node) {
                    out.push_str("</");
                    out.push_str(name);
                    out.push('>');
                }
            }
            Step::Open(node, raw) => match doc.kind(node) {
                NodeKind::Document => {
                    for &child in doc.children(node).iter().rev() {
                        stack.push(Step::Open(child, None));
                    }
                }
                NodeKind::Doctype(text) => {
                    out.push_str("<!");
                    out.push_str(text);
                    out.push('>');
                }
                NodeKind::Comment(text) => {
                    if comment_is_inert(text) {
                        out.push_str("<!--");
                        out.push_str(text);
                        out.push_str("-->");
                    }
                }
                NodeKind::Text(text) => match raw {
                    Some(parent) if !closes_raw_text(text, parent) => out.push_str(text),
                    _ => escape_text(text, out),
                },
                NodeKind::Element(data) => {
                    out.push('<');
                    out.push_str(&data.name);
                    for (name, value) in &data.attributes {
                        out.push(' ');
                        out.push_str(name);
                        if let Some(value) = value {
                            out.push_str("=\"");
                            escape_attr(value, out);
                            out.push('"');
                        }
                    }
                    out.push('>');
                    if is_void_element(&data.name) {
                        continue;
                    }
                    stack.push(Step::Close(node));
                    let raw_children = is_raw_text_element(&data.name).then_some(data.name.as_str());
                    for &child in doc.children(node).iter().rev() {
                        stack.push(Step::Open(child, raw_children));
                    }
                }
            },
        }
    }
}

/// A comment is written only if reparsing yields the same single comment.
fn comment_is_inert(text: &str) -> bool {
    !(text.starts_with('>') || text.starts_with("->") || text.contains("--") || text.ends_with('-'))
}

/// True when `text` contains an end tag for `parent` and so cannot be
/// written verbatim inside it.
fn closes_raw_text(text: &str, parent: &str) -> bool {
    let needle = format!("</{}", parent.to_ascii_lowercase());
    text.to_ascii_lowercase().contains(&needle)
}

fn escape_text(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            _ => out.push(c),
        }
    }
}

fn escape_attr(value: &str, out: &mut String) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            _ => out.push(c),
        }
    }
}
