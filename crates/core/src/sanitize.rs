//! HTML fragment sanitizer.
//!
//! Every fragment an operation inserts passes through here first. Unsafe
//! elements are deleted together with their content, as are comments and
//! doctypes. Event-handler attributes are dropped, and URL attributes
//! carrying a `javascript:` scheme are dropped. Sanitizing
//! already-sanitized output is a no-op.

use crate::dom::{Document, NodeId, NodeKind, ParseError};

/// Elements removed outright, subtree included. The text-content elements
/// are here because a browser reparses their content differently.
const BLOCKED_ELEMENTS: &[&str] = &[
    "script", "iframe", "object", "embed", "style", "meta", "frame", "frameset", "base",
    "textarea", "title", "noscript", "noembed", "noframes", "xmp", "plaintext",
];

/// Attributes that carry a URL and are checked for a script scheme.
const URL_ATTRIBUTES: &[&str] = &["href", "src", "action", "formaction", "xlink:href"];

/// `on*` attribute names (case-insensitive) are event handlers.
pub fn is_event_handler_attr(name: &str) -> bool {
    name.get(..2).is_some_and(|prefix| prefix.eq_ignore_ascii_case("on"))
}

pub fn is_url_attr(name: &str) -> bool {
    URL_ATTRIBUTES.iter().any(|a| a.eq_ignore_ascii_case(name))
}

/// True when `value` starts with a `javascript:` scheme once leading
/// whitespace and control characters are ignored. Whitespace embedded in
/// the scheme (`java\tscript:`) is ignored too, as browsers do.
pub fn is_script_url(value: &str) -> bool {
    const SCHEME: &str = "javascript:";
    let mut expected = SCHEME.chars();
    let mut next = expected.next();
    for c in value.chars() {
        let Some(want) = next else {
            return true;
        };
        if c.is_whitespace() || c.is_control() {
            continue;
        }
        if c.to_ascii_lowercase() != want {
            return false;
        }
        next = expected.next();
    }
    next.is_none()
}

fn is_blocked_element(doc: &Document, id: NodeId) -> bool {
    let Some(name) = doc.tag_name(id) else {
        return false;
    };
    if BLOCKED_ELEMENTS.contains(&name) {
        return true;
    }
    name == "link"
        && doc
            .attr(id, "rel")
            .is_some_and(|rel| rel.split_ascii_whitespace().any(|t| t.eq_ignore_ascii_case("stylesheet")))
}

/// Remove unsafe constructs from every node under `scope`, in place.
pub fn sanitize_subtree(doc: &mut Document, scope: NodeId) {
    let nodes: Vec<NodeId> = doc.descendants(scope).collect();
    for id in nodes {
        // Children of an already-removed node are unreachable anyway.
        if !doc.contains(scope, id) {
            continue;
        }
        let markup = matches!(doc.kind(id), NodeKind::Comment(_) | NodeKind::Doctype(_));
        if markup || is_blocked_element(doc, id) {
            doc.detach(id);
            continue;
        }
        doc.retain_attrs(id, |name, value| {
            if is_event_handler_attr(name) {
                return false;
            }
            !(is_url_attr(name) && value.is_some_and(is_script_url))
        });
    }
}

/// Parse `html` as a fragment and sanitize it.
pub fn clean_fragment(html: &str) -> Result<Document, ParseError> {
    let mut fragment = Document::parse_fragment(html)?;
    let root = fragment.root();
    sanitize_subtree(&mut fragment, root);
    Ok(fragment)
}

/// Sanitize an HTML fragment and return the safe markup.
pub fn sanitize_fragment(html: &str) -> Result<String, ParseError> {
    Ok(clean_fragment(html)?.to_html())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clean(html: &str) -> String {
        sanitize_fragment(html).unwrap()
    }

    #[test]
    fn removes_blocked_elements_with_content() {
        assert_eq!(clean("<p>a</p><script>alert(1)</script><p>b</p>"), "<p>a</p><p>b</p>");
        assert_eq!(clean(r#"<div><iframe src="x"><b>in</b></iframe>ok</div>"#), "<div>ok</div>");
        assert_eq!(clean("<style>body{}</style><object></object><embed src=x>"), "");
        assert_eq!(clean(r#"<meta http-equiv="refresh" content="0">hi"#), "hi");
    }

    #[test]
    fn removes_only_stylesheet_links() {
        assert_eq!(
            clean(r#"<link rel="stylesheet" href="x.css"><link rel="icon" href="i.png">"#),
            r#"<link rel="icon" href="i.png">"#
        );
    }

    #[test]
    fn strips_event_handlers_case_insensitively() {
        assert_eq!(
            clean(r#"<img src="a.png" onerror="x()" OnLoad="y()" alt="a">"#),
            r#"<img src="a.png" alt="a">"#
        );
    }

    #[test]
    fn strips_script_urls() {
        assert_eq!(clean(r#"<a href="  JavaScript:alert(1)">x</a>"#), "<a>x</a>");
        assert_eq!(clean("<a href=\"java\tscript:alert(1)\">x</a>"), "<a>x</a>");
        assert_eq!(clean(r#"<img src="javascript:void(0)">"#), "<img>");
        assert_eq!(clean(r#"<a href="/javascript:docs">x</a>"#), r#"<a href="/javascript:docs">x</a>"#);
    }

    #[test]
    fn nested_blocked_element_is_removed() {
        assert_eq!(
            clean(r#"<section><div><script src="x.js"></script><span onclick="x">s</span></div></section>"#),
            "<section><div><span>s</span></div></section>"
        );
    }

    #[test]
    fn sanitize_is_idempotent() {
        let inputs = [
            r#"<div onclick="x"><script>1</script><a href="javascript:1">a</a></div>"#,
            "<p>plain &amp; simple</p>",
            "<iframe></iframe><ul><li>x<li>y</ul>",
        ];
        for input in inputs {
            let once = clean(input);
            assert_eq!(clean(&once), once, "input: {input}");
        }
    }

    #[test]
    fn script_url_detection() {
        assert!(is_script_url("javascript:x"));
        assert!(is_script_url("\n  JAVASCRIPT:x"));
        assert!(!is_script_url("https://example.com"));
        assert!(!is_script_url("javascript"));
        assert!(!is_script_url(""));
    }

    #[test]
    fn text_content_elements_are_removed() {
        let vectors = [
            r#"<textarea><p title="</textarea><img src=x onerror=alert(1)>"></p></textarea>"#,
            r#"<noscript><p title="</noscript><img src=x onerror=alert(1)>"></p></noscript>"#,
            r#"<title><b title="</title><img src=x onerror=alert(1)>">x</b></title>"#,
            r#"<xmp><p title="</xmp><img src=x onerror=alert(1)>"></p></xmp>"#,
            r#"<noembed></noembed><noframes></noframes><plaintext><b>x</b>"#,
        ];
        for input in vectors {
            let out = clean(input);
            assert!(!out.contains("onerror"), "input: {input}, output: {out}");
            assert!(!out.contains("<textarea") && !out.contains("<noscript") && !out.contains("<title"));
            assert_eq!(clean(&out), out);
        }
        assert_eq!(clean("<p>a</p><textarea>b</textarea>"), "<p>a</p>");
    }

    #[test]
    fn comments_are_removed() {
        assert_eq!(clean("<p>a<!-- note -->b</p>"), "<p>ab</p>");
        for input in [
            "<!-- --!><img src=x onerror=alert(1)> -->",
            "<!--><img src=x onerror=alert(1)>-->",
            "<!---><img src=x onerror=alert(1)>-->",
        ] {
            let out = clean(input);
            assert!(!out.contains("<!--"), "input: {input}, output: {out}");
            assert!(!out.contains("onerror"), "input: {input}, output: {out}");
        }
    }

    #[test]
    fn attribute_values_cannot_open_tags() {
        let out = clean(r#"<p title="</p><img src=x onerror=alert(1)>">t</p>"#);
        assert_eq!(out, r#"<p title="&lt;/p&gt;&lt;img src=x onerror=alert(1)&gt;">t</p>"#);
    }
}
