//! Idempotent CSS rule upsert on opaque stylesheet text.
//!
//! The stylesheet is never parsed as a whole. Only the first top-level
//! block for the requested selector is located and rewritten; every byte
//! outside that block is preserved.

use regex::Regex;

/// Ordered property -> value pairs of one declaration block.
pub type Declarations = Vec<(String, String)>;

/// Split `body` on `;`, then each declaration on its first `:`.
/// Declarations without a colon or with an empty property are dropped.
/// Property names are lowercased; a repeated property keeps its first
/// position and takes the last value.
pub fn parse_declarations(body: &str) -> Declarations {
    let mut out: Declarations = Vec::new();
    for decl in body.split(';') {
        let Some((name, value)) = decl.split_once(':') else {
            continue;
        };
        let name = name.trim().to_ascii_lowercase();
        if name.is_empty() {
            continue;
        }
        upsert_declaration(&mut out, name, value.trim().to_string());
    }
    out
}

fn upsert_declaration(decls: &mut Declarations, name: String, value: String) {
    match decls.iter_mut().find(|(n, _)| *n == name) {
        Some((_, v)) => *v = value,
        None => decls.push((name, value)),
    }
}

/// Merge `incoming` over `existing`: existing order first, new properties
/// appended in their incoming order.
pub fn merge_declarations(existing: &Declarations, incoming: &Declarations) -> Declarations {
    let mut merged = existing.clone();
    for (name, value) in incoming {
        upsert_declaration(&mut merged, name.clone(), value.clone());
    }
    merged
}

pub fn format_declarations(decls: &Declarations) -> String {
    decls
        .iter()
        .map(|(n, v)| format!("{n}: {v}"))
        .collect::<Vec<_>>()
        .join("; ")
}

fn has_brace(text: &str) -> bool {
    text.contains(['{', '}'])
}

/// Pattern for `<selector> { <body> }` anchored at the start of the text or
/// right after a closing brace. The selector is matched literally.
fn block_pattern(selector: &str) -> Option<Regex> {
    let pattern = format!(r"(?:\A|\}})(\s*)({})\s*\{{([^{{}}]*)\}}", regex::escape(selector));
    Regex::new(&pattern).ok()
}

/// Insert or update the rule for `selector` in `css`.
///
/// If no block exists, `\n<selector> { <rules_text> }` is appended verbatim.
/// If one exists, its declarations are merged with `rules_text` and the
/// block is rewritten in place, unless the merge changes nothing, in which
/// case the text is returned untouched. Repeating a call with the same
/// arguments therefore leaves the text as the first call did.
///
/// A selector or rules text containing a brace could open or close blocks
/// of its own, so such input leaves the stylesheet unchanged.
pub fn upsert_rule(css: &str, selector: &str, rules_text: &str) -> String {
    let selector = selector.trim();
    if selector.is_empty() || has_brace(selector) || has_brace(rules_text) {
        return css.to_string();
    }

    let found = block_pattern(selector).and_then(|re| {
        re.captures(css).map(|caps| {
            let sel = caps.get(2).map(|m| m.start()).unwrap_or_default();
            let whole = caps.get(0).map(|m| m.end()).unwrap_or_default();
            let body = caps.get(3).map(|m| m.as_str()).unwrap_or_default();
            (sel, whole, body.to_string())
        })
    });

    let Some((block_start, block_end, body)) = found else {
        let mut out = String::with_capacity(css.len() + selector.len() + rules_text.len() + 8);
        out.push_str(css);
        out.push('\n');
        out.push_str(selector);
        out.push_str(" { ");
        out.push_str(rules_text);
        out.push_str(" }");
        return out;
    };

    let existing = parse_declarations(&body);
    let merged = merge_declarations(&existing, &parse_declarations(rules_text));
    if merged == existing {
        return css.to_string();
    }

    let block = format!("{selector} {{ {} }}", format_declarations(&merged));
    let mut out = String::with_capacity(css.len() + block.len());
    out.push_str(&css[..block_start]);
    out.push_str(&block);
    out.push_str(&css[block_end..]);
    out
}
