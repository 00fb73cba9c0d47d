//! Tolerant HTML tokenizer and tree builder.
//!
//! Accepts what a browser would accept for the pages this service edits:
//! unclosed elements, stray end tags, unquoted and bare attributes,
//! comments, a doctype, raw text inside `<script>`/`<style>` and friends,
//! and RCDATA inside `<textarea>`/`<title>`. Comments and raw-text end tags
//! close where a browser closes them. It does not
//! implement the HTML5 insertion modes; stray end tags are dropped and
//! unclosed elements are closed at end of input.
//!
//! Tag and attribute names use the ASCII class `[A-Za-z0-9:_-]` (attribute
//! names additionally allow `.` and `@`).

use super::{is_raw_text_element, is_rcdata_element, is_void_element, Document, ElementData, NodeId, NodeKind};

/// Nesting guard. Deeper input is rejected rather than risking unbounded
/// work in later tree walks.
pub const MAX_NESTING_DEPTH: usize = 512;

const COMMENT_START: &str = "<!--";
const COMMENT_ENDS: [&str; 2] = ["-->", "--!>"];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("document contains no element content")]
    Empty,

    #[error("document nests deeper than {MAX_NESTING_DEPTH} levels")]
    TooDeep,
}

#[derive(Debug)]
enum Token {
    Doctype(String),
    StartTag {
        name: String,
        attributes: Vec<(String, Option<String>)>,
        self_closing: bool,
    },
    EndTag(String),
    Comment(String),
    Text(String),
}

/// Tags that implicitly close an open element of the same name.
fn closes_same_tag(name: &str) -> bool {
    matches!(
        name,
        "p" | "li" | "option" | "dt" | "dd" | "tr" | "td" | "th"
    )
}

pub(super) fn parse(input: &str) -> Result<Document, ParseError> {
    build(tokenize(input))
}

fn build(tokens: Vec<Token>) -> Result<Document, ParseError> {
    let mut doc = Document::new();
    let root = doc.root();
    let mut open: Vec<(NodeId, String)> = Vec::new();

    for token in tokens {
        let parent = open.last().map(|(id, _)| *id).unwrap_or(root);
        match token {
            Token::Doctype(text) => {
                let node = doc.create_node(NodeKind::Doctype(text));
                doc.append_child(parent, node);
            }
            Token::Comment(text) => {
                let node = doc.create_node(NodeKind::Comment(text));
                doc.append_child(parent, node);
            }
            Token::Text(text) => {
                let node = doc.create_text(text);
                doc.append_child(parent, node);
            }
            Token::StartTag {
                name,
                attributes,
                self_closing,
            } => {
                if closes_same_tag(&name) && open.last().is_some_and(|(_, n)| *n == name) {
                    open.pop();
                }
                let parent = open.last().map(|(id, _)| *id).unwrap_or(root);
                let node = doc.create_node(NodeKind::Element(ElementData {
                    name: name.clone(),
                    attributes,
                }));
                doc.append_child(parent, node);

                if !self_closing && !is_void_element(&name) {
                    if open.len() >= MAX_NESTING_DEPTH {
                        return Err(ParseError::TooDeep);
                    }
                    open.push((node, name));
                }
            }
            Token::EndTag(name) => {
                // Stray end tags (nothing open by that name) are dropped.
                if let Some(pos) = open.iter().rposition(|(_, n)| *n == name) {
                    open.truncate(pos);
                }
            }
        }
    }

    Ok(doc)
}

fn is_name_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || b == b':'
}

fn is_attr_name_byte(b: u8) -> bool {
    is_name_byte(b) || b == b'.' || b == b'@'
}

fn starts_with_ignore_ascii_case_at(haystack: &[u8], start: usize, needle: &[u8]) -> bool {
    haystack.len() >= start + needle.len()
        && haystack[start..start + needle.len()].eq_ignore_ascii_case(needle)
}

/// Find `</name` followed by whitespace, `/` or `>`, case-insensitive.
/// Returns (start of close tag, index after its `>`).
fn find_raw_text_end(input: &str, from: usize, name: &str) -> Option<(usize, usize)> {
    let bytes = input.as_bytes();
    let mut i = from;
    while let Some(rel) = input[i..].find("</") {
        let start = i + rel;
        let name_end = start + 2 + name.len();
        if starts_with_ignore_ascii_case_at(bytes, start + 2, name.as_bytes())
            && (name_end == bytes.len() || matches!(bytes[name_end], b'>' | b'/') || bytes[name_end].is_ascii_whitespace())
        {
            let after = input[name_end..]
                .find('>')
                .map(|gt| name_end + gt + 1)
                .unwrap_or(bytes.len());
            return Some((start, after));
        }
        i = start + 2;
    }
    None
}

/// Scan a comment whose `<!--` ends at `body_start`. Returns the comment
/// text and the index after it. `<!-->` and `<!--->` are empty comments,
/// and both `-->` and `--!>` end one.
fn scan_comment(input: &str, body_start: usize) -> (String, usize) {
    let rest = &input[body_start..];
    for abrupt in [">", "->"] {
        if rest.starts_with(abrupt) {
            return (String::new(), body_start + abrupt.len());
        }
    }
    let end = COMMENT_ENDS
        .iter()
        .filter_map(|marker| rest.find(marker).map(|at| (at, marker.len())))
        .min();
    match end {
        Some((at, len)) => (rest[..at].to_string(), body_start + at + len),
        None => (rest.to_string(), input.len()),
    }
}

fn tokenize(input: &str) -> Vec<Token> {
    let bytes = input.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;

    // Slice endpoints are only ever taken at ASCII structural bytes, so
    // they always land on UTF-8 char boundaries.
    while i < bytes.len() {
        if bytes[i] != b'<' {
            let start = i;
            while i < bytes.len() && bytes[i] != b'<' {
                i += 1;
            }
            push_text(&mut out, &input[start..i]);
            continue;
        }

        if input[i..].starts_with(COMMENT_START) {
            let (text, next) = scan_comment(input, i + COMMENT_START.len());
            out.push(Token::Comment(text));
            i = next;
            continue;
        }

        if starts_with_ignore_ascii_case_at(bytes, i, b"<!doctype") {
            match input[i..].find('>') {
                Some(end) => {
                    out.push(Token::Doctype(input[i + 2..i + end].trim().to_string()));
                    i += end + 1;
                }
                None => i = bytes.len(),
            }
            continue;
        }

        // `<!...>` and `<?...>` bogus comments are dropped.
        if i + 1 < bytes.len() && (bytes[i + 1] == b'!' || bytes[i + 1] == b'?') {
            i = input[i..].find('>').map(|end| i + end + 1).unwrap_or(bytes.len());
            continue;
        }

        if i + 1 < bytes.len() && bytes[i + 1] == b'/' {
            let start = i + 2;
            let mut j = start;
            while j < bytes.len() && is_name_byte(bytes[j]) {
                j += 1;
            }
            if j == start {
                // `</>` or `</ ...`: not an end tag, treat `<` as text.
                push_text(&mut out, "<");
                i += 1;
                continue;
            }
            let name = input[start..j].to_ascii_lowercase();
            while j < bytes.len() && bytes[j] != b'>' {
                j += 1;
            }
            out.push(Token::EndTag(name));
            i = (j + 1).min(bytes.len());
            continue;
        }

        let start = i + 1;
        let mut j = start;
        while j < bytes.len() && is_name_byte(bytes[j]) {
            j += 1;
        }
        if j == start || !bytes[start].is_ascii_alphabetic() {
            push_text(&mut out, "<");
            i += 1;
            continue;
        }
        let name = input[start..j].to_ascii_lowercase();
        let (attributes, self_closing, next) = scan_attributes(input, j);
        i = next;

        let rcdata = is_rcdata_element(&name);
        let raw = (rcdata || is_raw_text_element(&name)) && !self_closing;
        out.push(Token::StartTag {
            name: name.clone(),
            attributes,
            self_closing,
        });

        if raw {
            let (text_end, next) = find_raw_text_end(input, i, &name).unwrap_or((bytes.len(), bytes.len()));
            if text_end > i {
                let text = &input[i..text_end];
                out.push(Token::Text(if rcdata { decode_entities(text) } else { text.to_string() }));
            }
            out.push(Token::EndTag(name));
            i = next;
        }
    }

    out
}

/// Scan attributes starting right after the tag name. Returns the
/// attributes, whether the tag was self-closing, and the index after `>`.
fn scan_attributes(input: &str, mut k: usize) -> (Vec<(String, Option<String>)>, bool, usize) {
    let bytes = input.as_bytes();
    let len = bytes.len();
    let mut attributes: Vec<(String, Option<String>)> = Vec::new();
    let mut self_closing = false;

    loop {
        while k < len && bytes[k].is_ascii_whitespace() {
            k += 1;
        }
        if k >= len {
            break;
        }
        match bytes[k] {
            b'>' => {
                k += 1;
                break;
            }
            b'/' => {
                if k + 1 < len && bytes[k + 1] == b'>' {
                    self_closing = true;
                    k += 2;
                    break;
                }
                k += 1;
                continue;
            }
            _ => {}
        }

        let name_start = k;
        while k < len && is_attr_name_byte(bytes[k]) {
            k += 1;
        }
        if k == name_start {
            // Junk byte inside the tag; skip it.
            k += input[k..].chars().next().map(char::len_utf8).unwrap_or(1);
            continue;
        }
        let name = input[name_start..k].to_ascii_lowercase();

        while k < len && bytes[k].is_ascii_whitespace() {
            k += 1;
        }
        let value = if k < len && bytes[k] == b'=' {
            k += 1;
            while k < len && bytes[k].is_ascii_whitespace() {
                k += 1;
            }
            if k < len && (bytes[k] == b'"' || bytes[k] == b'\'') {
                let quote = bytes[k];
                let value_start = k + 1;
                let mut end = value_start;
                while end < len && bytes[end] != quote {
                    end += 1;
                }
                let raw = &input[value_start..end];
                k = (end + 1).min(len);
                Some(decode_entities(raw))
            } else {
                let value_start = k;
                while k < len && !bytes[k].is_ascii_whitespace() && bytes[k] != b'>' {
                    k += 1;
                }
                Some(decode_entities(&input[value_start..k]))
            }
        } else {
            None
        };

        // First occurrence wins, as in browsers.
        if !attributes.iter().any(|(n, _)| *n == name) {
            attributes.push((name, value));
        }
    }

    (attributes, self_closing, k)
}

fn push_text(out: &mut Vec<Token>, raw: &str) {
    if raw.is_empty() {
        return;
    }
    let decoded = decode_entities(raw);
    if let Some(Token::Text(prev)) = out.last_mut() {
        prev.push_str(&decoded);
    } else {
        out.push(Token::Text(decoded));
    }
}

/// Decode the named entities pages actually use plus numeric references.
/// Unknown entities are left as written.
pub(crate) fn decode_entities(input: &str) -> String {
    if !input.contains('&') {
        return input.to_string();
    }

    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let decoded = rest[1..].find(';').filter(|&end| end <= 10).and_then(|end| {
            let entity = &rest[1..1 + end];
            decode_one(entity).map(|c| (c, end + 2))
        });
        match decoded {
            Some((c, consumed)) => {
                out.push(c);
                rest = &rest[consumed..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_one(entity: &str) -> Option<char> {
    if let Some(num) = entity.strip_prefix('#') {
        let code = match num.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => num.parse::<u32>().ok()?,
        };
        return char::from_u32(code).filter(|&c| c != '\0');
    }
    let c = match entity {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => '\u{a0}',
        "copy" => '\u{a9}',
        "reg" => '\u{ae}',
        "trade" => '\u{2122}',
        "hellip" => '\u{2026}',
        "mdash" => '\u{2014}',
        "ndash" => '\u{2013}',
        "lsquo" => '\u{2018}',
        "rsquo" => '\u{2019}',
        "ldquo" => '\u{201c}',
        "rdquo" => '\u{201d}',
        "middot" => '\u{b7}',
        "bull" => '\u{2022}',
        "euro" => '\u{20ac}',
        _ => return None,
    };
    Some(c)
}
