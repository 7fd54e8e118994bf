//! Quote-aware lexer for tag occurrences
//!
//! Produces the ordered sequence of opening, closing and self-closing tags of
//! a document without building a tree. Comments, doctype and processing
//! instructions are skipped, and the bodies of `script` and `style` are
//! treated as raw text. Malformed input never fails: a `<` that does not
//! start a recognisable tag is skipped and scanning resumes after it.
//!
//! Slices are only ever cut at ASCII structural bytes, so every offset handed
//! out is a valid `char` boundary of the document.

use std::ops::Range;

const COMMENT_START: &str = "<!--";
const COMMENT_END: &str = "-->";

/// Elements whose content is raw text rather than markup
const RAW_TEXT_ELEMENTS: [&str; 2] = ["script", "style"];

/// Kind of a tag occurrence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKind {
    /// `<name ...>`
    Open,
    /// `</name>`
    Close,
    /// `<name ... />`
    SelfClosing,
}

/// One attribute of a tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Lower-cased attribute name; empty for a stray quoted segment
    pub name: String,
    /// Value without quotes, `None` for a bare boolean attribute
    pub value: Option<String>,
    /// Byte range of the value in the document, quotes excluded
    pub value_span: Option<Range<usize>>,
    /// Quote character around the value, `None` when unquoted
    pub quote: Option<char>,
}

impl Attribute {
    /// True when the attribute has no value or an empty one
    pub fn is_empty(&self) -> bool {
        self.value.as_deref().map_or(true, str::is_empty)
    }
}

/// A tag occurrence in document order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagToken {
    pub kind: TagKind,
    /// Lower-cased tag name
    pub name: String,
    /// Byte range from the `<` through the closing `>` (or where lexing stopped)
    pub span: Range<usize>,
    /// Byte offset just past the tag name; attributes start here
    pub name_end: usize,
    pub attributes: Vec<Attribute>,
    /// Whether the tag ends with a `>`
    pub terminated: bool,
}

impl TagToken {
    /// The tag's source text
    pub fn source<'a>(&self, document: &'a str) -> &'a str {
        &document[self.span.clone()]
    }

    /// First attribute with the given (lower-case) name
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|attr| attr.name == name)
    }

    /// Byte ranges covered by attribute values
    pub fn value_spans(&self) -> impl Iterator<Item = &Range<usize>> {
        self.attributes.iter().filter_map(|attr| attr.value_span.as_ref())
    }

    /// Offset of the closing `>`, if the tag has one
    pub fn close_bracket(&self) -> Option<usize> {
        self.terminated.then(|| self.span.end - 1)
    }
}

/// HTML elements that never have content or a closing tag
pub fn is_void_element(name: &str) -> bool {
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

/// Lex every tag occurrence of the document, in order
pub fn tokenize(document: &str) -> Vec<TagToken> {
    let len = document.len();
    let mut tokens = Vec::new();
    let mut i = 0;

    while let Some(rel) = document[i..].find('<') {
        let lt = i + rel;
        let rest = &document[lt..];

        if rest.starts_with(COMMENT_START) {
            let body = lt + COMMENT_START.len();
            i = document[body..].find(COMMENT_END).map_or(len, |end| body + end + COMMENT_END.len());
            continue;
        }

        if rest.starts_with("<!") || rest.starts_with("<?") {
            i = document[lt..].find('>').map_or(len, |end| lt + end + 1);
            continue;
        }

        let Some(token) = lex_tag(document, lt) else {
            i = lt + 1;
            continue;
        };

        i = token.span.end;
        if token.kind == TagKind::Open && RAW_TEXT_ELEMENTS.contains(&token.name.as_str()) {
            i = skip_raw_text(document, i, &token.name);
        }
        tokens.push(token);
    }

    tokens
}

/// Position of the `</name` that ends a raw text element, or the document end
fn skip_raw_text(document: &str, from: usize, name: &str) -> usize {
    let bytes = document.as_bytes();
    let needle = name.as_bytes();
    let mut i = from;

    while let Some(rel) = document[i..].find("</") {
        let at = i + rel;
        let after = &bytes[at + 2..];
        if after.len() >= needle.len() && after[..needle.len()].eq_ignore_ascii_case(needle) {
            return at;
        }
        i = at + 2;
    }

    bytes.len()
}

/// Lex the tag starting at `lt`, tolerating whitespace after `<` and `</`
fn lex_tag(document: &str, lt: usize) -> Option<TagToken> {
    let bytes = document.as_bytes();
    let len = bytes.len();

    let mut i = skip_whitespace(bytes, lt + 1);
    let is_close = bytes.get(i) == Some(&b'/');
    if is_close {
        i = skip_whitespace(bytes, i + 1);
    }

    if !bytes.get(i).is_some_and(u8::is_ascii_alphabetic) {
        return None;
    }
    let name_start = i;
    while i < len && is_tag_name_byte(bytes[i]) {
        i += 1;
    }
    match bytes.get(i) {
        None | Some(b'>') | Some(b'/') => {}
        Some(b) if b.is_ascii_whitespace() => {}
        _ => return None,
    }
    let name = document[name_start..i].to_ascii_lowercase();
    let name_end = i;

    let mut attributes = Vec::new();
    let mut self_closing = false;
    let (end, terminated) = loop {
        i = skip_whitespace(bytes, i);
        match bytes.get(i) {
            None => break (len, false),
            Some(b'>') => break (i + 1, true),
            Some(b'<') => break (i, false),
            Some(b'/') => {
                let after = skip_whitespace(bytes, i + 1);
                if bytes.get(after) == Some(&b'>') {
                    self_closing = true;
                    break (after + 1, true);
                }
                i += 1;
            }
            Some(&quote @ (b'"' | b'\'')) => {
                let (span, next) = quoted_value(bytes, i + 1, quote);
                attributes.push(Attribute {
                    name: String::new(),
                    value: Some(document[span.clone()].to_string()),
                    value_span: Some(span),
                    quote: Some(char::from(quote)),
                });
                i = next;
            }
            Some(_) => {
                let (attribute, next) = lex_attribute(document, i);
                attributes.push(attribute);
                i = next;
            }
        }
    };

    let kind = if is_close {
        TagKind::Close
    } else if self_closing {
        TagKind::SelfClosing
    } else {
        TagKind::Open
    };

    Some(TagToken { kind, name, span: lt..end, name_end, attributes, terminated })
}

/// Lex one `name`, `name=value`, `name="value"` or `name='value'`
fn lex_attribute(document: &str, start: usize) -> (Attribute, usize) {
    let bytes = document.as_bytes();
    let len = bytes.len();

    let mut i = start;
    while i < len && !is_attribute_name_end(bytes[i]) {
        i += 1;
    }
    let name = document[start..i].to_ascii_lowercase();

    let after_name = skip_whitespace(bytes, i);
    if bytes.get(after_name) != Some(&b'=') {
        return (Attribute { name, value: None, value_span: None, quote: None }, i);
    }

    let v = skip_whitespace(bytes, after_name + 1);
    match bytes.get(v) {
        Some(&quote @ (b'"' | b'\'')) => {
            let (span, next) = quoted_value(bytes, v + 1, quote);
            let attribute = Attribute {
                name,
                value: Some(document[span.clone()].to_string()),
                value_span: Some(span),
                quote: Some(char::from(quote)),
            };
            (attribute, next)
        }
        None | Some(b'>') => {
            let attribute =
                Attribute { name, value: Some(String::new()), value_span: Some(v..v), quote: None };
            (attribute, v)
        }
        Some(_) => {
            let mut end = v;
            while end < len && !bytes[end].is_ascii_whitespace() && bytes[end] != b'>' {
                end += 1;
            }
            let attribute = Attribute {
                name,
                value: Some(document[v..end].to_string()),
                value_span: Some(v..end),
                quote: None,
            };
            (attribute, end)
        }
    }
}

/// Content range of a quoted value starting at `from`, and where lexing resumes.
/// An unterminated quote ends at the next `>` instead of swallowing the document.
fn quoted_value(bytes: &[u8], from: usize, quote: u8) -> (Range<usize>, usize) {
    if let Some(close) = find_byte(bytes, from, quote) {
        return (from..close, close + 1);
    }
    let stop = find_byte(bytes, from, b'>').unwrap_or(bytes.len());
    (from..stop, stop)
}

fn find_byte(bytes: &[u8], from: usize, needle: u8) -> Option<usize> {
    bytes.get(from..)?.iter().position(|&b| b == needle).map(|pos| from + pos)
}

fn skip_whitespace(bytes: &[u8], mut i: usize) -> usize {
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    i
}

fn is_tag_name_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b':')
}

fn is_attribute_name_end(b: u8) -> bool {
    b.is_ascii_whitespace() || matches!(b, b'=' | b'>' | b'/' | b'<' | b'"' | b'\'')
}
