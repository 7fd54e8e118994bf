//! Pattern library
//!
//! Reusable matchers for forbidden tags and attributes, whitespace misuse,
//! attribute quoting, line length and blank lines. A matcher is a compiled
//! regex plus a [`Scope`]: candidates the regex finds are only accepted when
//! their anchor lies in the right place of the document's markup. The anchor
//! is the named group `at` when the pattern has one, the match start otherwise.
//!
//! Scopes replace the lookaround the `regex` crate does not support. The tag
//! index behind them is built once per call from the quote-aware lexer.

use std::fmt;
use std::sync::LazyLock;

use regex::{Regex, RegexBuilder};

use crate::domain::findings::{Finding, Findings};
use crate::domain::violations::{GuardianError, GuardianResult};
use crate::scanner::tokenizer::{is_void_element, tokenize, TagKind, TagToken};

/// Compiled program size allowed for parameterised patterns
const PATTERN_SIZE_LIMIT: usize = 64 * (1 << 20);

/// Names of the fixed matchers, as rulebooks refer to them
pub const FIXED_MATCHERS: [&str; 10] = [
    "tabs",
    "space_after_tag",
    "space_before_closing_tag",
    "space_after_less_sign",
    "space_before_greater_sign",
    "space_before_less_sign",
    "space_before_equals",
    "space_after_equals",
    "wrong_quote_in_attribute",
    "two_line_breaks_in_a_row",
];

/// Where a candidate's anchor must lie to count as a hit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Anywhere
    Document,
    /// Inside a tag, after its name and outside attribute values
    Markup,
    /// The `<` that starts a tag
    TagStart,
    /// The `>` of an opening tag of a non-void element
    OpeningTagEnd,
    /// The `<` that starts a closing tag
    ClosingTagStart,
    /// The `>` that ends any tag
    TagEnd,
}

/// A reusable detector for one category of violation
#[derive(Clone)]
pub struct Matcher {
    name: String,
    regex: Regex,
    scope: Scope,
}

impl fmt::Debug for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Matcher")
            .field("name", &self.name)
            .field("pattern", &self.regex.as_str())
            .field("scope", &self.scope)
            .finish()
    }
}

impl Matcher {
    fn new(name: impl Into<String>, regex: Regex, scope: Scope) -> Self {
        Self { name: name.into(), regex, scope }
    }

    /// Wrap a user-supplied regex; it is matched anywhere in the document
    pub fn from_regex(name: impl Into<String>, regex: Regex) -> Self {
        Self::new(name, regex, Scope::Document)
    }

    /// Whether the document contains at least one violation
    pub fn test(&self, document: &str) -> bool {
        if self.scope == Scope::Document {
            return self.regex.is_match(document);
        }
        self.hits(document).next().is_some()
    }

    /// Every violation, in document order
    pub fn find_all(&self, document: &str) -> Findings {
        self.hits(document).collect()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The underlying regular expression
    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    fn hits<'a>(&'a self, document: &'a str) -> impl Iterator<Item = Finding> + 'a {
        let index = (self.scope != Scope::Document).then(|| MarkupIndex::build(document));

        self.regex.captures_iter(document).filter_map(move |caps| {
            let whole = caps.get(0)?;
            let anchor = caps.name("at").map_or(whole.start(), |at| at.start());
            if let Some(index) = &index {
                if !index.accepts(self.scope, anchor) {
                    return None;
                }
            }
            Some(Finding::new(whole.start(), whole.as_str()))
        })
    }
}

/// Tag occurrences of one document, ordered by position
struct MarkupIndex {
    tokens: Vec<TagToken>,
}

impl MarkupIndex {
    fn build(document: &str) -> Self {
        Self { tokens: tokenize(document) }
    }

    /// Token whose span contains `offset`
    fn enclosing(&self, offset: usize) -> Option<&TagToken> {
        let after = self.tokens.partition_point(|token| token.span.start <= offset);
        let token = self.tokens.get(after.checked_sub(1)?)?;
        token.span.contains(&offset).then_some(token)
    }

    fn starting_at(&self, offset: usize) -> Option<&TagToken> {
        self.enclosing(offset).filter(|token| token.span.start == offset)
    }

    fn ending_at(&self, offset: usize) -> Option<&TagToken> {
        self.enclosing(offset).filter(|token| token.close_bracket() == Some(offset))
    }

    fn accepts(&self, scope: Scope, offset: usize) -> bool {
        match scope {
            Scope::Document => true,
            Scope::Markup => self.enclosing(offset).is_some_and(|token| {
                offset >= token.name_end && !token.value_spans().any(|span| span.contains(&offset))
            }),
            Scope::TagStart => self.starting_at(offset).is_some(),
            Scope::ClosingTagStart => {
                self.starting_at(offset).is_some_and(|token| token.kind == TagKind::Close)
            }
            Scope::OpeningTagEnd => self
                .ending_at(offset)
                .is_some_and(|token| token.kind == TagKind::Open && !is_void_element(&token.name)),
            Scope::TagEnd => self.ending_at(offset).is_some(),
        }
    }
}

fn compile(pattern: &str) -> GuardianResult<Regex> {
    RegexBuilder::new(pattern)
        .size_limit(PATTERN_SIZE_LIMIT)
        .build()
        .map_err(|e| GuardianError::pattern(format!("Invalid pattern '{pattern}': {e}")))
}

fn fixed(name: &str, pattern: &str, scope: Scope) -> Matcher {
    let regex = Regex::new(pattern).expect("built-in pattern must compile");
    Matcher::new(name, regex, scope)
}

/// An opening tag `<name` (or `< name`) followed by a boundary. Text inside
/// comments and raw text elements is not markup and never matches.
pub fn tag(name: &str) -> GuardianResult<Matcher> {
    let pattern = format!(r"(?i)<\s?{}[\s/>]", regex::escape(name));
    Ok(Matcher::new(format!("tag({name})"), compile(&pattern)?, Scope::TagStart))
}

/// The attribute `name` in attribute position, with or without a value
pub fn attrs(name: &str) -> GuardianResult<Matcher> {
    let pattern = format!(r"(?i)(?:^|\s)(?P<at>{})(?:\s*=|[\s/>]|$)", regex::escape(name));
    Ok(Matcher::new(format!("attrs({name})"), compile(&pattern)?, Scope::Markup))
}

/// Lines longer than `limit` characters
pub fn max_line_length(limit: usize) -> GuardianResult<Matcher> {
    let min = limit.checked_add(1).ok_or_else(|| {
        GuardianError::pattern(format!("Line length limit {limit} is out of range"))
    })?;
    let pattern = format!(r"(?m)^[^\r\n]{{{min},}}");
    Ok(Matcher::new(format!("max_line_length({limit})"), compile(&pattern)?, Scope::Document))
}

static TABS: LazyLock<Matcher> = LazyLock::new(|| fixed("tabs", r"\t", Scope::Document));

static SPACE_AFTER_TAG: LazyLock<Matcher> =
    LazyLock::new(|| fixed("space_after_tag", r">[ \t]+\S", Scope::OpeningTagEnd));

static SPACE_BEFORE_CLOSING_TAG: LazyLock<Matcher> = LazyLock::new(|| {
    fixed("space_before_closing_tag", r"\S[ \t]+(?P<at><)\s?/", Scope::ClosingTagStart)
});

static SPACE_AFTER_LESS_SIGN: LazyLock<Matcher> =
    LazyLock::new(|| fixed("space_after_less_sign", r"<\s+/?[A-Za-z]", Scope::TagStart));

static SPACE_BEFORE_GREATER_SIGN: LazyLock<Matcher> =
    LazyLock::new(|| fixed("space_before_greater_sign", r"\s+(?P<at>>)", Scope::TagEnd));

static SPACE_BEFORE_EQUALS: LazyLock<Matcher> =
    LazyLock::new(|| fixed("space_before_equals", r"\s+(?P<at>=)", Scope::Markup));

static SPACE_AFTER_EQUALS: LazyLock<Matcher> =
    LazyLock::new(|| fixed("space_after_equals", r"(?P<at>=)\s+\S", Scope::Markup));

static WRONG_QUOTE_IN_ATTRIBUTE: LazyLock<Matcher> =
    LazyLock::new(|| fixed("wrong_quote_in_attribute", r#"(?P<at>=)\s*[^"\s>]"#, Scope::Markup));

static TWO_LINE_BREAKS_IN_A_ROW: LazyLock<Matcher> = LazyLock::new(|| {
    fixed("two_line_breaks_in_a_row", r"(?:\A|\n)[ \t\r]*\n[ \t\r]*\n", Scope::Document)
});

/// Horizontal tab characters
pub fn tabs() -> Matcher {
    TABS.clone()
}

/// Spaces after the `>` of an opening tag, before content on the same line
pub fn space_after_tag() -> Matcher {
    SPACE_AFTER_TAG.clone()
}

/// Spaces between content and a closing tag
pub fn space_before_closing_tag() -> Matcher {
    SPACE_BEFORE_CLOSING_TAG.clone()
}

/// Whitespace right after the `<` of a tag; `&lt;` never matches
pub fn space_after_less_sign() -> Matcher {
    SPACE_AFTER_LESS_SIGN.clone()
}

/// Whitespace right before the `>` that closes a tag
pub fn space_before_greater_sign() -> Matcher {
    SPACE_BEFORE_GREATER_SIGN.clone()
}

/// Alias of [`space_before_greater_sign`]
pub fn space_before_less_sign() -> Matcher {
    space_before_greater_sign()
}

/// Whitespace between an attribute name and its `=`
pub fn space_before_equals() -> Matcher {
    SPACE_BEFORE_EQUALS.clone()
}

/// Whitespace between an attribute's `=` and its value
pub fn space_after_equals() -> Matcher {
    SPACE_AFTER_EQUALS.clone()
}

/// Attribute values that are single-quoted or unquoted
pub fn wrong_quote_in_attribute() -> Matcher {
    WRONG_QUOTE_IN_ATTRIBUTE.clone()
}

/// Two or more consecutive blank lines
pub fn two_line_breaks_in_a_row() -> Matcher {
    TWO_LINE_BREAKS_IN_A_ROW.clone()
}

/// Look up a fixed matcher by name. `max_line_length` needs a parameter and
/// is not returned here.
pub fn by_name(name: &str) -> Option<Matcher> {
    let matcher = match name {
        "tabs" => tabs(),
        "space_after_tag" => space_after_tag(),
        "space_before_closing_tag" => space_before_closing_tag(),
        "space_after_less_sign" => space_after_less_sign(),
        "space_before_greater_sign" => space_before_greater_sign(),
        "space_before_less_sign" => space_before_less_sign(),
        "space_before_equals" => space_before_equals(),
        "space_after_equals" => space_after_equals(),
        "wrong_quote_in_attribute" => wrong_quote_in_attribute(),
        "two_line_breaks_in_a_row" => two_line_breaks_in_a_row(),
        _ => return None,
    };
    Some(matcher)
}
