//! Structural scanner
//!
//! Procedural analyzers that walk tag occurrences in document order to answer
//! questions a single regular expression cannot: nesting legality, alt text on
//! images and self-closing syntax on void elements. Also hosts the
//! line-oriented indentation check.

pub mod tokenizer;

use crate::domain::findings::{Finding, Findings};
use std::collections::HashMap;
use tokenizer::{is_void_element, tokenize, TagKind, TagToken};

/// Indentation unit, in spaces
pub const INDENT_WIDTH: usize = 4;

/// A named structural check that a rule can refer to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StructureCheck {
    WrongSpaces,
    BlockInsideInline,
    BlockInsideP,
    ImagesWithoutAlt,
    ClosedEmptyElements,
}

impl StructureCheck {
    pub const ALL: [StructureCheck; 5] = [
        Self::WrongSpaces,
        Self::BlockInsideInline,
        Self::BlockInsideP,
        Self::ImagesWithoutAlt,
        Self::ClosedEmptyElements,
    ];

    /// Resolve the name used in rulebooks
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|check| check.name() == name)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::WrongSpaces => "wrong_spaces",
            Self::BlockInsideInline => "block_inside_inline",
            Self::BlockInsideP => "block_inside_p",
            Self::ImagesWithoutAlt => "images_without_alt",
            Self::ClosedEmptyElements => "closed_empty_elements",
        }
    }

    pub fn run(self, document: &str) -> Findings {
        match self {
            Self::WrongSpaces => wrong_spaces_checker(document),
            Self::BlockInsideInline => block_inside_inline(document),
            Self::BlockInsideP => block_inside_p(document),
            Self::ImagesWithoutAlt => images_without_alt(document),
            Self::ClosedEmptyElements => closed_empty_elements(document),
        }
    }
}

/// Lines whose leading-space count is not a multiple of [`INDENT_WIDTH`]
pub fn wrong_spaces_checker(document: &str) -> Findings {
    let mut findings = Findings::new();
    let mut offset = 0;

    for line in document.split('\n') {
        let text = line.strip_suffix('\r').unwrap_or(line);
        let indent = text.bytes().take_while(|&b| b == b' ').count();
        if indent % INDENT_WIDTH != 0 {
            findings.push(Finding::new(offset, text));
        }
        offset += line.len() + 1;
    }

    findings
}

/// Block elements opened while an inline element is open
pub fn block_inside_inline(document: &str) -> Findings {
    nested_blocks(document, is_inline_element)
}

/// Block elements opened while a paragraph is open
pub fn block_inside_p(document: &str) -> Findings {
    nested_blocks(document, |name| name == "p")
}

/// `img` tags with a missing, bare or empty `alt`
pub fn images_without_alt(document: &str) -> Findings {
    tokenize(document)
        .iter()
        .filter(|token| token.kind != TagKind::Close && token.name == "img")
        .filter(|token| token.attribute("alt").map_or(true, |alt| alt.is_empty()))
        .map(|token| Finding::new(token.span.start, token.source(document)))
        .collect()
}

/// Void elements written with explicit `/>`
pub fn closed_empty_elements(document: &str) -> Findings {
    tokenize(document)
        .iter()
        .filter(|token| token.kind == TagKind::SelfClosing && is_void_element(&token.name))
        .map(|token| Finding::new(token.span.start, token.source(document)))
        .collect()
}

/// Tolerant stack walk over inline and block elements. A block opened while
/// any stack entry satisfies `ancestor` is a finding, unless it is empty.
///
/// Open counts per name and for `ancestor` keep every step O(1) amortized.
fn nested_blocks(document: &str, ancestor: impl Fn(&str) -> bool) -> Findings {
    let tokens = tokenize(document);
    let mut stack: Vec<&str> = Vec::new();
    let mut open_by_name: HashMap<&str, usize> = HashMap::new();
    let mut open_ancestors = 0usize;
    let mut findings = Findings::new();

    for (index, token) in tokens.iter().enumerate() {
        let name = token.name.as_str();
        if !is_inline_element(name) && !is_block_element(name) {
            continue;
        }

        match token.kind {
            TagKind::Open => {
                if is_block_element(name)
                    && open_ancestors > 0
                    && !is_empty_element(document, token, tokens.get(index + 1))
                {
                    findings.push(Finding::new(token.span.start, token.source(document)));
                }
                stack.push(name);
                *open_by_name.entry(name).or_default() += 1;
                if ancestor(name) {
                    open_ancestors += 1;
                }
            }
            TagKind::Close => {
                // Stray closes leave the stack alone
                if open_by_name.get(name).copied().unwrap_or(0) == 0 {
                    continue;
                }
                while let Some(open) = stack.pop() {
                    if let Some(count) = open_by_name.get_mut(open) {
                        *count -= 1;
                    }
                    if ancestor(open) {
                        open_ancestors -= 1;
                    }
                    if open == name {
                        break;
                    }
                }
            }
            TagKind::SelfClosing => {}
        }
    }

    findings
}

/// `<div></div>`: the very next tag closes it with only whitespace between
fn is_empty_element(document: &str, open: &TagToken, next: Option<&TagToken>) -> bool {
    next.is_some_and(|next| {
        next.kind == TagKind::Close
            && next.name == open.name
            && document[open.span.end..next.span.start].trim().is_empty()
    })
}

fn is_inline_element(name: &str) -> bool {
    matches!(
        name,
        "a" | "abbr"
            | "b"
            | "bdi"
            | "bdo"
            | "big"
            | "cite"
            | "code"
            | "dfn"
            | "em"
            | "font"
            | "i"
            | "kbd"
            | "label"
            | "mark"
            | "q"
            | "s"
            | "samp"
            | "small"
            | "span"
            | "strike"
            | "strong"
            | "sub"
            | "sup"
            | "time"
            | "tt"
            | "u"
            | "var"
    )
}

fn is_block_element(name: &str) -> bool {
    matches!(
        name,
        "address"
            | "article"
            | "aside"
            | "blockquote"
            | "dd"
            | "details"
            | "dialog"
            | "div"
            | "dl"
            | "dt"
            | "fieldset"
            | "figcaption"
            | "figure"
            | "footer"
            | "form"
            | "h1"
            | "h2"
            | "h3"
            | "h4"
            | "h5"
            | "h6"
            | "header"
            | "hgroup"
            | "li"
            | "main"
            | "nav"
            | "ol"
            | "p"
            | "pre"
            | "section"
            | "table"
            | "ul"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::CLEAN_PAGE;
    use rstest::rstest;

    #[test]
    fn test_clean_page_has_no_structural_findings() {
        for check in StructureCheck::ALL {
            assert_eq!(check.run(CLEAN_PAGE).count(), 0, "{} fired on the clean page", check.name());
        }
    }

    #[rstest]
    #[case("<div>\n    <p>ok</p>\n</div>", 0)]
    #[case("<div>\n   <p>three</p>\n</div>", 1)]
    #[case("<div>\n\t<p>tab</p>\n  \n</div>", 1)]
    #[case("<div>\r\n  <p>crlf</p>\r\n</div>", 1)]
    fn test_wrong_spaces_checker(#[case] document: &str, #[case] expected: usize) {
        assert_eq!(wrong_spaces_checker(document).count(), expected);
    }

    #[test]
    fn test_wrong_spaces_reports_offending_line() {
        let findings = wrong_spaces_checker("<ul>\n      <li>x</li>\n</ul>");
        assert_eq!(findings.fragments(), vec!["      <li>x</li>"]);
        assert_eq!(findings.iter().next().map(|f| f.offset), Some(5));
    }

    #[test]
    fn test_block_inside_inline_simple_cases() {
        let html = "Начало строки\n<span><div>bad</div></span>\n\nКонец строки<div>Слово</div>\n<span>\n<div></div></span>";
        let findings = block_inside_inline(html);

        assert_eq!(findings.count(), 1);
        assert_eq!(findings.fragments(), vec!["<div>"]);
    }

    #[test]
    fn test_block_inside_inline_after_text() {
        let html = format!("{CLEAN_PAGE}\n<span>\n  Некий текст<div>Слово</div></span>");
        assert_eq!(block_inside_inline(&html).count(), 1);
    }

    #[rstest]
    #[case("<span><div>x</div></span>", 1)]
    #[case("<div><span>x</span></div>", 0)]
    #[case("<a href=\"/\"><span>x</span></a><p>y</p>", 0)]
    #[case("<em><b>deep<section>x</section></b></em>", 1)]
    #[case("</span><div>stray close</div>", 0)]
    #[case("<span><!-- <div> --></span>", 0)]
    fn test_block_inside_inline(#[case] document: &str, #[case] expected: usize) {
        assert_eq!(block_inside_inline(document).count(), expected);
    }

    #[rstest]
    #[case("\n<p>\n  Некий текст<div>Слово</div></p>", 1)]
    #[case("\n<p>\n  Некий текст<table>Слово</table></p>", 1)]
    #[case("\n<p>\n  Некий текст</p><table>Слово</table>", 0)]
    fn test_block_inside_p(#[case] suffix: &str, #[case] expected: usize) {
        let html = format!("{CLEAN_PAGE}{suffix}");
        assert_eq!(block_inside_p(&html).count(), expected);
    }

    #[test]
    fn test_unclosed_inline_keeps_scope_until_matching_close() {
        let html = "<div><span>open<p>one</p></div><ul><li>two</li></ul>";
        // </div> also discards the unclosed span
        assert_eq!(block_inside_inline(html).count(), 1);
        assert_eq!(block_inside_inline("<span><b>x</span><div>y</div>").count(), 0);
    }

    #[rstest]
    #[case("<img src=\"a.png\">", 1)]
    #[case("<img src=\"a.png\" alt=\"\">", 1)]
    #[case("<img src=\"a.png\" alt=''>", 1)]
    #[case("<img src=\"a.png\" alt>", 1)]
    #[case("<IMG SRC=\"a.png\" ALT=\"Кекс\">", 0)]
    #[case("<img src=\"a.png\" alt=\"Кекс\"><img>", 1)]
    fn test_images_without_alt(#[case] document: &str, #[case] expected: usize) {
        assert_eq!(images_without_alt(document).count(), expected);
    }

    #[rstest]
    #[case("<meta someattr=\"test\" />", 1)]
    #[case("<br/><hr /><input type=\"text\"/>", 3)]
    #[case("<meta charset=\"utf-8\"><br>", 0)]
    #[case("<div/>", 0)]
    fn test_closed_empty_elements(#[case] document: &str, #[case] expected: usize) {
        assert_eq!(closed_empty_elements(document).count(), expected);
    }

    #[test]
    fn test_structure_check_names_round_trip() {
        for check in StructureCheck::ALL {
            assert_eq!(StructureCheck::from_name(check.name()), Some(check));
        }
        assert_eq!(StructureCheck::from_name("tabs"), None);
    }

    #[test]
    fn test_nesting_scan_stays_linear_on_deep_and_stray_markup() {
        let n = 60_000;
        let stray_closes = format!("{}{}", "<span>".repeat(n), "</b>".repeat(n));
        let deep_blocks = format!("{}{}", "<span>".repeat(n), "<div>x".repeat(n));
        let start = std::time::Instant::now();

        assert_eq!(block_inside_inline(&stray_closes).count(), 0);
        assert_eq!(block_inside_inline(&deep_blocks).count(), n);
        assert_eq!(block_inside_p(&format!("<p>{}", "<div>x".repeat(n))).count(), n);
        assert!(start.elapsed() < std::time::Duration::from_secs(10));
    }

    #[test]
    fn test_close_unwinds_counts_of_discarded_entries() {
        // </div> discards the unclosed <p>, so the later <ul> is outside it
        assert_eq!(block_inside_p("<div><p>x</div><ul><li>y</li></ul>").count(), 0);
        assert_eq!(block_inside_p("<p><span>x</p><div>y</div>").count(), 0);
        assert_eq!(block_inside_p("<p><p>x</p><div>y</div>").count(), 1);
    }

    #[test]
    fn test_scanners_survive_malformed_markup() {
        for document in ["", "<", "<span", "<p><div", "<<span>>", "<img alt=\"x"] {
            for check in StructureCheck::ALL {
                let _ = check.run(document);
            }
        }
    }
}
