//! Rule engine for detecting markup violations
//!
//! The engine compiles each rulebook rule into a detector (a pattern-library
//! matcher or a structural scan), runs them over a document and turns their
//! findings into located matches. Matches become violations at the boundary.

pub mod library;
pub mod path_filter;

use crate::config::{GuardianConfig, PatternRule, RuleType};
use crate::domain::findings::Findings;
use crate::domain::violations::{GuardianError, GuardianResult, Severity, Violation};
use crate::scanner::StructureCheck;
use library::Matcher;
use regex::RegexBuilder;
use std::path::{Path, PathBuf};

pub use path_filter::PathFilter;

/// Longest `{match}` substitution, in characters
const MAX_FRAGMENT_CHARS: usize = 80;

/// Core engine holding the compiled rules of one rulebook
#[derive(Debug, Default)]
pub struct PatternEngine {
    rules: Vec<CompiledRule>,
}

/// A rule ready to run
#[derive(Debug)]
struct CompiledRule {
    rule_id: String,
    detector: Detector,
    message_template: String,
    severity: Severity,
    suggestion: Option<String>,
    excluded_files: Vec<glob::Pattern>,
}

/// What a rule runs over the document
#[derive(Debug)]
enum Detector {
    Pattern(Matcher),
    Structure(StructureCheck),
}

impl Detector {
    fn run(&self, content: &str) -> Findings {
        match self {
            Self::Pattern(matcher) => matcher.find_all(content),
            Self::Structure(check) => check.run(content),
        }
    }
}

/// A match found by a rule
#[derive(Debug, Clone)]
pub struct PatternMatch {
    pub rule_id: String,
    pub file_path: PathBuf,
    pub line_number: Option<u32>,
    pub column_number: Option<u32>,
    pub matched_text: String,
    pub message: String,
    pub severity: Severity,
    pub context: Option<String>,
    pub suggestion: Option<String>,
}

impl PatternEngine {
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    /// Compile every enabled rule of a rulebook
    pub fn from_config(config: &GuardianConfig) -> GuardianResult<Self> {
        let mut engine = Self::new();
        for (_, category, rule) in config.enabled_rules() {
            engine.add_rule(rule, config.effective_severity(category, rule))?;
        }
        Ok(engine)
    }

    /// Add a rule to the engine, replacing any rule with the same id
    pub fn add_rule(
        &mut self,
        rule: &PatternRule,
        effective_severity: Severity,
    ) -> GuardianResult<()> {
        tracing::debug!(
            "Adding rule '{}' of type {} with pattern '{}' and severity {:?}",
            rule.id,
            rule.rule_type.as_str(),
            rule.pattern,
            effective_severity
        );

        let detector = build_detector(rule)?;

        let excluded_files = rule
            .exclude_if
            .as_ref()
            .and_then(|conditions| conditions.file_patterns.as_ref())
            .into_iter()
            .flatten()
            .map(|pattern| {
                glob::Pattern::new(pattern).map_err(|e| {
                    GuardianError::pattern(format!(
                        "Invalid exclude pattern '{pattern}' in rule '{}': {e}",
                        rule.id
                    ))
                })
            })
            .collect::<GuardianResult<Vec<_>>>()?;

        self.rules.retain(|existing| existing.rule_id != rule.id);
        self.rules.push(CompiledRule {
            rule_id: rule.id.clone(),
            detector,
            message_template: rule.message.clone(),
            severity: effective_severity,
            suggestion: rule.suggestion.clone(),
            excluded_files,
        });

        Ok(())
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Run every rule over one document
    pub fn analyze_document<P: AsRef<Path>>(&self, file_path: P, content: &str) -> Vec<PatternMatch> {
        let file_path = file_path.as_ref();
        let mut matches = Vec::new();

        tracing::debug!(
            "Analyzing '{}' ({} bytes) with {} rules",
            file_path.display(),
            content.len(),
            self.rules.len()
        );

        for rule in &self.rules {
            if rule.excluded_files.iter().any(|pattern| pattern.matches_path(file_path)) {
                tracing::debug!("Rule '{}' excluded for '{}'", rule.rule_id, file_path.display());
                continue;
            }

            let findings = rule.detector.run(content);
            tracing::debug!("Rule '{}' found {} matches", rule.rule_id, findings.count());

            for finding in findings {
                let offset = anchor_offset(finding.offset, &finding.fragment);
                let (line_num, col_num, context) = get_match_location(content, offset);
                let message =
                    rule.message_template.replace("{match}", &summarize_fragment(&finding.fragment));

                matches.push(PatternMatch {
                    rule_id: rule.rule_id.clone(),
                    file_path: file_path.to_path_buf(),
                    line_number: Some(line_num),
                    column_number: Some(col_num),
                    matched_text: finding.fragment,
                    message,
                    severity: rule.severity,
                    context: Some(context),
                    suggestion: rule.suggestion.clone(),
                });
            }
        }

        matches
    }

    /// Convert pattern matches to violations
    pub fn matches_to_violations(&self, matches: Vec<PatternMatch>) -> Vec<Violation> {
        matches
            .into_iter()
            .map(|m| {
                let mut violation = Violation::new(m.rule_id, m.severity, m.file_path, m.message);

                if let (Some(line), Some(col)) = (m.line_number, m.column_number) {
                    violation = violation.with_position(line, col);
                }
                if let Some(context) = m.context {
                    violation = violation.with_context(context);
                }
                if let Some(suggestion) = m.suggestion {
                    violation = violation.with_suggestion(suggestion);
                }

                violation
            })
            .collect()
    }
}

fn build_detector(rule: &PatternRule) -> GuardianResult<Detector> {
    let unknown = |kind: &str| {
        GuardianError::pattern(format!("Unknown {kind} in rule '{}': {}", rule.id, rule.pattern))
    };

    let detector = match rule.rule_type {
        RuleType::Tag => Detector::Pattern(library::tag(rule.pattern.trim())?),
        RuleType::Attribute => Detector::Pattern(library::attrs(rule.pattern.trim())?),
        RuleType::Codestyle => Detector::Pattern(
            library::by_name(rule.pattern.trim()).ok_or_else(|| unknown("codestyle matcher"))?,
        ),
        RuleType::LineLength => {
            let limit = rule.pattern.trim().parse::<usize>().map_err(|_| {
                GuardianError::pattern(format!(
                    "Invalid line length in rule '{}': {}",
                    rule.id, rule.pattern
                ))
            })?;
            Detector::Pattern(library::max_line_length(limit)?)
        }
        RuleType::Structure => Detector::Structure(
            StructureCheck::from_name(rule.pattern.trim())
                .ok_or_else(|| unknown("structure check"))?,
        ),
        RuleType::Regex => {
            tracing::debug!("Compiling regex pattern '{}' for rule '{}'", rule.pattern, rule.id);
            let regex = RegexBuilder::new(&rule.pattern)
                .case_insensitive(!rule.case_sensitive)
                .build()
                .map_err(|e| {
                    GuardianError::pattern(format!("Invalid regex '{}': {}", rule.pattern, e))
                })?;
            Detector::Pattern(Matcher::from_regex(rule.id.clone(), regex))
        }
    };

    Ok(detector)
}

/// Report blank-line findings on the first blank line, not the line before it
fn anchor_offset(offset: usize, fragment: &str) -> usize {
    if fragment.len() > 1 && fragment.starts_with('\n') {
        offset + 1
    } else {
        offset
    }
}

/// First non-blank line of a fragment, trimmed and shortened
fn summarize_fragment(fragment: &str) -> String {
    let line = fragment.lines().map(str::trim).find(|line| !line.is_empty()).unwrap_or("");
    if line.chars().count() > MAX_FRAGMENT_CHARS {
        let cut: String = line.chars().take(MAX_FRAGMENT_CHARS).collect();
        format!("{cut}...")
    } else {
        line.to_string()
    }
}

/// Line and column (1-based, columns in characters) of a byte offset, plus
/// the trimmed source line as context
fn get_match_location(content: &str, byte_offset: usize) -> (u32, u32, String) {
    let mut line = 1;
    let mut col = 1;
    let mut line_start = 0;

    for (i, ch) in content.char_indices() {
        if i >= byte_offset {
            break;
        }
        if ch == '\n' {
            line += 1;
            col = 1;
            line_start = i + 1;
        } else {
            col += 1;
        }
    }

    let line_end =
        content[line_start..].find('\n').map(|pos| line_start + pos).unwrap_or(content.len());
    let context = content[line_start..line_end].trim().to_string();

    (line, col, context)
}
