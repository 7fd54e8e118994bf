//! Rulebook loading and management
//!
//! A rulebook is YAML: path filtering plus pattern categories, each holding
//! rules that name a detector and the message to report. The built-in rulebook
//! is embedded here so the binary works without any file on disk.

use crate::domain::violations::{GuardianError, GuardianResult, Severity};
use crate::patterns::library::{self, FIXED_MATCHERS};
use crate::scanner::StructureCheck;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

/// Supported rulebook format versions
pub const SUPPORTED_VERSIONS: [&str; 1] = ["1.0"];

/// File names searched in the working directory, in order
pub const CONFIG_FILE_NAMES: [&str; 3] =
    ["markup_guardian.yaml", "markup_guardian.yml", ".markup_guardian.yaml"];

/// Default maximum line length, in characters
pub const DEFAULT_MAX_LINE_LENGTH: usize = 110;

/// Main rulebook structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardianConfig {
    /// Rulebook format version
    pub version: String,
    /// Path filtering configuration
    pub paths: PathConfig,
    /// Pattern definitions organized by category
    pub patterns: BTreeMap<String, PatternCategory>,
}

/// Path filtering configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathConfig {
    /// Include/exclude patterns (gitignore-style)
    pub patterns: Vec<String>,
    /// Optional ignore file name, looked up in analysed directories
    pub ignore_file: Option<String>,
    /// File extensions treated as HTML documents
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
}

/// A category of rules (e.g. "forbidden_tags", "codestyle")
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternCategory {
    /// Default severity for rules in this category
    pub severity: Severity,
    /// Whether this category is enabled
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub rules: Vec<PatternRule>,
}

/// Individual rule configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternRule {
    /// Unique identifier for this rule
    pub id: String,
    /// Which family of detector the pattern names
    #[serde(rename = "type")]
    pub rule_type: RuleType,
    /// Tag name, attribute name, matcher name, length or regex, per `rule_type`
    pub pattern: String,
    /// Human-readable message; `{match}` is replaced by the offending fragment
    pub message: String,
    /// Severity override (uses category default if not specified)
    #[serde(default)]
    pub severity: Option<Severity>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Case sensitivity for `regex` rules
    #[serde(default)]
    pub case_sensitive: bool,
    /// How to fix the markup, shown alongside the violation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    /// Conditions that exclude matches from being violations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude_if: Option<ExcludeConditions>,
}

/// Families of detectors a rule can use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleType {
    /// Forbidden tag; pattern is the tag name
    Tag,
    /// Forbidden attribute; pattern is the attribute name
    Attribute,
    /// Fixed whitespace or quoting matcher; pattern is its name
    Codestyle,
    /// Maximum line length; pattern is the number of characters
    LineLength,
    /// Structural scanner; pattern is its name
    Structure,
    /// User-supplied regular expression
    Regex,
}

impl RuleType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tag => "tag",
            Self::Attribute => "attribute",
            Self::Codestyle => "codestyle",
            Self::LineLength => "line_length",
            Self::Structure => "structure",
            Self::Regex => "regex",
        }
    }
}

/// Conditions that exclude a rule from some documents
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExcludeConditions {
    /// Glob patterns of documents the rule does not apply to
    pub file_patterns: Option<Vec<String>>,
}

impl PatternRule {
    /// Rule using the category's severity and no exclusions
    pub fn new(
        id: impl Into<String>,
        rule_type: RuleType,
        pattern: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            rule_type,
            pattern: pattern.into(),
            message: message.into(),
            severity: None,
            enabled: true,
            case_sensitive: false,
            suggestion: None,
            exclude_if: None,
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Check that the pattern names something the engine can build
    pub fn validate(&self) -> GuardianResult<()> {
        let invalid = |what: String| {
            GuardianError::config(format!("Invalid pattern in rule '{}': {what}", self.id))
        };

        let pattern = self.pattern.trim();
        match self.rule_type {
            RuleType::Tag | RuleType::Attribute => {
                if pattern.is_empty() {
                    return Err(invalid("name must not be empty".to_string()));
                }
            }
            RuleType::Codestyle => {
                if library::by_name(pattern).is_none() {
                    return Err(invalid(format!(
                        "unknown codestyle matcher '{}' (known: {})",
                        self.pattern,
                        FIXED_MATCHERS.join(", ")
                    )));
                }
            }
            RuleType::LineLength => {
                let limit = pattern.parse::<usize>().map_err(|e| {
                    invalid(format!("line length '{}' is not a number: {e}", self.pattern))
                })?;
                library::max_line_length(limit).map_err(|e| invalid(e.to_string()))?;
            }
            RuleType::Structure => {
                if StructureCheck::from_name(pattern).is_none() {
                    let known: Vec<_> = StructureCheck::ALL.iter().map(|c| c.name()).collect();
                    return Err(invalid(format!(
                        "unknown structure check '{}' (known: {})",
                        self.pattern,
                        known.join(", ")
                    )));
                }
            }
            RuleType::Regex => {
                regex::RegexBuilder::new(&self.pattern)
                    .case_insensitive(!self.case_sensitive)
                    .build()
                    .map_err(|e| invalid(e.to_string()))?;
            }
        }

        Ok(())
    }
}

impl GuardianConfig {
    /// Load a rulebook from a YAML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> GuardianResult<Self> {
        let contents = fs::read_to_string(&path).map_err(|e| {
            GuardianError::config(format!(
                "Failed to read config file '{}': {}",
                path.as_ref().display(),
                e
            ))
        })?;

        let config: Self = serde_yaml::from_str(&contents).map_err(|e| {
            GuardianError::config(format!(
                "Failed to parse config file '{}': {}",
                path.as_ref().display(),
                e
            ))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Load a rulebook from YAML text
    pub fn load_from_str(content: &str) -> GuardianResult<Self> {
        let config: Self = serde_yaml::from_str(content)
            .map_err(|e| GuardianError::config(format!("Failed to parse config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// First rulebook file found in `dir`, if any
    pub fn discover(dir: &Path) -> Option<std::path::PathBuf> {
        CONFIG_FILE_NAMES.iter().map(|name| dir.join(name)).find(|path| path.is_file())
    }

    /// The built-in rulebook
    pub fn with_defaults() -> Self {
        Self {
            version: "1.0".to_string(),
            paths: PathConfig {
                patterns: vec![
                    "**/node_modules/".to_string(),
                    "**/.git/".to_string(),
                    "**/dist/".to_string(),
                    "**/build/".to_string(),
                ],
                ignore_file: Some(".guardianignore".to_string()),
                extensions: default_extensions(),
            },
            patterns: Self::default_patterns(),
        }
    }

    fn default_patterns() -> BTreeMap<String, PatternCategory> {
        let mut patterns = BTreeMap::new();

        let forbidden_tags = ["i", "b", "font", "center", "marquee", "u", "s"]
            .into_iter()
            .map(|name| {
                PatternRule::new(
                    format!("forbidden_tag_{name}"),
                    RuleType::Tag,
                    name,
                    format!("Forbidden tag <{name}>: {{match}}"),
                )
                .with_suggestion(forbidden_tag_suggestion(name))
            })
            .collect();
        patterns.insert(
            "forbidden_tags".to_string(),
            PatternCategory { severity: Severity::Error, enabled: true, rules: forbidden_tags },
        );

        patterns.insert(
            "forbidden_attributes".to_string(),
            PatternCategory {
                severity: Severity::Error,
                enabled: true,
                rules: vec![
                    PatternRule::new(
                        "forbidden_attribute_style",
                        RuleType::Attribute,
                        "style",
                        "Inline styles are forbidden: {match}",
                    )
                    .with_suggestion("Move the declarations to a stylesheet and use a class"),
                    PatternRule::new(
                        "forbidden_attribute_border",
                        RuleType::Attribute,
                        "border",
                        "Presentational attribute border is forbidden: {match}",
                    )
                    .with_suggestion("Set borders in CSS"),
                ],
            },
        );

        patterns.insert(
            "codestyle".to_string(),
            PatternCategory {
                severity: Severity::Error,
                enabled: true,
                rules: vec![
                    PatternRule::new("tabs", RuleType::Codestyle, "tabs", "Tab character")
                        .with_suggestion("Indent with spaces"),
                    PatternRule::new(
                        "indentation",
                        RuleType::Structure,
                        "wrong_spaces",
                        "Indentation is not a multiple of four spaces: {match}",
                    ),
                    PatternRule::new(
                        "space_after_tag",
                        RuleType::Codestyle,
                        "space_after_tag",
                        "Space after an opening tag: {match}",
                    ),
                    PatternRule::new(
                        "space_before_closing_tag",
                        RuleType::Codestyle,
                        "space_before_closing_tag",
                        "Space between a word and the closing tag that follows it: {match}",
                    ),
                    PatternRule::new(
                        "space_after_less_sign",
                        RuleType::Codestyle,
                        "space_after_less_sign",
                        "Space after \"<\": {match}",
                    ),
                    PatternRule::new(
                        "space_before_greater_sign",
                        RuleType::Codestyle,
                        "space_before_greater_sign",
                        "Space before \">\": {match}",
                    ),
                    PatternRule::new(
                        "space_before_equals",
                        RuleType::Codestyle,
                        "space_before_equals",
                        "Space before \"=\" in an attribute: {match}",
                    ),
                    PatternRule::new(
                        "space_after_equals",
                        RuleType::Codestyle,
                        "space_after_equals",
                        "Space after \"=\" in an attribute: {match}",
                    ),
                    PatternRule::new(
                        "two_line_breaks_in_a_row",
                        RuleType::Codestyle,
                        "two_line_breaks_in_a_row",
                        "Two blank lines in a row",
                    )
                    .with_suggestion("Separate blocks with a single blank line"),
                    PatternRule::new(
                        "max_line_length",
                        RuleType::LineLength,
                        DEFAULT_MAX_LINE_LENGTH.to_string(),
                        format!("Line longer than {DEFAULT_MAX_LINE_LENGTH} characters"),
                    ),
                ],
            },
        );

        patterns.insert(
            "attribute_quotes".to_string(),
            PatternCategory {
                severity: Severity::Error,
                enabled: true,
                rules: vec![PatternRule::new(
                    "wrong_quote_in_attribute",
                    RuleType::Codestyle,
                    "wrong_quote_in_attribute",
                    "Attribute value is not in double quotes: {match}",
                )
                .with_suggestion("Wrap attribute values in double quotes")],
            },
        );

        patterns.insert(
            "nesting".to_string(),
            PatternCategory {
                severity: Severity::Error,
                enabled: true,
                rules: vec![
                    PatternRule::new(
                        "block_inside_inline",
                        RuleType::Structure,
                        "block_inside_inline",
                        "Block element inside an inline element: {match}",
                    ),
                    PatternRule::new(
                        "block_inside_p",
                        RuleType::Structure,
                        "block_inside_p",
                        "Block element inside a paragraph: {match}",
                    ),
                ],
            },
        );

        patterns.insert(
            "accessibility".to_string(),
            PatternCategory {
                severity: Severity::Warning,
                enabled: true,
                rules: vec![PatternRule::new(
                    "images_without_alt",
                    RuleType::Structure,
                    "images_without_alt",
                    "Image without alternative text: {match}",
                )
                .with_suggestion("Describe the image in a non-empty alt attribute")],
            },
        );

        patterns.insert(
            "void_elements".to_string(),
            PatternCategory {
                severity: Severity::Info,
                enabled: true,
                rules: vec![PatternRule::new(
                    "closed_empty_elements",
                    RuleType::Structure,
                    "closed_empty_elements",
                    "Void element closed with \"/>\": {match}",
                )
                .with_suggestion("Void elements need no closing slash")],
            },
        );

        patterns
    }

    /// Validate the rulebook for consistency and correctness
    pub fn validate(&self) -> GuardianResult<()> {
        if !SUPPORTED_VERSIONS.contains(&self.version.as_str()) {
            return Err(GuardianError::config(format!(
                "Unsupported configuration version: {}. Supported versions: {}",
                self.version,
                SUPPORTED_VERSIONS.join(", ")
            )));
        }

        let mut seen = HashSet::new();
        for (category_name, category) in &self.patterns {
            for rule in &category.rules {
                if !seen.insert(rule.id.as_str()) {
                    return Err(GuardianError::config(format!(
                        "Duplicate rule ID '{}' in category '{}'",
                        rule.id, category_name
                    )));
                }
                rule.validate()?;
            }
        }

        Ok(())
    }

    /// All enabled rules across all enabled categories
    pub fn enabled_rules(&self) -> impl Iterator<Item = (&String, &PatternCategory, &PatternRule)> {
        self.patterns.iter().filter(|(_, category)| category.enabled).flat_map(
            |(name, category)| {
                category
                    .rules
                    .iter()
                    .filter(|rule| rule.enabled)
                    .map(move |rule| (name, category, rule))
            },
        )
    }

    /// Find a rule by id, with its category name
    pub fn find_rule(&self, rule_id: &str) -> Option<(&String, &PatternCategory, &PatternRule)> {
        self.patterns.iter().find_map(|(name, category)| {
            category.rules.iter().find(|rule| rule.id == rule_id).map(|rule| (name, category, rule))
        })
    }

    /// Effective severity for a rule (rule override or category default)
    pub fn effective_severity(&self, category: &PatternCategory, rule: &PatternRule) -> Severity {
        rule.severity.unwrap_or(category.severity)
    }

    /// Whether a path has one of the configured document extensions
    pub fn is_document(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.paths.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
    }

    /// Convert to JSON for serialization
    pub fn to_json(&self) -> GuardianResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| GuardianError::config(format!("Failed to serialize config: {e}")))
    }

    pub fn to_yaml(&self) -> GuardianResult<String> {
        serde_yaml::to_string(self)
            .map_err(|e| GuardianError::config(format!("Failed to serialize config: {e}")))
    }
}

impl Default for GuardianConfig {
    fn default() -> Self {
        Self::with_defaults()
    }
}

fn default_true() -> bool {
    true
}

fn default_extensions() -> Vec<String> {
    vec!["html".to_string(), "htm".to_string()]
}

fn forbidden_tag_suggestion(name: &str) -> &'static str {
    match name {
        "b" => "Use <strong> for importance or a class for bold text",
        "i" => "Use <em> for emphasis or a class for italics",
        "s" => "Use <del> for removed content or CSS text-decoration",
        "u" => "Use CSS text-decoration",
        "center" => "Center with CSS text-align or flexbox",
        _ => "Use semantic markup and CSS instead",
    }
}

/// Rulebook builder for programmatic construction
pub struct ConfigBuilder {
    config: GuardianConfig,
}

impl ConfigBuilder {
    /// Start from the built-in rulebook
    pub fn new() -> Self {
        Self { config: GuardianConfig::default() }
    }

    /// Start from a rulebook with no categories
    pub fn empty() -> Self {
        let mut config = GuardianConfig::default();
        config.patterns.clear();
        Self { config }
    }

    pub fn add_path_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.config.paths.patterns.push(pattern.into());
        self
    }

    pub fn ignore_file(mut self, filename: impl Into<String>) -> Self {
        self.config.paths.ignore_file = Some(filename.into());
        self
    }

    pub fn add_extension(mut self, extension: impl Into<String>) -> Self {
        self.config.paths.extensions.push(extension.into());
        self
    }

    /// Add or replace a category
    pub fn add_category(mut self, name: impl Into<String>, category: PatternCategory) -> Self {
        self.config.patterns.insert(name.into(), category);
        self
    }

    /// Enable or disable a whole category, if present
    pub fn category_enabled(mut self, name: &str, enabled: bool) -> Self {
        if let Some(category) = self.config.patterns.get_mut(name) {
            category.enabled = enabled;
        }
        self
    }

    /// Change the line length limit of every `line_length` rule
    pub fn max_line_length(mut self, limit: usize) -> Self {
        let rules = self.config.patterns.values_mut().flat_map(|c| c.rules.iter_mut());
        for rule in rules.filter(|rule| rule.rule_type == RuleType::LineLength) {
            rule.pattern = limit.to_string();
            rule.message = format!("Line longer than {limit} characters");
        }
        self
    }

    pub fn build(self) -> GuardianResult<GuardianConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    #[test]
    fn test_default_rulebook_is_valid() {
        let config = GuardianConfig::with_defaults();
        assert!(config.validate().is_ok());
        assert_eq!(config.enabled_rules().count(), 24);
        assert!(config.find_rule("forbidden_tag_marquee").is_some());
        assert!(config.find_rule("indentation").is_some());
    }

    #[test]
    fn test_default_severities() {
        let config = GuardianConfig::with_defaults();
        let severity_of = |id: &str| {
            let (_, category, rule) = config.find_rule(id).expect("rule exists");
            config.effective_severity(category, rule)
        };

        assert_eq!(severity_of("block_inside_p"), Severity::Error);
        assert_eq!(severity_of("images_without_alt"), Severity::Warning);
        assert_eq!(severity_of("closed_empty_elements"), Severity::Info);
    }

    #[test]
    fn test_load_from_str_with_defaults_for_optional_fields() {
        let yaml = r#"
version: "1.0"
paths:
  patterns: ["vendor/**"]
patterns:
  legacy:
    severity: warning
    rules:
      - id: no_marquee
        type: tag
        pattern: marquee
        message: "Marquee: {match}"
      - id: short_lines
        type: line_length
        pattern: "80"
        message: "Too long"
        severity: error
"#;
        let config = GuardianConfig::load_from_str(yaml).unwrap();
        let (_, category, rule) = config.find_rule("short_lines").unwrap();

        assert!(category.enabled);
        assert!(rule.enabled);
        assert_eq!(config.effective_severity(category, rule), Severity::Error);
        assert_eq!(config.paths.extensions, vec!["html", "htm"]);
        assert_eq!(config.paths.ignore_file, None);
    }

    #[test]
    fn test_validation_rejects_bad_rulebooks() {
        let unknown_version = "version: \"2.0\"\npaths: {patterns: []}\npatterns: {}\n";
        assert!(GuardianConfig::load_from_str(unknown_version).is_err());

        let rule = |rule_type: &str, pattern: &str| {
            format!(
                "version: \"1.0\"\npaths: {{patterns: []}}\npatterns:\n  c:\n    severity: error\n    rules:\n      - {{id: r, type: {rule_type}, pattern: '{pattern}', message: m}}\n"
            )
        };
        assert!(GuardianConfig::load_from_str(&rule("codestyle", "tabs")).is_ok());
        assert!(GuardianConfig::load_from_str(&rule("codestyle", "no_such_matcher")).is_err());
        assert!(GuardianConfig::load_from_str(&rule("structure", "block_inside_p")).is_ok());
        assert!(GuardianConfig::load_from_str(&rule("structure", "tabs")).is_err());
        assert!(GuardianConfig::load_from_str(&rule("line_length", "wide")).is_err());
        assert!(GuardianConfig::load_from_str(&rule("regex", "(unclosed")).is_err());
        assert!(GuardianConfig::load_from_str(&rule("tag", " ")).is_err());
    }

    #[rstest]
    #[case(RuleType::Codestyle, " tabs ", true)]
    #[case(RuleType::Structure, " block_inside_p", true)]
    #[case(RuleType::LineLength, " 120 ", true)]
    #[case(RuleType::LineLength, "18446744073709551615", false)]
    #[case(RuleType::LineLength, "-1", false)]
    fn test_rule_validation_agrees_with_engine(
        #[case] rule_type: RuleType,
        #[case] pattern: &str,
        #[case] valid: bool,
    ) {
        let rule = PatternRule::new("r", rule_type, pattern, "m").with_severity(Severity::Warning);
        assert_eq!(rule.validate().is_ok(), valid);

        let config = ConfigBuilder::empty()
            .add_category(
                "c",
                PatternCategory { severity: Severity::Error, enabled: true, rules: vec![rule] },
            )
            .build();
        assert_eq!(config.is_ok(), valid);
        if let Ok(config) = config {
            assert!(crate::Analyzer::new(config).is_ok());
        }
    }

    #[test]
    fn test_validation_rejects_duplicate_ids_across_categories() {
        let rule = PatternRule::new("dup", RuleType::Tag, "font", "font");
        let result = ConfigBuilder::empty()
            .add_category(
                "a",
                PatternCategory { severity: Severity::Error, enabled: true, rules: vec![rule.clone()] },
            )
            .add_category(
                "b",
                PatternCategory { severity: Severity::Error, enabled: true, rules: vec![rule] },
            )
            .build();

        assert!(result.is_err());
    }

    #[test]
    fn test_load_from_file_and_discover() {
        let dir = TempDir::new().unwrap();
        assert!(GuardianConfig::discover(dir.path()).is_none());

        let yaml = GuardianConfig::with_defaults().to_yaml().unwrap();
        let path = dir.path().join("markup_guardian.yml");
        std::fs::write(&path, yaml).unwrap();

        let found = GuardianConfig::discover(dir.path()).unwrap();
        assert_eq!(found, path);
        let config = GuardianConfig::load_from_file(&found).unwrap();
        assert_eq!(config.enabled_rules().count(), 24);
    }

    #[test]
    fn test_load_from_file_reports_parse_errors() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "version: [not, a, string").unwrap();

        let err = GuardianConfig::load_from_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_builder_adjusts_line_length_and_categories() {
        let config = ConfigBuilder::new()
            .max_line_length(80)
            .category_enabled("void_elements", false)
            .add_extension("xhtml")
            .add_path_pattern("drafts/**")
            .build()
            .unwrap();

        assert!(config.paths.patterns.iter().any(|p| p == "drafts/**"));
        let (_, _, rule) = config.find_rule("max_line_length").unwrap();
        assert_eq!(rule.pattern, "80");
        assert!(config.enabled_rules().all(|(_, _, rule)| rule.id != "closed_empty_elements"));
        assert!(config.is_document(Path::new("page.XHTML")));
        assert!(!config.is_document(Path::new("style.css")));
    }

    #[test]
    fn test_json_dump() {
        let json = GuardianConfig::with_defaults().to_json().unwrap();
        assert!(json.contains("\"forbidden_tags\""));
        assert!(json.contains("\"type\": \"line_length\""));
    }
}
