//! Markup Guardian - style and structure linter for hand-authored HTML
//!
//! The library is layered the way the CLI uses it:
//! - `patterns::library` and `scanner` are the detectors: plain functions
//!   from a document to a verdict or a list of findings
//! - `config` holds the YAML rulebook that turns detectors into named rules
//! - `analyzer` walks files and runs the rulebook over them
//! - `report` renders the results for people and CI systems

pub mod analyzer;
pub mod config;
pub mod domain;
pub mod patterns;
pub mod report;
pub mod scanner;

pub use domain::findings::{Finding, Findings};
pub use domain::violations::{
    GuardianError, GuardianResult, Severity, ValidationReport, ValidationSummary, Violation,
};

pub use config::{GuardianConfig, PatternCategory, PatternRule, RuleType};

pub use analyzer::{AnalysisOptions, Analyzer, PatternStats};

pub use report::{OutputFormat, ReportFormatter, ReportOptions};

pub use patterns::library::Matcher;
pub use scanner::StructureCheck;

use std::path::Path;
use std::time::Instant;

/// Main validator providing high-level validation operations
pub struct MarkupValidator {
    analyzer: Analyzer,
    report_formatter: ReportFormatter,
}

impl MarkupValidator {
    /// Create a new validator with the given rulebook
    pub fn new_with_config(config: GuardianConfig) -> GuardianResult<Self> {
        let analyzer = Analyzer::new(config)?;
        Ok(Self { analyzer, report_formatter: ReportFormatter::default() })
    }

    /// Create a validator with the built-in rulebook
    pub fn new() -> GuardianResult<Self> {
        Self::new_with_config(GuardianConfig::default())
    }

    /// Create a validator loading the rulebook from file
    pub fn from_config_file<P: AsRef<Path>>(path: P) -> GuardianResult<Self> {
        let config = GuardianConfig::load_from_file(path)?;
        Self::new_with_config(config)
    }

    pub fn with_report_formatter(mut self, formatter: ReportFormatter) -> Self {
        self.report_formatter = formatter;
        self
    }

    /// Check markup held in memory; `name` only labels the violations
    pub fn validate_document<P: AsRef<Path>>(&self, name: P, content: &str) -> ValidationReport {
        let start_time = Instant::now();
        let mut report = ValidationReport::new();

        for violation in self.analyzer.analyze_document(name, content) {
            report.add_violation(violation);
        }

        report.set_files_analyzed(1);
        report.set_execution_time(start_time.elapsed().as_millis() as u64);
        report.sort_violations();
        report
    }

    /// Validate a single file
    pub fn validate_file<P: AsRef<Path>>(&self, file_path: P) -> GuardianResult<ValidationReport> {
        let file_path = file_path.as_ref();
        let violations = self.analyzer.analyze_file(file_path)?;

        let mut report = ValidationReport::new();
        for violation in violations {
            report.add_violation(violation);
        }
        report.set_files_analyzed(usize::from(self.analyzer.should_analyze(file_path)?));
        report.sort_violations();

        Ok(report)
    }

    /// Validate files and directory trees with explicit analysis options
    pub fn validate_paths<P: AsRef<Path>>(
        &self,
        paths: &[P],
        options: &AnalysisOptions,
    ) -> GuardianResult<ValidationReport> {
        self.analyzer.analyze_paths(paths, options)
    }

    /// Validate an entire directory tree
    pub fn validate_directory<P: AsRef<Path>>(
        &self,
        root: P,
        options: &AnalysisOptions,
    ) -> GuardianResult<ValidationReport> {
        self.analyzer.analyze_directory(root, options)
    }

    /// Validate files and directories, reading files through tokio.
    ///
    /// Directories are walked with the configured path filter; files the
    /// filter rejects are skipped, and a file named both directly and
    /// through its directory is checked once. Missing or unreadable files
    /// are logged and skipped.
    pub async fn validate_files<P: AsRef<Path>>(
        &self,
        paths: Vec<P>,
    ) -> GuardianResult<ValidationReport> {
        let start_time = Instant::now();
        let mut report = ValidationReport::new();
        let mut files_analyzed = 0;

        let files = self.analyzer.collect_files(&paths, &AnalysisOptions::default())?;
        for path in &files {
            match tokio::fs::read_to_string(path).await {
                Ok(content) => {
                    for violation in self.analyzer.analyze_document(path, &content) {
                        report.add_violation(violation);
                    }
                    files_analyzed += 1;
                }
                Err(e) => tracing::warn!("Failed to read {}: {}", path.display(), e),
            }
        }

        report.set_files_analyzed(files_analyzed);
        report.set_execution_time(start_time.elapsed().as_millis() as u64);
        report.sort_violations();

        Ok(report)
    }

    /// Format a validation report for output
    pub fn format_report(
        &self,
        report: &ValidationReport,
        format: OutputFormat,
    ) -> GuardianResult<String> {
        self.report_formatter.format_report(report, format)
    }

    pub fn pattern_statistics(&self) -> PatternStats {
        self.analyzer.pattern_stats()
    }

    pub fn config(&self) -> &GuardianConfig {
        self.analyzer.config()
    }
}

/// Validate a directory with the built-in rulebook
pub fn validate_directory<P: AsRef<Path>>(directory: P) -> GuardianResult<ValidationReport> {
    let validator = MarkupValidator::new()?;
    validator.validate_directory(directory, &AnalysisOptions::default())
}

/// Hooks for commit gates
pub mod agent {
    use super::*;

    /// Pre-commit validation of modified files.
    ///
    /// Fails with [`GuardianError::Validation`] when any blocking violation is
    /// found; warnings and info findings pass the gate.
    pub async fn pre_commit_check<P: AsRef<Path>>(modified_files: Vec<P>) -> GuardianResult<()> {
        let validator = MarkupValidator::new()?;
        let report = validator.validate_files(modified_files).await?;

        if report.has_errors() {
            let error_count = report.summary.violations_by_severity.error;
            return Err(GuardianError::validation(format!(
                "Pre-commit check failed: {} blocking violation{} found",
                error_count,
                if error_count == 1 { "" } else { "s" }
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    /// A page that passes every rule of the built-in rulebook
    pub(crate) const CLEAN_PAGE: &str = include_str!("../tests/fixtures/large.html");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::CLEAN_PAGE;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_validator_creation() {
        let validator = MarkupValidator::new().unwrap();
        let stats = validator.pattern_statistics();

        assert_eq!(stats.enabled_rules, 24);
        assert_eq!(stats.tag_rules, 7);
        assert_eq!(stats.structure_rules, 5);
    }

    #[test]
    fn test_validate_document() {
        let validator = MarkupValidator::new().unwrap();

        let clean = validator.validate_document("index.html", CLEAN_PAGE);
        assert!(!clean.has_violations());
        assert_eq!(clean.summary.total_files, 1);

        let dirty = validator.validate_document("promo.html", "<p>\n<div>x</div>\n</p>\n");
        assert!(dirty.has_errors());
        assert_eq!(dirty.violations_for_rule("block_inside_p").count(), 1);
    }

    #[tokio::test]
    async fn test_validate_files() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("blog")).unwrap();
        fs::write(root.join("index.html"), "<b>Жирный</b>\n").unwrap();
        fs::write(root.join("style.css"), "b { color: red; }\n").unwrap();
        fs::write(root.join("blog/post.html"), "<img src=\"a.png\">\n").unwrap();

        let validator = MarkupValidator::new().unwrap();
        let report = validator
            .validate_files(vec![
                root.join("index.html"),
                root.join("style.css"),
                root.join("missing.html"),
                root.join("blog"),
            ])
            .await
            .unwrap();

        assert_eq!(report.summary.total_files, 2);
        let rules: Vec<&str> = report.violations.iter().map(|v| v.rule_id.as_str()).collect();
        assert_eq!(rules, vec!["images_without_alt", "forbidden_tag_b"]);
    }

    #[tokio::test]
    async fn test_validate_files_counts_each_file_once() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::write(root.join("a.html"), "<b>x</b>\n").unwrap();
        fs::write(root.join("z.html"), CLEAN_PAGE).unwrap();

        let validator = MarkupValidator::new().unwrap();
        let report = validator
            .validate_files(vec![root.join("a.html"), root.to_path_buf()])
            .await
            .unwrap();

        assert_eq!(report.summary.total_files, 2);
        assert_eq!(report.violations.len(), 1);
        assert_eq!(report.summary.violations_by_severity.error, 1);
    }

    #[test]
    fn test_single_file_validation() {
        let temp_dir = TempDir::new().unwrap();
        let test_file = temp_dir.path().join("page.html");
        fs::write(&test_file, "<p>\tТаб</p>\n").unwrap();

        let validator = MarkupValidator::new().unwrap();
        let report = validator.validate_file(&test_file).unwrap();

        assert_eq!(report.summary.total_files, 1);
        let tab = report.violations_for_rule("tabs").next().unwrap();
        assert_eq!(tab.line_number, Some(1));
        assert_eq!(tab.column_number, Some(4));
    }

    #[test]
    fn test_report_formatting() {
        let validator = MarkupValidator::new()
            .unwrap()
            .with_report_formatter(ReportFormatter::new(ReportOptions {
                use_colors: false,
                ..Default::default()
            }));
        let report = validator.validate_document("a.html", "<font>x</font>\n");

        let human = validator.format_report(&report, OutputFormat::Human).unwrap();
        assert!(human.contains("Markup violations found"));
        assert!(human.contains("forbidden_tag_font"));

        let json = validator.format_report(&report, OutputFormat::Json).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert!(parsed["violations"].is_array());
    }

    #[tokio::test]
    async fn test_agent_pre_commit_check() {
        let temp_dir = TempDir::new().unwrap();
        let clean_file = temp_dir.path().join("clean.html");
        let warning_file = temp_dir.path().join("gallery.html");
        let dirty_file = temp_dir.path().join("dirty.html");

        fs::write(&clean_file, CLEAN_PAGE).unwrap();
        fs::write(&warning_file, "<img src=\"cat.jpg\">\n").unwrap();
        fs::write(&dirty_file, "<center>Привет</center>\n").unwrap();

        assert!(agent::pre_commit_check(vec![&clean_file]).await.is_ok());
        assert!(agent::pre_commit_check(vec![&warning_file]).await.is_ok());

        let err = agent::pre_commit_check(vec![&clean_file, &dirty_file]).await.unwrap_err();
        assert!(matches!(err, GuardianError::Validation { .. }));
        assert!(err.to_string().contains("1 blocking violation found"));
    }

    #[test]
    fn test_validate_directory_convenience() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("index.html"), CLEAN_PAGE).unwrap();

        let report = validate_directory(temp_dir.path()).unwrap();
        assert_eq!(report.summary.total_files, 1);
        assert!(!report.has_violations());
    }
}
