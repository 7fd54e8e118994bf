//! Main analysis orchestrator
//!
//! Coordinates path filtering, rule evaluation and result aggregation for
//! single documents, explicit file lists and whole directory trees.

use crate::config::{GuardianConfig, RuleType};
use crate::domain::violations::{GuardianError, GuardianResult, ValidationReport, Violation};
use crate::patterns::{PathFilter, PatternEngine};
use rayon::prelude::*;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Main analyzer that orchestrates the entire validation process
pub struct Analyzer {
    config: GuardianConfig,
    pattern_engine: PatternEngine,
    path_filter: PathFilter,
}

/// Options for customizing analysis behavior
#[derive(Debug, Clone)]
pub struct AnalysisOptions {
    /// Whether to analyze files on the rayon pool
    pub parallel: bool,
    /// Maximum number of files to analyze
    pub max_files: Option<usize>,
    /// Stop at the first unreadable file instead of logging and skipping it
    pub fail_fast: bool,
    /// Additional exclusion patterns for this run
    pub exclude_patterns: Vec<String>,
    /// Whether to ignore .guardianignore files
    pub ignore_ignore_files: bool,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            parallel: true,
            max_files: None,
            fail_fast: false,
            exclude_patterns: Vec::new(),
            ignore_ignore_files: false,
        }
    }
}

impl Analyzer {
    /// Create a new analyzer with the given rulebook
    pub fn new(config: GuardianConfig) -> GuardianResult<Self> {
        let mut pattern_engine = PatternEngine::new();

        for (category_name, category, rule) in config.enabled_rules() {
            let effective_severity = config.effective_severity(category, rule);
            pattern_engine.add_rule(rule, effective_severity).map_err(|e| {
                GuardianError::config(format!(
                    "Failed to add rule '{}' in category '{}': {}",
                    rule.id, category_name, e
                ))
            })?;
        }

        let mut paths = config.paths.clone();
        if paths.ignore_file.as_deref() == Some("") {
            paths.ignore_file = None;
        }
        let path_filter = PathFilter::from_config(&paths)
            .map_err(|e| GuardianError::config(format!("Failed to create path filter: {e}")))?;

        Ok(Self { config, pattern_engine, path_filter })
    }

    /// Create an analyzer with the built-in rulebook
    pub fn with_defaults() -> GuardianResult<Self> {
        Self::new(GuardianConfig::default())
    }

    pub fn config(&self) -> &GuardianConfig {
        &self.config
    }

    /// Check an in-memory document; `name` is only used for reporting
    pub fn analyze_document<P: AsRef<Path>>(&self, name: P, content: &str) -> Vec<Violation> {
        let matches = self.pattern_engine.analyze_document(name, content);
        self.pattern_engine.matches_to_violations(matches)
    }

    /// Whether the configured path filter accepts a file
    pub fn should_analyze<P: AsRef<Path>>(&self, file_path: P) -> GuardianResult<bool> {
        self.path_filter.should_analyze(file_path)
    }

    /// Analyze a single file and return violations. Files the path filter
    /// rejects produce no violations.
    pub fn analyze_file<P: AsRef<Path>>(&self, file_path: P) -> GuardianResult<Vec<Violation>> {
        let file_path = file_path.as_ref();

        if !self.path_filter.should_analyze(file_path)? {
            tracing::debug!("Skipping filtered file {}", file_path.display());
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(file_path).map_err(|e| {
            GuardianError::analysis(
                file_path.display().to_string(),
                format!("Failed to read file: {e}"),
            )
        })?;

        Ok(self.analyze_document(file_path, &content))
    }

    /// Analyze files and directory trees and return a complete validation report
    pub fn analyze_paths<P: AsRef<Path>>(
        &self,
        paths: &[P],
        options: &AnalysisOptions,
    ) -> GuardianResult<ValidationReport> {
        let start_time = Instant::now();
        let mut report = ValidationReport::new();

        let files_to_analyze = self.collect_files(paths, options)?;

        let total_files = files_to_analyze.len();
        tracing::debug!("Analyzing {} files (parallel: {})", total_files, options.parallel);

        let violations = if options.parallel && files_to_analyze.len() > 1 {
            self.analyze_files_parallel(&files_to_analyze, options)?
        } else {
            self.analyze_files_sequential(&files_to_analyze, options)?
        };

        for violation in violations {
            report.add_violation(violation);
        }

        report.set_files_analyzed(total_files);
        report.set_execution_time(start_time.elapsed().as_millis() as u64);
        report.sort_violations();

        Ok(report)
    }

    /// Resolve files and directory trees to the files the filter accepts.
    ///
    /// Each file appears once, in first-seen order, even when it is named
    /// explicitly and also found by a directory walk.
    pub fn collect_files<P: AsRef<Path>>(
        &self,
        paths: &[P],
        options: &AnalysisOptions,
    ) -> GuardianResult<Vec<PathBuf>> {
        let mut filter = self.path_filter.clone();
        for pattern in &options.exclude_patterns {
            filter.add_pattern(pattern)?;
        }
        if options.ignore_ignore_files {
            filter = filter.without_ignore_files();
        }

        let mut candidates = Vec::new();
        for path in paths {
            let path = path.as_ref();

            if path.is_file() {
                if filter.should_analyze(path)? {
                    candidates.push(path.to_path_buf());
                }
            } else if path.is_dir() {
                candidates.extend(filter.find_files(path)?);
            } else {
                let message = "No such file or directory";
                if options.fail_fast {
                    return Err(GuardianError::analysis(path.display().to_string(), message));
                }
                tracing::warn!("{}: {}", path.display(), message);
            }
        }

        // `site/a.html` and `./site/a.html` name the same file
        let mut seen = HashSet::new();
        candidates.retain(|path| seen.insert(fs::canonicalize(path).unwrap_or_else(|_| path.clone())));

        if let Some(max_files) = options.max_files {
            candidates.truncate(max_files);
        }

        Ok(candidates)
    }

    fn analyze_files_sequential(
        &self,
        files: &[PathBuf],
        options: &AnalysisOptions,
    ) -> GuardianResult<Vec<Violation>> {
        let mut all_violations = Vec::new();

        for file_path in files {
            match self.read_and_analyze(file_path) {
                Ok(violations) => all_violations.extend(violations),
                Err(e) if options.fail_fast => return Err(e),
                Err(e) => tracing::warn!("Failed to analyze {}: {}", file_path.display(), e),
            }
        }

        Ok(all_violations)
    }

    fn analyze_files_parallel(
        &self,
        files: &[PathBuf],
        options: &AnalysisOptions,
    ) -> GuardianResult<Vec<Violation>> {
        let results: Vec<(&PathBuf, GuardianResult<Vec<Violation>>)> =
            files.par_iter().map(|file_path| (file_path, self.read_and_analyze(file_path))).collect();

        let mut all_violations = Vec::new();
        for (file_path, result) in results {
            match result {
                Ok(violations) => all_violations.extend(violations),
                Err(e) if options.fail_fast => return Err(e),
                Err(e) => tracing::warn!("Failed to analyze {}: {}", file_path.display(), e),
            }
        }

        Ok(all_violations)
    }

    /// Read and check a file that already passed the path filter
    fn read_and_analyze(&self, file_path: &Path) -> GuardianResult<Vec<Violation>> {
        let content = fs::read_to_string(file_path).map_err(|e| {
            GuardianError::analysis(
                file_path.display().to_string(),
                format!("Failed to read file: {e}"),
            )
        })?;
        Ok(self.analyze_document(file_path, &content))
    }

    /// Analyze a directory tree and return a validation report
    pub fn analyze_directory<P: AsRef<Path>>(
        &self,
        root: P,
        options: &AnalysisOptions,
    ) -> GuardianResult<ValidationReport> {
        self.analyze_paths(&[root.as_ref()], options)
    }

    /// Statistics about the configured rules
    pub fn pattern_stats(&self) -> PatternStats {
        let mut stats = PatternStats::default();

        for category in self.config.patterns.values() {
            if !category.enabled {
                stats.disabled_categories += 1;
                stats.disabled_rules += category.rules.len();
                continue;
            }

            stats.enabled_categories += 1;
            for rule in &category.rules {
                if !rule.enabled {
                    stats.disabled_rules += 1;
                    continue;
                }

                stats.enabled_rules += 1;
                match rule.rule_type {
                    RuleType::Tag => stats.tag_rules += 1,
                    RuleType::Attribute => stats.attribute_rules += 1,
                    RuleType::Codestyle | RuleType::LineLength => stats.codestyle_rules += 1,
                    RuleType::Structure => stats.structure_rules += 1,
                    RuleType::Regex => stats.regex_rules += 1,
                }
            }
        }

        stats
    }
}

/// Statistics about configured rules
#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct PatternStats {
    pub enabled_categories: usize,
    pub disabled_categories: usize,
    pub enabled_rules: usize,
    pub disabled_rules: usize,
    pub tag_rules: usize,
    pub attribute_rules: usize,
    /// Whitespace, quoting and line-length rules
    pub codestyle_rules: usize,
    pub structure_rules: usize,
    pub regex_rules: usize,
}

impl PatternStats {
    pub fn total_categories(&self) -> usize {
        self.enabled_categories + self.disabled_categories
    }

    pub fn total_rules(&self) -> usize {
        self.enabled_rules + self.disabled_rules
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigBuilder;
    use crate::domain::violations::Severity;
    use crate::test_support::CLEAN_PAGE;
    use rstest::rstest;
    use std::fs;
    use tempfile::TempDir;

    fn write_site(root: &Path) -> std::io::Result<()> {
        fs::create_dir_all(root.join("pages"))?;
        fs::create_dir_all(root.join("node_modules/widget"))?;
        fs::write(root.join("index.html"), CLEAN_PAGE)?;
        fs::write(root.join("pages/promo.html"), "<center>Скидки!</center>\n")?;
        fs::write(root.join("pages/gallery.htm"), "<img src=\"a.png\">\n")?;
        fs::write(root.join("pages/notes.txt"), "<font>not html</font>\n")?;
        fs::write(root.join("node_modules/widget/demo.html"), "<b>vendored</b>\n")?;
        Ok(())
    }

    #[test]
    fn test_analyzer_creation() {
        let analyzer = Analyzer::with_defaults().unwrap();
        let stats = analyzer.pattern_stats();

        assert_eq!(stats.enabled_rules, 24);
        assert_eq!(stats.tag_rules, 7);
        assert_eq!(stats.structure_rules, 5);
        assert_eq!(stats.total_categories(), 7);
    }

    #[test]
    fn test_single_file_analysis() -> GuardianResult<()> {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("page.html");
        fs::write(&file_path, "<p>Слово <b>важно</b></p>\n")?;

        let analyzer = Analyzer::with_defaults()?;
        let violations = analyzer.analyze_file(&file_path)?;

        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].rule_id, "forbidden_tag_b");
        assert_eq!(violations[0].file_path, file_path);
        Ok(())
    }

    #[test]
    fn test_non_documents_are_skipped() -> GuardianResult<()> {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("notes.txt");
        fs::write(&file_path, "<font>x</font>")?;

        let analyzer = Analyzer::with_defaults()?;
        assert!(analyzer.analyze_file(&file_path)?.is_empty());
        Ok(())
    }

    #[test]
    fn test_directory_analysis() -> GuardianResult<()> {
        let temp_dir = TempDir::new().unwrap();
        write_site(temp_dir.path())?;

        let analyzer = Analyzer::with_defaults()?;
        for parallel in [true, false] {
            let options = AnalysisOptions { parallel, ..Default::default() };
            let report = analyzer.analyze_directory(temp_dir.path(), &options)?;

            assert_eq!(report.summary.total_files, 3);
            let ids: Vec<&str> = report.violations.iter().map(|v| v.rule_id.as_str()).collect();
            assert_eq!(ids, vec!["images_without_alt", "forbidden_tag_center"]);
            assert!(report.has_errors());
        }
        Ok(())
    }

    #[test]
    fn test_analysis_options() -> GuardianResult<()> {
        let temp_dir = TempDir::new().unwrap();
        write_site(temp_dir.path())?;
        let analyzer = Analyzer::with_defaults()?;

        let limited = AnalysisOptions { max_files: Some(1), ..Default::default() };
        let report = analyzer.analyze_directory(temp_dir.path(), &limited)?;
        assert_eq!(report.summary.total_files, 1);

        let excluded =
            AnalysisOptions { exclude_patterns: vec!["pages/".to_string()], ..Default::default() };
        let report = analyzer.analyze_directory(temp_dir.path(), &excluded)?;
        assert_eq!(report.summary.total_files, 1);
        assert!(!report.has_violations());
        Ok(())
    }

    #[test]
    fn test_missing_paths_and_fail_fast() -> GuardianResult<()> {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("missing.html");
        let analyzer = Analyzer::with_defaults()?;

        let lenient = analyzer.analyze_paths(&[&missing], &AnalysisOptions::default())?;
        assert_eq!(lenient.summary.total_files, 0);

        let strict = AnalysisOptions { fail_fast: true, ..Default::default() };
        assert!(analyzer.analyze_paths(&[&missing], &strict).is_err());
        Ok(())
    }

    #[rstest]
    #[case(false)]
    #[case(true)]
    fn test_file_inside_listed_directory_is_analyzed_once(
        #[case] parallel: bool,
    ) -> GuardianResult<()> {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::write(root.join("a.html"), "<b>x</b>\n")?;
        fs::write(root.join("z.html"), CLEAN_PAGE)?;

        let analyzer = Analyzer::with_defaults()?;
        let options = AnalysisOptions { parallel, ..Default::default() };
        let report = analyzer.analyze_paths(
            &[root.to_path_buf(), root.join("a.html"), root.join(".").join("a.html")],
            &options,
        )?;

        assert_eq!(report.summary.total_files, 2);
        let ids: Vec<&str> = report.violations.iter().map(|v| v.rule_id.as_str()).collect();
        assert_eq!(ids, vec!["forbidden_tag_b"]);
        Ok(())
    }

    #[test]
    fn test_custom_rulebook_severity() -> GuardianResult<()> {
        let config = ConfigBuilder::new().max_line_length(20).build()?;
        let analyzer = Analyzer::new(config)?;

        let violations =
            analyzer.analyze_document("inline.html", "<p>Очень длинная строка текста</p>\n");
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].rule_id, "max_line_length");
        assert_eq!(violations[0].severity, Severity::Error);
        Ok(())
    }
}
