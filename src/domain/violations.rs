//! Violations, validation reports and the crate error type
//!
//! A violation is a located, reportable finding produced by one rule of the
//! rulebook. Reports aggregate the violations of one run across many documents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

/// Severity levels for markup violations
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational notes that never fail a gate
    Info,
    /// Style problems worth fixing that do not block a commit
    Warning,
    /// Violations that fail the pre-commit hook or CI job
    Error,
}

impl Severity {
    /// Whether this severity level should cause validation to fail
    pub fn is_blocking(self) -> bool {
        matches!(self, Self::Error)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

/// A rule violation detected in an HTML document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Violation {
    /// Identifier of the rule that fired
    pub rule_id: String,
    pub severity: Severity,
    /// Document the violation was found in
    pub file_path: PathBuf,
    /// Line number (1-indexed)
    pub line_number: Option<u32>,
    /// Column number (1-indexed, in characters)
    pub column_number: Option<u32>,
    /// Human-readable description of the violation
    pub message: String,
    /// The offending source line, trimmed
    pub context: Option<String>,
    /// How to fix the markup, when the rule knows
    pub suggested_fix: Option<String>,
    pub detected_at: DateTime<Utc>,
}

impl Violation {
    pub fn new(
        rule_id: impl Into<String>,
        severity: Severity,
        file_path: PathBuf,
        message: impl Into<String>,
    ) -> Self {
        Self {
            rule_id: rule_id.into(),
            severity,
            file_path,
            line_number: None,
            column_number: None,
            message: message.into(),
            context: None,
            suggested_fix: None,
            detected_at: Utc::now(),
        }
    }

    /// Set line and column position
    pub fn with_position(mut self, line: u32, column: u32) -> Self {
        self.line_number = Some(line);
        self.column_number = Some(column);
        self
    }

    /// Attach the offending source line
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggested_fix = Some(suggestion.into());
        self
    }

    /// Whether this violation fails the gate
    pub fn is_blocking(&self) -> bool {
        self.severity.is_blocking()
    }

    /// Key that orders violations by document, then position, most severe
    /// first on ties. Violations without a position sort first.
    fn sort_key(&self) -> (&Path, u32, u32, Reverse<Severity>) {
        (
            self.file_path.as_path(),
            self.line_number.unwrap_or(0),
            self.column_number.unwrap_or(0),
            Reverse(self.severity),
        )
    }
}

/// `path:line:col: rule_id [severity] message`, the shape editors jump to
impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.file_path.display())?;
        if let Some(line) = self.line_number {
            write!(f, ":{line}")?;
            if let Some(col) = self.column_number {
                write!(f, ":{col}")?;
            }
        }
        write!(f, ": {} [{}] {}", self.rule_id, self.severity.as_str(), self.message)
    }
}

/// Summary statistics for a validation report
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationSummary {
    /// Number of documents analysed
    pub total_files: usize,
    pub violations_by_severity: ViolationCounts,
    /// Wall-clock time of the run in milliseconds
    pub execution_time_ms: u64,
    pub validated_at: DateTime<Utc>,
}

/// Count of violations by severity level
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ViolationCounts {
    pub error: usize,
    pub warning: usize,
    pub info: usize,
}

impl ViolationCounts {
    pub fn total(&self) -> usize {
        self.error + self.warning + self.info
    }

    pub fn get(&self, severity: Severity) -> usize {
        match severity {
            Severity::Error => self.error,
            Severity::Warning => self.warning,
            Severity::Info => self.info,
        }
    }

    pub fn has_blocking(&self) -> bool {
        [Severity::Error, Severity::Warning, Severity::Info]
            .into_iter()
            .any(|severity| severity.is_blocking() && self.get(severity) > 0)
    }

    fn add(&mut self, severity: Severity) {
        let slot = match severity {
            Severity::Error => &mut self.error,
            Severity::Warning => &mut self.warning,
            Severity::Info => &mut self.info,
        };
        *slot += 1;
    }
}

/// All violations of one run plus summary metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub violations: Vec<Violation>,
    pub summary: ValidationSummary,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self {
            violations: Vec::new(),
            summary: ValidationSummary { validated_at: Utc::now(), ..Default::default() },
        }
    }

    pub fn add_violation(&mut self, violation: Violation) {
        self.summary.violations_by_severity.add(violation.severity);
        self.violations.push(violation);
    }

    pub fn has_violations(&self) -> bool {
        !self.violations.is_empty()
    }

    /// Whether the report contains blocking violations
    pub fn has_errors(&self) -> bool {
        self.summary.violations_by_severity.has_blocking()
    }

    pub fn violations_by_severity(&self, severity: Severity) -> impl Iterator<Item = &Violation> {
        self.violations.iter().filter(move |v| v.severity == severity)
    }

    /// Violations produced by one rule
    pub fn violations_for_rule<'a>(
        &'a self,
        rule_id: &'a str,
    ) -> impl Iterator<Item = &'a Violation> + 'a {
        self.violations.iter().filter(move |v| v.rule_id == rule_id)
    }

    /// How often each rule fired, by rule id
    pub fn counts_by_rule(&self) -> BTreeMap<&str, usize> {
        let mut counts = BTreeMap::new();
        for violation in &self.violations {
            *counts.entry(violation.rule_id.as_str()).or_default() += 1;
        }
        counts
    }

    /// Number of distinct documents with at least one violation
    pub fn files_with_violations(&self) -> usize {
        self.violations.iter().map(|v| v.file_path.as_path()).collect::<BTreeSet<_>>().len()
    }

    pub fn set_files_analyzed(&mut self, count: usize) {
        self.summary.total_files = count;
    }

    pub fn set_execution_time(&mut self, duration_ms: u64) {
        self.summary.execution_time_ms = duration_ms;
    }

    /// Order by document, then position, most severe first on ties. The sort
    /// is stable, so same-position violations keep rulebook order.
    pub fn sort_violations(&mut self) {
        self.violations.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
    }
}

impl Default for ValidationReport {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors raised outside the detectors themselves
#[derive(Debug, thiserror::Error)]
pub enum GuardianError {
    /// Rulebook could not be loaded, parsed or validated
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("IO error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// A rule's pattern could not be compiled
    #[error("Pattern error: {message}")]
    Pattern { message: String },

    /// A document could not be analysed
    #[error("Analysis error in {file}: {message}")]
    Analysis { file: String, message: String },

    /// The gate itself failed (blocking violations present)
    #[error("Validation error: {message}")]
    Validation { message: String },
}

impl GuardianError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }

    pub fn pattern(message: impl Into<String>) -> Self {
        Self::Pattern { message: message.into() }
    }

    pub fn analysis(file: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Analysis { file: file.into(), message: message.into() }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation { message: message.into() }
    }
}

/// Result type for fallible guardian operations
pub type GuardianResult<T> = Result<T, GuardianError>;
