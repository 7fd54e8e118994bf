//! Report generation with multiple output formats
//!
//! Formatters translate a [`ValidationReport`] into text for people (human),
//! programs (JSON, SARIF) and CI systems (JUnit XML, GitHub Actions commands).

use crate::domain::violations::{GuardianError, GuardianResult, Severity, ValidationReport, Violation};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

const TOOL_NAME: &str = "markup-guardian";

/// Supported output formats for validation reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable format with colors and context
    Human,
    /// JSON format for programmatic consumption
    Json,
    /// JUnit XML format for CI/CD integration
    Junit,
    /// SARIF format for code scanning tools
    Sarif,
    /// GitHub Actions workflow commands
    GitHub,
}

impl OutputFormat {
    pub fn all_formats() -> &'static [&'static str] {
        &["human", "json", "junit", "sarif", "github"]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Human => "human",
            Self::Json => "json",
            Self::Junit => "junit",
            Self::Sarif => "sarif",
            Self::GitHub => "github",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = GuardianError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "human" => Ok(Self::Human),
            "json" => Ok(Self::Json),
            "junit" => Ok(Self::Junit),
            "sarif" => Ok(Self::Sarif),
            "github" => Ok(Self::GitHub),
            other => Err(GuardianError::config(format!(
                "Unknown output format '{other}'. Available: {}",
                Self::all_formats().join(", ")
            ))),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options for customizing report output
#[derive(Debug, Clone)]
pub struct ReportOptions {
    /// Whether to use ANSI colors (human format only)
    pub use_colors: bool,
    /// Whether to show the offending source line
    pub show_context: bool,
    pub show_suggestions: bool,
    /// Maximum number of violations to include
    pub max_violations: Option<usize>,
    /// Minimum severity level to include
    pub min_severity: Option<Severity>,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            use_colors: true,
            show_context: true,
            show_suggestions: true,
            max_violations: None,
            min_severity: None,
        }
    }
}

/// ANSI styles used by the human format
#[derive(Debug, Clone, Copy)]
enum Style {
    Bold,
    Dim,
    Red,
    Yellow,
    Green,
    Cyan,
}

impl Style {
    fn code(self) -> &'static str {
        match self {
            Self::Bold => "1",
            Self::Dim => "2",
            Self::Red => "31",
            Self::Yellow => "33",
            Self::Green => "32",
            Self::Cyan => "36",
        }
    }

    fn for_severity(severity: Severity) -> Self {
        match severity {
            Severity::Error => Self::Red,
            Severity::Warning => Self::Yellow,
            Severity::Info => Self::Cyan,
        }
    }
}

/// Main report formatter that dispatches to specific formatters
pub struct ReportFormatter {
    options: ReportOptions,
}

impl Default for ReportFormatter {
    fn default() -> Self {
        Self::new(ReportOptions::default())
    }
}

impl ReportFormatter {
    pub fn new(options: ReportOptions) -> Self {
        Self { options }
    }

    /// Format a validation report in the specified format
    pub fn format_report(
        &self,
        report: &ValidationReport,
        format: OutputFormat,
    ) -> GuardianResult<String> {
        let violations = self.filter_violations(&report.violations);

        match format {
            OutputFormat::Human => Ok(self.format_human(report, &violations)),
            OutputFormat::Json => self.format_json(report, &violations),
            OutputFormat::Junit => Ok(self.format_junit(report, &violations)),
            OutputFormat::Sarif => self.format_sarif(&violations),
            OutputFormat::GitHub => Ok(self.format_github(&violations)),
        }
    }

    fn filter_violations<'a>(&self, violations: &'a [Violation]) -> Vec<&'a Violation> {
        let mut filtered: Vec<&Violation> = violations
            .iter()
            .filter(|v| self.options.min_severity.map_or(true, |min| v.severity >= min))
            .collect();

        if let Some(max) = self.options.max_violations {
            filtered.truncate(max);
        }

        filtered
    }

    fn paint(&self, text: &str, style: Style) -> String {
        if self.options.use_colors {
            format!("\x1b[{}m{}\x1b[0m", style.code(), text)
        } else {
            text.to_string()
        }
    }

    fn format_human(&self, report: &ValidationReport, violations: &[&Violation]) -> String {
        let mut output = String::new();

        if violations.is_empty() {
            output.push_str(&self.paint("No markup violations found", Style::Green));
            output.push('\n');
        } else {
            let style = if report.has_errors() { Style::Red } else { Style::Yellow };
            output.push_str(&self.paint("Markup violations found", style));
            output.push_str("\n\n");

            let mut by_file: BTreeMap<&Path, Vec<&Violation>> = BTreeMap::new();
            for violation in violations {
                by_file.entry(violation.file_path.as_path()).or_default().push(*violation);
            }

            for (file_path, file_violations) in by_file {
                output.push_str(&self.paint(&file_path.display().to_string(), Style::Bold));
                output.push('\n');

                for violation in file_violations {
                    self.push_human_violation(&mut output, violation);
                }
            }
        }

        output.push_str(&self.format_summary(report));
        output
    }

    fn push_human_violation(&self, output: &mut String, violation: &Violation) {
        let position = match (violation.line_number, violation.column_number) {
            (Some(line), Some(col)) => format!("{line}:{col}"),
            (Some(line), None) => line.to_string(),
            _ => "?".to_string(),
        };

        output.push_str(&format!(
            "  {} [{}] {}\n",
            self.paint(&format!("{position} {}", violation.rule_id), Style::Dim),
            self.paint(violation.severity.as_str(), Style::for_severity(violation.severity)),
            violation.message
        ));

        if self.options.show_context {
            if let Some(context) = violation.context.as_deref().filter(|c| !c.is_empty()) {
                output.push_str(&format!("    | {}\n", self.paint(context, Style::Dim)));
            }
        }

        if self.options.show_suggestions {
            if let Some(suggestion) = &violation.suggested_fix {
                output.push_str(&format!("    = {}\n", self.paint(suggestion, Style::Green)));
            }
        }

        output.push('\n');
    }

    fn format_json(
        &self,
        report: &ValidationReport,
        violations: &[&Violation],
    ) -> GuardianResult<String> {
        let json_violations: Vec<JsonValue> = violations
            .iter()
            .map(|v| {
                serde_json::json!({
                    "rule_id": v.rule_id,
                    "severity": v.severity.as_str(),
                    "file_path": v.file_path.display().to_string(),
                    "line_number": v.line_number,
                    "column_number": v.column_number,
                    "message": v.message,
                    "context": v.context,
                    "suggested_fix": v.suggested_fix,
                    "detected_at": v.detected_at.to_rfc3339()
                })
            })
            .collect();

        let counts = &report.summary.violations_by_severity;
        let json_report = serde_json::json!({
            "violations": json_violations,
            "summary": {
                "total_files": report.summary.total_files,
                "files_with_violations": report.files_with_violations(),
                "violations_by_severity": {
                    "error": counts.error,
                    "warning": counts.warning,
                    "info": counts.info
                },
                "violations_by_rule": report.counts_by_rule(),
                "execution_time_ms": report.summary.execution_time_ms,
                "validated_at": report.summary.validated_at.to_rfc3339()
            }
        });

        serde_json::to_string_pretty(&json_report)
            .map_err(|e| GuardianError::config(format!("JSON serialization failed: {e}")))
    }

    /// One test case per violation; blocking ones are failures
    fn format_junit(&self, report: &ValidationReport, violations: &[&Violation]) -> String {
        let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");

        let failures = violations.iter().filter(|v| v.is_blocking()).count();
        let execution_time = (report.summary.execution_time_ms as f64) / 1000.0;

        xml.push_str(&format!(
            "<testsuite name=\"{TOOL_NAME}\" tests=\"{}\" failures=\"{failures}\" errors=\"0\" time=\"{execution_time:.3}\">\n",
            violations.len()
        ));

        for violation in violations {
            let location = format!(
                "{}:{}:{}",
                violation.file_path.display(),
                violation.line_number.unwrap_or(0),
                violation.column_number.unwrap_or(0)
            );
            xml.push_str(&format!(
                "  <testcase classname=\"{}\" name=\"{}\">\n",
                escape_xml(&violation.rule_id),
                escape_xml(&location)
            ));

            if violation.is_blocking() {
                xml.push_str(&format!(
                    "    <failure message=\"{}\">\n",
                    escape_xml(&violation.message)
                ));
                xml.push_str(&format!("      File: {}\n", escape_xml(&location)));
                if let Some(context) = &violation.context {
                    xml.push_str(&format!("      Context: {}\n", escape_xml(context)));
                }
                xml.push_str("    </failure>\n");
            } else {
                xml.push_str(&format!(
                    "    <system-out>{}: {}</system-out>\n",
                    violation.severity.as_str(),
                    escape_xml(&violation.message)
                ));
            }

            xml.push_str("  </testcase>\n");
        }

        xml.push_str("</testsuite>\n");
        xml
    }

    fn format_sarif(&self, violations: &[&Violation]) -> GuardianResult<String> {
        let results: Vec<JsonValue> = violations
            .iter()
            .map(|v| {
                let level = match v.severity {
                    Severity::Error => "error",
                    Severity::Warning => "warning",
                    Severity::Info => "note",
                };

                serde_json::json!({
                    "ruleId": v.rule_id,
                    "level": level,
                    "message": { "text": v.message },
                    "locations": [{
                        "physicalLocation": {
                            "artifactLocation": { "uri": v.file_path.display().to_string() },
                            "region": {
                                "startLine": v.line_number.unwrap_or(1),
                                "startColumn": v.column_number.unwrap_or(1)
                            },
                            "contextRegion": v.context.as_ref().map(|c| serde_json::json!({
                                "snippet": { "text": c }
                            }))
                        }
                    }]
                })
            })
            .collect();

        let sarif_report = serde_json::json!({
            "version": "2.1.0",
            "$schema": "https://json.schemastore.org/sarif-2.1.0.json",
            "runs": [{
                "tool": {
                    "driver": {
                        "name": TOOL_NAME,
                        "version": env!("CARGO_PKG_VERSION")
                    }
                },
                "results": results
            }]
        });

        serde_json::to_string_pretty(&sarif_report)
            .map_err(|e| GuardianError::config(format!("SARIF serialization failed: {e}")))
    }

    fn format_github(&self, violations: &[&Violation]) -> String {
        let mut output = String::new();

        for violation in violations {
            let level = match violation.severity {
                Severity::Error => "error",
                Severity::Warning => "warning",
                Severity::Info => "notice",
            };

            let position = match (violation.line_number, violation.column_number) {
                (Some(line), Some(col)) => format!(",line={line},col={col}"),
                (Some(line), None) => format!(",line={line}"),
                _ => String::new(),
            };

            output.push_str(&format!(
                "::{} file={}{},title={}::{}\n",
                level,
                violation.file_path.display(),
                position,
                violation.rule_id,
                escape_github(&violation.message)
            ));
        }

        output
    }

    fn format_summary(&self, report: &ValidationReport) -> String {
        let counts = &report.summary.violations_by_severity;
        let execution_time = (report.summary.execution_time_ms as f64) / 1000.0;
        let files = report.summary.total_files;
        let label = self.paint("Summary:", Style::Bold);

        if counts.total() == 0 {
            let none = self.paint("0 violations", Style::Green);
            return format!("{label} {none} in {files} files ({execution_time:.1}s)\n");
        }

        let plural = |n: usize| if n == 1 { "" } else { "s" };
        let mut parts = Vec::new();
        if counts.error > 0 {
            let text = format!("{} error{}", counts.error, plural(counts.error));
            parts.push(self.paint(&text, Style::Red));
        }
        if counts.warning > 0 {
            let text = format!("{} warning{}", counts.warning, plural(counts.warning));
            parts.push(self.paint(&text, Style::Yellow));
        }
        if counts.info > 0 {
            parts.push(self.paint(&format!("{} info", counts.info), Style::Cyan));
        }

        format!("{label} {} in {files} files ({execution_time:.1}s)\n", parts.join(", "))
    }
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Workflow command data must not contain raw `%`, CR or LF
fn escape_github(s: &str) -> String {
    s.replace('%', "%25").replace('\r', "%0D").replace('\n', "%0A")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn create_test_report() -> ValidationReport {
        let mut report = ValidationReport::new();

        report.add_violation(
            Violation::new(
                "forbidden_tag_font",
                Severity::Error,
                PathBuf::from("pages/index.html"),
                "Forbidden tag <font>: <font",
            )
            .with_position(42, 15)
            .with_context("<font color=\"red\">Скидка</font>")
            .with_suggestion("Use semantic markup and CSS instead"),
        );
        report.add_violation(
            Violation::new(
                "closed_empty_elements",
                Severity::Info,
                PathBuf::from("pages/index.html"),
                "Void element closed with \"/>\": <br/>",
            )
            .with_position(50, 9),
        );

        report.set_files_analyzed(10);
        report.set_execution_time(1200);
        report
    }

    fn plain() -> ReportFormatter {
        ReportFormatter::new(ReportOptions { use_colors: false, ..Default::default() })
    }

    #[test]
    fn test_human_format() {
        let output = plain().format_report(&create_test_report(), OutputFormat::Human).unwrap();

        assert!(output.contains("Markup violations found"));
        assert!(output.contains("pages/index.html"));
        assert!(output.contains("42:15 forbidden_tag_font [error] Forbidden tag <font>: <font"));
        assert!(output.contains("| <font color=\"red\">Скидка</font>"));
        assert!(output.contains("= Use semantic markup and CSS instead"));
        assert!(output.contains("Summary: 1 error, 1 info in 10 files (1.2s)"));
        assert!(!output.contains('\x1b'));
    }

    #[test]
    fn test_human_format_colors() {
        let output = ReportFormatter::default()
            .format_report(&create_test_report(), OutputFormat::Human)
            .unwrap();
        assert!(output.contains("\x1b[31merror\x1b[0m"));
    }

    #[test]
    fn test_json_format() {
        let output =
            ReportFormatter::default().format_report(&create_test_report(), OutputFormat::Json).unwrap();

        let json: JsonValue = serde_json::from_str(&output).unwrap();
        assert_eq!(json["violations"].as_array().map(Vec::len), Some(2));
        assert_eq!(json["violations"][0]["rule_id"], "forbidden_tag_font");
        assert_eq!(json["violations"][0]["line_number"], 42);
        assert_eq!(json["summary"]["total_files"], 10);
        assert_eq!(json["summary"]["violations_by_severity"]["info"], 1);
        assert_eq!(json["summary"]["violations_by_rule"]["forbidden_tag_font"], 1);
        assert_eq!(json["summary"]["files_with_violations"], 1);
    }

    #[test]
    fn test_junit_format() {
        let output = plain().format_report(&create_test_report(), OutputFormat::Junit).unwrap();

        assert!(output.starts_with("<?xml version=\"1.0\""));
        assert!(output.contains("tests=\"2\" failures=\"1\""));
        assert!(output.contains("<failure message=\"Forbidden tag &lt;font&gt;: &lt;font\">"));
        assert!(output.contains("<system-out>info: "));
    }

    #[test]
    fn test_sarif_format() {
        let output = plain().format_report(&create_test_report(), OutputFormat::Sarif).unwrap();
        let json: JsonValue = serde_json::from_str(&output).unwrap();

        assert_eq!(json["runs"][0]["tool"]["driver"]["name"], TOOL_NAME);
        assert_eq!(json["runs"][0]["results"][1]["level"], "note");
    }

    #[test]
    fn test_github_format() {
        let output = plain().format_report(&create_test_report(), OutputFormat::GitHub).unwrap();

        assert!(output.contains(
            "::error file=pages/index.html,line=42,col=15,title=forbidden_tag_font::Forbidden tag"
        ));
        assert!(output.contains("::notice file=pages/index.html,line=50,col=9"));
    }

    #[test]
    fn test_empty_report() {
        let output = plain().format_report(&ValidationReport::new(), OutputFormat::Human).unwrap();

        assert!(output.contains("No markup violations found"));
        assert!(output.contains("0 violations in 0 files"));
    }

    #[test]
    fn test_severity_and_count_filtering() {
        let report = create_test_report();

        let errors_only = ReportFormatter::new(ReportOptions {
            min_severity: Some(Severity::Warning),
            ..Default::default()
        });
        let json: JsonValue =
            serde_json::from_str(&errors_only.format_report(&report, OutputFormat::Json).unwrap())
                .unwrap();
        assert_eq!(json["violations"].as_array().map(Vec::len), Some(1));
        assert_eq!(json["violations"][0]["rule_id"], "forbidden_tag_font");

        let capped = ReportFormatter::new(ReportOptions {
            max_violations: Some(1),
            ..Default::default()
        });
        let output = capped.format_report(&report, OutputFormat::GitHub).unwrap();
        assert_eq!(output.lines().count(), 1);
    }

    #[test]
    fn test_output_format_parsing() {
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!("github".parse::<OutputFormat>().unwrap(), OutputFormat::GitHub);
        assert!("xml".parse::<OutputFormat>().is_err());
        assert_eq!(OutputFormat::Junit.to_string(), "junit");
    }
}
