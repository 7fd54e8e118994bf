//! Path filtering using .gitignore-style patterns
//!
//! Decides which files of a tree are HTML documents worth analysing: the
//! extension must be one of the configured document extensions, then the
//! configured patterns and any ignore files found up the tree are applied in
//! order, the last matching pattern winning.

use crate::config::PathConfig;
use crate::domain::violations::{GuardianError, GuardianResult};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Manages path filtering using .gitignore-style patterns
#[derive(Debug, Clone)]
pub struct PathFilter {
    patterns: Vec<FilterPattern>,
    /// Name of ignore files to process, if enabled
    ignore_filename: Option<String>,
    /// Lower-cased document extensions; empty means any file
    extensions: Vec<String>,
}

/// A single path filter pattern
#[derive(Debug, Clone)]
struct FilterPattern {
    pattern: glob::Pattern,
    /// `!pattern` re-includes what earlier patterns excluded
    is_include: bool,
    /// Trailing `/`: matches a directory and everything below it
    is_directory: bool,
    /// Contains `/`: matched against the whole path rather than the file name
    is_anchored: bool,
    original: String,
}

impl FilterPattern {
    fn parse(raw: &str) -> Result<Self, glob::PatternError> {
        let (is_include, body) = match raw.strip_prefix('!') {
            Some(stripped) => (true, stripped),
            None => (false, raw),
        };
        let is_directory = body.ends_with('/');
        let body = body.trim_end_matches('/');
        let body = body.strip_prefix('/').unwrap_or(body);

        Ok(Self {
            pattern: glob::Pattern::new(body)?,
            is_include,
            is_directory,
            is_anchored: body.contains('/'),
            original: raw.to_string(),
        })
    }

    fn matches(&self, path: &Path) -> bool {
        if self.is_directory {
            return path.ancestors().skip(1).any(|dir| self.matches_single(dir));
        }
        self.matches_single(path)
    }

    fn matches_single(&self, path: &Path) -> bool {
        if self.is_anchored {
            return self.pattern.matches_path(path);
        }
        path.file_name().is_some_and(|name| self.pattern.matches(&name.to_string_lossy()))
    }
}

impl PathFilter {
    /// Create a filter from raw patterns, an optional ignore file name and
    /// the accepted document extensions
    pub fn new(
        patterns: Vec<String>,
        ignore_filename: Option<String>,
        extensions: Vec<String>,
    ) -> GuardianResult<Self> {
        let patterns = patterns
            .iter()
            .map(|raw| {
                FilterPattern::parse(raw)
                    .map_err(|e| GuardianError::pattern(format!("Invalid pattern '{raw}': {e}")))
            })
            .collect::<GuardianResult<Vec<_>>>()?;

        Ok(Self {
            patterns,
            ignore_filename,
            extensions: extensions.into_iter().map(|ext| ext.to_ascii_lowercase()).collect(),
        })
    }

    /// Build the filter described by a rulebook's `paths` section
    pub fn from_config(paths: &PathConfig) -> GuardianResult<Self> {
        Self::new(paths.patterns.clone(), paths.ignore_file.clone(), paths.extensions.clone())
    }

    /// Stop consulting ignore files
    pub fn without_ignore_files(mut self) -> Self {
        self.ignore_filename = None;
        self
    }

    /// Whether the file looks like a document by extension
    pub fn is_document<P: AsRef<Path>>(&self, path: P) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
    }

    /// Check if a file should be analyzed based on extension, patterns and ignore files
    pub fn should_analyze<P: AsRef<Path>>(&self, path: P) -> GuardianResult<bool> {
        let path = path.as_ref();
        self.should_analyze_within(path, path)
    }

    /// Like [`should_analyze`](Self::should_analyze), matching patterns
    /// against `relative` (the path below a walked root)
    fn should_analyze_within(&self, path: &Path, relative: &Path) -> GuardianResult<bool> {
        if !self.is_document(path) || self.is_excluded(relative) {
            return Ok(false);
        }

        if self.ignore_filename.is_some() && self.is_ignored_by_files(path)? {
            return Ok(false);
        }

        Ok(true)
    }

    /// Whether the configured patterns exclude a path
    fn is_excluded(&self, path: &Path) -> bool {
        let mut excluded = false;
        for pattern in &self.patterns {
            if pattern.matches(path) {
                excluded = !pattern.is_include;
            }
        }
        excluded
    }

    /// Check ignore files from the root down to the file's directory
    fn is_ignored_by_files(&self, path: &Path) -> GuardianResult<bool> {
        let Some(ignore_filename) = &self.ignore_filename else {
            return Ok(false);
        };

        let mut dirs: Vec<&Path> = path.ancestors().skip(1).collect();
        dirs.reverse();

        let mut is_ignored = false;
        for dir in dirs {
            let ignore_file = dir.join(ignore_filename);
            if !ignore_file.is_file() {
                continue;
            }

            let Ok(relative_path) = path.strip_prefix(dir) else {
                continue;
            };
            for pattern in self.load_ignore_file(&ignore_file)? {
                if pattern.matches(relative_path) {
                    is_ignored = !pattern.is_include;
                }
            }
        }

        Ok(is_ignored)
    }

    /// Load patterns from an ignore file, skipping invalid lines
    fn load_ignore_file(&self, path: &Path) -> GuardianResult<Vec<FilterPattern>> {
        let content = fs::read_to_string(path).map_err(|e| {
            GuardianError::config(format!("Failed to read ignore file '{}': {}", path.display(), e))
        })?;

        let mut patterns = Vec::new();
        for line in content.lines().map(str::trim) {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            match FilterPattern::parse(line) {
                Ok(pattern) => patterns.push(pattern),
                Err(e) => {
                    tracing::warn!("Invalid pattern '{}' in {}: {}", line, path.display(), e);
                }
            }
        }

        Ok(patterns)
    }

    /// All documents under `root` that should be analyzed, sorted
    pub fn find_files<P: AsRef<Path>>(&self, root: P) -> GuardianResult<Vec<PathBuf>> {
        let root = root.as_ref();
        let mut files = Vec::new();

        let walker = WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| {
                let relative = relative_to(entry.path(), root);
                entry.depth() == 0 || !self.is_excluded_dir(entry.path(), relative)
            });

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("Skipping unreadable entry under {}: {}", root.display(), e);
                    continue;
                }
            };

            let relative = relative_to(entry.path(), root);
            if entry.file_type().is_file() && self.should_analyze_within(entry.path(), relative)? {
                files.push(entry.into_path());
            }
        }

        files.sort();
        Ok(files)
    }

    /// Directories excluded outright are not descended into
    fn is_excluded_dir(&self, dir: &Path, relative: &Path) -> bool {
        if !dir.is_dir() {
            return false;
        }
        let mut excluded = false;
        for pattern in self.patterns.iter().filter(|p| p.is_directory) {
            if pattern.matches_single(relative) {
                excluded = !pattern.is_include;
            }
        }
        excluded
    }

    /// Filter a list of paths to only those that should be analyzed
    pub fn filter_paths<P: AsRef<Path>>(&self, paths: &[P]) -> GuardianResult<Vec<PathBuf>> {
        let mut filtered = Vec::new();
        for path in paths {
            if self.should_analyze(path)? {
                filtered.push(path.as_ref().to_path_buf());
            }
        }
        Ok(filtered)
    }

    /// Append a pattern; later patterns take precedence
    pub fn add_pattern(&mut self, pattern: impl AsRef<str>) -> GuardianResult<()> {
        let raw = pattern.as_ref();
        let parsed = FilterPattern::parse(raw)
            .map_err(|e| GuardianError::pattern(format!("Invalid pattern '{raw}': {e}")))?;
        self.patterns.push(parsed);
        Ok(())
    }

    /// Which patterns match a path, for `--verbose` diagnostics
    pub fn debug_patterns<P: AsRef<Path>>(&self, path: P) -> Vec<String> {
        let path = path.as_ref();
        self.patterns
            .iter()
            .enumerate()
            .map(|(i, pattern)| {
                let verdict = if pattern.matches(path) { "MATCH" } else { "no match" };
                format!("Pattern {}: {} -> {}", i, pattern.original, verdict)
            })
            .collect()
    }
}

fn relative_to<'a>(path: &'a Path, root: &Path) -> &'a Path {
    path.strip_prefix(root).unwrap_or(path)
}
