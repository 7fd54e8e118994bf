//! Markup Guardian CLI - command-line interface for the HTML linter
//!
//! Translates commands into library calls and owns the process concerns:
//! rulebook discovery, terminal output, file watching and exit codes.

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand, ValueEnum};
use markup_guardian::config::CONFIG_FILE_NAMES;
use markup_guardian::patterns::library;
use markup_guardian::{
    AnalysisOptions, GuardianConfig, MarkupValidator, OutputFormat, ReportFormatter,
    ReportOptions, RuleType, Severity,
};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

/// Markup Guardian - style and structure linter for HTML
#[derive(Parser)]
#[command(name = "markup-guardian")]
#[command(version)]
#[command(about = "Style and structure linter for hand-authored HTML")]
#[command(
    long_about = "Markup Guardian checks HTML documents for forbidden tags and attributes, \
    whitespace and quoting style, broken nesting and accessibility problems. \
    Designed for pre-commit hooks and CI pipelines."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Rulebook file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Check documents for markup violations
    Check(CheckArgs),

    /// Watch for file changes and re-run checks
    Watch {
        /// Path to watch (defaults to current directory)
        path: Option<PathBuf>,

        /// File patterns to watch (glob patterns)
        #[arg(short, long, action = clap::ArgAction::Append)]
        pattern: Vec<String>,

        /// Debounce delay in milliseconds
        #[arg(long, default_value = "500")]
        delay: u64,
    },

    /// Validate a rulebook file
    ValidateConfig {
        /// Rulebook to validate
        config_file: Option<PathBuf>,
    },

    /// Explain what a specific rule does
    Explain {
        /// Rule ID to explain
        rule_id: String,
    },

    /// List configured rules
    Rules {
        /// Show only enabled rules
        #[arg(long)]
        enabled_only: bool,

        /// Filter by category
        #[arg(long)]
        category: Option<String>,
    },
}

#[derive(Args)]
struct CheckArgs {
    /// Paths to analyze (files or directories)
    paths: Vec<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "human")]
    format: OutputFormatArg,

    /// Minimum severity level to report
    #[arg(short, long, value_enum)]
    severity: Option<SeverityArg>,

    /// Maximum number of violations to report
    #[arg(long)]
    max_violations: Option<usize>,

    /// Additional exclude patterns
    #[arg(long, action = clap::ArgAction::Append)]
    exclude: Vec<String>,

    /// Ignore .guardianignore files
    #[arg(long)]
    no_ignore: bool,

    /// Disable parallel processing
    #[arg(long)]
    no_parallel: bool,

    /// Stop at the first unreadable file
    #[arg(long)]
    fail_fast: bool,
}

#[derive(Copy, Clone, ValueEnum, PartialEq)]
enum OutputFormatArg {
    Human,
    Json,
    Junit,
    Sarif,
    Github,
}

impl From<OutputFormatArg> for OutputFormat {
    fn from(arg: OutputFormatArg) -> Self {
        match arg {
            OutputFormatArg::Human => OutputFormat::Human,
            OutputFormatArg::Json => OutputFormat::Json,
            OutputFormatArg::Junit => OutputFormat::Junit,
            OutputFormatArg::Sarif => OutputFormat::Sarif,
            OutputFormatArg::Github => OutputFormat::GitHub,
        }
    }
}

#[derive(Copy, Clone, ValueEnum)]
enum SeverityArg {
    Info,
    Warning,
    Error,
}

impl From<SeverityArg> for Severity {
    fn from(arg: SeverityArg) -> Self {
        match arg {
            SeverityArg::Info => Severity::Info,
            SeverityArg::Warning => Severity::Warning,
            SeverityArg::Error => Severity::Error,
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    match run_command(cli).await {
        Ok(exit_code) => process::exit(exit_code),
        Err(e) => {
            eprintln!("Error: {e:#}");
            process::exit(1);
        }
    }
}

async fn run_command(cli: Cli) -> anyhow::Result<i32> {
    let use_colors = !cli.no_color && std::io::stdout().is_terminal();

    match cli.command {
        Commands::Check(args) => run_check(cli.config.as_deref(), args, use_colors),
        Commands::Watch { path, pattern, delay } => {
            run_watch(cli.config.as_deref(), path, pattern, delay, use_colors).await
        }
        Commands::ValidateConfig { config_file } => run_validate_config(config_file.or(cli.config)),
        Commands::Explain { rule_id } => run_explain(cli.config.as_deref(), &rule_id),
        Commands::Rules { enabled_only, category } => {
            run_list_rules(cli.config.as_deref(), enabled_only, category.as_deref())
        }
    }
}

/// `--config` if given, else a rulebook in the working directory, else the
/// built-in rulebook
fn load_config(config_path: Option<&Path>) -> anyhow::Result<GuardianConfig> {
    let discovered;
    let path: &Path = match config_path {
        Some(path) => path,
        None => match GuardianConfig::discover(Path::new(".")) {
            Some(path) => {
                discovered = path;
                discovered.as_path()
            }
            None => {
                tracing::debug!("No rulebook found, using built-in rules");
                return Ok(GuardianConfig::default());
            }
        },
    };

    tracing::debug!("Loading rulebook from {}", path.display());
    GuardianConfig::load_from_file(path)
        .with_context(|| format!("Failed to load rulebook {}", path.display()))
}

fn run_check(config_path: Option<&Path>, args: CheckArgs, use_colors: bool) -> anyhow::Result<i32> {
    let config = load_config(config_path)?;
    let formatter = ReportFormatter::new(ReportOptions {
        use_colors,
        max_violations: args.max_violations,
        min_severity: args.severity.map(Severity::from),
        ..Default::default()
    });
    let validator = MarkupValidator::new_with_config(config)?.with_report_formatter(formatter);

    let paths = if args.paths.is_empty() { vec![PathBuf::from(".")] } else { args.paths };

    let options = AnalysisOptions {
        parallel: !args.no_parallel,
        fail_fast: args.fail_fast,
        exclude_patterns: args.exclude,
        ignore_ignore_files: args.no_ignore,
        ..Default::default()
    };

    let report = validator.validate_paths(&paths, &options)?;

    let formatted = validator.format_report(&report, args.format.into())?;
    print!("{formatted}");

    Ok(if report.has_errors() { 1 } else { 0 })
}

async fn run_watch(
    config_path: Option<&Path>,
    path: Option<PathBuf>,
    patterns: Vec<String>,
    delay_ms: u64,
    use_colors: bool,
) -> anyhow::Result<i32> {
    use notify::{Event, RecursiveMode, Result as NotifyResult, Watcher};
    use tokio::sync::mpsc;

    let watch_path = path.unwrap_or_else(|| PathBuf::from("."));
    let watch_patterns =
        if patterns.is_empty() { vec!["**/*.html".to_string(), "**/*.htm".to_string()] } else { patterns };
    let globs = watch_patterns
        .iter()
        .map(|p| glob::Pattern::new(p).with_context(|| format!("Invalid watch pattern '{p}'")))
        .collect::<anyhow::Result<Vec<_>>>()?;

    println!("Watching {} ({})", watch_path.display(), watch_patterns.join(", "));
    println!("Debounce delay: {delay_ms}ms. Press Ctrl+C to stop.\n");

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut watcher = notify::recommended_watcher(move |res: NotifyResult<Event>| match res {
        Ok(event) => {
            let _ = tx.send(event);
        }
        Err(e) => tracing::warn!("Watch error: {}", e),
    })
    .context("Failed to create file watcher")?;

    watcher
        .watch(&watch_path, RecursiveMode::Recursive)
        .with_context(|| format!("Failed to watch path '{}'", watch_path.display()))?;

    let mut config_path = config_path.map(Path::to_path_buf);
    run_watch_analysis(config_path.as_deref(), &watch_path, use_colors);

    let debounce = Duration::from_millis(delay_ms);
    let mut pending: Option<Instant> = None;

    loop {
        match tokio::time::timeout(Duration::from_millis(100), rx.recv()).await {
            Ok(Some(event)) => {
                if let Some(changed) = config_change(&event) {
                    println!("Rulebook changed: {}", changed.display());
                    config_path = Some(changed);
                    pending = Some(Instant::now());
                } else if should_trigger_analysis(&event, &watch_path, &globs) {
                    pending = Some(Instant::now());
                }
            }
            Ok(None) => {
                tracing::warn!("File watcher disconnected");
                break;
            }
            Err(_) => {}
        }

        if pending.is_some_and(|since| since.elapsed() >= debounce) {
            pending = None;
            if use_colors {
                print!("\x1b[2J\x1b[H");
            }
            run_watch_analysis(config_path.as_deref(), &watch_path, use_colors);
        }
    }

    Ok(0)
}

/// Whether an event touches a watched document
fn should_trigger_analysis(event: &notify::Event, root: &Path, globs: &[glob::Pattern]) -> bool {
    use notify::EventKind;

    if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)) {
        return false;
    }

    event.paths.iter().any(|path| {
        let relative = path.strip_prefix(root).unwrap_or(path);
        globs.iter().any(|glob| glob.matches_path(relative) || glob.matches_path(path))
    })
}

/// The rulebook file an event touches, if any
fn config_change(event: &notify::Event) -> Option<PathBuf> {
    use notify::EventKind;

    if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
        return None;
    }

    event
        .paths
        .iter()
        .find(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| CONFIG_FILE_NAMES.contains(&name))
        })
        .cloned()
}

/// One watch-mode pass; failures are printed and the watch continues
fn run_watch_analysis(config_path: Option<&Path>, watch_path: &Path, use_colors: bool) {
    let config = match load_config(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e:#}");
            eprintln!("Using built-in rules instead");
            GuardianConfig::default()
        }
    };

    let formatter = ReportFormatter::new(ReportOptions { use_colors, ..Default::default() });
    let result = MarkupValidator::new_with_config(config).and_then(|validator| {
        let validator = validator.with_report_formatter(formatter);
        let report = validator.validate_directory(watch_path, &AnalysisOptions::default())?;
        validator.format_report(&report, OutputFormat::Human)
    });

    match result {
        Ok(formatted) => {
            print!("{formatted}");
            println!("Watching for changes...\n");
        }
        Err(e) => eprintln!("Analysis failed: {e}"),
    }
}

fn run_validate_config(config_path: Option<PathBuf>) -> anyhow::Result<i32> {
    let Some(config_path) = config_path.or_else(|| GuardianConfig::discover(Path::new("."))) else {
        bail!("No rulebook found (looked for {})", CONFIG_FILE_NAMES.join(", "));
    };

    println!("Validating rulebook: {}", config_path.display());

    match GuardianConfig::load_from_file(&config_path) {
        Ok(config) => {
            let validator = MarkupValidator::new_with_config(config)?;
            let stats = validator.pattern_statistics();

            println!("Rulebook is valid");
            println!(
                "  Categories: {} total, {} enabled",
                stats.total_categories(),
                stats.enabled_categories
            );
            println!("  Rules: {} total, {} enabled", stats.total_rules(), stats.enabled_rules);
            println!("  Path patterns: {}", validator.config().paths.patterns.len());

            Ok(0)
        }
        Err(e) => {
            eprintln!("Rulebook validation failed: {e}");
            Ok(1)
        }
    }
}

fn run_explain(config_path: Option<&Path>, rule_id: &str) -> anyhow::Result<i32> {
    let config = load_config(config_path)?;

    let Some((category_name, category, rule)) = config.find_rule(rule_id) else {
        eprintln!("Rule '{rule_id}' not found");
        println!("\nAvailable rules:");
        for (category_name, category) in &config.patterns {
            println!("  {category_name}:");
            for rule in &category.rules {
                println!("    - {}", rule.id);
            }
        }
        return Ok(1);
    };

    println!("Rule:     {}", rule.id);
    println!("Category: {category_name}");
    println!("Severity: {}", config.effective_severity(category, rule).as_str());
    println!("Type:     {}", rule.rule_type.as_str());
    println!("Enabled:  {}", rule.enabled && category.enabled);
    println!();
    println!("Message:  {}", rule.message);
    println!("Pattern:  {}", rule.pattern);

    let compiled = match rule.rule_type {
        RuleType::Tag => library::tag(&rule.pattern).ok(),
        RuleType::Attribute => library::attrs(&rule.pattern).ok(),
        RuleType::Codestyle => library::by_name(&rule.pattern),
        RuleType::LineLength => {
            rule.pattern.parse().ok().and_then(|limit| library::max_line_length(limit).ok())
        }
        RuleType::Structure | RuleType::Regex => None,
    };
    if let Some(matcher) = compiled {
        println!("Regex:    {}", matcher.as_str());
    }

    if let Some(suggestion) = &rule.suggestion {
        println!("Fix:      {suggestion}");
    }
    if let Some(patterns) = rule.exclude_if.as_ref().and_then(|e| e.file_patterns.as_ref()) {
        println!("Skipped in: {}", patterns.join(", "));
    }

    Ok(0)
}

fn run_list_rules(
    config_path: Option<&Path>,
    enabled_only: bool,
    category_filter: Option<&str>,
) -> anyhow::Result<i32> {
    let config = load_config(config_path)?;

    for (category_name, category) in &config.patterns {
        if category_filter.is_some_and(|filter| filter != category_name.as_str()) {
            continue;
        }
        if enabled_only && !category.enabled {
            continue;
        }

        let status = if category.enabled { "on " } else { "off" };
        println!("[{status}] {} ({})", category_name, category.severity.as_str());

        for rule in &category.rules {
            if enabled_only && !rule.enabled {
                continue;
            }

            let rule_status = if rule.enabled { "on " } else { "off" };
            let severity = config.effective_severity(category, rule);
            println!("  [{rule_status}] {} [{}] - {}", rule.id, severity.as_str(), rule.message);
        }
        println!();
    }

    Ok(0)
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
