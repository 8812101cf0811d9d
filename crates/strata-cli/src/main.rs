//! strata - Identify unknown game asset files and track engine format lineage
//!
//! This tool ranks every plausible format of a file, classifies it against
//! a timeline of RAGE engine generations, and runs either analysis over
//! whole directory trees in parallel.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use strata_core::{
    BatchCoordinator, DiscoveryEngine, DiscoveryResult, EvolutionResult, EvolutionaryClassifier,
    ItemOutcome, LineageLog, PluginRegistry, ProgressSink, Settings,
};
use tracing::{debug, info, trace, warn, Level};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

/// Identify unknown game asset files and track engine format lineage
#[derive(Parser, Debug)]
#[command(name = "strata")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Settings file (JSON)
    #[arg(short, long, global = true, env = "STRATA_CONFIG")]
    config: Option<PathBuf>,

    /// Additional plugin manifest directory (repeatable)
    #[arg(short = 'p', long = "plugins", global = true)]
    plugin_dirs: Vec<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value = "text", global = true)]
    format: OutputFormat,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Rank candidate formats for files or directories
    Discover {
        /// Files or directories to analyze
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Only print the best candidate per file
        #[arg(long)]
        primary_only: bool,
    },

    /// Classify files against engine generations
    Evolve {
        /// Files or directories to analyze
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Lineage log to load and update
        #[arg(long)]
        lineage_log: Option<PathBuf>,
    },

    /// Show the cross-generation patterns learned so far
    Report {
        /// Lineage log to read
        #[arg(long)]
        lineage_log: Option<PathBuf>,
    },

    /// List loaded plugins
    Plugins,

    /// Analyze many files in parallel
    Batch {
        /// Files or directories to analyze
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Number of worker threads
        #[arg(short, long)]
        jobs: Option<usize>,

        /// Analysis to run on each file
        #[arg(long, value_enum, default_value = "discover")]
        mode: BatchMode,

        /// Skip files whose contents were already queued
        #[arg(long)]
        dedup: bool,

        /// Lineage log to load and update (evolve mode)
        #[arg(long)]
        lineage_log: Option<PathBuf>,
    },
}

/// Output format for results
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// Human-readable text
    Text,
    /// Pretty-printed JSON
    Json,
}

/// Analysis run by `batch`
#[derive(Debug, Clone, Copy, ValueEnum)]
enum BatchMode {
    /// Multi-candidate format discovery
    Discover,
    /// Engine generation classification
    Evolve,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let settings = load_settings(&cli)?;

    match &cli.command {
        Command::Discover {
            paths,
            primary_only,
        } => run_discover(&cli, &settings, paths, *primary_only),
        Command::Evolve { paths, lineage_log } => {
            run_evolve(&cli, &settings, paths, lineage_log.as_deref())
        }
        Command::Report { lineage_log } => run_report(&cli, &settings, lineage_log.as_deref()),
        Command::Plugins => run_plugins(&cli, &settings),
        Command::Batch {
            inputs,
            jobs,
            mode,
            dedup,
            lineage_log,
        } => run_batch(
            &cli,
            &settings,
            BatchArgs {
                inputs,
                jobs: *jobs,
                mode: *mode,
                dedup: *dedup,
                lineage_log: lineage_log.as_deref(),
            },
        ),
    }
}

/// Load the settings file, if any, and apply command-line overrides
fn load_settings(cli: &Cli) -> Result<Settings> {
    let mut settings = match &cli.config {
        Some(path) => Settings::load(path)
            .with_context(|| format!("Failed to load settings: {}", path.display()))?,
        None => Settings::default(),
    };
    settings.plugin_dirs.extend(cli.plugin_dirs.iter().cloned());
    debug!("Settings: {:?}", settings);
    Ok(settings)
}

/// Load built-in plugins plus the configured manifest directories
fn load_registry(settings: &Settings) -> Arc<PluginRegistry> {
    let registry = PluginRegistry::with_builtins();
    let report = registry.load(settings.plugin_dirs.as_slice());
    for failure in &report.failed {
        warn!("Plugin not loaded: {}", failure);
    }
    info!("Loaded {} plugin(s)", report.loaded.len());
    Arc::new(registry)
}

fn lineage_path<'a>(flag: Option<&'a Path>, settings: &'a Settings) -> Option<&'a Path> {
    flag.or(settings.lineage_log.as_deref())
}

fn load_classifier(settings: &Settings, log_path: Option<&Path>) -> Result<EvolutionaryClassifier> {
    let classifier = EvolutionaryClassifier::new().with_config(settings.classifier.clone());
    match log_path {
        Some(path) => {
            let log = LineageLog::load(path)
                .with_context(|| format!("Failed to load lineage log: {}", path.display()))?;
            debug!("Loaded {} lineage pattern(s) from {}", log.len(), path.display());
            Ok(classifier.with_log(log))
        }
        None => Ok(classifier),
    }
}

fn save_classifier_log(classifier: &EvolutionaryClassifier, log_path: Option<&Path>) -> Result<()> {
    if let Some(path) = log_path {
        classifier
            .save_log(path)
            .with_context(|| format!("Failed to save lineage log: {}", path.display()))?;
        info!("Lineage log written to {}", path.display());
    }
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{}", json)?;
    Ok(())
}

fn run_discover(cli: &Cli, settings: &Settings, paths: &[PathBuf], primary_only: bool) -> Result<()> {
    let files = collect_inputs(paths)?;
    let engine = DiscoveryEngine::from_registry(load_registry(settings), settings.discovery.clone());

    let mut results = Vec::new();
    for file in &files {
        match engine.discover(file) {
            Ok(result) => results.push(result),
            Err(e) => warn!("Error processing {}: {}", file.display(), e),
        }
    }

    if primary_only {
        for result in &mut results {
            result.candidates.truncate(1);
        }
    }

    match cli.format {
        OutputFormat::Json => print_json(&results),
        OutputFormat::Text => {
            for result in &results {
                print!("{}", render_discovery(result));
            }
            Ok(())
        }
    }
}

fn render_discovery(result: &DiscoveryResult) -> String {
    let mut out = format!("{} ({} bytes)\n", result.path.display(), result.file_size);
    if result.is_unrecognized() {
        out.push_str("  no candidates\n");
        return out;
    }
    for candidate in &result.candidates {
        out.push_str(&format!(
            "  {:<28} {:>5.1}%  {:<9}{}\n",
            candidate.format,
            candidate.confidence * 100.0,
            candidate.method,
            if candidate.can_process { "  processable" } else { "" }
        ));
        if !candidate.games.is_empty() {
            let games: Vec<&str> = candidate.games.iter().map(String::as_str).collect();
            out.push_str(&format!("      games: {}\n", games.join(", ")));
        }
        for evidence in &candidate.evidence {
            out.push_str(&format!("      - {}\n", evidence));
        }
    }
    out
}

fn run_evolve(
    cli: &Cli,
    settings: &Settings,
    paths: &[PathBuf],
    lineage_log: Option<&Path>,
) -> Result<()> {
    let files = collect_inputs(paths)?;
    let log_path = lineage_path(lineage_log, settings);
    let classifier = load_classifier(settings, log_path)?;

    let mut results = Vec::new();
    for file in &files {
        match classifier.analyze(file) {
            Ok(result) => results.push(result),
            Err(e) => warn!("Error processing {}: {}", file.display(), e),
        }
    }
    save_classifier_log(&classifier, log_path)?;

    match cli.format {
        OutputFormat::Json => print_json(&results),
        OutputFormat::Text => {
            for result in &results {
                print!("{}", render_evolution(result));
            }
            Ok(())
        }
    }
}

fn render_evolution(result: &EvolutionResult) -> String {
    let mut out = format!("{}\n  reader: {}\n", result.path.display(), result.recommended_reader);
    for m in &result.matches {
        out.push_str(&format!(
            "  {:<22} {:>5.1}%  {}\n",
            m.profile,
            m.confidence * 100.0,
            m.methods.join("; ")
        ));
    }
    for insight in &result.insights {
        out.push_str(&format!("  * {}\n", insight));
    }
    if let Some(pattern) = &result.new_pattern {
        out.push_str(&format!("  new lineage pattern: {}\n", pattern));
    }
    out
}

fn run_report(cli: &Cli, settings: &Settings, lineage_log: Option<&Path>) -> Result<()> {
    let Some(path) = lineage_path(lineage_log, settings) else {
        bail!("No lineage log given (use --lineage-log or set lineage_log in the settings file)");
    };
    let report = load_classifier(settings, Some(path))?.learning_report();

    match cli.format {
        OutputFormat::Json => print_json(&report),
        OutputFormat::Text => {
            println!("Analyses: {}", report.total_analyses);
            println!("Distinct patterns: {}", report.distinct_patterns);
            for record in &report.patterns {
                println!(
                    "  {}  first seen {}{}",
                    record.pattern,
                    record.first_seen.format("%Y-%m-%d %H:%M:%S UTC"),
                    record
                        .file_type_hint
                        .as_deref()
                        .map(|h| format!(" (.{})", h))
                        .unwrap_or_default()
                );
            }
            println!("Engine timeline:");
            for entry in &report.engine_timeline {
                println!("  {}", entry);
            }
            Ok(())
        }
    }
}

fn run_plugins(cli: &Cli, settings: &Settings) -> Result<()> {
    let registry = load_registry(settings);
    let plugins = registry.list();

    match cli.format {
        OutputFormat::Json => print_json(&plugins),
        OutputFormat::Text => {
            for plugin in &plugins {
                println!(
                    "{} v{}{}",
                    plugin.name,
                    plugin.version,
                    if plugin.base { " [base]" } else { "" }
                );
                if !plugin.description.is_empty() {
                    println!("  {}", plugin.description);
                }
                println!("  formats: {}", plugin.formats.join(", "));
                if !plugin.games.is_empty() {
                    println!("  games: {}", plugin.games.join(", "));
                }
            }
            Ok(())
        }
    }
}

struct BatchArgs<'a> {
    inputs: &'a [PathBuf],
    jobs: Option<usize>,
    mode: BatchMode,
    dedup: bool,
    lineage_log: Option<&'a Path>,
}

fn run_batch(cli: &Cli, settings: &Settings, args: BatchArgs<'_>) -> Result<()> {
    let mut files = collect_inputs(args.inputs)?;
    if args.dedup {
        let mut registry = ContentRegistry::new();
        files = registry.dedup(files);
        info!(
            "Deduplicated inputs: {} unique, {} duplicate(s) skipped",
            files.len(),
            registry.duplicates_skipped
        );
    }

    let mut config = settings.batch.clone();
    if let Some(jobs) = args.jobs {
        config = config.concurrency(jobs);
    }
    let coordinator = BatchCoordinator::new().with_config(config);

    // Progress goes to stderr so JSON on stdout stays clean
    let show_progress = cli.format == OutputFormat::Text && cli.verbose == 0;
    let progress = |percent: f64, message: &str| {
        eprint!("\r[{:5.1}%] {}", percent, message);
    };
    let sink: Option<&dyn ProgressSink> = if show_progress { Some(&progress) } else { None };

    let result = match args.mode {
        BatchMode::Discover => {
            let engine =
                DiscoveryEngine::from_registry(load_registry(settings), settings.discovery.clone());
            coordinator.run(
                &files,
                |path| match engine.discover(path) {
                    Ok(r) => match &r.primary {
                        Some(primary) => {
                            info!(
                                "{}: {} ({:.1}%)",
                                path.display(),
                                primary.format,
                                primary.confidence * 100.0
                            );
                            ItemOutcome::Success
                        }
                        None => ItemOutcome::Failed("no format candidates".to_string()),
                    },
                    Err(e) => ItemOutcome::Error(e.to_string()),
                },
                sink,
            )
        }
        BatchMode::Evolve => {
            let log_path = lineage_path(args.lineage_log, settings);
            let classifier = load_classifier(settings, log_path)?;
            let result = coordinator.run(
                &files,
                |path| {
                    classifier
                        .analyze(path)
                        .map(|r| info!("{}: {}", path.display(), r.recommended_reader))
                        .into()
                },
                sink,
            );
            save_classifier_log(&classifier, log_path)?;
            result
        }
    };
    if show_progress && result.total > 0 {
        eprintln!();
    }

    match cli.format {
        OutputFormat::Json => print_json(&result)?,
        OutputFormat::Text => {
            println!(
                "Processed {} file(s): {} succeeded, {} failed{}",
                result.total,
                result.succeeded,
                result.failed,
                if result.cancelled {
                    format!(", {} skipped (cancelled)", result.skipped)
                } else {
                    String::new()
                }
            );
            for error in &result.errors {
                println!("  {}", error);
            }
        }
    }
    Ok(())
}

/// Expand files and directories into a sorted list of files
fn collect_inputs(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_file() {
            files.push(input.clone());
        } else if input.is_dir() {
            debug!("Scanning directory: {}", input.display());
            for entry in WalkDir::new(input)
                .follow_links(false)
                .sort_by_file_name()
                .into_iter()
                .filter_entry(|e| e.depth() == 0 || !is_hidden(e.path()))
                .filter_map(|e| e.ok())
            {
                if entry.file_type().is_file() {
                    files.push(entry.into_path());
                }
            }
        } else {
            bail!("Input does not exist: {}", input.display());
        }
    }
    trace!("Collected {} input file(s)", files.len());
    Ok(files)
}

/// Dotfiles and dot-directories
fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.'))
        .unwrap_or(false)
}

/// Tracks file contents already queued, by content hash
#[derive(Default)]
struct ContentRegistry {
    /// Maps content hash -> first path seen with that content
    seen: HashMap<String, PathBuf>,
    duplicates_skipped: usize,
}

impl ContentRegistry {
    fn new() -> Self {
        Self::default()
    }

    /// Compute a short hash of the content (first 16 chars of blake3)
    fn content_hash(data: &[u8]) -> String {
        blake3::hash(data).to_hex()[..16].to_string()
    }

    /// Keep the first path for each distinct content; unreadable files
    /// are kept so the batch reports them
    fn dedup(&mut self, files: Vec<PathBuf>) -> Vec<PathBuf> {
        let mut unique = Vec::with_capacity(files.len());
        for file in files {
            let data = match fs::read(&file) {
                Ok(data) => data,
                Err(e) => {
                    trace!("Cannot hash {}: {}", file.display(), e);
                    unique.push(file);
                    continue;
                }
            };
            let hash = Self::content_hash(&data);
            if let Some(first) = self.seen.get(&hash) {
                debug!(
                    "Skipping duplicate: {} (same content as {})",
                    file.display(),
                    first.display()
                );
                self.duplicates_skipped += 1;
                continue;
            }
            self.seen.insert(hash, file.clone());
            unique.push(file);
        }
        unique
    }
}
