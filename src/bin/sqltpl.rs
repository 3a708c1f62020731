//! sqltpl — format SQL in template literals
//!
//! # Usage
//!
//! ```bash
//! # Report literals that would change
//! sqltpl check src/
//!
//! # Rewrite files in place
//! sqltpl fix src/ --include-tagless
//!
//! # Format a single query
//! echo "select * from users" | sqltpl format
//! ```

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use serde::Serialize;
use sqltpl::config::ConfigBuilder;
use sqltpl::prelude::*;
use tracing_subscriber::EnvFilter;

const EXTENSIONS: &[&str] = &["js", "jsx", "ts", "tsx", "mjs", "cjs", "mts", "cts"];
const SKIPPED_DIRS: &[&str] = &["node_modules", "target", ".git", "dist", "vendor"];

#[derive(Parser)]
#[command(name = "sqltpl")]
#[command(version)]
#[command(about = "Format SQL queries embedded in template literals", long_about = None)]
#[command(after_help = "EXAMPLES:
    sqltpl check src/                  # List literals that need formatting
    sqltpl fix src/ lib/db.ts          # Rewrite them in place
    sqltpl format 'select 1 from t'    # Format one query")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (default: sqltpl.toml, then the user config dir)
    #[arg(short, long, global = true, env = "SQLTPL_CONFIG")]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text", global = true)]
    format: OutputFormat,

    /// Verbose output (debug logging)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Also consider literals without a sql tag
    #[arg(long, global = true)]
    include_tagless: bool,

    /// Skip literals containing ${...} expressions
    #[arg(long, global = true)]
    ignore_expressions: bool,

    /// Also format single-line literals
    #[arg(long, global = true)]
    include_inline: bool,

    /// Keep the formatter's indentation instead of aligning to the statement
    #[arg(long, global = true)]
    no_match_indentation: bool,

    /// Regex matching driver placeholders, for untagged query detection
    #[arg(long, global = true)]
    placeholder_rule: Option<String>,
}

#[derive(Clone, Copy, PartialEq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Report literals that would be reformatted
    Check {
        /// Files or directories
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Reformat literals in place
    Fix {
        /// Files or directories
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Format one query (argument or stdin)
    Format {
        /// The query; read from stdin when absent
        query: Option<String>,
    },
}

#[derive(Serialize)]
struct FileReport<'a> {
    file: &'a Path,
    #[serde(flatten)]
    report: &'a Report,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(&cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            ExitCode::from(2)
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("sqltpl=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sqltpl=warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: &Cli) -> Result<ExitCode> {
    let config = load_config(cli)?;
    match &cli.command {
        Commands::Check { paths } => check(cli, config, paths),
        Commands::Fix { paths } => fix(cli, config, paths),
        Commands::Format { query } => format_query(&config, query.as_deref()),
    }
}

fn load_config(cli: &Cli) -> Result<Config> {
    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::discover(&std::env::current_dir()?)?,
    };

    let mut builder = ConfigBuilder::from_config(config);
    if cli.include_tagless {
        builder = builder.ignore_tagless(false);
    }
    if cli.ignore_expressions {
        builder = builder.ignore_expressions(true);
    }
    if cli.include_inline {
        builder = builder.ignore_inline(false);
    }
    if cli.no_match_indentation {
        builder = builder.match_indentation(false);
    }
    if let Some(rule) = &cli.placeholder_rule {
        builder = builder.placeholder_rule(rule.clone());
    }
    Ok(builder.build())
}

/// Expand directories into the source files below them.
fn collect_files(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            walk_dir(path, &mut files);
        } else {
            files.push(path.clone());
        }
    }
    files
}

fn walk_dir(dir: &Path, files: &mut Vec<PathBuf>) {
    let entries = match fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) => {
            tracing::warn!(dir = %dir.display(), error = %e, "cannot read directory");
            return;
        }
    };

    let mut paths: Vec<PathBuf> = entries.flatten().map(|e| e.path()).collect();
    paths.sort();
    for path in paths {
        if path.is_dir() {
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            if SKIPPED_DIRS.contains(&name) {
                continue;
            }
            walk_dir(&path, files);
        } else if let Some(ext) = path.extension().and_then(|e| e.to_str())
            && EXTENSIONS.contains(&ext)
        {
            files.push(path);
        }
    }
}

fn check(cli: &Cli, config: Config, paths: &[PathBuf]) -> Result<ExitCode> {
    let engine = Engine::new(config)?;
    let mut changes = 0;
    let mut failed = 0;
    let mut json = Vec::new();

    for file in collect_files(paths) {
        let report = match read(&file).and_then(|source| Ok(engine.check_as(&source, dialect(&file))?)) {
            Ok(report) => report,
            Err(e) => {
                eprintln!("{} {}: {:#}", "✗".red(), file.display(), e);
                failed += 1;
                continue;
            }
        };
        changes += report.patches().count();

        match cli.format {
            OutputFormat::Json => json.push(serde_json::to_value(FileReport {
                file: &file,
                report: &report,
            })?),
            OutputFormat::Text => print_report(&file, &report),
        }
    }

    match cli.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&json)?),
        OutputFormat::Text if changes == 0 && failed == 0 => {
            println!("{}", "✓ All queries formatted".green().bold());
        }
        OutputFormat::Text => {
            if changes > 0 {
                println!("{} {} literal(s) need formatting", "✗".red(), changes);
            }
        }
    }

    Ok(if changes > 0 || failed > 0 {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    })
}

fn print_report(file: &Path, report: &Report) {
    for finding in &report.findings {
        let icon = match finding.kind {
            FindingKind::Rewrite => "✗".red(),
            FindingKind::Error => "⚠".yellow(),
        };
        let location = format!("{}:{}:{}", file.display(), finding.line, finding.column + 1);
        println!("{} {} {}", icon, location.white(), finding.message);
    }
}

fn fix(cli: &Cli, config: Config, paths: &[PathBuf]) -> Result<ExitCode> {
    let engine = Engine::new(config)?;
    let mut fixed = Vec::new();
    let mut failed = 0;

    for file in collect_files(paths) {
        let result = read(&file).and_then(|source| {
            let output = engine.fix_as(&source, dialect(&file))?;
            if output.changed() {
                fs::write(&file, &output.output)
                    .with_context(|| format!("cannot write {}", file.display()))?;
            }
            Ok(output)
        });
        match result {
            Ok(output) => {
                for error in &output.errors {
                    println!(
                        "{} {}:{}:{} {}",
                        "⚠".yellow(),
                        file.display(),
                        error.line,
                        error.column + 1,
                        error.message
                    );
                }
                if output.changed() {
                    if cli.format == OutputFormat::Text {
                        println!("{} {}", "✓ Fixed".green(), file.display());
                    }
                    fixed.push(file);
                }
            }
            Err(e) => {
                eprintln!("{} {}: {:#}", "✗".red(), file.display(), e);
                failed += 1;
            }
        }
    }

    if cli.format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&fixed)?);
    } else if fixed.is_empty() && failed == 0 {
        println!("{}", "✓ Nothing to fix".green().bold());
    }

    Ok(if failed > 0 {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    })
}

fn format_query(config: &Config, query: Option<&str>) -> Result<ExitCode> {
    let query = match query {
        Some(q) => q.to_string(),
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };
    let formatted = SqlFormatter::new().format(&query, &config.formatter)?;
    print!("{}", formatted);
    Ok(ExitCode::SUCCESS)
}

/// Grammar for `file`; files named explicitly with another extension are
/// read as TypeScript.
fn dialect(file: &Path) -> Dialect {
    Dialect::from_path(file).unwrap_or_default()
}

fn read(file: &Path) -> Result<String> {
    fs::read_to_string(file).with_context(|| format!("cannot read {}", file.display()))
}
