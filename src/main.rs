use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use line_patcher::config;
use line_patcher::dispatch::{DispatchError, Dispatcher, EditOutcome, ToolResponse};
use similar::{ChangeTag, TextDiff};
use std::env;
use std::fs;
use std::io::{self, BufRead, Read, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "line-patcher")]
#[command(about = "Line-number-anchored patching for LLM edit tools", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (defaults to $LINE_PATCHER_CONFIG, then ./line-patcher.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Workspace root; edits outside it are refused (defaults to the current directory)
    #[arg(short, long, global = true)]
    workspace: Option<PathBuf>,

    /// Log pipeline stages to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply a batch of edit directives to a file
    Apply {
        file: PathBuf,

        /// Line count of the file as seen when the directives were written
        #[arg(short, long)]
        lines: usize,

        /// File holding the directives (read from stdin otherwise)
        #[arg(short, long)]
        edits: Option<PathBuf>,

        /// Show what would change without writing
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Show unified diff of changes
        #[arg(short, long)]
        diff: bool,

        /// Print the outcome as JSON
        #[arg(long)]
        json: bool,
    },

    /// Parse and validate directives without applying them
    Check {
        file: PathBuf,

        #[arg(short, long)]
        lines: usize,

        #[arg(short, long)]
        edits: Option<PathBuf>,
    },

    /// Print a file with line markers
    Read {
        file: PathBuf,

        #[arg(long)]
        start: Option<usize>,

        #[arg(long)]
        end: Option<usize>,
    },

    /// Print the number of lines in a file
    Count { file: PathBuf },

    /// Answer JSON tool calls, one per line, on stdin
    Serve,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cwd = env::current_dir().context("cannot determine current directory")?;
    let config = config::load(cli.config.as_deref(), &cwd)?;
    let root = cli
        .workspace
        .clone()
        .or_else(|| config.workspace.root.clone())
        .unwrap_or(cwd);
    let dispatcher = Dispatcher::from_config(&config, &root)
        .with_context(|| format!("cannot open workspace {}", root.display()))?;

    match cli.command {
        Commands::Apply {
            file,
            lines,
            edits,
            dry_run,
            diff,
            json,
        } => cmd_apply(&dispatcher, &file, lines, edits.as_deref(), dry_run, diff, json),

        Commands::Check { file, lines, edits } => {
            cmd_check(&dispatcher, &file, lines, edits.as_deref())
        }

        Commands::Read { file, start, end } => cmd_read(&dispatcher, &file, start, end),

        Commands::Count { file } => {
            println!("{}", dispatcher.count_lines(&file)?);
            Ok(())
        }

        Commands::Serve => cmd_serve(&dispatcher),
    }
}

/// Logs go to stderr so stdout stays clean for tool responses.
fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn read_directives(edits: Option<&Path>) -> Result<String> {
    match edits {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("cannot read directives from {}", path.display())),
        None => {
            let mut text = String::new();
            io::stdin()
                .read_to_string(&mut text)
                .context("cannot read directives from stdin")?;
            Ok(text)
        }
    }
}

fn cmd_apply(
    dispatcher: &Dispatcher,
    file: &Path,
    lines: usize,
    edits: Option<&Path>,
    dry_run: bool,
    show_diff: bool,
    json: bool,
) -> Result<()> {
    let directives = read_directives(edits)?;
    let result = if dry_run {
        dispatcher.preview_edit(file, lines, &directives)
    } else {
        dispatcher.edit_file(file, lines, &directives)
    };

    match result {
        Ok(outcome) if json => {
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            Ok(())
        }
        Ok(outcome) => {
            report_outcome(&outcome, show_diff);
            Ok(())
        }
        Err(e) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&ToolResponse::from(e))?);
            } else {
                report_failure(file, &e);
            }
            std::process::exit(1);
        }
    }
}

fn report_outcome(outcome: &EditOutcome, show_diff: bool) {
    let glyph = if outcome.result.changed() {
        "✓".green()
    } else {
        "⊙".yellow()
    };
    println!("{} {}", glyph, outcome);

    for warning in &outcome.result.warnings {
        println!("  {} {}", "warning:".yellow(), warning);
    }
    for diag in &outcome.lint {
        println!("  {}", diag.message.dimmed());
    }

    if show_diff && outcome.result.changed() {
        display_diff(&outcome.path, &outcome.original, &outcome.result.final_content);
    }
}

fn report_failure(file: &Path, err: &DispatchError) {
    eprintln!("{} {}: {}", "✗".red(), file.display(), err.stage().red());
    for line in err.diagnostic().lines() {
        eprintln!("  {line}");
    }
}

/// Helper: Show unified diff between original and patched content
fn display_diff(file: &Path, original: &str, modified: &str) {
    println!(
        "\n{}",
        format!("--- {} (original)", file.display()).dimmed()
    );
    println!("{}", format!("+++ {} (patched)", file.display()).dimmed());

    let diff = TextDiff::from_lines(original, modified);
    for hunk in diff.unified_diff().context_radius(3).iter_hunks() {
        println!("{}", hunk.header().to_string().cyan());
        for change in hunk.iter_changes() {
            let line = match change.tag() {
                ChangeTag::Delete => format!("-{}", change).red(),
                ChangeTag::Insert => format!("+{}", change).green(),
                ChangeTag::Equal => format!(" {}", change).normal(),
            };
            print!("{}", line);
            if change.missing_newline() {
                println!();
            }
        }
    }
}

fn cmd_check(dispatcher: &Dispatcher, file: &Path, lines: usize, edits: Option<&Path>) -> Result<()> {
    let directives = read_directives(edits)?;
    let path = dispatcher.guard().validate_path(file)?;
    let current = fs::read_to_string(&path)
        .with_context(|| format!("cannot read {}", path.display()))?;

    match dispatcher.engine().check(&current, lines, &directives) {
        Ok(batch) => {
            println!(
                "{} {} directive(s) valid against {} lines",
                "✓".green(),
                batch.len(),
                lines
            );
            for (idx, directive) in batch.directives.iter().enumerate() {
                let added = directive.content_lines().len();
                println!("  {}. {} (+{} lines)", idx + 1, directive, added);
            }
            Ok(())
        }
        Err(e) => {
            report_failure(file, &DispatchError::Patch(e));
            std::process::exit(1);
        }
    }
}

fn cmd_read(
    dispatcher: &Dispatcher,
    file: &Path,
    start: Option<usize>,
    end: Option<usize>,
) -> Result<()> {
    let view = dispatcher.read_file(file, start, end)?;
    eprintln!(
        "{}",
        format!(
            "{}: lines {}-{} of {}",
            view.path.display(),
            view.start_line,
            view.end_line,
            view.total_lines
        )
        .dimmed()
    );
    if !view.content.is_empty() {
        println!("{}", view.content);
    }
    Ok(())
}

fn cmd_serve(dispatcher: &Dispatcher) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout().lock();
    for line in stdin.lock().lines() {
        let line = line.context("cannot read request from stdin")?;
        if line.trim().is_empty() {
            continue;
        }
        let response = dispatcher.call_json(&line);
        serde_json::to_writer(&mut stdout, &response)?;
        writeln!(stdout)?;
        stdout.flush()?;
    }
    Ok(())
}
