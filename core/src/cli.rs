use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::config::Config;
use crate::engine::postgres::PostgresEngine;
use crate::history::HistoryEntry;
use crate::scheduler::OnError;
use crate::session::ExecutionSession;
use crate::types::{ExecutionBatchReport, ExecutionEvent, ExecutionResult};
use crate::{cursor, logging, parser};

#[derive(Parser)]
#[command(name = "sqlrun")]
#[command(about = "sqlrun - split SQL buffers and run them statement by statement", long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default search)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Database URL (overrides config file and env vars)
    #[arg(long, global = true)]
    pub database_url: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the statements found in a file
    Split {
        /// SQL file, or - for stdin
        file: String,

        /// One JSON object per statement
        #[arg(long)]
        json: bool,
    },

    /// Print the statement under a cursor position
    Locate {
        /// SQL file, or - for stdin
        file: String,

        /// Character offset into the file
        #[arg(short = 'c', long = "cursor")]
        cursor: usize,
    },

    /// Execute the statements in a file against the database
    Run {
        /// SQL file, or - for stdin
        file: String,

        /// Run only the statement at this character offset
        #[arg(short = 'c', long = "cursor")]
        cursor: Option<usize>,

        /// What to do after a failed statement: continue, abort
        #[arg(long = "on-error")]
        on_error: Option<OnError>,

        /// Print history entries and the report as JSON lines
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration
    Config,
}

/// Run the CLI by parsing process arguments
pub async fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    run_cli_with_args(cli).await
}

/// Run the CLI with provided arguments
pub async fn run_cli_from_args(args: Vec<String>) -> Result<()> {
    let cli = Cli::parse_from(args);
    run_cli_with_args(cli).await
}

async fn run_cli_with_args(cli: Cli) -> Result<()> {
    // Load config first so errors show before any command output
    let config = Config::builder()
        .config_path(cli.config)
        .database_url(cli.database_url)
        .build()?;

    logging::init(&config.logging.level)?;

    match cli.command {
        Commands::Split { file, json } => {
            let buffer = read_buffer(&file)?;
            let descriptors = parser::parse(&buffer);

            if json {
                for descriptor in &descriptors {
                    println!("{}", serde_json::to_string(descriptor)?);
                }
                return Ok(());
            }

            if descriptors.is_empty() {
                println!("No statements found");
                return Ok(());
            }

            for descriptor in &descriptors {
                let note = descriptor
                    .ambiguity
                    .map(|a| format!(" [{:?}]", a))
                    .unwrap_or_default();
                println!(
                    "#{} lines {}-{}{}",
                    descriptor.sequence_index, descriptor.start_line, descriptor.end_line, note
                );
                println!("  {}", descriptor.text.replace('\n', "\n  "));
            }
        }

        Commands::Locate { file, cursor } => {
            let buffer = read_buffer(&file)?;
            let descriptors = parser::parse(&buffer);

            match cursor::resolve(&descriptors, cursor) {
                Some(descriptor) => {
                    println!(
                        "#{} lines {}-{} (offsets {}..{})",
                        descriptor.sequence_index,
                        descriptor.start_line,
                        descriptor.end_line,
                        descriptor.start_offset,
                        descriptor.end_offset
                    );
                    println!("{}", descriptor.text);
                }
                None => {
                    eprintln!("No statement at offset {}", cursor);
                    std::process::exit(1);
                }
            }
        }

        Commands::Run {
            file,
            cursor,
            on_error,
            json,
        } => {
            let buffer = read_buffer(&file)?;
            let on_error = on_error.unwrap_or(config.execution.on_error);

            let engine = PostgresEngine::connect(&config.database).await?;
            let session = ExecutionSession::new(
                Arc::new(engine),
                Arc::new(on_error),
                config.execution.scheduler_options(),
            );

            let report = run_buffer(&session, &buffer, cursor, json).await?;

            if json {
                println!("{}", serde_json::to_string(&report)?);
            } else {
                print_report(&report);
            }

            if report.has_failures() {
                std::process::exit(1);
            }
        }

        Commands::Config => {
            print!("{}", config.to_toml()?);
        }
    }

    Ok(())
}

/// Drive one run to its report, forwarding Ctrl-C as a cancellation.
async fn run_buffer(
    session: &ExecutionSession,
    buffer: &str,
    cursor: Option<usize>,
    json: bool,
) -> Result<ExecutionBatchReport> {
    let mut handle = match cursor {
        Some(offset) => session.run_current(buffer, offset)?,
        None => session.run_all(buffer)?,
    };

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;

    loop {
        tokio::select! {
            event = handle.next_event() => match event {
                Some(ExecutionEvent::Progress { index, total, preview, .. }) => {
                    if !json {
                        println!("[{}/{}] {}", index + 1, total, preview);
                    }
                }
                Some(ExecutionEvent::Result(result)) => {
                    if json {
                        let entry = HistoryEntry::from_result(session.id(), &result);
                        println!("{}", serde_json::to_string(&entry)?);
                    } else {
                        print_result(&result);
                    }
                }
                Some(ExecutionEvent::Report(report)) => return Ok(report),
                None => break,
            },
            _ = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                eprintln!("Cancelling after the current statement...");
                session.cancel();
            }
        }
    }

    Ok(handle.report().await?)
}

fn read_buffer(file: &str) -> Result<String> {
    if file == "-" {
        let mut buffer = String::new();
        std::io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read SQL from stdin")?;
        return Ok(buffer);
    }

    std::fs::read_to_string(file).with_context(|| format!("Failed to read {}", file))
}

fn print_result(result: &ExecutionResult) {
    let elapsed_ms = result.elapsed.as_millis();

    match (&result.error_message, result.row_count) {
        (Some(error), _) => println!("  ✗ {} ({} ms)", error, elapsed_ms),
        (None, row_count) => {
            if !result.columns.is_empty() {
                println!("  {}", result.columns.join(" | "));
                for row in &result.rows {
                    let cells: Vec<String> = row.iter().map(|cell| cell.to_string()).collect();
                    println!("  {}", cells.join(" | "));
                }
            }
            println!("  ✓ {} row(s) ({} ms)", row_count.unwrap_or(0), elapsed_ms);
        }
    }
}

fn print_report(report: &ExecutionBatchReport) {
    println!();
    println!(
        "{} statement(s): {} succeeded, {} failed, {} skipped in {} ms",
        report.total,
        report.succeeded,
        report.failed,
        report.skipped,
        report.total_elapsed.as_millis()
    );

    if report.cancelled {
        println!("Run cancelled");
    } else if report.aborted {
        println!("Run aborted after a failure");
    }
}
