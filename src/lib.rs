//! rxclaims: batch analytics over pharmacy claim events.
//!
//! A run loads three datasets (pharmacies, claims, reverts), validates and
//! deduplicates them, joins claims to their pharmacy chain and revert status,
//! and produces three tables: per pharmacy/drug fill metrics, the two
//! cheapest chains per drug, and the most prescribed quantities per drug.

pub mod analytics;
pub mod config;
pub mod ingest;
pub mod model;
pub mod output;
pub mod pipeline;

use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::info;

use crate::analytics::Severity;
use crate::config::{ConfigError, ConfigLayer, Settings};
use crate::ingest::{IngestError, load_all};
use crate::output::{OutputError, WrittenFiles, write_outputs};
use crate::pipeline::{PipelineOutput, RunSummary, run_pipeline};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "rxclaims",
    version,
    about = "Pharmacy claims analytics: fill metrics, chain recommendations, quantity profiles"
)]
pub struct Cli {
    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the batch and write the result files
    Run {
        #[command(flatten)]
        input: InputArgs,
    },
    /// Run the batch and verify result invariants without writing anything
    Check {
        #[command(flatten)]
        input: InputArgs,
    },
}

impl Commands {
    pub fn input(&self) -> &InputArgs {
        match self {
            Commands::Run { input } | Commands::Check { input } => input,
        }
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct InputArgs {
    /// Directory of pharmacy CSV files
    #[arg(long, value_name = "DIR")]
    pub pharmacy_dir: Option<PathBuf>,

    /// Directory of claim JSON files
    #[arg(long, value_name = "DIR")]
    pub claims_dir: Option<PathBuf>,

    /// Directory of revert JSON files
    #[arg(long, value_name = "DIR")]
    pub reverts_dir: Option<PathBuf>,

    /// Where result files are written
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// List at most N quantities per drug
    #[arg(long, value_name = "N")]
    pub quantity_limit: Option<usize>,

    /// TOML config file
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Print machine-readable JSON on stdout
    #[arg(long)]
    pub json: bool,
}

impl InputArgs {
    fn flag_layer(&self) -> ConfigLayer {
        ConfigLayer {
            pharmacy_dir: self.pharmacy_dir.clone(),
            claims_dir: self.claims_dir.clone(),
            reverts_dir: self.reverts_dir.clone(),
            output_dir: self.output_dir.clone(),
            quantity_limit: self.quantity_limit,
        }
    }

    pub fn settings(&self) -> Result<Settings, ConfigError> {
        Settings::resolve(self.config.as_deref(), self.flag_layer())
    }
}

/// Structured error carrying the process exit code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CliError {
    pub code: i32,
    pub kind: &'static str,
    pub message: String,
    pub hint: Option<String>,
    pub retryable: bool,
}

impl CliError {
    fn usage(message: impl Into<String>) -> Self {
        Self {
            code: 2,
            kind: "usage",
            message: message.into(),
            hint: Some("run `rxclaims --help` for usage".into()),
            retryable: false,
        }
    }

    /// Classify an error by the module error found in its chain.
    pub fn from_anyhow(err: &anyhow::Error) -> Self {
        let message = format!("{err:#}");
        if let Some(cfg) = err.chain().find_map(|e| e.downcast_ref::<ConfigError>()) {
            let hint = match cfg {
                ConfigError::Parse { .. } => "check the config file keys and value types",
                ConfigError::InvalidEnv { .. } => "unset or fix the RXCLAIMS_* variable",
                _ => "check --config and the RXCLAIMS_* variables",
            };
            return Self {
                code: 2,
                kind: "config",
                message,
                hint: Some(hint.into()),
                retryable: false,
            };
        }
        if let Some(ingest) = err.chain().find_map(|e| e.downcast_ref::<IngestError>()) {
            let hint = match ingest {
                IngestError::MissingDirectory { .. } => {
                    Some("pass --pharmacy-dir / --claims-dir / --reverts-dir".to_string())
                }
                _ => None,
            };
            return Self {
                code: 3,
                kind: "input",
                message,
                hint,
                retryable: false,
            };
        }
        if err.chain().any(|e| e.downcast_ref::<OutputError>().is_some()) {
            return Self {
                code: 4,
                kind: "output",
                message,
                hint: Some("check that --output-dir is writable".into()),
                retryable: true,
            };
        }
        Self {
            code: 1,
            kind: "internal",
            message,
            hint: None,
            retryable: false,
        }
    }
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for CliError {}

#[derive(Debug, Clone)]
pub struct ParsedCli {
    pub cli: Cli,
}

/// Parse arguments. `--help` / `--version` are printed here and come back
/// as a code-0 error with an empty message.
pub fn parse_cli(args: Vec<String>) -> Result<ParsedCli, CliError> {
    match Cli::try_parse_from(args) {
        Ok(cli) => Ok(ParsedCli { cli }),
        Err(err) => match err.kind() {
            clap::error::ErrorKind::DisplayHelp
            | clap::error::ErrorKind::DisplayVersion
            | clap::error::ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                let _ = err.print();
                Err(CliError {
                    code: 0,
                    kind: "help",
                    message: String::new(),
                    hint: None,
                    retryable: false,
                })
            }
            _ => Err(CliError::usage(err.render().to_string().trim_end())),
        },
    }
}

/// Install the stderr log subscriber. `RUST_LOG` wins over the flags.
pub fn init_tracing(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => "warn",
        (false, 0) => "info",
        (false, 1) => "debug",
        (false, _) => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Result of a `run`: the pipeline output and where it was written.
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub settings: Settings,
    pub output: PipelineOutput,
    pub files: WrittenFiles,
}

/// Load, analyze and keep everything in memory.
pub fn analyze_inputs(settings: &Settings) -> anyhow::Result<PipelineOutput> {
    let (batches, unreadable) =
        load_all(&settings.input_dirs()).context("failed to load input datasets")?;
    let mut output = run_pipeline(&batches);
    output.summary.unreadable_files = unreadable;
    Ok(output)
}

/// Full batch: analyze, then write the result files.
pub fn run_batch(settings: &Settings) -> anyhow::Result<BatchReport> {
    let output = analyze_inputs(settings)?;
    let files = write_outputs(
        &settings.output_dir,
        &output.tables,
        &output.summary,
        settings.quantity_limit,
    )
    .context("failed to write results")?;
    Ok(BatchReport {
        settings: settings.clone(),
        output,
        files,
    })
}

pub fn run_with_parsed(parsed: ParsedCli) -> Result<(), CliError> {
    let cli = parsed.cli;
    init_tracing(cli.verbose, cli.quiet);

    let command = cli.command.unwrap_or(Commands::Run {
        input: InputArgs::default(),
    });

    let mut stdout = std::io::stdout().lock();
    let result = execute(&command, &mut stdout);
    let _ = stdout.flush();

    match result {
        Ok(true) => Ok(()),
        Ok(false) => Err(CliError {
            code: 1,
            kind: "check_failed",
            message: "one or more invariant checks failed".into(),
            hint: Some("see the `checks` list for details".into()),
            retryable: false,
        }),
        Err(err) => Err(CliError::from_anyhow(&err)),
    }
}

/// Run one command, printing its report to `out`. `Ok(false)` means the
/// command completed but an error-severity check failed.
pub fn execute(command: &Commands, out: &mut impl Write) -> anyhow::Result<bool> {
    let input = command.input();
    let settings = input.settings()?;

    match command {
        Commands::Run { .. } => {
            let report = run_batch(&settings)?;
            if input.json {
                let payload = serde_json::json!({
                    "command": "run",
                    "settings": report.settings,
                    "files": report.files,
                    "summary": report.output.summary,
                });
                writeln!(out, "{}", serde_json::to_string_pretty(&payload)?)?;
            } else {
                print_summary(out, &report.output.summary)?;
                writeln!(out, "results written to {}", settings.output_dir.display())?;
            }
            Ok(report.output.summary.is_consistent())
        }
        Commands::Check { .. } => {
            let output = analyze_inputs(&settings)?;
            let consistent = output.summary.is_consistent();
            info!(consistent, "check finished");
            if input.json {
                let payload = serde_json::json!({
                    "command": "check",
                    "ok": consistent,
                    "summary": output.summary,
                });
                writeln!(out, "{}", serde_json::to_string_pretty(&payload)?)?;
            } else {
                print_summary(out, &output.summary)?;
                for check in &output.summary.checks {
                    let mark = match (check.ok, check.severity) {
                        (true, _) => "ok  ",
                        (false, Severity::Error) => "FAIL",
                        (false, _) => "warn",
                    };
                    writeln!(out, "[{mark}] {}: {}", check.id, check.details)?;
                }
            }
            Ok(consistent)
        }
    }
}

fn print_summary(out: &mut impl Write, summary: &RunSummary) -> std::io::Result<()> {
    let v = &summary.validation;
    for (name, stats) in [
        ("pharmacy", &v.pharmacy),
        ("claims", &v.claims),
        ("reverts", &v.reverts),
    ] {
        writeln!(
            out,
            "{name:<9} seen {:>6}  accepted {:>6}  rejected {:>4}  duplicates {:>4}",
            stats.seen, stats.accepted, stats.rejected, stats.duplicates
        )?;
    }
    writeln!(
        out,
        "joined claims {} ({} reverted, {} with unknown pharmacy dropped)",
        summary.joined_claims, summary.reverted_claims, summary.unknown_pharmacy
    )?;
    writeln!(
        out,
        "tables: {} metrics, {} chain rankings, {} quantity profiles",
        summary.tables.metrics, summary.tables.chains, summary.tables.quantities
    )?;
    if !summary.unreadable_files.is_empty() {
        writeln!(out, "unreadable files: {}", summary.unreadable_files.len())?;
        for path in &summary.unreadable_files {
            writeln!(out, "  {}", path.display())?;
        }
    }
    Ok(())
}
