//! iflowc: compile integration blueprints into SAP Cloud Integration iFlows
//!
//! Usage:
//!   iflowc compile orders.yaml -o OrderSync.iflw --report report.json
//!   iflowc validate orders.json
//!   iflowc sanitize exported.iflw -o repaired.iflw
//!
//! Catalog and generator overrides come from `--catalog` / `--config` or the
//! `IFLOW_CATALOG` / `IFLOW_GENERATOR_CONFIG` environment variables.
//! Logs go to stderr (`RUST_LOG`, default `info`); artifacts go to stdout
//! unless `-o` is given.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use iflow_core::config::{CATALOG_ENV, GENERATOR_CONFIG_ENV};
use iflow_core::{load_blueprint, sanitize, CompileError, GeneratedDocument, Pipeline, PipelineConfig};

#[derive(Parser, Debug)]
#[command(name = "iflowc")]
#[command(about = "Compile integration blueprints into SAP Cloud Integration iFlow documents")]
struct Cli {
    /// Component template overrides (YAML)
    #[arg(long, global = true, env = CATALOG_ENV)]
    catalog: Option<PathBuf>,

    /// Generator configuration (YAML)
    #[arg(long, global = true, env = GENERATOR_CONFIG_ENV)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate, generate and sanitize a blueprint
    Compile {
        /// Blueprint file (.json, .yaml or .yml)
        blueprint: PathBuf,

        /// Write the iFlow document here instead of stdout
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,

        /// Write compile metadata (warnings, repairs, sanitizer report) as JSON
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Run both validators and print every finding
    Validate {
        /// Blueprint file (.json, .yaml or .yml)
        blueprint: PathBuf,
    },

    /// Repair an existing iFlow document
    Sanitize {
        /// iFlow document (.iflw)
        document: PathBuf,

        /// Write the repaired document here instead of stdout
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,

        /// Write the sanitizer report as JSON
        #[arg(long)]
        report: Option<PathBuf>,
    },
}

fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = PipelineConfig::resolve(cli.catalog.clone(), cli.config.clone())?;
    let pipeline = Pipeline::from_config(config);

    let ok = match &cli.command {
        Command::Compile {
            blueprint,
            output,
            report,
        } => compile(&pipeline, blueprint, output.as_deref(), report.as_deref())?,
        Command::Validate { blueprint } => validate(&pipeline, blueprint)?,
        Command::Sanitize {
            document,
            output,
            report,
        } => repair(document, output.as_deref(), report.as_deref())?,
    };
    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

/// Returns `false` when the blueprint was rejected.
fn compile(pipeline: &Pipeline, blueprint: &Path, output: Option<&Path>, report: Option<&Path>) -> Result<bool> {
    let dto = load_blueprint(blueprint)?;
    let compiled = match pipeline.compile(&dto) {
        Ok(compiled) => compiled,
        Err(err) => return rejected(err),
    };

    for warning in compiled.metadata.warnings.warnings() {
        eprintln!("{}", warning);
    }
    let xml = compiled.document.to_xml()?;
    emit(output, &xml)?;
    if let Some(path) = report {
        let json = serde_json::to_string_pretty(&compiled.metadata)?;
        write_file(path, &json)?;
    }
    info!(
        iflow = %compiled.metadata.iflow_name,
        archive_path = %compiled.metadata.archive_path,
        digest = %compiled.metadata.digest,
        "compiled"
    );
    Ok(true)
}

fn validate(pipeline: &Pipeline, blueprint: &Path) -> Result<bool> {
    let dto = load_blueprint(blueprint)?;
    match pipeline.validate(&dto) {
        Ok(validated) => {
            print!("{}", validated.warnings);
            println!(
                "{}: valid ({} warning(s))",
                blueprint.display(),
                validated.warnings.warning_count()
            );
            Ok(true)
        }
        Err(err) => rejected(err),
    }
}

fn repair(document: &Path, output: Option<&Path>, report: Option<&Path>) -> Result<bool> {
    let xml = fs::read_to_string(document)
        .with_context(|| format!("Failed to read document {}", document.display()))?;
    let doc = GeneratedDocument::from_xml(&xml)
        .with_context(|| format!("Failed to parse iFlow document {}", document.display()))?;

    let (doc, findings) = sanitize(doc);
    for (issue, fix) in findings.resolved() {
        eprintln!("fixed [{}] {}: {}", issue.code, issue.message, fix);
    }
    emit(output, &doc.to_xml()?)?;
    if let Some(path) = report {
        write_file(path, &serde_json::to_string_pretty(&findings)?)?;
    }
    Ok(true)
}

/// Print validation findings; other compile errors propagate.
fn rejected(err: CompileError) -> Result<bool> {
    match err.findings() {
        Some(findings) => {
            eprint!("{}", findings);
            eprintln!("{}", err);
            Ok(false)
        }
        None => Err(err.into()),
    }
}

fn emit(output: Option<&Path>, content: &str) -> Result<()> {
    match output {
        Some(path) => write_file(path, content),
        None => {
            println!("{}", content);
            Ok(())
        }
    }
}

fn write_file(path: &Path, content: &str) -> Result<()> {
    fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))
}
