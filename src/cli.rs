use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::claudit::mode::AnalysisMode;
use crate::commands::{self, CommandReport};
use crate::logging;

#[derive(Parser)]
#[command(name = "claudit")]
#[command(version)]
#[command(about = "Audit Claude conversation logs into a knowledge or rules report", long_about = None)]
pub struct Cli {
    /// Debug-level logging on stderr (CLAUDIT_LOG overrides)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Analyze one project's conversations and write or update its report
    Analyze {
        /// Project display name, absolute path, or raw directory name
        project: Option<String>,
        /// Pick a project by its 1-based position in the listing
        #[arg(long, conflicts_with = "project")]
        project_number: Option<usize>,
        #[arg(long, value_enum, default_value_t = AnalysisMode::Rules)]
        mode: AnalysisMode,
        /// Report file name or path (relative names land in --out-dir)
        #[arg(short, long)]
        output: Option<String>,
        #[arg(long, default_value = "reports")]
        out_dir: PathBuf,
        /// Use the external CLI tool even if detection would pick the API
        #[arg(long)]
        force_cli: bool,
        /// Use the HTTP API even if the CLI tool is installed
        #[arg(long)]
        force_api: bool,
        /// Skip confirmation prompts
        #[arg(short, long)]
        yes: bool,
        /// Keep per-chunk subreports after a successful run
        #[arg(long)]
        keep_subchunk_reports: bool,
        #[arg(long)]
        max_chunk_bytes: Option<usize>,
        #[arg(long)]
        json: bool,
    },
    /// List discovered projects with size and cost estimates
    Projects {
        #[arg(long, default_value = "reports")]
        out_dir: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Show resolved paths, backend availability and env overrides
    Status {
        #[arg(long, default_value = "reports")]
        out_dir: PathBuf,
        #[arg(long)]
        json: bool,
    },
}

fn emit(report: &CommandReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        print!("{}", report.render());
    }
    if !report.ok {
        std::process::exit(1);
    }
    Ok(())
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    match cli.command {
        Command::Analyze {
            project,
            project_number,
            mode,
            output,
            out_dir,
            force_cli,
            force_api,
            yes,
            keep_subchunk_reports,
            max_chunk_bytes,
            json,
        } => {
            let report = commands::analyze::run(&commands::analyze::AnalyzeOptions {
                project,
                project_number,
                mode,
                output,
                out_dir,
                force_cli,
                force_api,
                yes,
                keep_subchunk_reports,
                max_chunk_bytes,
            })?;
            emit(&report, json)
        }
        Command::Projects { out_dir, json } => {
            let report =
                commands::projects::run(&commands::projects::ProjectsOptions { out_dir })?;
            emit(&report, json)
        }
        Command::Status { out_dir, json } => {
            let report = commands::status::run(&out_dir)?;
            emit(&report, json)
        }
    }
}
