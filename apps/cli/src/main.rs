//! NetOps CLI - command-line front end for the KPI anomaly pipeline
//!
//! Provides a `netops-cli` binary that trains and reuses the anomaly model,
//! scores KPI files into the score store, and runs predictive analysis on
//! stored uploads.

mod commands;

use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use commands::{analyze, logs, report, score, train, upload};

/// NetOps - per-cell KPI anomaly detection and predictive analytics
#[derive(Parser, Debug)]
#[command(name = "netops", author, version, about = "NetOps - KPI anomaly detection and predictive analytics")]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// Configuration file layered over the global and local ones
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Train and persist models from a KPI CSV file
    ///
    /// Replaces the persisted anomaly model. With --predictive, trains the
    /// status classifier and throughput regressor instead.
    Train {
        /// KPI CSV file
        file: PathBuf,

        /// Train the predictive models instead of the anomaly model
        #[arg(long)]
        predictive: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Score a KPI CSV file with the persisted anomaly model (batch job)
    ///
    /// Rows are stored under the batch upload id 0. Fails if no model has
    /// been trained.
    Score {
        /// KPI CSV file
        file: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Register and score an uploaded KPI CSV file
    Upload {
        /// KPI CSV file
        file: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show anomaly counts for one upload
    Report {
        /// Upload id
        upload_id: i64,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List uploads
    Uploads {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Predict health status and throughput for a stored upload or a file
    Analyze {
        /// Upload id to re-analyze from stored rows
        #[arg(required_unless_present = "file", conflicts_with = "file")]
        upload_id: Option<i64>,

        /// Analyze a KPI CSV file directly
        #[arg(long)]
        file: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Extract incident lines from a syslog file (.log or .txt)
    Logs {
        /// Log file
        file: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // Logs go to stderr so --json output on stdout stays parseable.
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .without_time()
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let Some(command) = args.command else {
        Args::command().print_help()?;
        return Ok(());
    };

    let config = args.config.as_deref();
    match command {
        Command::Train { file, predictive, json } => train::execute(config, &file, predictive, json),
        Command::Score { file, json } => score::execute(config, &file, json),
        Command::Upload { file, json } => upload::execute(config, &file, json),
        Command::Report { upload_id, json } => report::execute(config, upload_id, json),
        Command::Uploads { json } => report::list(config, json),
        Command::Analyze { upload_id, file, json } => analyze::execute(config, upload_id, file.as_deref(), json),
        Command::Logs { file, json } => logs::execute(&file, json),
    }
}
