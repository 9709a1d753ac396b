//! progresslens CLI, the teacher-facing command-line interface.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

use commands::ReportArgs;

#[derive(Parser)]
#[command(
    name = "progresslens",
    version,
    about = "Student progress analytics for teachers"
)]
struct Cli {
    /// Config file path (defaults to ./progresslens.toml, then ~/.config/progresslens/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Per-student progress in each course
    Students {
        #[command(flatten)]
        args: ReportArgs,
    },

    /// Per-course aggregates, assignment stats and rankings
    Courses {
        #[command(flatten)]
        args: ReportArgs,
    },

    /// Response statistics for lessons
    Lessons {
        #[command(flatten)]
        args: ReportArgs,
    },

    /// Dashboard summary over every view
    Summary {
        #[command(flatten)]
        args: ReportArgs,

        /// Also save the full report as JSON
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Recompute the summary whenever the teacher's courses change
    Watch {
        #[command(flatten)]
        args: ReportArgs,

        /// Exit after this many summaries
        #[arg(long)]
        max_updates: Option<usize>,
    },

    /// Compare two saved reports
    Compare {
        /// Baseline report JSON
        #[arg(long)]
        baseline: PathBuf,

        /// Current report JSON
        #[arg(long)]
        current: PathBuf,

        /// Decline threshold in average-score points
        #[arg(long, default_value = "5.0")]
        threshold: f64,

        /// Exit code 1 if any student declined
        #[arg(long)]
        fail_on_decline: bool,

        /// Output format: text, json, markdown
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Check the config and the snapshot it points at
    Validate {
        /// Snapshot to check instead of the configured one
        #[arg(long)]
        snapshot: Option<PathBuf>,
    },

    /// Create a starter config and sample snapshot
    Init,
}

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("progresslens=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.config.as_deref();

    let result = match cli.command {
        Commands::Students { args } => commands::students::execute(config, args).await,
        Commands::Courses { args } => commands::courses::execute(config, args).await,
        Commands::Lessons { args } => commands::lessons::execute(config, args).await,
        Commands::Summary { args, output } => {
            commands::summary::execute(config, args, output).await
        }
        Commands::Watch { args, max_updates } => {
            commands::watch::execute(config, args, max_updates).await
        }
        Commands::Compare {
            baseline,
            current,
            threshold,
            fail_on_decline,
            format,
        } => commands::compare::execute(baseline, current, threshold, fail_on_decline, format),
        Commands::Validate { snapshot } => commands::validate::execute(config, snapshot),
        Commands::Init => commands::init::execute(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
