//! Subcommand implementations and the plumbing they share.

pub mod compare;
pub mod courses;
pub mod init;
pub mod lessons;
pub mod students;
pub mod summary;
pub mod validate;
pub mod watch;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use tokio_util::sync::CancellationToken;

use progresslens_core::engine::ReportEngine;
use progresslens_core::filter::{to_instant, RawTimestamp, ReportFilters};
use progresslens_core::model::Diagnostic;
use progresslens_store::config::{create_store, load_config_from, StoreConfig};
use progresslens_store::snapshot::DEFAULT_POLL_INTERVAL;

/// Flags shared by every report command.
#[derive(Debug, Clone, Args)]
pub struct ReportArgs {
    /// Teacher whose courses are reported (defaults to `default_teacher`)
    #[arg(long)]
    pub teacher: Option<String>,

    /// Restrict to one course
    #[arg(long)]
    pub course: Option<String>,

    /// Restrict to these students (comma-separated ids)
    #[arg(long, value_delimiter = ',')]
    pub students: Vec<String>,

    /// Restrict to these assignment types (comma-separated, e.g. "lesson,quiz")
    #[arg(long, value_delimiter = ',')]
    pub types: Vec<String>,

    /// Start of the date range, inclusive (YYYY-MM-DD or RFC 3339)
    #[arg(long, value_parser = parse_instant)]
    pub from: Option<DateTime<Utc>>,

    /// End of the date range, exclusive (YYYY-MM-DD or RFC 3339)
    #[arg(long, value_parser = parse_instant)]
    pub to: Option<DateTime<Utc>>,

    /// Read this snapshot file instead of the configured store
    #[arg(long)]
    pub snapshot: Option<PathBuf>,

    /// Output format: table, json (summary also accepts markdown or md)
    #[arg(long, default_value = "table")]
    pub format: String,
}

fn parse_instant(s: &str) -> Result<DateTime<Utc>, String> {
    to_instant(&RawTimestamp::Text(s.to_string())).map_err(|e| e.to_string())
}

/// 0001-01-01, stands in for a missing `--from`.
fn open_start() -> DateTime<Utc> {
    DateTime::from_timestamp(-62_135_596_800, 0).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// 9999-12-31T23:59:59Z, stands in for a missing `--to`.
fn open_end() -> DateTime<Utc> {
    DateTime::from_timestamp(253_402_300_799, 0).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

impl ReportArgs {
    pub fn filters(&self) -> ReportFilters {
        let mut filters = ReportFilters::default()
            .students(self.students.iter().cloned())
            .types(self.types.iter().cloned());
        if let Some(course) = &self.course {
            filters = filters.course(course.clone());
        }
        match (self.from, self.to) {
            (None, None) => filters,
            (start, end) => filters.between(
                start.unwrap_or_else(open_start),
                end.unwrap_or_else(open_end),
            ),
        }
    }

    pub fn json(&self) -> bool {
        self.format == "json"
    }
}

/// Everything a report command needs, resolved from config and flags.
pub struct Session {
    pub engine: Arc<ReportEngine>,
    pub teacher_id: String,
    pub filters: ReportFilters,
}

impl Session {
    pub fn open(config_path: Option<&Path>, args: &ReportArgs) -> Result<Self> {
        let config = load_config_from(config_path)?;

        let store_config = match &args.snapshot {
            Some(path) => StoreConfig::Snapshot {
                path: path.display().to_string(),
                poll_interval_ms: match config.store {
                    StoreConfig::Snapshot {
                        poll_interval_ms, ..
                    } => poll_interval_ms,
                    StoreConfig::Memory => DEFAULT_POLL_INTERVAL.as_millis() as u64,
                },
            },
            None => config.store.clone(),
        };
        let store = create_store(&store_config)?;
        let engine = ReportEngine::new(store, config.engine.to_engine_config()?);

        let teacher_id = args
            .teacher
            .clone()
            .or(config.default_teacher)
            .context(
                "no teacher given: pass --teacher or set default_teacher in progresslens.toml",
            )?;

        Ok(Self {
            engine: Arc::new(engine),
            teacher_id,
            filters: args.filters(),
        })
    }
}

/// A token that is cancelled when the user presses Ctrl-C.
pub fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    });
    token
}

/// Each diagnostic is already logged at `warn` by the engine; this only tallies them.
pub fn print_diagnostics(diagnostics: &[Diagnostic]) {
    if !diagnostics.is_empty() {
        eprintln!("{} unit(s) or record(s) skipped", diagnostics.len());
    }
}

pub fn percent(rate: f64) -> String {
    format!("{:.1}%", rate * 100.0)
}

pub fn minutes(value: f64) -> String {
    format!("{:.0} min", value)
}

pub fn date(instant: Option<DateTime<Utc>>) -> String {
    instant
        .map(|t| t.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "-".to_string())
}
