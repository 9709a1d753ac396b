//! Configuration and store factory.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use progresslens_core::engine::EngineConfig;
use progresslens_core::store::RecordStore;

use crate::memory::InMemoryStore;
use crate::snapshot::SnapshotStore;

/// Which backend serves the records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StoreConfig {
    /// A JSON dataset file, polled for changes.
    Snapshot {
        path: String,
        #[serde(default = "default_poll_interval")]
        poll_interval_ms: u64,
    },
    /// An empty in-process store.
    Memory,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig::Snapshot {
            path: default_snapshot_path(),
            poll_interval_ms: default_poll_interval(),
        }
    }
}

fn default_snapshot_path() -> String {
    "progresslens-snapshot.json".to_string()
}
fn default_poll_interval() -> u64 {
    2000
}

/// Engine tuning, as written in the `[engine]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Max store reads in flight per report.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Timeout for every store call in milliseconds.
    #[serde(default = "default_store_timeout")]
    pub store_timeout_ms: u64,
    #[serde(default = "default_attention_limit")]
    pub attention_limit: usize,
    /// Assignment type tag that marks lessons.
    #[serde(default = "default_lesson_type")]
    pub lesson_type: String,
    #[serde(default = "default_recent_limit")]
    pub recent_limit: usize,
}

fn default_concurrency() -> usize {
    4
}
fn default_store_timeout() -> u64 {
    10_000
}
fn default_attention_limit() -> usize {
    5
}
fn default_lesson_type() -> String {
    "lesson".to_string()
}
fn default_recent_limit() -> usize {
    5
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            store_timeout_ms: default_store_timeout(),
            attention_limit: default_attention_limit(),
            lesson_type: default_lesson_type(),
            recent_limit: default_recent_limit(),
        }
    }
}

impl EngineSettings {
    pub fn to_engine_config(&self) -> Result<EngineConfig> {
        let config = EngineConfig {
            concurrency: self.concurrency,
            store_timeout: Duration::from_millis(self.store_timeout_ms),
            attention_limit: self.attention_limit,
            lesson_type: self.lesson_type.clone(),
            recent_limit: self.recent_limit,
        };
        config.validate().context("invalid [engine] settings")?;
        Ok(config)
    }
}

/// Top-level progresslens configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressLensConfig {
    /// Teacher used when `--teacher` is not given.
    #[serde(default)]
    pub default_teacher: Option<String>,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub engine: EngineSettings,
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
///
/// Substituted values are not scanned again.
fn resolve_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    let mut from = 0;
    while let Some(offset) = result[from..].find("${") {
        let start = from + offset;
        let Some(end) = result[start..].find('}') else {
            break;
        };
        let var_name = &result[start + 2..start + end];
        let value = std::env::var(var_name).unwrap_or_default();
        result = format!("{}{}{}", &result[..start], value, &result[start + end + 1..]);
        from = start + value.len();
    }
    result
}

/// Load config from an explicit path, or search the default locations.
///
/// Search order without a path:
/// 1. `progresslens.toml` in the current directory
/// 2. `~/.config/progresslens/config.toml`
///
/// Environment variable overrides: `PROGRESSLENS_SNAPSHOT`, `PROGRESSLENS_TEACHER`.
pub fn load_config_from(path: Option<&Path>) -> Result<ProgressLensConfig> {
    let config_path = match path {
        Some(p) if p.exists() => Some(p.to_path_buf()),
        Some(p) => anyhow::bail!("config file not found: {}", p.display()),
        None => {
            let local = PathBuf::from("progresslens.toml");
            if local.exists() {
                Some(local)
            } else {
                dirs_path()
                    .map(|home| home.join("config.toml"))
                    .filter(|global| global.exists())
            }
        }
    };

    let mut config = match config_path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            tracing::debug!(path = %path.display(), "loading config");
            parse_config(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => ProgressLensConfig::default(),
    };

    if let Ok(path) = std::env::var("PROGRESSLENS_SNAPSHOT") {
        let poll_interval_ms = match config.store {
            StoreConfig::Snapshot {
                poll_interval_ms, ..
            } => poll_interval_ms,
            StoreConfig::Memory => default_poll_interval(),
        };
        config.store = StoreConfig::Snapshot {
            path,
            poll_interval_ms,
        };
    }
    if let Ok(teacher) = std::env::var("PROGRESSLENS_TEACHER") {
        config.default_teacher = Some(teacher);
    }

    Ok(config)
}

/// Parse TOML text and resolve `${VAR}` references in string values.
pub fn parse_config(content: &str) -> Result<ProgressLensConfig> {
    let mut config: ProgressLensConfig = toml::from_str(content)?;
    config.default_teacher = config
        .default_teacher
        .map(|t| resolve_env_vars(&t))
        .filter(|t| !t.trim().is_empty());
    if let StoreConfig::Snapshot { path, .. } = &mut config.store {
        *path = resolve_env_vars(path);
    }
    config.engine.lesson_type = resolve_env_vars(&config.engine.lesson_type);
    Ok(config)
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("progresslens"))
}

/// Create a store instance from its configuration.
pub fn create_store(config: &StoreConfig) -> Result<Arc<dyn RecordStore>> {
    match config {
        StoreConfig::Snapshot {
            path,
            poll_interval_ms,
        } => {
            let store = SnapshotStore::open(path, Duration::from_millis(*poll_interval_ms))
                .with_context(|| format!("failed to open snapshot store at {path}"))?;
            Ok(Arc::new(store))
        }
        StoreConfig::Memory => Ok(Arc::new(InMemoryStore::new())),
    }
}
