//! The `progresslens validate` command.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use progresslens_store::config::{load_config_from, StoreConfig};
use progresslens_store::Dataset;

pub fn execute(config_path: Option<&Path>, snapshot: Option<PathBuf>) -> Result<()> {
    let config = load_config_from(config_path)?;
    config.engine.to_engine_config()?;
    println!("Config OK.");

    let path = match (snapshot, &config.store) {
        (Some(path), _) => path,
        (None, StoreConfig::Snapshot { path, .. }) => PathBuf::from(path),
        (None, StoreConfig::Memory) => {
            println!("Store is in-memory, no snapshot to check.");
            return Ok(());
        }
    };

    let dataset = Dataset::load_json(&path)
        .with_context(|| format!("failed to load snapshot {}", path.display()))?;
    println!(
        "Snapshot {}: {} courses, {} students, {} assignments, {} submissions",
        path.display(),
        dataset.courses.len(),
        dataset.students.len(),
        dataset.assignments.len(),
        dataset.submissions.len()
    );

    let issues = dataset.check();
    for issue in &issues {
        println!("  WARNING: {issue}");
    }

    if issues.is_empty() {
        println!("Snapshot valid.");
    } else {
        println!("\n{} warning(s) found.", issues.len());
    }

    Ok(())
}
