//! The `progresslens compare` command.

use std::path::PathBuf;

use anyhow::Result;

use progresslens_core::report::ProgressReport;

pub fn execute(
    baseline_path: PathBuf,
    current_path: PathBuf,
    threshold: f64,
    fail_on_decline: bool,
    format: String,
) -> Result<()> {
    let baseline = ProgressReport::load_json(&baseline_path)?;
    let current = ProgressReport::load_json(&current_path)?;

    if baseline.teacher_id != current.teacher_id {
        eprintln!(
            "warning: comparing reports for different teachers ({} vs {})",
            baseline.teacher_id, current.teacher_id
        );
    }

    let comparison = current.compare(&baseline, threshold);

    match format.as_str() {
        "markdown" | "md" => {
            println!("{}", comparison.to_markdown());
        }
        "json" => {
            println!("{}", serde_json::to_string_pretty(&comparison)?);
        }
        _ => {
            println!(
                "Comparison: {} declines, {} improvements, {} unchanged",
                comparison.declines.len(),
                comparison.improvements.len(),
                comparison.unchanged
            );

            for (heading, changes) in [
                ("Declines", &comparison.declines),
                ("Improvements", &comparison.improvements),
            ] {
                if changes.is_empty() {
                    continue;
                }
                println!("\n{heading}:");
                for c in changes {
                    println!(
                        "  {} [{}] {:.1} -> {:.1} ({:+.1})",
                        c.student_name, c.course_id, c.baseline_score, c.current_score, c.delta
                    );
                }
            }

            if comparison.new_units > 0 {
                println!("\n{} new student/course pair(s)", comparison.new_units);
            }
            if comparison.removed_units > 0 {
                println!("{} removed student/course pair(s)", comparison.removed_units);
            }
        }
    }

    if fail_on_decline && comparison.has_declines() {
        std::process::exit(1);
    }

    Ok(())
}
