//! The `progresslens summary` command.

use std::path::{Path, PathBuf};

use anyhow::Result;

use progresslens_core::model::ReportSummary;

use super::{cancel_on_ctrl_c, percent, print_diagnostics, ReportArgs, Session};

pub async fn execute(
    config_path: Option<&Path>,
    args: ReportArgs,
    output: Option<PathBuf>,
) -> Result<()> {
    let session = Session::open(config_path, &args)?;
    let cancel = cancel_on_ctrl_c();

    tracing::info!(
        teacher = %session.teacher_id,
        store = session.engine.reader().store_name(),
        "computing report"
    );
    let report = session
        .engine
        .full_report(&session.teacher_id, &session.filters, &cancel)
        .await?;

    if let Some(path) = &output {
        report.save_json(path)?;
        eprintln!("Report saved to {}", path.display());
    }

    match args.format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&report)?),
        "markdown" | "md" => println!("{}", report.to_markdown()),
        _ => {
            print_summary(&report.summary);
            print_diagnostics(&report.diagnostics);
        }
    }

    Ok(())
}

pub fn print_summary(summary: &ReportSummary) {
    println!(
        "{} students in {} courses, {} lessons",
        summary.total_students, summary.total_courses, summary.total_lessons
    );
    println!("  average grade:      {:.1}", summary.average_grade);
    println!("  completion:         {}", percent(summary.completion_rate));
    println!("  engagement:         {:.1}", summary.engagement_level);
    println!(
        "  lesson completion:  {}",
        percent(summary.lesson_completion_rate)
    );
    if let Some(top) = &summary.top_course {
        println!(
            "  top course:         {} ({:.1})",
            top.course_name, top.average_grade
        );
    }
    if let Some(student) = &summary.most_engaged_student {
        println!(
            "  most engaged:       {} ({:.1})",
            student.student_name, student.engagement_score
        );
    }

    if !summary.needs_attention.is_empty() {
        println!("\nNeeds attention:");
        for entry in &summary.needs_attention {
            let reasons: Vec<String> = entry.reasons.iter().map(|r| r.to_string()).collect();
            println!(
                "  {} [{}] avg {:.1}, completion {} ({})",
                entry.student_name,
                entry.course_id,
                entry.average_score,
                percent(entry.completion_rate),
                reasons.join(", ")
            );
        }
    }
}
