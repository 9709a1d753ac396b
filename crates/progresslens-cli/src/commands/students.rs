//! The `progresslens students` command.

use std::path::Path;

use anyhow::Result;
use comfy_table::{Cell, Table};

use progresslens_core::model::StudentProgress;

use super::{cancel_on_ctrl_c, date, percent, print_diagnostics, ReportArgs, Session};

pub async fn execute(config_path: Option<&Path>, args: ReportArgs) -> Result<()> {
    let session = Session::open(config_path, &args)?;
    let cancel = cancel_on_ctrl_c();

    let report = session
        .engine
        .student_progress_report(&session.teacher_id, &session.filters, &cancel)
        .await?;

    if args.json() {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_table(&report.data);
        print_diagnostics(&report.diagnostics);
    }
    Ok(())
}

fn print_table(progress: &[StudentProgress]) {
    if progress.is_empty() {
        println!("No students match.");
        return;
    }

    let mut table = Table::new();
    table.set_header(vec![
        "Student",
        "Course",
        "Completed",
        "Completion",
        "Avg score",
        "Engagement",
        "Late",
        "Last activity",
    ]);

    for p in progress {
        table.add_row(vec![
            Cell::new(format!("{} ({})", p.student_name, p.student_id)),
            Cell::new(&p.course_name),
            Cell::new(format!("{}/{}", p.completed_assignments, p.total_assignments)),
            Cell::new(percent(p.completion_rate)),
            Cell::new(format!("{:.1}", p.average_score)),
            Cell::new(format!("{:.1}", p.engagement_score)),
            Cell::new(p.late_submissions),
            Cell::new(date(p.last_activity)),
        ]);
    }

    println!("{table}");
}
