//! The `progresslens courses` command.

use std::path::Path;

use anyhow::Result;
use comfy_table::{Cell, Table};

use progresslens_core::model::{CourseProgress, RankedStudent};

use super::{cancel_on_ctrl_c, percent, print_diagnostics, ReportArgs, Session};

pub async fn execute(config_path: Option<&Path>, args: ReportArgs) -> Result<()> {
    let session = Session::open(config_path, &args)?;
    let cancel = cancel_on_ctrl_c();

    let report = session
        .engine
        .course_progress_report(&session.teacher_id, &session.filters, &cancel)
        .await?;

    if args.json() {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for course in &report.data {
            print_course(course);
        }
        if report.data.is_empty() {
            println!("No courses match.");
        }
        print_diagnostics(&report.diagnostics);
    }
    Ok(())
}

fn names(students: &[RankedStudent]) -> String {
    if students.is_empty() {
        return "-".to_string();
    }
    students
        .iter()
        .map(|s| format!("{} ({:.1})", s.student_name, s.average_score))
        .collect::<Vec<_>>()
        .join(", ")
}

fn print_course(course: &CourseProgress) {
    println!("{} ({})", course.course_name, course.course_id);
    println!(
        "  enrolled {} (active {}), avg grade {:.1}, completion {}, engagement {:.1} [{}]",
        course.total_enrollment,
        course.active_enrollment,
        course.average_grade,
        percent(course.completion_rate),
        course.engagement_score,
        course.engagement_level,
    );
    println!("  top: {}", names(&course.top_students));
    println!("  struggling: {}", names(&course.struggling_students));

    if course.assignments.is_empty() {
        println!();
        return;
    }

    let mut table = Table::new();
    table.set_header(vec![
        "Assignment",
        "Type",
        "Submissions",
        "Completion",
        "Avg grade",
        "Difficulty",
    ]);
    for a in &course.assignments {
        table.add_row(vec![
            Cell::new(&a.title),
            Cell::new(&a.kind),
            Cell::new(a.submission_count),
            Cell::new(percent(a.completion_rate)),
            Cell::new(
                a.average_grade
                    .map(|g| format!("{g:.1}/{:.0}", a.max_points))
                    .unwrap_or_else(|| "-".to_string()),
            ),
            Cell::new(a.difficulty),
        ]);
    }
    println!("{table}\n");
}
