//! The `progresslens lessons` command.

use std::path::Path;

use anyhow::Result;
use comfy_table::{Cell, Table};

use super::{cancel_on_ctrl_c, date, minutes, percent, print_diagnostics, ReportArgs, Session};

pub async fn execute(config_path: Option<&Path>, args: ReportArgs) -> Result<()> {
    let session = Session::open(config_path, &args)?;
    let cancel = cancel_on_ctrl_c();

    let report = session
        .engine
        .lesson_response_report(&session.teacher_id, &session.filters, &cancel)
        .await?;

    if args.json() {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    if report.data.is_empty() {
        println!(
            "No lessons match (lessons are assignments of type \"{}\").",
            session.engine.config().lesson_type
        );
    } else {
        let mut table = Table::new();
        table.set_header(vec![
            "Lesson",
            "Course",
            "Due",
            "Responded",
            "Completion",
            "Avg time",
            "Avg difficulty",
            "Questions",
        ]);
        for lesson in &report.data {
            table.add_row(vec![
                Cell::new(&lesson.title),
                Cell::new(&lesson.course_name),
                Cell::new(date(lesson.due_at)),
                Cell::new(format!("{}/{}", lesson.responded, lesson.enrolled)),
                Cell::new(percent(lesson.completion_rate)),
                Cell::new(minutes(lesson.average_time_spent)),
                Cell::new(
                    lesson
                        .average_difficulty
                        .map(|d| format!("{d:.1}/5"))
                        .unwrap_or_else(|| "-".to_string()),
                ),
                Cell::new(lesson.total_questions),
            ]);
        }
        println!("{table}");

        let missing: Vec<String> = report
            .data
            .iter()
            .flat_map(|lesson| {
                lesson
                    .participants
                    .iter()
                    .filter(|p| !p.completed)
                    .map(move |p| format!("  {}: {}", lesson.title, p.student_name))
            })
            .collect();
        if !missing.is_empty() {
            println!("\nNot yet responded:");
            for line in &missing {
                println!("{line}");
            }
        }
    }

    print_diagnostics(&report.diagnostics);
    Ok(())
}
