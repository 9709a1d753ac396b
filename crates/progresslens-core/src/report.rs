//! Persisted progress reports with JSON round-tripping and period comparison.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::filter::ReportFilters;
use crate::model::{CourseProgress, Diagnostic, LessonResponse, ReportSummary, StudentProgress};

/// Every view of one report run, stamped for later comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressReport {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub teacher_id: String,
    /// Name of the record store backend the report was computed from.
    pub store: String,
    #[serde(default)]
    pub filters: ReportFilters,
    pub summary: ReportSummary,
    pub students: Vec<StudentProgress>,
    pub courses: Vec<CourseProgress>,
    pub lessons: Vec<LessonResponse>,
    #[serde(default)]
    pub diagnostics: Vec<Diagnostic>,
    /// Wall-clock computation time in milliseconds.
    pub duration_ms: u64,
}

impl ProgressReport {
    /// Save the report as JSON to a file.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize report")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        Ok(())
    }

    /// Load a report from a JSON file.
    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read report from {}", path.display()))?;
        let report: ProgressReport = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse report from {}", path.display()))?;
        Ok(report)
    }

    /// Render the report as markdown text.
    pub fn to_markdown(&self) -> String {
        let mut md = String::new();
        let s = &self.summary;

        let _ = writeln!(md, "# Progress report for {}", self.teacher_id);
        let _ = writeln!(
            md,
            "Generated {} from `{}` in {}ms\n",
            self.created_at.format("%Y-%m-%d %H:%M UTC"),
            self.store,
            self.duration_ms
        );

        let _ = writeln!(md, "## Summary\n");
        let _ = writeln!(md, "| Metric | Value |");
        let _ = writeln!(md, "|--------|-------|");
        let _ = writeln!(md, "| Students | {} |", s.total_students);
        let _ = writeln!(md, "| Courses | {} |", s.total_courses);
        let _ = writeln!(md, "| Average grade | {:.1} |", s.average_grade);
        let _ = writeln!(md, "| Completion | {:.1}% |", s.completion_rate * 100.0);
        let _ = writeln!(md, "| Engagement | {:.1} |", s.engagement_level);
        let _ = writeln!(
            md,
            "| Lesson completion | {:.1}% ({} lessons) |",
            s.lesson_completion_rate * 100.0,
            s.total_lessons
        );
        if let Some(top) = &s.top_course {
            let _ = writeln!(md, "| Top course | {} ({:.1}) |", top.course_name, top.average_grade);
        }
        if let Some(star) = &s.most_engaged_student {
            let _ = writeln!(
                md,
                "| Most engaged | {} ({:.1}) |",
                star.student_name, star.engagement_score
            );
        }
        md.push('\n');

        if !s.needs_attention.is_empty() {
            let _ = writeln!(md, "## Needs attention\n");
            for entry in &s.needs_attention {
                let reasons: Vec<String> = entry.reasons.iter().map(|r| r.to_string()).collect();
                let _ = writeln!(
                    md,
                    "- {} ({}): average {:.1}, completion {:.0}% [{}]",
                    entry.student_name,
                    entry.course_id,
                    entry.average_score,
                    entry.completion_rate * 100.0,
                    reasons.join(", ")
                );
            }
            md.push('\n');
        }

        if !self.courses.is_empty() {
            let _ = writeln!(md, "## Courses\n");
            let _ = writeln!(md, "| Course | Enrolled | Average | Completion | Engagement |");
            let _ = writeln!(md, "|--------|----------|---------|------------|------------|");
            for c in &self.courses {
                let _ = writeln!(
                    md,
                    "| {} | {}/{} | {:.1} | {:.1}% | {} |",
                    c.course_name,
                    c.active_enrollment,
                    c.total_enrollment,
                    c.average_grade,
                    c.completion_rate * 100.0,
                    c.engagement_level
                );
            }
            md.push('\n');
        }

        if !self.lessons.is_empty() {
            let _ = writeln!(md, "## Lessons\n");
            for l in &self.lessons {
                let _ = writeln!(
                    md,
                    "- {} ({}): {}/{} responded ({:.0}%)",
                    l.title,
                    l.course_name,
                    l.responded,
                    l.enrolled,
                    l.completion_rate * 100.0
                );
            }
            md.push('\n');
        }

        if !self.diagnostics.is_empty() {
            let _ = writeln!(md, "## Diagnostics\n");
            for d in &self.diagnostics {
                let _ = writeln!(md, "- {d}");
            }
        }

        md
    }

    /// Compare this report against a baseline, per (student, course) unit.
    ///
    /// `threshold` is in average-score points.
    pub fn compare(&self, baseline: &ProgressReport, threshold: f64) -> ProgressComparison {
        let index = |report: &ProgressReport| -> HashMap<(String, String), (String, f64)> {
            report
                .students
                .iter()
                .map(|p| {
                    (
                        (p.student_id.clone(), p.course_id.clone()),
                        (p.student_name.clone(), p.average_score),
                    )
                })
                .collect()
        };

        let baseline_scores = index(baseline);

        let mut declines = Vec::new();
        let mut improvements = Vec::new();
        let mut unchanged = 0usize;
        let mut new_units = 0usize;

        // Walk the current report in its own order so output is stable.
        for p in &self.students {
            let key = (p.student_id.clone(), p.course_id.clone());
            let Some((_, baseline_score)) = baseline_scores.get(&key) else {
                new_units += 1;
                continue;
            };
            let delta = p.average_score - baseline_score;
            let change = ScoreChange {
                student_id: p.student_id.clone(),
                student_name: p.student_name.clone(),
                course_id: p.course_id.clone(),
                baseline_score: *baseline_score,
                current_score: p.average_score,
                delta,
            };
            if delta < -threshold {
                declines.push(change);
            } else if delta > threshold {
                improvements.push(change);
            } else {
                unchanged += 1;
            }
        }

        let current_scores = index(self);
        let removed_units = baseline_scores
            .keys()
            .filter(|k| !current_scores.contains_key(*k))
            .count();

        ProgressComparison {
            declines,
            improvements,
            unchanged,
            new_units,
            removed_units,
        }
    }
}

/// Result of comparing two reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressComparison {
    /// Units whose average score went down by more than the threshold.
    pub declines: Vec<ScoreChange>,
    /// Units whose average score went up by more than the threshold.
    pub improvements: Vec<ScoreChange>,
    pub unchanged: usize,
    /// Units in current but not baseline.
    pub new_units: usize,
    /// Units in baseline but not current.
    pub removed_units: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreChange {
    pub student_id: String,
    pub student_name: String,
    pub course_id: String,
    pub baseline_score: f64,
    pub current_score: f64,
    pub delta: f64,
}

impl ProgressComparison {
    /// Format the comparison as markdown.
    pub fn to_markdown(&self) -> String {
        let mut md = String::new();

        md.push_str(&format!(
            "**Summary:** {} declines, {} improvements, {} unchanged\n\n",
            self.declines.len(),
            self.improvements.len(),
            self.unchanged
        ));

        for (heading, changes) in [
            ("Declines", &self.declines),
            ("Improvements", &self.improvements),
        ] {
            if changes.is_empty() {
                continue;
            }
            md.push_str(&format!("### {heading}\n\n"));
            md.push_str("| Student | Course | Baseline | Current | Delta |\n");
            md.push_str("|---------|--------|----------|---------|-------|\n");
            for c in changes {
                md.push_str(&format!(
                    "| {} | {} | {:.1} | {:.1} | {:+.1} |\n",
                    c.student_name, c.course_id, c.baseline_score, c.current_score, c.delta
                ));
            }
            md.push('\n');
        }

        md
    }

    /// Returns true if any unit declined.
    pub fn has_declines(&self) -> bool {
        !self.declines.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::StudentStatus;

    fn unit(student: &str, course: &str, average: f64) -> StudentProgress {
        StudentProgress {
            student_id: student.into(),
            student_name: format!("Student {student}"),
            email: String::new(),
            status: StudentStatus::Active,
            course_id: course.into(),
            course_name: course.into(),
            total_assignments: 1,
            completed_assignments: 1,
            graded_submissions: 1,
            late_submissions: 0,
            completion_rate: 1.0,
            average_score: average,
            engagement_score: 80.0,
            total_time_spent: 0,
            questions_asked: 0,
            last_activity: None,
            strengths: vec![],
            areas_for_improvement: vec![],
            recent_submissions: vec![],
        }
    }

    fn make_report(students: Vec<StudentProgress>) -> ProgressReport {
        ProgressReport {
            id: Uuid::nil(),
            created_at: Utc::now(),
            teacher_id: "t1".into(),
            store: "memory".into(),
            filters: ReportFilters::default(),
            summary: ReportSummary {
                total_students: students.len(),
                total_courses: 1,
                total_lessons: 0,
                average_grade: 0.0,
                completion_rate: 0.0,
                engagement_level: 0.0,
                lesson_completion_rate: 0.0,
                top_course: None,
                most_engaged_student: None,
                needs_attention: vec![],
            },
            students,
            courses: vec![],
            lessons: vec![],
            diagnostics: vec![],
            duration_ms: 0,
        }
    }

    #[test]
    fn compare_identical_reports() {
        let baseline = make_report(vec![unit("s1", "c1", 80.0)]);
        let current = make_report(vec![unit("s1", "c1", 80.0)]);

        let cmp = current.compare(&baseline, 5.0);
        assert!(cmp.declines.is_empty());
        assert!(cmp.improvements.is_empty());
        assert_eq!(cmp.unchanged, 1);
        assert!(!cmp.has_declines());
    }

    #[test]
    fn compare_detects_decline_and_improvement() {
        let baseline = make_report(vec![unit("s1", "c1", 80.0), unit("s2", "c1", 60.0)]);
        let current = make_report(vec![unit("s1", "c1", 70.0), unit("s2", "c1", 72.0)]);

        let cmp = current.compare(&baseline, 5.0);
        assert_eq!(cmp.declines.len(), 1);
        assert_eq!(cmp.declines[0].student_id, "s1");
        assert!((cmp.declines[0].delta + 10.0).abs() < 1e-9);
        assert_eq!(cmp.improvements.len(), 1);
        assert_eq!(cmp.improvements[0].student_id, "s2");
    }

    #[test]
    fn compare_same_student_in_other_course_is_new() {
        let baseline = make_report(vec![unit("s1", "c1", 80.0)]);
        let current = make_report(vec![unit("s1", "c2", 80.0)]);

        let cmp = current.compare(&baseline, 5.0);
        assert_eq!(cmp.new_units, 1);
        assert_eq!(cmp.removed_units, 1);
    }

    #[test]
    fn json_roundtrip() {
        let report = make_report(vec![unit("s1", "c1", 80.0)]);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("report.json");

        report.save_json(&path).unwrap();
        let loaded = ProgressReport::load_json(&path).unwrap();

        assert_eq!(loaded, report);
    }

    #[test]
    fn load_missing_file_has_context() {
        let err = ProgressReport::load_json(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(format!("{err:#}").contains("failed to read report"));
    }

    #[test]
    fn markdown_output() {
        let baseline = make_report(vec![unit("s1", "c1", 90.0)]);
        let current = make_report(vec![unit("s1", "c1", 50.0)]);

        let md = current.compare(&baseline, 5.0).to_markdown();
        assert!(md.contains("Declines"));
        assert!(md.contains("Student s1"));

        let report_md = current.to_markdown();
        assert!(report_md.contains("# Progress report for t1"));
        assert!(report_md.contains("| Students | 1 |"));
    }
}
