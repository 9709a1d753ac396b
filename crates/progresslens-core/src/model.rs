//! Core data model types for progresslens.
//!
//! Entities (`Student`, `Course`, `Assignment`, `Submission`) are fully
//! populated records produced by the normalization step in [`crate::record`].
//! The view types are recomputed per report and never persisted as the source
//! of truth.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ComputationError, StoreError};

/// Enrollment status of a student.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StudentStatus {
    Active,
    Inactive,
    Suspended,
}

impl fmt::Display for StudentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StudentStatus::Active => write!(f, "active"),
            StudentStatus::Inactive => write!(f, "inactive"),
            StudentStatus::Suspended => write!(f, "suspended"),
        }
    }
}

impl FromStr for StudentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "active" | "enrolled" => Ok(StudentStatus::Active),
            "inactive" | "withdrawn" => Ok(StudentStatus::Inactive),
            "suspended" => Ok(StudentStatus::Suspended),
            other => Err(format!("unknown student status: {other}")),
        }
    }
}

/// A student known to the platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Student {
    pub id: String,
    pub name: String,
    pub email: String,
    pub status: StudentStatus,
    pub course_ids: Vec<String>,
}

/// A course owned by one teacher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    pub id: String,
    pub name: String,
    pub teacher_id: String,
}

/// A piece of coursework. Lessons are assignments whose `kind` equals the
/// configured lesson tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub id: String,
    pub course_id: String,
    pub title: String,
    pub kind: String,
    pub due_at: Option<DateTime<Utc>>,
    pub max_points: f64,
    pub created_at: DateTime<Utc>,
}

/// One student's submission for one assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub id: String,
    pub student_id: String,
    pub assignment_id: String,
    pub course_id: String,
    pub submitted_at: DateTime<Utc>,
    pub grade: Option<f64>,
    pub feedback: Option<String>,
    pub late: bool,
    /// Minutes spent on the work.
    pub time_spent: u32,
    pub questions_asked: u32,
    /// Self-reported difficulty, 1 (easy) to 5 (hard).
    pub difficulty_rating: Option<u8>,
}

// ---------------------------------------------------------------------------
// Diagnostics
// ---------------------------------------------------------------------------

/// What went wrong for an omitted unit or record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// A sub-fetch failed; the unit of work was omitted.
    StoreFailure,
    /// A record was excluded during normalization.
    MalformedRecord,
}

/// A recoverable problem recorded next to a partial report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignment_id: Option<String>,
    pub message: String,
}

impl Diagnostic {
    pub fn store_failure(error: &StoreError) -> Self {
        Self {
            kind: DiagnosticKind::StoreFailure,
            course_id: None,
            student_id: None,
            assignment_id: None,
            message: error.to_string(),
        }
    }

    pub fn malformed(error: &ComputationError) -> Self {
        Self {
            kind: DiagnosticKind::MalformedRecord,
            course_id: None,
            student_id: None,
            assignment_id: None,
            message: error.to_string(),
        }
    }

    pub fn in_course(mut self, course_id: &str) -> Self {
        self.course_id = Some(course_id.to_string());
        self
    }

    pub fn for_student(mut self, student_id: &str) -> Self {
        self.student_id = Some(student_id.to_string());
        self
    }

    pub fn for_assignment(mut self, assignment_id: &str) -> Self {
        self.assignment_id = Some(assignment_id.to_string());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scope: Vec<String> = [
            self.course_id.as_ref().map(|c| format!("course={c}")),
            self.student_id.as_ref().map(|s| format!("student={s}")),
            self.assignment_id.as_ref().map(|a| format!("assignment={a}")),
        ]
        .into_iter()
        .flatten()
        .collect();
        if scope.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "[{}] {}", scope.join(" "), self.message)
        }
    }
}

/// A report value together with the diagnostics gathered while computing it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportResult<T> {
    pub data: T,
    #[serde(default)]
    pub diagnostics: Vec<Diagnostic>,
}

// ---------------------------------------------------------------------------
// Student progress
// ---------------------------------------------------------------------------

/// A submission shown in a student's recent activity list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecentSubmission {
    pub submission_id: String,
    pub assignment_id: String,
    pub assignment_title: String,
    pub submitted_at: DateTime<Utc>,
    pub grade: Option<f64>,
    pub late: bool,
}

/// Progress of one student in one course.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentProgress {
    pub student_id: String,
    pub student_name: String,
    pub email: String,
    pub status: StudentStatus,
    pub course_id: String,
    pub course_name: String,
    pub total_assignments: usize,
    pub completed_assignments: usize,
    pub graded_submissions: usize,
    pub late_submissions: usize,
    pub completion_rate: f64,
    pub average_score: f64,
    pub engagement_score: f64,
    /// Total minutes across the student's submissions.
    pub total_time_spent: u64,
    pub questions_asked: u64,
    pub last_activity: Option<DateTime<Utc>>,
    pub strengths: Vec<String>,
    pub areas_for_improvement: Vec<String>,
    pub recent_submissions: Vec<RecentSubmission>,
}

// ---------------------------------------------------------------------------
// Course progress
// ---------------------------------------------------------------------------

/// Coarse engagement bucket for a course.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngagementLevel {
    Low,
    Medium,
    High,
}

impl fmt::Display for EngagementLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngagementLevel::Low => write!(f, "Low"),
            EngagementLevel::Medium => write!(f, "Medium"),
            EngagementLevel::High => write!(f, "High"),
        }
    }
}

/// Difficulty label derived from how students actually scored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Difficulty {
    Easy,
    Moderate,
    Hard,
    /// Nothing graded yet.
    Unrated,
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Difficulty::Easy => write!(f, "Easy"),
            Difficulty::Moderate => write!(f, "Moderate"),
            Difficulty::Hard => write!(f, "Hard"),
            Difficulty::Unrated => write!(f, "Unrated"),
        }
    }
}

/// Submission statistics for one assignment within a course report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentStats {
    pub assignment_id: String,
    pub title: String,
    pub kind: String,
    pub due_at: Option<DateTime<Utc>>,
    pub max_points: f64,
    pub submission_count: usize,
    pub completion_rate: f64,
    pub average_grade: Option<f64>,
    pub difficulty: Difficulty,
}

/// A student's position in a course ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedStudent {
    pub student_id: String,
    pub student_name: String,
    pub average_score: f64,
    pub completion_rate: f64,
}

/// Aggregated view of one course.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseProgress {
    pub course_id: String,
    pub course_name: String,
    pub total_enrollment: usize,
    pub active_enrollment: usize,
    pub average_grade: f64,
    pub completion_rate: f64,
    pub engagement_score: f64,
    pub engagement_level: EngagementLevel,
    pub assignments: Vec<AssignmentStats>,
    pub top_students: Vec<RankedStudent>,
    pub struggling_students: Vec<RankedStudent>,
}

// ---------------------------------------------------------------------------
// Lesson response
// ---------------------------------------------------------------------------

/// One enrolled student's response (or non-response) to a lesson.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LessonParticipant {
    pub student_id: String,
    pub student_name: String,
    pub completed: bool,
    pub submitted_at: Option<DateTime<Utc>>,
    pub time_spent: u32,
    pub questions_asked: u32,
    pub difficulty_rating: Option<u8>,
    pub grade: Option<f64>,
    pub engagement_score: f64,
}

/// Response statistics for one lesson across all enrolled students.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LessonResponse {
    pub lesson_id: String,
    pub title: String,
    pub course_id: String,
    pub course_name: String,
    pub due_at: Option<DateTime<Utc>>,
    pub enrolled: usize,
    pub responded: usize,
    pub completion_rate: f64,
    pub average_time_spent: f64,
    pub average_difficulty: Option<f64>,
    pub total_questions: u64,
    pub participants: Vec<LessonParticipant>,
}

// ---------------------------------------------------------------------------
// Report summary
// ---------------------------------------------------------------------------

/// Why a student was flagged for follow-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttentionReason {
    LowGrade,
    LowCompletion,
}

impl fmt::Display for AttentionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttentionReason::LowGrade => write!(f, "low grade"),
            AttentionReason::LowCompletion => write!(f, "low completion"),
        }
    }
}

/// A student flagged by the needs-attention predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttentionEntry {
    pub student_id: String,
    pub student_name: String,
    pub course_id: String,
    pub average_score: f64,
    pub completion_rate: f64,
    pub reasons: Vec<AttentionReason>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseHighlight {
    pub course_id: String,
    pub course_name: String,
    pub average_grade: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentHighlight {
    pub student_id: String,
    pub student_name: String,
    pub course_id: String,
    pub engagement_score: f64,
}

/// Dashboard headline numbers composed from the other three views.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total_students: usize,
    pub total_courses: usize,
    pub total_lessons: usize,
    pub average_grade: f64,
    pub completion_rate: f64,
    /// Mean engagement score across student units.
    pub engagement_level: f64,
    pub lesson_completion_rate: f64,
    pub top_course: Option<CourseHighlight>,
    pub most_engaged_student: Option<StudentHighlight>,
    pub needs_attention: Vec<AttentionEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parse_and_display() {
        assert_eq!("Active".parse::<StudentStatus>().unwrap(), StudentStatus::Active);
        assert_eq!(
            "enrolled".parse::<StudentStatus>().unwrap(),
            StudentStatus::Active
        );
        assert_eq!(
            "withdrawn".parse::<StudentStatus>().unwrap(),
            StudentStatus::Inactive
        );
        assert_eq!(StudentStatus::Suspended.to_string(), "suspended");
        assert!("graduated".parse::<StudentStatus>().is_err());
    }

    #[test]
    fn diagnostic_display_includes_scope() {
        let diag = Diagnostic::store_failure(&StoreError::Unavailable {
            operation: "list_submissions",
            key: "s1/c1".into(),
            message: "boom".into(),
        })
        .in_course("c1")
        .for_student("s1");
        let text = diag.to_string();
        assert!(text.starts_with("[course=c1 student=s1]"), "got: {text}");
        assert!(text.contains("boom"));
    }

    #[test]
    fn diagnostic_serde_skips_empty_scope() {
        let diag = Diagnostic::malformed(&ComputationError::MissingField {
            entity: "submission",
            id: "sub-1".into(),
            field: "submitted_at",
        });
        let json = serde_json::to_string(&diag).unwrap();
        assert!(!json.contains("course_id"));
        assert!(json.contains("malformed_record"));
    }
}
