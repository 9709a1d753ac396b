//! Raw store documents and their one-time normalization.
//!
//! Store backends hand back documents exactly as persisted: optional fields,
//! mixed timestamp shapes, loosely typed status strings. Each `normalize_*`
//! function is the single place where defaults are filled in and bad data is
//! rejected, so scoring can assume complete records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ComputationError;
use crate::filter::{to_instant, RawTimestamp};
use crate::model::{Assignment, Course, Student, StudentStatus, Submission};

pub const UNKNOWN_STUDENT_NAME: &str = "Unknown student";
pub const UNTITLED_COURSE: &str = "Untitled course";
pub const UNTITLED_ASSIGNMENT: &str = "Untitled assignment";
pub const DEFAULT_ASSIGNMENT_KIND: &str = "assignment";
pub const DEFAULT_MAX_POINTS: f64 = 100.0;
const MAX_DIFFICULTY_RATING: u8 = 5;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseDoc {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub teacher_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentDoc {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, alias = "courseIds")]
    pub enrolled_course_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentDoc {
    pub id: String,
    #[serde(default)]
    pub course_id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default, alias = "dueDate")]
    pub due_at: Option<RawTimestamp>,
    #[serde(default)]
    pub max_points: Option<f64>,
    #[serde(default)]
    pub created_at: Option<RawTimestamp>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionDoc {
    pub id: String,
    #[serde(default)]
    pub student_id: Option<String>,
    #[serde(default)]
    pub assignment_id: Option<String>,
    #[serde(default)]
    pub course_id: Option<String>,
    #[serde(default)]
    pub submitted_at: Option<RawTimestamp>,
    #[serde(default)]
    pub grade: Option<f64>,
    #[serde(default)]
    pub feedback: Option<String>,
    #[serde(default, alias = "isLate")]
    pub late: Option<bool>,
    #[serde(default)]
    pub time_spent: Option<u32>,
    #[serde(default)]
    pub questions_asked: Option<u32>,
    #[serde(default)]
    pub difficulty_rating: Option<u8>,
}

/// A batch of normalized records plus the documents that were rejected.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized<T> {
    pub records: Vec<T>,
    pub rejected: Vec<ComputationError>,
}

impl<T> Normalized<T> {
    /// Normalize every document, keeping enumeration order of the survivors.
    pub fn from_docs<D>(
        docs: Vec<D>,
        normalize: impl Fn(D) -> Result<T, ComputationError>,
    ) -> Self {
        let mut records = Vec::with_capacity(docs.len());
        let mut rejected = Vec::new();
        for doc in docs {
            match normalize(doc) {
                Ok(record) => records.push(record),
                Err(e) => rejected.push(e),
            }
        }
        Self { records, rejected }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn required(
    value: Option<String>,
    entity: &'static str,
    id: &str,
    field: &'static str,
) -> Result<String, ComputationError> {
    non_blank(value).ok_or_else(|| ComputationError::MissingField {
        entity,
        id: id.to_string(),
        field,
    })
}

fn instant(
    raw: &RawTimestamp,
    entity: &'static str,
    id: &str,
    field: &'static str,
) -> Result<DateTime<Utc>, ComputationError> {
    to_instant(raw).map_err(|_| ComputationError::InvalidTimestamp {
        entity,
        id: id.to_string(),
        field,
        value: raw.to_string(),
    })
}

pub fn normalize_course(doc: CourseDoc) -> Result<Course, ComputationError> {
    let teacher_id = required(doc.teacher_id, "course", &doc.id, "teacher_id")?;
    Ok(Course {
        name: non_blank(doc.name).unwrap_or_else(|| UNTITLED_COURSE.to_string()),
        teacher_id,
        id: doc.id,
    })
}

pub fn normalize_student(doc: StudentDoc) -> Result<Student, ComputationError> {
    let status = match non_blank(doc.status) {
        None => StudentStatus::Active,
        Some(raw) => raw
            .parse::<StudentStatus>()
            .map_err(|reason| ComputationError::InvalidValue {
                entity: "student",
                id: doc.id.clone(),
                field: "status",
                reason,
            })?,
    };
    Ok(Student {
        name: non_blank(doc.name).unwrap_or_else(|| UNKNOWN_STUDENT_NAME.to_string()),
        email: doc.email.unwrap_or_default(),
        status,
        course_ids: doc.enrolled_course_ids,
        id: doc.id,
    })
}

pub fn normalize_assignment(doc: AssignmentDoc) -> Result<Assignment, ComputationError> {
    let id = doc.id;
    let course_id = required(doc.course_id, "assignment", &id, "course_id")?;
    let created_at = match &doc.created_at {
        Some(raw) => instant(raw, "assignment", &id, "created_at")?,
        None => {
            return Err(ComputationError::MissingField {
                entity: "assignment",
                id,
                field: "created_at",
            })
        }
    };
    let due_at = doc
        .due_at
        .as_ref()
        .map(|raw| instant(raw, "assignment", &id, "due_at"))
        .transpose()?;
    let max_points = doc.max_points.unwrap_or(DEFAULT_MAX_POINTS);
    if !max_points.is_finite() || max_points <= 0.0 {
        return Err(ComputationError::InvalidValue {
            entity: "assignment",
            id,
            field: "max_points",
            reason: format!("{max_points} is not a positive number"),
        });
    }

    Ok(Assignment {
        course_id,
        title: non_blank(doc.title).unwrap_or_else(|| UNTITLED_ASSIGNMENT.to_string()),
        kind: non_blank(doc.kind)
            .map(|k| k.trim().to_lowercase())
            .unwrap_or_else(|| DEFAULT_ASSIGNMENT_KIND.to_string()),
        due_at,
        max_points,
        created_at,
        id,
    })
}

pub fn normalize_submission(doc: SubmissionDoc) -> Result<Submission, ComputationError> {
    let id = doc.id;
    let student_id = required(doc.student_id, "submission", &id, "student_id")?;
    let assignment_id = required(doc.assignment_id, "submission", &id, "assignment_id")?;
    let course_id = required(doc.course_id, "submission", &id, "course_id")?;
    let submitted_at = match &doc.submitted_at {
        Some(raw) => instant(raw, "submission", &id, "submitted_at")?,
        None => {
            return Err(ComputationError::MissingField {
                entity: "submission",
                id,
                field: "submitted_at",
            })
        }
    };
    if let Some(grade) = doc.grade {
        if !grade.is_finite() || grade < 0.0 {
            return Err(ComputationError::InvalidValue {
                entity: "submission",
                id,
                field: "grade",
                reason: format!("{grade} is not a non-negative number"),
            });
        }
    }

    Ok(Submission {
        student_id,
        assignment_id,
        course_id,
        submitted_at,
        grade: doc.grade,
        feedback: non_blank(doc.feedback),
        late: doc.late.unwrap_or(false),
        time_spent: doc.time_spent.unwrap_or(0),
        questions_asked: doc.questions_asked.unwrap_or(0),
        difficulty_rating: doc
            .difficulty_rating
            .map(|r| r.clamp(1, MAX_DIFFICULTY_RATING)),
        id,
    })
}
