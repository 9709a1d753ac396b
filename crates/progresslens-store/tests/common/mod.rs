//! Document builders shared by the integration tests.

#![allow(dead_code)]

use chrono::{TimeZone, Utc};

use progresslens_core::filter::RawTimestamp;
use progresslens_core::record::{AssignmentDoc, CourseDoc, StudentDoc, SubmissionDoc};
use progresslens_store::InMemoryStore;

pub fn day(d: u32) -> RawTimestamp {
    RawTimestamp::Native(Utc.with_ymd_and_hms(2024, 1, d, 9, 0, 0).unwrap())
}

pub fn course(id: &str, teacher: &str) -> CourseDoc {
    CourseDoc {
        id: id.into(),
        name: Some(format!("Course {id}")),
        teacher_id: Some(teacher.into()),
    }
}

pub fn student(id: &str, courses: &[&str]) -> StudentDoc {
    StudentDoc {
        id: id.into(),
        name: Some(id.to_uppercase()),
        email: Some(format!("{id}@school.test")),
        status: Some("active".into()),
        enrolled_course_ids: courses.iter().map(|c| c.to_string()).collect(),
    }
}

pub fn assignment(id: &str, course: &str, kind: &str, created: RawTimestamp) -> AssignmentDoc {
    AssignmentDoc {
        id: id.into(),
        course_id: Some(course.into()),
        title: Some(format!("Title {id}")),
        kind: Some(kind.into()),
        due_at: None,
        max_points: Some(100.0),
        created_at: Some(created),
    }
}

pub fn submission(
    id: &str,
    student: &str,
    assignment: &str,
    course: &str,
    at: RawTimestamp,
    grade: Option<f64>,
) -> SubmissionDoc {
    SubmissionDoc {
        id: id.into(),
        student_id: Some(student.into()),
        assignment_id: Some(assignment.into()),
        course_id: Some(course.into()),
        submitted_at: Some(at),
        grade,
        feedback: None,
        late: Some(false),
        time_spent: Some(20),
        questions_asked: Some(1),
        difficulty_rating: Some(3),
    }
}

/// Course c1 of teacher t1: two assignments, student x submits both
/// (90 and 80), student y submits one (50).
pub fn two_student_course() -> InMemoryStore {
    InMemoryStore::new()
        .with_course(course("c1", "t1"))
        .with_student(student("x", &["c1"]))
        .with_student(student("y", &["c1"]))
        .with_assignment(assignment("a1", "c1", "assignment", day(1)))
        .with_assignment(assignment("a2", "c1", "assignment", day(2)))
        .with_submission(submission("s1", "x", "a1", "c1", day(3), Some(90.0)))
        .with_submission(submission("s2", "x", "a2", "c1", day(4), Some(80.0)))
        .with_submission(submission("s3", "y", "a1", "c1", day(5), Some(50.0)))
}

pub fn approx(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {expected}, got {actual}"
    );
}
