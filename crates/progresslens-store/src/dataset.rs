//! The document collections both backends serve from.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use progresslens_core::record::{
    normalize_assignment, normalize_course, normalize_student, normalize_submission,
    AssignmentDoc, CourseDoc, StudentDoc, SubmissionDoc,
};

/// Raw documents for every collection, as persisted in a snapshot file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    #[serde(default)]
    pub courses: Vec<CourseDoc>,
    #[serde(default)]
    pub students: Vec<StudentDoc>,
    #[serde(default)]
    pub assignments: Vec<AssignmentDoc>,
    #[serde(default)]
    pub submissions: Vec<SubmissionDoc>,
}

impl Dataset {
    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read dataset: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse dataset: {}", path.display()))
    }

    pub fn save_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("failed to write dataset: {}", path.display()))?;
        Ok(())
    }

    pub fn courses_by_teacher(&self, teacher_id: &str) -> Vec<CourseDoc> {
        self.courses
            .iter()
            .filter(|c| c.teacher_id.as_deref() == Some(teacher_id))
            .cloned()
            .collect()
    }

    pub fn students_in_course(&self, course_id: &str) -> Vec<StudentDoc> {
        self.students
            .iter()
            .filter(|s| s.enrolled_course_ids.iter().any(|id| id == course_id))
            .cloned()
            .collect()
    }

    pub fn assignments_in_course(&self, course_id: &str) -> Vec<AssignmentDoc> {
        self.assignments
            .iter()
            .filter(|a| a.course_id.as_deref() == Some(course_id))
            .cloned()
            .collect()
    }

    pub fn submissions_for(&self, student_id: &str, course_id: &str) -> Vec<SubmissionDoc> {
        self.submissions
            .iter()
            .filter(|s| {
                s.student_id.as_deref() == Some(student_id)
                    && s.course_id.as_deref() == Some(course_id)
            })
            .cloned()
            .collect()
    }

    pub fn submissions_for_assignment(&self, assignment_id: &str) -> Vec<SubmissionDoc> {
        self.submissions
            .iter()
            .filter(|s| s.assignment_id.as_deref() == Some(assignment_id))
            .cloned()
            .collect()
    }

    /// Does `teacher_id` own `course_id`?
    pub fn owns_course(&self, teacher_id: &str, course_id: &str) -> bool {
        self.courses
            .iter()
            .any(|c| c.id == course_id && c.teacher_id.as_deref() == Some(teacher_id))
    }

    pub fn course_of_assignment(&self, assignment_id: &str) -> Option<String> {
        self.assignments
            .iter()
            .find(|a| a.id == assignment_id)
            .and_then(|a| a.course_id.clone())
    }

    /// Everything a report run would reject or silently miss.
    ///
    /// Covers documents that fail normalization, duplicate ids, and
    /// references to courses, students or assignments that do not exist.
    pub fn check(&self) -> Vec<String> {
        let mut issues = Vec::new();

        for doc in &self.courses {
            if let Err(e) = normalize_course(doc.clone()) {
                issues.push(e.to_string());
            }
        }
        for doc in &self.students {
            if let Err(e) = normalize_student(doc.clone()) {
                issues.push(e.to_string());
            }
        }
        for doc in &self.assignments {
            if let Err(e) = normalize_assignment(doc.clone()) {
                issues.push(e.to_string());
            }
        }
        for doc in &self.submissions {
            if let Err(e) = normalize_submission(doc.clone()) {
                issues.push(e.to_string());
            }
        }

        duplicates("course", self.courses.iter().map(|d| d.id.as_str()), &mut issues);
        duplicates("student", self.students.iter().map(|d| d.id.as_str()), &mut issues);
        duplicates("assignment", self.assignments.iter().map(|d| d.id.as_str()), &mut issues);
        duplicates("submission", self.submissions.iter().map(|d| d.id.as_str()), &mut issues);

        let courses: HashSet<&str> = self.courses.iter().map(|c| c.id.as_str()).collect();
        let students: HashSet<&str> = self.students.iter().map(|s| s.id.as_str()).collect();
        let assignments: HashSet<&str> = self.assignments.iter().map(|a| a.id.as_str()).collect();

        for s in &self.students {
            for course_id in &s.enrolled_course_ids {
                if !courses.contains(course_id.as_str()) {
                    issues.push(format!(
                        "student {}: enrolled in unknown course {course_id}",
                        s.id
                    ));
                }
            }
        }
        for a in &self.assignments {
            if let Some(course_id) = a.course_id.as_deref() {
                if !courses.contains(course_id) {
                    issues.push(format!("assignment {}: unknown course {course_id}", a.id));
                }
            }
        }
        for s in &self.submissions {
            if let Some(student_id) = s.student_id.as_deref() {
                if !students.contains(student_id) {
                    issues.push(format!("submission {}: unknown student {student_id}", s.id));
                }
            }
            if let Some(assignment_id) = s.assignment_id.as_deref() {
                if !assignments.contains(assignment_id) {
                    issues.push(format!("submission {}: unknown assignment {assignment_id}", s.id));
                }
            }
        }

        issues
    }
}

fn duplicates<'a>(entity: &str, ids: impl Iterator<Item = &'a str>, issues: &mut Vec<String>) {
    let mut seen = HashSet::new();
    let mut reported = HashSet::new();
    for id in ids {
        if !seen.insert(id) && reported.insert(id) {
            issues.push(format!("duplicate {entity} id {id}"));
        }
    }
}
