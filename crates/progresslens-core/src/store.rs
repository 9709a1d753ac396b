//! Record store trait and the adapter boundary in front of it.
//!
//! [`RecordStore`] is implemented by the backends in `progresslens-store`.
//! The aggregator never talks to it directly; it goes through
//! [`RecordReader`], which bounds every call with a timeout and normalizes
//! the returned documents.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::model::{Assignment, Course, Student, Submission};
use crate::record::{
    normalize_assignment, normalize_course, normalize_student, normalize_submission,
    AssignmentDoc, CourseDoc, Normalized, StudentDoc, SubmissionDoc,
};

/// A notification that something under a course changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseChange {
    pub course_id: String,
}

/// Stream of course change notifications. Dropping it unsubscribes.
pub type ChangeFeed = BoxStream<'static, CourseChange>;

/// Read-only access to the external collection store.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Human-readable backend name (e.g. "snapshot").
    fn name(&self) -> &str;

    async fn list_courses_by_teacher(&self, teacher_id: &str) -> Result<Vec<CourseDoc>, StoreError>;

    async fn list_students_by_course(&self, course_id: &str) -> Result<Vec<StudentDoc>, StoreError>;

    async fn list_assignments_by_course(
        &self,
        course_id: &str,
    ) -> Result<Vec<AssignmentDoc>, StoreError>;

    /// Submissions of one student within one course.
    async fn list_submissions(
        &self,
        student_id: &str,
        course_id: &str,
    ) -> Result<Vec<SubmissionDoc>, StoreError>;

    async fn list_submissions_by_assignment(
        &self,
        assignment_id: &str,
    ) -> Result<Vec<SubmissionDoc>, StoreError>;

    /// Subscribe to changes under any course owned by `teacher_id`.
    async fn subscribe_course_changes(&self, teacher_id: &str) -> Result<ChangeFeed, StoreError>;
}

/// Timeout-bounded, normalizing view over a [`RecordStore`].
#[derive(Clone)]
pub struct RecordReader {
    store: Arc<dyn RecordStore>,
    timeout: Duration,
}

impl RecordReader {
    pub fn new(store: Arc<dyn RecordStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    pub fn store_name(&self) -> &str {
        self.store.name()
    }

    async fn bounded<T, F>(
        &self,
        operation: &'static str,
        key: String,
        call: F,
    ) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout {
                operation,
                key,
                timeout_ms: self.timeout.as_millis() as u64,
            }),
        }
    }

    pub async fn courses(&self, teacher_id: &str) -> Result<Normalized<Course>, StoreError> {
        let docs = self
            .bounded(
                "list_courses_by_teacher",
                teacher_id.to_string(),
                self.store.list_courses_by_teacher(teacher_id),
            )
            .await?;
        Ok(Normalized::from_docs(docs, normalize_course))
    }

    pub async fn students(&self, course_id: &str) -> Result<Normalized<Student>, StoreError> {
        let docs = self
            .bounded(
                "list_students_by_course",
                course_id.to_string(),
                self.store.list_students_by_course(course_id),
            )
            .await?;
        Ok(Normalized::from_docs(docs, normalize_student))
    }

    pub async fn assignments(&self, course_id: &str) -> Result<Normalized<Assignment>, StoreError> {
        let docs = self
            .bounded(
                "list_assignments_by_course",
                course_id.to_string(),
                self.store.list_assignments_by_course(course_id),
            )
            .await?;
        Ok(Normalized::from_docs(docs, normalize_assignment))
    }

    pub async fn submissions(
        &self,
        student_id: &str,
        course_id: &str,
    ) -> Result<Normalized<Submission>, StoreError> {
        let docs = self
            .bounded(
                "list_submissions",
                format!("{student_id}/{course_id}"),
                self.store.list_submissions(student_id, course_id),
            )
            .await?;
        Ok(Normalized::from_docs(docs, normalize_submission))
    }

    pub async fn submissions_for_assignment(
        &self,
        assignment_id: &str,
    ) -> Result<Normalized<Submission>, StoreError> {
        let docs = self
            .bounded(
                "list_submissions_by_assignment",
                assignment_id.to_string(),
                self.store.list_submissions_by_assignment(assignment_id),
            )
            .await?;
        Ok(Normalized::from_docs(docs, normalize_submission))
    }

    pub async fn course_changes(&self, teacher_id: &str) -> Result<ChangeFeed, StoreError> {
        self.bounded(
            "subscribe_course_changes",
            teacher_id.to_string(),
            self.store.subscribe_course_changes(teacher_id),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::RawTimestamp;

    /// Store whose only populated collection is a fixed course list.
    struct FixedStore {
        courses: Vec<CourseDoc>,
        delay: Duration,
    }

    #[async_trait]
    impl RecordStore for FixedStore {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn list_courses_by_teacher(&self, _: &str) -> Result<Vec<CourseDoc>, StoreError> {
            tokio::time::sleep(self.delay).await;
            Ok(self.courses.clone())
        }

        async fn list_students_by_course(&self, _: &str) -> Result<Vec<StudentDoc>, StoreError> {
            Ok(vec![])
        }

        async fn list_assignments_by_course(
            &self,
            _: &str,
        ) -> Result<Vec<AssignmentDoc>, StoreError> {
            Ok(vec![AssignmentDoc {
                id: "a1".into(),
                course_id: Some("c1".into()),
                created_at: Some(RawTimestamp::Text("garbage".into())),
                ..Default::default()
            }])
        }

        async fn list_submissions(
            &self,
            _: &str,
            _: &str,
        ) -> Result<Vec<SubmissionDoc>, StoreError> {
            Ok(vec![])
        }

        async fn list_submissions_by_assignment(
            &self,
            _: &str,
        ) -> Result<Vec<SubmissionDoc>, StoreError> {
            Ok(vec![])
        }

        async fn subscribe_course_changes(&self, _: &str) -> Result<ChangeFeed, StoreError> {
            Ok(Box::pin(futures::stream::empty()))
        }
    }

    fn course(id: &str) -> CourseDoc {
        CourseDoc {
            id: id.into(),
            name: Some(format!("Course {id}")),
            teacher_id: Some("t1".into()),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn slow_store_surfaces_timeout() {
        let reader = RecordReader::new(
            Arc::new(FixedStore {
                courses: vec![course("c1")],
                delay: Duration::from_secs(30),
            }),
            Duration::from_millis(500),
        );
        let err = reader.courses("t1").await.unwrap_err();
        assert_eq!(
            err,
            StoreError::Timeout {
                operation: "list_courses_by_teacher",
                key: "t1".into(),
                timeout_ms: 500,
            }
        );
    }

    #[tokio::test]
    async fn reader_normalizes_and_reports_rejects() {
        let reader = RecordReader::new(
            Arc::new(FixedStore {
                courses: vec![course("c1"), course("c2")],
                delay: Duration::ZERO,
            }),
            Duration::from_secs(1),
        );
        let courses = reader.courses("t1").await.unwrap();
        assert_eq!(courses.records.len(), 2);
        assert!(courses.rejected.is_empty());

        let assignments = reader.assignments("c1").await.unwrap();
        assert!(assignments.records.is_empty());
        assert_eq!(assignments.rejected.len(), 1);
    }
}
