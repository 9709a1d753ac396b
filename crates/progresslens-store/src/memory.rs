//! In-memory record store.
//!
//! Holds a mutable [`Dataset`] and broadcasts a [`CourseChange`] on every
//! mutation. Latency and per-call failures can be injected, and every read
//! is counted, which makes it the backend of choice for tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::RwLock;

use progresslens_core::error::StoreError;
use progresslens_core::record::{AssignmentDoc, CourseDoc, StudentDoc, SubmissionDoc};
use progresslens_core::store::{ChangeFeed, CourseChange, RecordStore};

use crate::dataset::Dataset;

const CHANGE_CAPACITY: usize = 64;

/// Matches any key in [`InMemoryStore::fail_on`].
pub const ANY_KEY: &str = "*";

pub struct InMemoryStore {
    data: Arc<RwLock<Dataset>>,
    changes: Mutex<Option<broadcast::Sender<CourseChange>>>,
    latency: Duration,
    failures: Mutex<HashSet<(String, String)>>,
    reads: AtomicUsize,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::from_dataset(Dataset::default())
    }

    pub fn from_dataset(dataset: Dataset) -> Self {
        let (tx, _) = broadcast::channel(CHANGE_CAPACITY);
        Self {
            data: Arc::new(RwLock::new(dataset)),
            changes: Mutex::new(Some(tx)),
            latency: Duration::ZERO,
            failures: Mutex::new(HashSet::new()),
            reads: AtomicUsize::new(0),
        }
    }

    pub fn with_course(self, doc: CourseDoc) -> Self {
        self.seed(|data| data.courses.push(doc))
    }

    pub fn with_student(self, doc: StudentDoc) -> Self {
        self.seed(|data| data.students.push(doc))
    }

    pub fn with_assignment(self, doc: AssignmentDoc) -> Self {
        self.seed(|data| data.assignments.push(doc))
    }

    pub fn with_submission(self, doc: SubmissionDoc) -> Self {
        self.seed(|data| data.submissions.push(doc))
    }

    fn seed(self, f: impl FnOnce(&mut Dataset)) -> Self {
        // Builders run before the store is shared, so the lock is free.
        if let Ok(mut data) = self.data.try_write() {
            f(&mut data);
        }
        self
    }

    /// Delay every call by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Make `operation` fail for `key` (or for every key with [`ANY_KEY`]).
    ///
    /// Keys are the ones the store is called with; `list_submissions` uses
    /// `"{student_id}/{course_id}"`.
    pub fn fail_on(&self, operation: &str, key: &str) {
        guard(&self.failures).insert((operation.to_string(), key.to_string()));
    }

    pub fn clear_failures(&self) {
        guard(&self.failures).clear();
    }

    /// Number of calls served so far, failed ones included.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub async fn snapshot(&self) -> Dataset {
        self.data.read().await.clone()
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    pub async fn add_submission(&self, doc: SubmissionDoc) {
        let course_id = {
            let mut data = self.data.write().await;
            let course_id = doc.course_id.clone().or_else(|| {
                doc.assignment_id
                    .as_deref()
                    .and_then(|id| data.course_of_assignment(id))
            });
            data.submissions.push(doc);
            course_id
        };
        if let Some(course_id) = course_id {
            self.touch_course(&course_id);
        }
    }

    /// Returns `false` if no submission had that id.
    pub async fn remove_submission(&self, submission_id: &str) -> bool {
        let removed = {
            let mut data = self.data.write().await;
            match data.submissions.iter().position(|s| s.id == submission_id) {
                Some(index) => Some(data.submissions.remove(index)),
                None => None,
            }
        };
        match removed {
            Some(doc) => {
                if let Some(course_id) = doc.course_id {
                    self.touch_course(&course_id);
                }
                true
            }
            None => false,
        }
    }

    pub async fn upsert_assignment(&self, doc: AssignmentDoc) {
        let course_id = doc.course_id.clone();
        {
            let mut data = self.data.write().await;
            match data.assignments.iter_mut().find(|a| a.id == doc.id) {
                Some(existing) => *existing = doc,
                None => data.assignments.push(doc),
            }
        }
        if let Some(course_id) = course_id {
            self.touch_course(&course_id);
        }
    }

    /// Insert or replace a student; every course they are enrolled in changes.
    pub async fn enroll_student(&self, doc: StudentDoc) {
        let courses = doc.enrolled_course_ids.clone();
        {
            let mut data = self.data.write().await;
            match data.students.iter_mut().find(|s| s.id == doc.id) {
                Some(existing) => *existing = doc,
                None => data.students.push(doc),
            }
        }
        for course_id in &courses {
            self.touch_course(course_id);
        }
    }

    /// Announce a change under `course_id` without mutating anything.
    pub fn touch_course(&self, course_id: &str) {
        if let Some(tx) = guard(&self.changes).as_ref() {
            // No subscribers is fine.
            let _ = tx.send(CourseChange {
                course_id: course_id.to_string(),
            });
        }
    }

    /// End every open change feed. Later subscriptions are refused.
    pub fn close_feeds(&self) {
        guard(&self.changes).take();
    }

    async fn enter(&self, operation: &'static str, key: &str) -> Result<(), StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let failing = {
            let failures = guard(&self.failures);
            failures.contains(&(operation.to_string(), key.to_string()))
                || failures.contains(&(operation.to_string(), ANY_KEY.to_string()))
        };
        if failing {
            return Err(StoreError::Unavailable {
                operation,
                key: key.to_string(),
                message: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for InMemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn list_courses_by_teacher(
        &self,
        teacher_id: &str,
    ) -> Result<Vec<CourseDoc>, StoreError> {
        self.enter("list_courses_by_teacher", teacher_id).await?;
        Ok(self.data.read().await.courses_by_teacher(teacher_id))
    }

    async fn list_students_by_course(
        &self,
        course_id: &str,
    ) -> Result<Vec<StudentDoc>, StoreError> {
        self.enter("list_students_by_course", course_id).await?;
        Ok(self.data.read().await.students_in_course(course_id))
    }

    async fn list_assignments_by_course(
        &self,
        course_id: &str,
    ) -> Result<Vec<AssignmentDoc>, StoreError> {
        self.enter("list_assignments_by_course", course_id).await?;
        Ok(self.data.read().await.assignments_in_course(course_id))
    }

    async fn list_submissions(
        &self,
        student_id: &str,
        course_id: &str,
    ) -> Result<Vec<SubmissionDoc>, StoreError> {
        self.enter("list_submissions", &format!("{student_id}/{course_id}"))
            .await?;
        Ok(self.data.read().await.submissions_for(student_id, course_id))
    }

    async fn list_submissions_by_assignment(
        &self,
        assignment_id: &str,
    ) -> Result<Vec<SubmissionDoc>, StoreError> {
        self.enter("list_submissions_by_assignment", assignment_id)
            .await?;
        Ok(self.data.read().await.submissions_for_assignment(assignment_id))
    }

    async fn subscribe_course_changes(&self, teacher_id: &str) -> Result<ChangeFeed, StoreError> {
        let rx = match guard(&self.changes).as_ref() {
            Some(tx) => tx.subscribe(),
            None => {
                return Err(StoreError::Unavailable {
                    operation: "subscribe_course_changes",
                    key: teacher_id.to_string(),
                    message: "change feeds are closed".to_string(),
                })
            }
        };
        let state = (rx, Arc::clone(&self.data), teacher_id.to_string());
        let feed = futures::stream::unfold(state, |(mut rx, data, teacher_id)| async move {
            loop {
                match rx.recv().await {
                    Ok(change) => {
                        if data.read().await.owns_course(&teacher_id, &change.course_id) {
                            return Some((change, (rx, data, teacher_id)));
                        }
                    }
                    // Missed notifications are followed by newer ones.
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "change feed lagged");
                    }
                    Err(RecvError::Closed) => return None,
                }
            }
        });
        Ok(Box::pin(feed))
    }
}
