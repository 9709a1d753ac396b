//! Record store backed by a JSON snapshot file.
//!
//! The file is reloaded whenever its modification time changes. The change
//! feed polls the file and, after every reload, reports each course of the
//! subscribed teacher as changed.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;

use progresslens_core::error::StoreError;
use progresslens_core::record::{AssignmentDoc, CourseDoc, StudentDoc, SubmissionDoc};
use progresslens_core::store::{ChangeFeed, CourseChange, RecordStore};

use crate::dataset::Dataset;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

struct Loaded {
    modified: Option<SystemTime>,
    dataset: Arc<Dataset>,
}

pub struct SnapshotStore {
    path: PathBuf,
    poll_interval: Duration,
    cache: RwLock<Loaded>,
}

async fn modified_at(path: &Path) -> Option<SystemTime> {
    tokio::fs::metadata(path).await.ok()?.modified().ok()
}

async fn read_dataset(
    path: &Path,
    operation: &'static str,
    key: &str,
) -> Result<Dataset, StoreError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| StoreError::Unavailable {
            operation,
            key: key.to_string(),
            message: format!("{}: {e}", path.display()),
        })?;
    serde_json::from_str(&content).map_err(|e| StoreError::Malformed {
        collection: "snapshot",
        message: format!("{}: {e}", path.display()),
    })
}

impl SnapshotStore {
    /// Open a snapshot file. The file must exist and parse.
    pub fn open(path: impl Into<PathBuf>, poll_interval: Duration) -> Result<Self> {
        let path = path.into();
        let dataset = Dataset::load_json(&path)?;
        let modified = std::fs::metadata(&path).and_then(|m| m.modified()).ok();
        tracing::debug!(
            path = %path.display(),
            courses = dataset.courses.len(),
            students = dataset.students.len(),
            "snapshot loaded"
        );
        Ok(Self {
            path,
            poll_interval,
            cache: RwLock::new(Loaded {
                modified,
                dataset: Arc::new(dataset),
            }),
        })
    }

    /// Current dataset, reloaded first if the file changed on disk.
    ///
    /// Readers only share the lock for the mtime comparison; the write lock
    /// is taken just to reload.
    async fn dataset(
        &self,
        operation: &'static str,
        key: &str,
    ) -> Result<Arc<Dataset>, StoreError> {
        let modified = modified_at(&self.path).await;
        if modified.is_none() {
            return Err(StoreError::Unavailable {
                operation,
                key: key.to_string(),
                message: format!("{} is no longer readable", self.path.display()),
            });
        }
        {
            let cache = self.cache.read().await;
            if cache.modified == modified {
                return Ok(Arc::clone(&cache.dataset));
            }
        }

        let mut cache = self.cache.write().await;
        // Another reader may have reloaded while this one waited.
        if cache.modified != modified {
            let dataset = read_dataset(&self.path, operation, key).await?;
            tracing::info!(path = %self.path.display(), "snapshot reloaded");
            cache.modified = modified;
            cache.dataset = Arc::new(dataset);
        }
        Ok(Arc::clone(&cache.dataset))
    }
}

struct Poll {
    path: PathBuf,
    interval: Duration,
    teacher_id: String,
    modified: Option<SystemTime>,
    pending: VecDeque<CourseChange>,
}

#[async_trait]
impl RecordStore for SnapshotStore {
    fn name(&self) -> &str {
        "snapshot"
    }

    async fn list_courses_by_teacher(
        &self,
        teacher_id: &str,
    ) -> Result<Vec<CourseDoc>, StoreError> {
        let data = self.dataset("list_courses_by_teacher", teacher_id).await?;
        Ok(data.courses_by_teacher(teacher_id))
    }

    async fn list_students_by_course(
        &self,
        course_id: &str,
    ) -> Result<Vec<StudentDoc>, StoreError> {
        let data = self.dataset("list_students_by_course", course_id).await?;
        Ok(data.students_in_course(course_id))
    }

    async fn list_assignments_by_course(
        &self,
        course_id: &str,
    ) -> Result<Vec<AssignmentDoc>, StoreError> {
        let data = self.dataset("list_assignments_by_course", course_id).await?;
        Ok(data.assignments_in_course(course_id))
    }

    async fn list_submissions(
        &self,
        student_id: &str,
        course_id: &str,
    ) -> Result<Vec<SubmissionDoc>, StoreError> {
        let data = self
            .dataset("list_submissions", &format!("{student_id}/{course_id}"))
            .await?;
        Ok(data.submissions_for(student_id, course_id))
    }

    async fn list_submissions_by_assignment(
        &self,
        assignment_id: &str,
    ) -> Result<Vec<SubmissionDoc>, StoreError> {
        let data = self
            .dataset("list_submissions_by_assignment", assignment_id)
            .await?;
        Ok(data.submissions_for_assignment(assignment_id))
    }

    async fn subscribe_course_changes(&self, teacher_id: &str) -> Result<ChangeFeed, StoreError> {
        let modified = {
            // Make sure the feed starts from what readers currently see.
            self.dataset("subscribe_course_changes", teacher_id).await?;
            self.cache.read().await.modified
        };
        let poll = Poll {
            path: self.path.clone(),
            interval: self.poll_interval,
            teacher_id: teacher_id.to_string(),
            modified,
            pending: VecDeque::new(),
        };
        let feed = futures::stream::unfold(poll, |mut poll| async move {
            loop {
                if let Some(change) = poll.pending.pop_front() {
                    return Some((change, poll));
                }
                tokio::time::sleep(poll.interval).await;

                let modified = modified_at(&poll.path).await;
                if modified.is_none() || modified == poll.modified {
                    continue;
                }
                match read_dataset(&poll.path, "subscribe_course_changes", &poll.teacher_id).await {
                    Ok(dataset) => {
                        poll.modified = modified;
                        poll.pending = dataset
                            .courses_by_teacher(&poll.teacher_id)
                            .into_iter()
                            .map(|c| CourseChange { course_id: c.id })
                            .collect();
                    }
                    // Probably caught mid-write; the next poll retries.
                    Err(e) => tracing::debug!("snapshot not readable yet: {e}"),
                }
            }
        });
        Ok(Box::pin(feed))
    }
}
