//! Live report updates.
//!
//! A subscription listens to the store's course change feed and recomputes
//! the report summary whenever something changes. At most one recomputation
//! runs at a time; changes arriving meanwhile collapse into a single
//! follow-up run.

use std::sync::{Arc, Mutex, MutexGuard};

use futures::StreamExt;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::engine::ReportEngine;
use crate::error::{ConfigurationError, ReportError};
use crate::filter::ReportFilters;
use crate::model::{ReportResult, ReportSummary};

/// Receives every recomputed summary, or the error that replaced it.
pub type SummaryCallback =
    Arc<dyn Fn(Result<ReportResult<ReportSummary>, ReportError>) + Send + Sync>;

#[derive(Debug)]
struct State {
    dirty: bool,
    feed_closed: bool,
    filters: ReportFilters,
}

struct Shared {
    state: Mutex<State>,
    wake: Notify,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        // Poisoning is ignored; the state is plain flags.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn mark_dirty(&self) {
        self.lock().dirty = true;
        self.wake.notify_one();
    }

    fn close_feed(&self) {
        self.lock().feed_closed = true;
        self.wake.notify_one();
    }

    /// Clear the dirty flag and return the filters to recompute with.
    fn take_dirty(&self) -> Option<ReportFilters> {
        let mut state = self.lock();
        if state.dirty {
            state.dirty = false;
            Some(state.filters.clone())
        } else {
            None
        }
    }

    fn feed_closed(&self) -> bool {
        self.lock().feed_closed
    }
}

/// Entry point for live subscriptions over one engine.
#[derive(Clone)]
pub struct LiveReports {
    engine: Arc<ReportEngine>,
}

impl LiveReports {
    pub fn new(engine: Arc<ReportEngine>) -> Self {
        Self { engine }
    }

    /// Subscribe to summary updates for `teacher_id`.
    ///
    /// The callback first receives the current summary, then one refreshed
    /// summary per burst of course changes. Filters are validated and the
    /// change feed is opened before this returns, so a bad request fails
    /// here rather than through the callback.
    pub async fn subscribe<F>(
        &self,
        teacher_id: &str,
        filters: ReportFilters,
        callback: F,
    ) -> Result<ReportSubscription, ReportError>
    where
        F: Fn(Result<ReportResult<ReportSummary>, ReportError>) + Send + Sync + 'static,
    {
        if teacher_id.trim().is_empty() {
            return Err(ConfigurationError::BlankValue {
                field: "teacher_id",
            }
            .into());
        }
        filters.validate()?;

        let mut feed = self.engine.reader().course_changes(teacher_id).await?;
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                // The initial summary is just the first drain.
                dirty: true,
                feed_closed: false,
                filters,
            }),
            wake: Notify::new(),
        });
        let cancel = CancellationToken::new();

        let listener = {
            let shared = Arc::clone(&shared);
            let cancel = cancel.clone();
            let teacher_id = teacher_id.to_string();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        change = feed.next() => match change {
                            Some(change) => {
                                tracing::debug!(
                                    teacher_id = %teacher_id,
                                    course_id = %change.course_id,
                                    "course changed"
                                );
                                shared.mark_dirty();
                            }
                            None => {
                                tracing::info!(teacher_id = %teacher_id, "change feed closed");
                                shared.close_feed();
                                break;
                            }
                        },
                    }
                }
            })
        };

        let worker = {
            let shared = Arc::clone(&shared);
            let cancel = cancel.clone();
            let engine = Arc::clone(&self.engine);
            let teacher_id = teacher_id.to_string();
            let callback: SummaryCallback = Arc::new(callback);
            tokio::spawn(async move {
                loop {
                    while let Some(filters) = shared.take_dirty() {
                        let result = engine.report_summary(&teacher_id, &filters, &cancel).await;
                        if cancel.is_cancelled() {
                            return;
                        }
                        if let Err(e) = &result {
                            tracing::error!(
                                teacher_id = %teacher_id,
                                "live recomputation failed: {e}"
                            );
                        }
                        callback(result);
                    }
                    if shared.feed_closed() {
                        break;
                    }
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return,
                        _ = shared.wake.notified() => {}
                    }
                }
                tracing::info!(teacher_id = %teacher_id, "live subscription ended");
            })
        };

        tracing::info!(teacher_id, "live subscription started");
        Ok(ReportSubscription {
            shared,
            cancel,
            listener,
            worker: Some(worker),
        })
    }
}

/// Handle to a live subscription. Dropping it unsubscribes.
pub struct ReportSubscription {
    shared: Arc<Shared>,
    cancel: CancellationToken,
    listener: JoinHandle<()>,
    worker: Option<JoinHandle<()>>,
}

impl ReportSubscription {
    /// Replace the filters and schedule a recomputation with them.
    pub fn set_filters(&self, filters: ReportFilters) -> Result<(), ConfigurationError> {
        filters.validate()?;
        {
            let mut state = self.shared.lock();
            state.filters = filters;
            state.dirty = true;
        }
        self.shared.wake.notify_one();
        Ok(())
    }

    /// Stop listening and abandon any in-flight recomputation.
    pub fn unsubscribe(&self) {
        self.cancel.cancel();
    }

    /// True until unsubscribed or until the store closes its feed and the
    /// last pending recomputation has been delivered.
    pub fn is_active(&self) -> bool {
        !self.cancel.is_cancelled()
            && self.worker.as_ref().is_some_and(|worker| !worker.is_finished())
    }

    /// Wait until the worker has stopped, either because the store closed
    /// its feed or because the subscription was cancelled.
    ///
    /// Cancel safe: the worker handle is only released once it has finished.
    pub async fn closed(&mut self) {
        if let Some(worker) = self.worker.as_mut() {
            let _ = worker.await;
            self.worker = None;
        }
    }
}

impl Drop for ReportSubscription {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.listener.abort();
    }
}
