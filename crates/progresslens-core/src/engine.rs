//! Report aggregation engine.
//!
//! Fans out over courses, students and lessons with bounded concurrency,
//! scores every unit, and folds the results into the four report views.
//! Results are always collected back into enumeration order, so tie-breaks
//! never depend on which store call finished first.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::{Semaphore, SemaphorePermit};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{ConfigurationError, ReportError, StoreError};
use crate::filter::ReportFilters;
use crate::model::{
    Assignment, AssignmentStats, Course, CourseHighlight, CourseProgress, Diagnostic,
    LessonParticipant, LessonResponse, RankedStudent, ReportResult, ReportSummary, Student,
    StudentHighlight, StudentProgress, StudentStatus, Submission,
};
use crate::record::Normalized;
use crate::report::ProgressReport;
use crate::scoring;
use crate::store::{RecordReader, RecordStore};

pub const TOP_STUDENTS: usize = 3;
pub const STRUGGLING_STUDENTS: usize = 2;

/// Configuration for the report engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum units of work reading from the store at once.
    pub concurrency: usize,
    /// Timeout applied to every store call.
    pub store_timeout: Duration,
    /// Cap on the needs-attention list.
    pub attention_limit: usize,
    /// Assignment type tag that marks lessons.
    pub lesson_type: String,
    /// Entries in each student's recent submission list.
    pub recent_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            store_timeout: Duration::from_secs(10),
            attention_limit: scoring::DEFAULT_ATTENTION_LIMIT,
            lesson_type: "lesson".to_string(),
            recent_limit: scoring::DEFAULT_RECENT_LIMIT,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.concurrency == 0 {
            return Err(ConfigurationError::ZeroLimit {
                field: "concurrency",
            });
        }
        if self.store_timeout.is_zero() {
            return Err(ConfigurationError::ZeroLimit {
                field: "store_timeout",
            });
        }
        if self.lesson_type.trim().is_empty() {
            return Err(ConfigurationError::BlankValue {
                field: "lesson_type",
            });
        }
        Ok(())
    }
}

/// Why a unit of work produced no result.
enum UnitError {
    Store(StoreError),
    Cancelled,
}

impl From<StoreError> for UnitError {
    fn from(e: StoreError) -> Self {
        UnitError::Store(e)
    }
}

/// One scored (student, course) pair.
struct StudentUnit {
    submissions: Vec<Submission>,
    progress: StudentProgress,
}

/// Everything read for one course.
struct CourseData {
    course: Course,
    students: Vec<Student>,
    /// All normalized assignments, before filtering.
    all_assignments: Vec<Assignment>,
    /// Assignments that passed the filter pipeline.
    assignments: Vec<Assignment>,
    units: Vec<StudentUnit>,
}

/// All four views from one pass of reads.
struct Views {
    students: Vec<StudentProgress>,
    courses: Vec<CourseProgress>,
    lessons: Vec<LessonResponse>,
    summary: ReportSummary,
    diagnostics: Vec<Diagnostic>,
}

/// Run `f` over every item concurrently and return outputs in input order.
async fn fan_out<I, F, Fut, T>(items: I, f: F) -> Vec<T>
where
    I: IntoIterator,
    F: Fn(I::Item) -> Fut,
    Fut: Future<Output = T>,
{
    let mut pending: FuturesUnordered<_> = items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            let fut = f(item);
            async move { (index, fut.await) }
        })
        .collect();

    let mut done = Vec::with_capacity(pending.len());
    while let Some(output) = pending.next().await {
        done.push(output);
    }
    done.sort_by_key(|(index, _)| *index);
    done.into_iter().map(|(_, output)| output).collect()
}

fn note(diagnostics: &mut Vec<Diagnostic>, diagnostic: Diagnostic) {
    tracing::warn!("{diagnostic}");
    diagnostics.push(diagnostic);
}

fn note_rejected<T>(
    diagnostics: &mut Vec<Diagnostic>,
    batch: &Normalized<T>,
    scope: impl Fn(Diagnostic) -> Diagnostic,
) {
    for error in &batch.rejected {
        note(diagnostics, scope(Diagnostic::malformed(error)));
    }
}

/// The report engine. Holds the injected store and shares one concurrency
/// budget across every report it computes.
pub struct ReportEngine {
    reader: RecordReader,
    config: EngineConfig,
    permits: Semaphore,
}

impl ReportEngine {
    pub fn new(store: Arc<dyn RecordStore>, config: EngineConfig) -> Self {
        Self {
            reader: RecordReader::new(store, config.store_timeout),
            permits: Semaphore::new(config.concurrency.max(1)),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn reader(&self) -> &RecordReader {
        &self.reader
    }

    /// Wait for a concurrency slot, then check for cancellation.
    async fn permit(&self, cancel: &CancellationToken) -> Result<SemaphorePermit<'_>, UnitError> {
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(UnitError::Cancelled),
            permit = self.permits.acquire() => permit.map_err(|_| UnitError::Cancelled)?,
        };
        if cancel.is_cancelled() {
            return Err(UnitError::Cancelled);
        }
        Ok(permit)
    }

    fn check_request(
        &self,
        teacher_id: &str,
        filters: &ReportFilters,
    ) -> Result<(), ConfigurationError> {
        if teacher_id.trim().is_empty() {
            return Err(ConfigurationError::BlankValue {
                field: "teacher_id",
            });
        }
        filters.validate()
    }

    // -----------------------------------------------------------------------
    // Public report operations
    // -----------------------------------------------------------------------

    /// One `StudentProgress` per (student, course) unit.
    pub async fn student_progress_report(
        &self,
        teacher_id: &str,
        filters: &ReportFilters,
        cancel: &CancellationToken,
    ) -> Result<ReportResult<Vec<StudentProgress>>, ReportError> {
        let (courses, diagnostics) = self.gather(teacher_id, filters, cancel, true).await?;
        let data: Vec<StudentProgress> = courses
            .into_iter()
            .flat_map(|c| c.units.into_iter().map(|u| u.progress))
            .collect();
        tracing::info!(
            teacher_id,
            units = data.len(),
            diagnostics = diagnostics.len(),
            "student progress report ready"
        );
        Ok(ReportResult { data, diagnostics })
    }

    pub async fn course_progress_report(
        &self,
        teacher_id: &str,
        filters: &ReportFilters,
        cancel: &CancellationToken,
    ) -> Result<ReportResult<Vec<CourseProgress>>, ReportError> {
        let (courses, diagnostics) = self.gather(teacher_id, filters, cancel, true).await?;
        let data: Vec<CourseProgress> = courses.iter().map(course_progress).collect();
        tracing::info!(
            teacher_id,
            courses = data.len(),
            diagnostics = diagnostics.len(),
            "course progress report ready"
        );
        Ok(ReportResult { data, diagnostics })
    }

    pub async fn lesson_response_report(
        &self,
        teacher_id: &str,
        filters: &ReportFilters,
        cancel: &CancellationToken,
    ) -> Result<ReportResult<Vec<LessonResponse>>, ReportError> {
        let (courses, mut diagnostics) = self.gather(teacher_id, filters, cancel, false).await?;
        let data = self
            .lessons(&courses, filters, cancel, &mut diagnostics)
            .await?;
        tracing::info!(
            teacher_id,
            lessons = data.len(),
            diagnostics = diagnostics.len(),
            "lesson response report ready"
        );
        Ok(ReportResult { data, diagnostics })
    }

    pub async fn report_summary(
        &self,
        teacher_id: &str,
        filters: &ReportFilters,
        cancel: &CancellationToken,
    ) -> Result<ReportResult<ReportSummary>, ReportError> {
        let views = self.views(teacher_id, filters, cancel).await?;
        Ok(ReportResult {
            data: views.summary,
            diagnostics: views.diagnostics,
        })
    }

    /// Compute every view from one pass of reads and stamp it for persistence.
    pub async fn full_report(
        &self,
        teacher_id: &str,
        filters: &ReportFilters,
        cancel: &CancellationToken,
    ) -> Result<ProgressReport, ReportError> {
        let start = Instant::now();
        let views = self.views(teacher_id, filters, cancel).await?;
        Ok(ProgressReport {
            id: Uuid::new_v4(),
            created_at: chrono::Utc::now(),
            teacher_id: teacher_id.to_string(),
            store: self.reader.store_name().to_string(),
            filters: filters.clone(),
            summary: views.summary,
            students: views.students,
            courses: views.courses,
            lessons: views.lessons,
            diagnostics: views.diagnostics,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    // -----------------------------------------------------------------------
    // Fan-out
    // -----------------------------------------------------------------------

    async fn views(
        &self,
        teacher_id: &str,
        filters: &ReportFilters,
        cancel: &CancellationToken,
    ) -> Result<Views, ReportError> {
        let (courses, mut diagnostics) = self.gather(teacher_id, filters, cancel, true).await?;
        let lessons = self
            .lessons(&courses, filters, cancel, &mut diagnostics)
            .await?;
        let course_views: Vec<CourseProgress> = courses.iter().map(course_progress).collect();
        let students: Vec<StudentProgress> = courses
            .into_iter()
            .flat_map(|c| c.units.into_iter().map(|u| u.progress))
            .collect();
        let summary = summarize(&students, &course_views, &lessons, self.config.attention_limit);
        tracing::info!(
            teacher_id,
            students = summary.total_students,
            courses = summary.total_courses,
            lessons = summary.total_lessons,
            diagnostics = diagnostics.len(),
            "report summary ready"
        );
        Ok(Views {
            students,
            courses: course_views,
            lessons,
            summary,
            diagnostics,
        })
    }

    /// Read the teacher's courses and everything under them.
    ///
    /// Only the course listing itself is fatal; any failure below it omits
    /// that unit and records a diagnostic.
    async fn gather(
        &self,
        teacher_id: &str,
        filters: &ReportFilters,
        cancel: &CancellationToken,
        with_units: bool,
    ) -> Result<(Vec<CourseData>, Vec<Diagnostic>), ReportError> {
        self.check_request(teacher_id, filters)?;
        let mut diagnostics = Vec::new();

        let listed = {
            let _permit = match self.permit(cancel).await {
                Ok(permit) => permit,
                Err(_) => return Err(ReportError::Cancelled),
            };
            self.reader.courses(teacher_id).await?
        };
        note_rejected(&mut diagnostics, &listed, |d| d);
        let courses = filters.filter_courses(listed.records);
        tracing::debug!(teacher_id, courses = courses.len(), "gathering courses");

        let outcomes = fan_out(courses, |course| {
            self.gather_course(course, filters, cancel, with_units)
        })
        .await;

        let mut gathered = Vec::with_capacity(outcomes.len());
        for (course_id, outcome) in outcomes {
            match outcome {
                Ok((data, course_diagnostics)) => {
                    diagnostics.extend(course_diagnostics);
                    gathered.push(data);
                }
                Err(UnitError::Cancelled) => return Err(ReportError::Cancelled),
                Err(UnitError::Store(e)) => {
                    note(&mut diagnostics, Diagnostic::store_failure(&e).in_course(&course_id));
                }
            }
        }
        Ok((gathered, diagnostics))
    }

    async fn gather_course(
        &self,
        course: Course,
        filters: &ReportFilters,
        cancel: &CancellationToken,
        with_units: bool,
    ) -> (String, Result<(CourseData, Vec<Diagnostic>), UnitError>) {
        let course_id = course.id.clone();
        let outcome = self.read_course(course, filters, cancel, with_units).await;
        (course_id, outcome)
    }

    async fn read_course(
        &self,
        course: Course,
        filters: &ReportFilters,
        cancel: &CancellationToken,
        with_units: bool,
    ) -> Result<(CourseData, Vec<Diagnostic>), UnitError> {
        let (students, assignments) = {
            let _permit = self.permit(cancel).await?;
            futures::try_join!(
                self.reader.students(&course.id),
                self.reader.assignments(&course.id)
            )?
        };

        let mut diagnostics = Vec::new();
        note_rejected(&mut diagnostics, &students, |d| d.in_course(&course.id));
        note_rejected(&mut diagnostics, &assignments, |d| d.in_course(&course.id));

        let students = filters.filter_students(students.records);
        let all_assignments = assignments.records;
        let filtered = filters.filter_assignments(all_assignments.clone());

        let mut data = CourseData {
            course,
            students,
            all_assignments,
            assignments: filtered,
            units: Vec::new(),
        };

        if with_units {
            let outcomes = fan_out(&data.students, |student| {
                self.score_student(&data, student, filters, cancel)
            })
            .await;
            let mut units = Vec::with_capacity(outcomes.len());
            for (student, outcome) in data.students.iter().zip(outcomes) {
                match outcome {
                    Ok((unit, unit_diagnostics)) => {
                        diagnostics.extend(unit_diagnostics);
                        units.push(unit);
                    }
                    Err(UnitError::Cancelled) => return Err(UnitError::Cancelled),
                    Err(UnitError::Store(e)) => note(
                        &mut diagnostics,
                        Diagnostic::store_failure(&e)
                            .in_course(&data.course.id)
                            .for_student(&student.id),
                    ),
                }
            }
            data.units = units;
        }

        tracing::debug!(
            course_id = %data.course.id,
            students = data.students.len(),
            assignments = data.assignments.len(),
            "course gathered"
        );
        Ok((data, diagnostics))
    }

    async fn score_student(
        &self,
        data: &CourseData,
        student: &Student,
        filters: &ReportFilters,
        cancel: &CancellationToken,
    ) -> Result<(StudentUnit, Vec<Diagnostic>), UnitError> {
        let fetched = {
            let _permit = self.permit(cancel).await?;
            self.reader.submissions(&student.id, &data.course.id).await?
        };

        let mut diagnostics = Vec::new();
        note_rejected(&mut diagnostics, &fetched, |d| {
            d.in_course(&data.course.id).for_student(&student.id)
        });

        let submissions = filters.filter_submissions(fetched.records, &data.all_assignments);
        let progress = build_progress(
            student,
            &data.course,
            &data.assignments,
            &data.all_assignments,
            &submissions,
            self.config.recent_limit,
        );
        Ok((
            StudentUnit {
                submissions,
                progress,
            },
            diagnostics,
        ))
    }

    async fn lessons(
        &self,
        courses: &[CourseData],
        filters: &ReportFilters,
        cancel: &CancellationToken,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Result<Vec<LessonResponse>, ReportError> {
        let lesson_type = self.config.lesson_type.as_str();
        let units: Vec<(&CourseData, &Assignment)> = courses
            .iter()
            .flat_map(|data| {
                data.assignments
                    .iter()
                    .filter(move |a| a.kind.eq_ignore_ascii_case(lesson_type))
                    .map(move |a| (data, a))
            })
            .collect();

        let outcomes = fan_out(units.iter().copied(), |(data, lesson)| {
            self.read_lesson(data, lesson, filters, cancel)
        })
        .await;

        let mut lessons = Vec::with_capacity(outcomes.len());
        for ((data, lesson), outcome) in units.iter().zip(outcomes) {
            match outcome {
                Ok((response, lesson_diagnostics)) => {
                    diagnostics.extend(lesson_diagnostics);
                    lessons.push(response);
                }
                Err(UnitError::Cancelled) => return Err(ReportError::Cancelled),
                Err(UnitError::Store(e)) => note(
                    diagnostics,
                    Diagnostic::store_failure(&e)
                        .in_course(&data.course.id)
                        .for_assignment(&lesson.id),
                ),
            }
        }
        Ok(lessons)
    }

    async fn read_lesson(
        &self,
        data: &CourseData,
        lesson: &Assignment,
        filters: &ReportFilters,
        cancel: &CancellationToken,
    ) -> Result<(LessonResponse, Vec<Diagnostic>), UnitError> {
        let fetched = {
            let _permit = self.permit(cancel).await?;
            self.reader.submissions_for_assignment(&lesson.id).await?
        };

        let mut diagnostics = Vec::new();
        note_rejected(&mut diagnostics, &fetched, |d| {
            d.in_course(&data.course.id).for_assignment(&lesson.id)
        });

        let submissions = filters.filter_submissions(fetched.records, &data.all_assignments);
        Ok((
            lesson_response(&data.course, lesson, &data.students, &submissions),
            diagnostics,
        ))
    }
}

// ---------------------------------------------------------------------------
// Folding unit results into views
// ---------------------------------------------------------------------------

fn build_progress(
    student: &Student,
    course: &Course,
    assignments: &[Assignment],
    all_assignments: &[Assignment],
    submissions: &[Submission],
    recent_limit: usize,
) -> StudentProgress {
    let card = scoring::score_unit(assignments, submissions);
    StudentProgress {
        student_id: student.id.clone(),
        student_name: student.name.clone(),
        email: student.email.clone(),
        status: student.status,
        course_id: course.id.clone(),
        course_name: course.name.clone(),
        total_assignments: card.total_assignments,
        completed_assignments: card.completed_assignments,
        graded_submissions: card.graded_count,
        late_submissions: submissions.iter().filter(|s| s.late).count(),
        completion_rate: card.completion_rate,
        average_score: card.average_score,
        engagement_score: card.engagement_score,
        total_time_spent: submissions.iter().map(|s| u64::from(s.time_spent)).sum(),
        questions_asked: submissions.iter().map(|s| u64::from(s.questions_asked)).sum(),
        last_activity: submissions.iter().map(|s| s.submitted_at).max(),
        strengths: scoring::strengths(&card),
        areas_for_improvement: scoring::areas_for_improvement(&card),
        recent_submissions: scoring::recent_submissions(submissions, all_assignments, recent_limit),
    }
}

fn ranked(unit: &StudentUnit) -> RankedStudent {
    RankedStudent {
        student_id: unit.progress.student_id.clone(),
        student_name: unit.progress.student_name.clone(),
        average_score: unit.progress.average_score,
        completion_rate: unit.progress.completion_rate,
    }
}

fn course_progress(data: &CourseData) -> CourseProgress {
    let units = &data.units;
    let engagement = scoring::mean(units.iter().map(|u| u.progress.engagement_score));

    let assignments = data
        .assignments
        .iter()
        .map(|a| {
            let matching: Vec<&Submission> = units
                .iter()
                .flat_map(|u| u.submissions.iter())
                .filter(|s| s.assignment_id == a.id)
                .collect();
            let submitters = units
                .iter()
                .filter(|u| u.submissions.iter().any(|s| s.assignment_id == a.id))
                .count();
            let grades: Vec<f64> = matching.iter().filter_map(|s| s.grade).collect();
            let average_grade = (!grades.is_empty()).then(|| scoring::mean(grades.iter().copied()));
            AssignmentStats {
                assignment_id: a.id.clone(),
                title: a.title.clone(),
                kind: a.kind.clone(),
                due_at: a.due_at,
                max_points: a.max_points,
                submission_count: matching.len(),
                completion_rate: if units.is_empty() {
                    0.0
                } else {
                    submitters as f64 / units.len() as f64
                },
                average_grade,
                difficulty: scoring::difficulty(average_grade.map(|g| g * 100.0 / a.max_points)),
            }
        })
        .collect();

    // Stable sorts keep enumeration order among equal grades.
    let mut by_grade: Vec<&StudentUnit> = units.iter().collect();
    by_grade.sort_by(|a, b| {
        b.progress
            .average_score
            .total_cmp(&a.progress.average_score)
    });
    let top_students = by_grade.iter().take(TOP_STUDENTS).map(|u| ranked(u)).collect();
    by_grade.sort_by(|a, b| {
        a.progress
            .average_score
            .total_cmp(&b.progress.average_score)
    });
    let struggling_students = by_grade
        .iter()
        .take(STRUGGLING_STUDENTS)
        .map(|u| ranked(u))
        .collect();

    CourseProgress {
        course_id: data.course.id.clone(),
        course_name: data.course.name.clone(),
        total_enrollment: data.students.len(),
        active_enrollment: data
            .students
            .iter()
            .filter(|s| s.status == StudentStatus::Active)
            .count(),
        average_grade: scoring::mean(units.iter().map(|u| u.progress.average_score)),
        completion_rate: scoring::mean(units.iter().map(|u| u.progress.completion_rate)),
        engagement_score: engagement,
        engagement_level: scoring::engagement_level(engagement),
        assignments,
        top_students,
        struggling_students,
    }
}

/// Join a lesson's submissions against every enrolled student, so students
/// who never responded show up explicitly.
fn lesson_response(
    course: &Course,
    lesson: &Assignment,
    students: &[Student],
    submissions: &[Submission],
) -> LessonResponse {
    let mut latest: HashMap<&str, &Submission> = HashMap::new();
    for s in submissions {
        latest
            .entry(s.student_id.as_str())
            .and_modify(|current| {
                if s.submitted_at > current.submitted_at {
                    *current = s;
                }
            })
            .or_insert(s);
    }

    let participants: Vec<LessonParticipant> = students
        .iter()
        .map(|student| match latest.get(student.id.as_str()) {
            Some(s) => LessonParticipant {
                student_id: student.id.clone(),
                student_name: student.name.clone(),
                completed: true,
                submitted_at: Some(s.submitted_at),
                time_spent: s.time_spent,
                questions_asked: s.questions_asked,
                difficulty_rating: s.difficulty_rating,
                grade: s.grade,
                engagement_score: scoring::engagement_score(1.0, s.grade.unwrap_or(0.0), 1, 1),
            },
            None => LessonParticipant {
                student_id: student.id.clone(),
                student_name: student.name.clone(),
                completed: false,
                submitted_at: None,
                time_spent: 0,
                questions_asked: 0,
                difficulty_rating: None,
                grade: None,
                engagement_score: 0.0,
            },
        })
        .collect();

    let responders: Vec<&LessonParticipant> = participants.iter().filter(|p| p.completed).collect();
    let ratings: Vec<f64> = responders
        .iter()
        .filter_map(|p| p.difficulty_rating.map(f64::from))
        .collect();

    LessonResponse {
        lesson_id: lesson.id.clone(),
        title: lesson.title.clone(),
        course_id: course.id.clone(),
        course_name: course.name.clone(),
        due_at: lesson.due_at,
        enrolled: participants.len(),
        responded: responders.len(),
        completion_rate: if participants.is_empty() {
            0.0
        } else {
            responders.len() as f64 / participants.len() as f64
        },
        average_time_spent: scoring::mean(responders.iter().map(|p| f64::from(p.time_spent))),
        average_difficulty: (!ratings.is_empty()).then(|| scoring::mean(ratings.iter().copied())),
        total_questions: responders.iter().map(|p| u64::from(p.questions_asked)).sum(),
        participants,
    }
}

/// Compose the headline summary from the three detailed views.
pub fn summarize(
    students: &[StudentProgress],
    courses: &[CourseProgress],
    lessons: &[LessonResponse],
    attention_limit: usize,
) -> ReportSummary {
    let top_course = scoring::first_max_by(courses, |c| c.average_grade).map(|c| CourseHighlight {
        course_id: c.course_id.clone(),
        course_name: c.course_name.clone(),
        average_grade: c.average_grade,
    });
    let most_engaged_student =
        scoring::first_max_by(students, |s| s.engagement_score).map(|s| StudentHighlight {
            student_id: s.student_id.clone(),
            student_name: s.student_name.clone(),
            course_id: s.course_id.clone(),
            engagement_score: s.engagement_score,
        });

    ReportSummary {
        total_students: students.len(),
        total_courses: courses.len(),
        total_lessons: lessons.len(),
        average_grade: scoring::mean(students.iter().map(|s| s.average_score)),
        completion_rate: scoring::mean(students.iter().map(|s| s.completion_rate)),
        engagement_level: scoring::mean(students.iter().map(|s| s.engagement_score)),
        lesson_completion_rate: scoring::mean(lessons.iter().map(|l| l.completion_rate)),
        top_course,
        most_engaged_student,
        needs_attention: scoring::needs_attention(students, attention_limit),
    }
}
