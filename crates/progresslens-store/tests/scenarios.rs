//! Report engine scenarios against the in-memory store.

mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use tokio_util::sync::CancellationToken;

use common::*;
use progresslens_core::engine::{EngineConfig, ReportEngine};
use progresslens_core::error::{ConfigurationError, ReportError};
use progresslens_core::filter::{RawTimestamp, ReportFilters};
use progresslens_core::model::{AttentionReason, Difficulty, DiagnosticKind, EngagementLevel};
use progresslens_store::memory::ANY_KEY;
use progresslens_store::InMemoryStore;

fn engine(store: &Arc<InMemoryStore>) -> ReportEngine {
    ReportEngine::new(store.clone(), EngineConfig::default())
}

fn no_filters() -> ReportFilters {
    ReportFilters::default()
}

// --- Scenario A: completion and grade averages ---

#[tokio::test]
async fn scenario_a_student_progress() {
    let store = Arc::new(two_student_course());
    let engine = engine(&store);
    let cancel = CancellationToken::new();

    let report = engine
        .student_progress_report("t1", &no_filters(), &cancel)
        .await
        .unwrap();
    assert!(report.diagnostics.is_empty());
    assert_eq!(report.data.len(), 2);

    let x = &report.data[0];
    assert_eq!(x.student_id, "x");
    approx(x.completion_rate, 1.0);
    approx(x.average_score, 85.0);
    approx(x.engagement_score, 94.0);
    assert_eq!(x.recent_submissions.len(), 2);
    assert_eq!(x.recent_submissions[0].assignment_title, "Title a2");
    assert_eq!(x.strengths, ["Consistent completion", "Strong engagement"]);

    let y = &report.data[1];
    assert_eq!(y.student_id, "y");
    approx(y.completion_rate, 0.5);
    approx(y.average_score, 50.0);
    approx(y.engagement_score, 50.0);
    assert!(y
        .areas_for_improvement
        .contains(&"Assignment completion".to_string()));
}

#[tokio::test]
async fn scenario_a_summary() {
    let store = Arc::new(two_student_course());
    let summary = engine(&store)
        .report_summary("t1", &no_filters(), &CancellationToken::new())
        .await
        .unwrap()
        .data;

    assert_eq!(summary.total_students, 2);
    assert_eq!(summary.total_courses, 1);
    approx(summary.average_grade, 67.5);
    approx(summary.completion_rate, 0.75);
    approx(summary.engagement_level, 72.0);
    assert_eq!(summary.top_course.unwrap().course_id, "c1");
    assert_eq!(summary.most_engaged_student.unwrap().student_id, "x");

    assert_eq!(summary.needs_attention.len(), 1);
    let flagged = &summary.needs_attention[0];
    assert_eq!(flagged.student_id, "y");
    assert_eq!(
        flagged.reasons,
        vec![AttentionReason::LowGrade, AttentionReason::LowCompletion]
    );
}

#[tokio::test]
async fn scenario_a_course_progress() {
    let store = Arc::new(two_student_course());
    let courses = engine(&store)
        .course_progress_report("t1", &no_filters(), &CancellationToken::new())
        .await
        .unwrap()
        .data;

    assert_eq!(courses.len(), 1);
    let c1 = &courses[0];
    assert_eq!(c1.total_enrollment, 2);
    assert_eq!(c1.active_enrollment, 2);
    approx(c1.average_grade, 67.5);
    approx(c1.completion_rate, 0.75);
    assert_eq!(c1.engagement_level, EngagementLevel::Medium);

    let ids: Vec<&str> = c1.top_students.iter().map(|s| s.student_id.as_str()).collect();
    assert_eq!(ids, ["x", "y"]);
    let ids: Vec<&str> = c1
        .struggling_students
        .iter()
        .map(|s| s.student_id.as_str())
        .collect();
    assert_eq!(ids, ["y", "x"]);

    let a1 = &c1.assignments[0];
    assert_eq!(a1.submission_count, 2);
    approx(a1.completion_rate, 1.0);
    assert_eq!(a1.average_grade, Some(70.0));
    assert_eq!(a1.difficulty, Difficulty::Moderate);
    let a2 = &c1.assignments[1];
    approx(a2.completion_rate, 0.5);
    assert_eq!(a2.difficulty, Difficulty::Easy);
}

// --- Scenario B: lesson responses include non-responders ---

#[tokio::test]
async fn scenario_b_lesson_responses() {
    let store = Arc::new(
        InMemoryStore::new()
            .with_course(course("c2", "t1"))
            .with_student(student("s1", &["c2"]))
            .with_student(student("s2", &["c2"]))
            .with_student(student("s3", &["c2"]))
            .with_assignment(assignment("l1", "c2", "lesson", day(1)))
            .with_assignment(assignment("hw", "c2", "assignment", day(1)))
            .with_submission(submission("r1", "s2", "l1", "c2", day(2), Some(90.0)))
            .with_submission(submission("r2", "s1", "hw", "c2", day(2), Some(70.0))),
    );
    let lessons = engine(&store)
        .lesson_response_report("t1", &no_filters(), &CancellationToken::new())
        .await
        .unwrap()
        .data;

    assert_eq!(lessons.len(), 1);
    let lesson = &lessons[0];
    assert_eq!(lesson.lesson_id, "l1");
    assert_eq!(lesson.enrolled, 3);
    assert_eq!(lesson.responded, 1);
    approx(lesson.completion_rate, 1.0 / 3.0);
    approx(lesson.average_time_spent, 20.0);

    let by_id = |id: &str| {
        lesson
            .participants
            .iter()
            .find(|p| p.student_id == id)
            .unwrap()
    };
    for absent in ["s1", "s3"] {
        let p = by_id(absent);
        assert!(!p.completed);
        assert_eq!(p.time_spent, 0);
        assert_eq!(p.engagement_score, 0.0);
    }
    let s2 = by_id("s2");
    assert!(s2.completed);
    approx(s2.engagement_score, 96.0);
}

// --- Scenario C: date range removes an assignment from both sides ---

#[tokio::test]
async fn scenario_c_excluded_assignment_leaves_completion_rate() {
    let created_before = RawTimestamp::Epoch {
        seconds: Utc
            .with_ymd_and_hms(2023, 12, 1, 0, 0, 0)
            .unwrap()
            .timestamp(),
        nanoseconds: 0,
    };
    let store = Arc::new(
        InMemoryStore::new()
            .with_course(course("c3", "t1"))
            .with_student(student("z", &["c3"]))
            .with_student(student("w", &["c3"]))
            .with_assignment(assignment("old", "c3", "assignment", created_before))
            .with_assignment(assignment(
                "new",
                "c3",
                "assignment",
                RawTimestamp::Text("2024-01-03".into()),
            ))
            .with_submission(submission("z1", "z", "old", "c3", day(5), Some(95.0)))
            .with_submission(submission("w1", "w", "old", "c3", day(5), Some(95.0)))
            .with_submission(submission("w2", "w", "new", "c3", day(6), Some(75.0))),
    );
    let engine = engine(&store);
    let cancel = CancellationToken::new();

    let unfiltered = engine
        .student_progress_report("t1", &no_filters(), &cancel)
        .await
        .unwrap()
        .data;
    approx(unfiltered[0].completion_rate, 0.5);

    let january = no_filters().between(
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap(),
    );
    let filtered = engine
        .student_progress_report("t1", &january, &cancel)
        .await
        .unwrap()
        .data;

    let z = &filtered[0];
    assert_eq!(z.total_assignments, 1);
    assert_eq!(z.completed_assignments, 0);
    approx(z.completion_rate, 0.0);
    approx(z.average_score, 0.0);

    let w = &filtered[1];
    assert_eq!(w.total_assignments, 1);
    approx(w.completion_rate, 1.0);
    approx(w.average_score, 75.0);
}

// --- Filters ---

#[tokio::test]
async fn student_and_type_filters_narrow_units() {
    let store = Arc::new(
        two_student_course().with_assignment(assignment("l9", "c1", "lesson", day(2))),
    );
    let engine = engine(&store);
    let cancel = CancellationToken::new();

    let only_y = no_filters().students(["y"]);
    let report = engine
        .student_progress_report("t1", &only_y, &cancel)
        .await
        .unwrap();
    assert_eq!(report.data.len(), 1);
    assert_eq!(report.data[0].student_id, "y");

    let lessons_only = no_filters().types(["Lesson"]);
    let report = engine
        .student_progress_report("t1", &lessons_only, &cancel)
        .await
        .unwrap();
    assert!(report.data.iter().all(|p| p.total_assignments == 1));
    assert!(report.data.iter().all(|p| p.completed_assignments == 0));
}

#[tokio::test]
async fn inverted_date_range_is_rejected_before_any_read() {
    let store = Arc::new(two_student_course());
    let filters = no_filters().between(
        Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
    );
    let err = engine(&store)
        .report_summary("t1", &filters, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ReportError::Configuration(ConfigurationError::InvalidDateRange { .. })
    ));
    assert_eq!(store.reads(), 0);
}

#[tokio::test]
async fn blank_teacher_is_rejected() {
    let store = Arc::new(two_student_course());
    let err = engine(&store)
        .student_progress_report("  ", &no_filters(), &CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(
        err,
        ReportError::Configuration(ConfigurationError::BlankValue {
            field: "teacher_id"
        })
    );
}

// --- Failure isolation ---

#[tokio::test]
async fn failed_submission_fetch_omits_only_that_unit() {
    let store = Arc::new(two_student_course());
    store.fail_on("list_submissions", "y/c1");

    let report = engine(&store)
        .student_progress_report("t1", &no_filters(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.data.len(), 1);
    assert_eq!(report.data[0].student_id, "x");

    assert_eq!(report.diagnostics.len(), 1);
    let d = &report.diagnostics[0];
    assert_eq!(d.kind, DiagnosticKind::StoreFailure);
    assert_eq!(d.course_id.as_deref(), Some("c1"));
    assert_eq!(d.student_id.as_deref(), Some("y"));
    assert!(d.message.contains("injected failure"));
}

#[tokio::test]
async fn failed_course_fetch_omits_the_course() {
    let store = Arc::new(
        two_student_course()
            .with_course(course("c2", "t1"))
            .with_student(student("q", &["c2"])),
    );
    store.fail_on("list_assignments_by_course", "c2");

    let report = engine(&store)
        .course_progress_report("t1", &no_filters(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.data.len(), 1);
    assert_eq!(report.data[0].course_id, "c1");
    assert_eq!(report.diagnostics.len(), 1);
    assert_eq!(report.diagnostics[0].course_id.as_deref(), Some("c2"));
}

#[tokio::test]
async fn failed_lesson_join_is_a_diagnostic() {
    let store = Arc::new(
        two_student_course()
            .with_assignment(assignment("l1", "c1", "lesson", day(1)))
            .with_assignment(assignment("l2", "c1", "lesson", day(2))),
    );
    store.fail_on("list_submissions_by_assignment", "l1");

    let report = engine(&store)
        .lesson_response_report("t1", &no_filters(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.data.len(), 1);
    assert_eq!(report.data[0].lesson_id, "l2");
    assert_eq!(report.diagnostics[0].assignment_id.as_deref(), Some("l1"));
}

#[tokio::test]
async fn failed_course_listing_is_fatal() {
    let store = Arc::new(two_student_course());
    store.fail_on("list_courses_by_teacher", ANY_KEY);

    let err = engine(&store)
        .report_summary("t1", &no_filters(), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ReportError::Store(_)));
}

#[tokio::test]
async fn malformed_records_are_excluded_with_a_diagnostic() {
    let store = Arc::new(
        two_student_course()
            .with_assignment(assignment(
                "bad",
                "c1",
                "assignment",
                RawTimestamp::Text("next tuesday".into()),
            ))
            .with_submission(submission(
                "s9",
                "x",
                "a1",
                "c1",
                day(6),
                Some(f64::NAN),
            )),
    );

    let report = engine(&store)
        .student_progress_report("t1", &no_filters(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.data.len(), 2);
    approx(report.data[0].average_score, 85.0);
    assert_eq!(report.data[0].total_assignments, 2);

    let malformed: Vec<_> = report
        .diagnostics
        .iter()
        .filter(|d| d.kind == DiagnosticKind::MalformedRecord)
        .collect();
    assert_eq!(malformed.len(), 2);
    assert!(malformed[0].message.contains("next tuesday"));
    assert_eq!(malformed[1].student_id.as_deref(), Some("x"));
}

// --- Determinism, cancellation, timeouts ---

#[tokio::test]
async fn identical_requests_give_identical_reports() {
    let store = Arc::new(two_student_course());
    let engine = engine(&store);
    let cancel = CancellationToken::new();

    let first = engine
        .student_progress_report("t1", &no_filters(), &cancel)
        .await
        .unwrap();
    let second = engine
        .student_progress_report("t1", &no_filters(), &cancel)
        .await
        .unwrap();
    assert_eq!(first, second);
}

#[tokio::test(start_paused = true)]
async fn output_order_does_not_depend_on_concurrency() {
    let store = Arc::new(
        two_student_course()
            .with_student(student("v", &["c1"]))
            .with_submission(submission("s4", "v", "a2", "c1", day(6), Some(85.0)))
            .with_latency(Duration::from_millis(5)),
    );
    let cancel = CancellationToken::new();

    let serial = ReportEngine::new(
        store.clone(),
        EngineConfig {
            concurrency: 1,
            ..EngineConfig::default()
        },
    );
    let wide = ReportEngine::new(
        store.clone(),
        EngineConfig {
            concurrency: 16,
            ..EngineConfig::default()
        },
    );

    let a = serial.report_summary("t1", &no_filters(), &cancel).await.unwrap();
    let b = wide.report_summary("t1", &no_filters(), &cancel).await.unwrap();
    assert_eq!(a, b);
    let ids: Vec<_> = a
        .data
        .needs_attention
        .iter()
        .map(|e| e.student_id.as_str())
        .collect();
    assert_eq!(ids, ["y", "v"]);
}

#[tokio::test]
async fn needs_attention_respects_the_cap_and_input_order() {
    let mut store = InMemoryStore::new()
        .with_course(course("c1", "t1"))
        .with_assignment(assignment("a1", "c1", "assignment", day(1)));
    for i in 0..8 {
        let id = format!("s{i}");
        store = store
            .with_student(student(&id, &["c1"]))
            .with_submission(submission(
                &format!("x{i}"),
                &id,
                "a1",
                "c1",
                day(2),
                Some(40.0 + i as f64),
            ));
    }
    let engine = ReportEngine::new(
        Arc::new(store),
        EngineConfig {
            attention_limit: 3,
            ..EngineConfig::default()
        },
    );

    let summary = engine
        .report_summary("t1", &no_filters(), &CancellationToken::new())
        .await
        .unwrap()
        .data;
    let ids: Vec<_> = summary
        .needs_attention
        .iter()
        .map(|e| e.student_id.as_str())
        .collect();
    assert_eq!(ids, ["s0", "s1", "s2"]);
    assert!(summary
        .needs_attention
        .iter()
        .all(|e| e.average_score < 70.0 || e.completion_rate < 0.7));
}

#[tokio::test]
async fn cancelled_request_issues_no_reads() {
    let store = Arc::new(two_student_course());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = engine(&store)
        .student_progress_report("t1", &no_filters(), &cancel)
        .await
        .unwrap_err();
    assert_eq!(err, ReportError::Cancelled);
    assert_eq!(store.reads(), 0);
}

#[tokio::test(start_paused = true)]
async fn cancellation_mid_report_stops_further_reads() {
    let store = Arc::new(two_student_course().with_latency(Duration::from_millis(100)));
    let engine = engine(&store);
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        // After the course listing, during the course-level reads.
        tokio::time::sleep(Duration::from_millis(150)).await;
        trigger.cancel();
    });

    let err = engine
        .student_progress_report("t1", &no_filters(), &cancel)
        .await
        .unwrap_err();
    assert_eq!(err, ReportError::Cancelled);
    // One listing, then students and assignments; no submission reads.
    assert_eq!(store.reads(), 3);
}

#[tokio::test(start_paused = true)]
async fn slow_store_times_out() {
    let store = Arc::new(two_student_course().with_latency(Duration::from_secs(5)));
    let engine = ReportEngine::new(
        store.clone(),
        EngineConfig {
            store_timeout: Duration::from_millis(200),
            ..EngineConfig::default()
        },
    );

    let err = engine
        .report_summary("t1", &no_filters(), &CancellationToken::new())
        .await
        .unwrap_err();
    match err {
        ReportError::Store(e) => assert!(e.is_timeout()),
        other => panic!("expected a store timeout, got {other:?}"),
    }
}

#[tokio::test]
async fn full_report_carries_every_view() {
    let store = Arc::new(
        two_student_course().with_assignment(assignment("l1", "c1", "lesson", day(2))),
    );
    let report = engine(&store)
        .full_report("t1", &no_filters(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.teacher_id, "t1");
    assert_eq!(report.store, "memory");
    assert_eq!(report.students.len(), 2);
    assert_eq!(report.courses.len(), 1);
    assert_eq!(report.lessons.len(), 1);
    assert_eq!(report.summary.total_lessons, 1);
    approx(report.summary.lesson_completion_rate, 0.0);
}
