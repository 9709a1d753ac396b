//! Scoring engine: pure functions over one student/course unit.
//!
//! engagement = clamp(completion * 40 + average_score * 0.4
//!                    + min(|S| / max(|A|, 1), 1) * 20, 0, 100)

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::model::{
    Assignment, AttentionEntry, AttentionReason, Difficulty, EngagementLevel, RecentSubmission,
    StudentProgress, Submission,
};

pub const COMPLETION_WEIGHT: f64 = 40.0;
pub const SCORE_WEIGHT: f64 = 0.4;
pub const VOLUME_WEIGHT: f64 = 20.0;
pub const MIN_ENGAGEMENT: f64 = 0.0;
pub const MAX_ENGAGEMENT: f64 = 100.0;

pub const STRONG_COMPLETION_RATE: f64 = 0.8;
pub const HIGH_AVERAGE_SCORE: f64 = 85.0;
pub const STRONG_ENGAGEMENT: f64 = 75.0;

pub const LOW_COMPLETION_RATE: f64 = 0.7;
pub const LOW_AVERAGE_SCORE: f64 = 70.0;
pub const LOW_ENGAGEMENT: f64 = 60.0;

/// Upper bound (inclusive) of the Medium engagement bucket.
pub const MEDIUM_ENGAGEMENT_CEILING: f64 = 80.0;

/// Mean graded percentage of max points at or above which an assignment is Easy.
pub const EASY_GRADE_PERCENT: f64 = 80.0;
pub const MODERATE_GRADE_PERCENT: f64 = 60.0;

pub const DEFAULT_RECENT_LIMIT: usize = 5;
pub const DEFAULT_ATTENTION_LIMIT: usize = 5;
pub const MISSING_ASSIGNMENT_TITLE: &str = "Unknown assignment";

pub const STRENGTH_COMPLETION: &str = "Consistent completion";
pub const STRENGTH_PERFORMANCE: &str = "High performance";
pub const STRENGTH_ENGAGEMENT: &str = "Strong engagement";
pub const IMPROVE_COMPLETION: &str = "Assignment completion";
pub const IMPROVE_PERFORMANCE: &str = "Grade performance";
pub const IMPROVE_ENGAGEMENT: &str = "Class engagement";

/// Scores for one (student, course) unit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreCard {
    pub total_assignments: usize,
    pub completed_assignments: usize,
    pub graded_count: usize,
    pub completion_rate: f64,
    pub average_score: f64,
    pub engagement_score: f64,
}

/// Arithmetic mean, 0 for an empty input.
pub fn mean(values: impl IntoIterator<Item = f64>) -> f64 {
    let (sum, count) = values
        .into_iter()
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// Distinct assignments of `assignments` that have at least one submission.
pub fn completed_count(assignments: &[Assignment], submissions: &[Submission]) -> usize {
    let ids: HashSet<&str> = assignments.iter().map(|a| a.id.as_str()).collect();
    submissions
        .iter()
        .map(|s| s.assignment_id.as_str())
        .filter(|id| ids.contains(id))
        .collect::<HashSet<_>>()
        .len()
}

pub fn completion_rate(assignments: &[Assignment], submissions: &[Submission]) -> f64 {
    if assignments.is_empty() {
        return 0.0;
    }
    let rate = completed_count(assignments, submissions) as f64 / assignments.len() as f64;
    rate.clamp(0.0, 1.0)
}

/// Mean grade over graded submissions only.
pub fn average_score(submissions: &[Submission]) -> f64 {
    mean(submissions.iter().filter_map(|s| s.grade))
}

pub fn engagement_score(
    completion_rate: f64,
    average_score: f64,
    submission_count: usize,
    assignment_count: usize,
) -> f64 {
    let volume = (submission_count as f64 / assignment_count.max(1) as f64).min(1.0);
    let raw = completion_rate * COMPLETION_WEIGHT
        + average_score * SCORE_WEIGHT
        + volume * VOLUME_WEIGHT;
    raw.clamp(MIN_ENGAGEMENT, MAX_ENGAGEMENT)
}

/// Score one unit from its filtered assignment set and submission set.
pub fn score_unit(assignments: &[Assignment], submissions: &[Submission]) -> ScoreCard {
    let completion = completion_rate(assignments, submissions);
    let average = average_score(submissions);
    ScoreCard {
        total_assignments: assignments.len(),
        completed_assignments: completed_count(assignments, submissions),
        graded_count: submissions.iter().filter(|s| s.grade.is_some()).count(),
        completion_rate: completion,
        average_score: average,
        engagement_score: engagement_score(
            completion,
            average,
            submissions.len(),
            assignments.len(),
        ),
    }
}

pub fn strengths(card: &ScoreCard) -> Vec<String> {
    let mut out = Vec::new();
    if card.completion_rate > STRONG_COMPLETION_RATE {
        out.push(STRENGTH_COMPLETION.to_string());
    }
    if card.average_score > HIGH_AVERAGE_SCORE {
        out.push(STRENGTH_PERFORMANCE.to_string());
    }
    if card.engagement_score > STRONG_ENGAGEMENT {
        out.push(STRENGTH_ENGAGEMENT.to_string());
    }
    out
}

pub fn areas_for_improvement(card: &ScoreCard) -> Vec<String> {
    let mut out = Vec::new();
    if card.completion_rate < LOW_COMPLETION_RATE {
        out.push(IMPROVE_COMPLETION.to_string());
    }
    if card.average_score < LOW_AVERAGE_SCORE {
        out.push(IMPROVE_PERFORMANCE.to_string());
    }
    if card.engagement_score < LOW_ENGAGEMENT {
        out.push(IMPROVE_ENGAGEMENT.to_string());
    }
    out
}

/// Latest `limit` submissions, newest first, each paired with its
/// assignment title. Equal instants keep input order.
pub fn recent_submissions(
    submissions: &[Submission],
    assignments: &[Assignment],
    limit: usize,
) -> Vec<RecentSubmission> {
    let titles: HashMap<&str, &str> = assignments
        .iter()
        .map(|a| (a.id.as_str(), a.title.as_str()))
        .collect();

    let mut ordered: Vec<&Submission> = submissions.iter().collect();
    ordered.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));

    ordered
        .into_iter()
        .take(limit)
        .map(|s| RecentSubmission {
            submission_id: s.id.clone(),
            assignment_id: s.assignment_id.clone(),
            assignment_title: titles
                .get(s.assignment_id.as_str())
                .copied()
                .unwrap_or(MISSING_ASSIGNMENT_TITLE)
                .to_string(),
            submitted_at: s.submitted_at,
            grade: s.grade,
            late: s.late,
        })
        .collect()
}

pub fn engagement_level(score: f64) -> EngagementLevel {
    if score <= LOW_ENGAGEMENT {
        EngagementLevel::Low
    } else if score <= MEDIUM_ENGAGEMENT_CEILING {
        EngagementLevel::Medium
    } else {
        EngagementLevel::High
    }
}

/// Label an assignment from the mean graded percentage of its max points.
pub fn difficulty(average_grade_percent: Option<f64>) -> Difficulty {
    match average_grade_percent {
        None => Difficulty::Unrated,
        Some(p) if p >= EASY_GRADE_PERCENT => Difficulty::Easy,
        Some(p) if p >= MODERATE_GRADE_PERCENT => Difficulty::Moderate,
        Some(_) => Difficulty::Hard,
    }
}

pub fn attention_reasons(average_score: f64, completion_rate: f64) -> Vec<AttentionReason> {
    let mut reasons = Vec::new();
    if average_score < LOW_AVERAGE_SCORE {
        reasons.push(AttentionReason::LowGrade);
    }
    if completion_rate < LOW_COMPLETION_RATE {
        reasons.push(AttentionReason::LowCompletion);
    }
    reasons
}

/// Students with a low grade or low completion, in input order, at most `cap`.
///
/// No re-sorting by severity happens here: the first flagged units in
/// enumeration order win the limited slots.
pub fn needs_attention(progress: &[StudentProgress], cap: usize) -> Vec<AttentionEntry> {
    progress
        .iter()
        .filter_map(|p| {
            let reasons = attention_reasons(p.average_score, p.completion_rate);
            (!reasons.is_empty()).then(|| AttentionEntry {
                student_id: p.student_id.clone(),
                student_name: p.student_name.clone(),
                course_id: p.course_id.clone(),
                average_score: p.average_score,
                completion_rate: p.completion_rate,
                reasons,
            })
        })
        .take(cap)
        .collect()
}

/// First item with the strictly greatest key. Ties go to the earliest item.
pub fn first_max_by<T>(items: &[T], key: impl Fn(&T) -> f64) -> Option<&T> {
    let mut best: Option<(&T, f64)> = None;
    for item in items {
        let value = key(item);
        match best {
            Some((_, current)) if value <= current => {}
            _ => best = Some((item, value)),
        }
    }
    best.map(|(item, _)| item)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::StudentStatus;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, 9, 0, 0).unwrap()
    }

    fn assignment(id: &str) -> Assignment {
        Assignment {
            id: id.into(),
            course_id: "c1".into(),
            title: format!("Title {id}"),
            kind: "assignment".into(),
            due_at: None,
            max_points: 100.0,
            created_at: at(1),
        }
    }

    fn submission(id: &str, assignment: &str, grade: Option<f64>, day: u32) -> Submission {
        Submission {
            id: id.into(),
            student_id: "s1".into(),
            assignment_id: assignment.into(),
            course_id: "c1".into(),
            submitted_at: at(day),
            grade,
            feedback: None,
            late: false,
            time_spent: 10,
            questions_asked: 0,
            difficulty_rating: None,
        }
    }

    fn progress(id: &str, average: f64, completion: f64) -> StudentProgress {
        StudentProgress {
            student_id: id.into(),
            student_name: id.to_uppercase(),
            email: String::new(),
            status: StudentStatus::Active,
            course_id: "c1".into(),
            course_name: "Course".into(),
            total_assignments: 2,
            completed_assignments: 0,
            graded_submissions: 0,
            late_submissions: 0,
            completion_rate: completion,
            average_score: average,
            engagement_score: 0.0,
            total_time_spent: 0,
            questions_asked: 0,
            last_activity: None,
            strengths: vec![],
            areas_for_improvement: vec![],
            recent_submissions: vec![],
        }
    }

    #[test]
    fn completion_rate_is_zero_without_assignments() {
        let subs = vec![submission("x", "a1", Some(90.0), 2)];
        assert_eq!(completion_rate(&[], &subs), 0.0);
    }

    #[test]
    fn duplicate_submissions_never_exceed_one() {
        let assignments = vec![assignment("a1")];
        let subs = vec![
            submission("x", "a1", Some(90.0), 2),
            submission("y", "a1", Some(95.0), 3),
            submission("z", "a1", None, 4),
        ];
        assert_eq!(completion_rate(&assignments, &subs), 1.0);
    }

    #[test]
    fn submissions_outside_assignment_set_do_not_complete() {
        let assignments = vec![assignment("a1"), assignment("a2")];
        let subs = vec![submission("x", "other", Some(90.0), 2)];
        assert_eq!(completion_rate(&assignments, &subs), 0.0);
    }

    #[test]
    fn ungraded_submission_never_moves_average() {
        let graded = vec![
            submission("x", "a1", Some(90.0), 2),
            submission("y", "a2", Some(80.0), 3),
        ];
        let mut with_ungraded = graded.clone();
        with_ungraded.push(submission("z", "a3", None, 4));
        assert_eq!(average_score(&graded), 85.0);
        assert_eq!(average_score(&with_ungraded), 85.0);
        assert_eq!(average_score(&[submission("z", "a3", None, 4)]), 0.0);
    }

    #[test]
    fn engagement_is_clamped_under_extreme_inputs() {
        let high = engagement_score(1.0, 1000.0, 10_000, 1);
        assert_eq!(high, MAX_ENGAGEMENT);
        let low = engagement_score(0.0, 0.0, 0, 0);
        assert_eq!(low, MIN_ENGAGEMENT);
    }

    #[test]
    fn engagement_formula_matches_weights() {
        // 0.5 * 40 + 50 * 0.4 + (1/2) * 20
        let score = engagement_score(0.5, 50.0, 1, 2);
        assert!((score - 50.0).abs() < 1e-9);
    }

    #[test]
    fn score_unit_for_strong_student() {
        let assignments = vec![assignment("a1"), assignment("a2")];
        let subs = vec![
            submission("x", "a1", Some(90.0), 2),
            submission("y", "a2", Some(80.0), 3),
        ];
        let card = score_unit(&assignments, &subs);
        assert_eq!(card.completion_rate, 1.0);
        assert_eq!(card.average_score, 85.0);
        assert_eq!(card.completed_assignments, 2);
        assert_eq!(card.graded_count, 2);
        // 40 + 34 + 20
        assert!((card.engagement_score - 94.0).abs() < 1e-9);
        assert_eq!(
            strengths(&card),
            vec![STRENGTH_COMPLETION.to_string(), STRENGTH_ENGAGEMENT.to_string()]
        );
        assert!(areas_for_improvement(&card).is_empty());
    }

    #[test]
    fn weak_student_gets_every_improvement_area() {
        let assignments = vec![assignment("a1"), assignment("a2")];
        let subs = vec![submission("x", "a1", Some(50.0), 2)];
        let card = score_unit(&assignments, &subs);
        assert_eq!(
            areas_for_improvement(&card),
            vec![
                IMPROVE_COMPLETION.to_string(),
                IMPROVE_PERFORMANCE.to_string(),
                IMPROVE_ENGAGEMENT.to_string()
            ]
        );
        assert!(strengths(&card).is_empty());
    }

    #[test]
    fn recent_submissions_newest_first_with_placeholder_title() {
        let assignments = vec![assignment("a1")];
        let subs: Vec<Submission> = (1..=7)
            .map(|d| submission(&format!("s{d}"), if d == 7 { "gone" } else { "a1" }, None, d))
            .collect();
        let recent = recent_submissions(&subs, &assignments, DEFAULT_RECENT_LIMIT);
        assert_eq!(recent.len(), 5);
        assert_eq!(recent[0].submission_id, "s7");
        assert_eq!(recent[0].assignment_title, MISSING_ASSIGNMENT_TITLE);
        assert_eq!(recent[1].assignment_title, "Title a1");
        assert_eq!(recent[4].submission_id, "s3");
    }

    #[test]
    fn engagement_level_boundaries() {
        assert_eq!(engagement_level(60.0), EngagementLevel::Low);
        assert_eq!(engagement_level(60.1), EngagementLevel::Medium);
        assert_eq!(engagement_level(80.0), EngagementLevel::Medium);
        assert_eq!(engagement_level(80.1), EngagementLevel::High);
    }

    #[test]
    fn difficulty_from_real_grades() {
        assert_eq!(difficulty(None), Difficulty::Unrated);
        assert_eq!(difficulty(Some(92.0)), Difficulty::Easy);
        assert_eq!(difficulty(Some(65.0)), Difficulty::Moderate);
        assert_eq!(difficulty(Some(40.0)), Difficulty::Hard);
    }

    #[test]
    fn needs_attention_respects_cap_and_input_order() {
        let units = vec![
            progress("a", 95.0, 1.0),
            progress("b", 40.0, 1.0),
            progress("c", 90.0, 0.2),
            progress("d", 10.0, 0.1),
            progress("e", 69.9, 0.9),
        ];
        let flagged = needs_attention(&units, 2);
        let ids: Vec<&str> = flagged.iter().map(|e| e.student_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);

        let all = needs_attention(&units, 10);
        assert_eq!(all.len(), 4);
        for entry in &all {
            assert!(
                entry.average_score < LOW_AVERAGE_SCORE
                    || entry.completion_rate < LOW_COMPLETION_RATE
            );
        }
        assert_eq!(
            all[2].reasons,
            vec![AttentionReason::LowGrade, AttentionReason::LowCompletion]
        );
        assert!(needs_attention(&units, 0).is_empty());
    }

    #[test]
    fn first_max_by_breaks_ties_by_first_seen() {
        let items = vec![("a", 1.0), ("b", 3.0), ("c", 3.0), ("d", 2.0)];
        assert_eq!(first_max_by(&items, |i| i.1).map(|i| i.0), Some("b"));
        let empty: Vec<(&str, f64)> = vec![];
        assert!(first_max_by(&empty, |i| i.1).is_none());
    }

    #[test]
    fn mean_of_nothing_is_zero() {
        assert_eq!(mean(Vec::<f64>::new()), 0.0);
        assert_eq!(mean(vec![85.0, 50.0]), 67.5);
    }
}
