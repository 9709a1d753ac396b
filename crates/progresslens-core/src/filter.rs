//! Filter pipeline and timestamp normalization.
//!
//! Upstream documents carry instants in one of three shapes. They are folded
//! into a single `DateTime<Utc>` by [`to_instant`] before any comparison, so
//! nothing downstream ever looks at the raw shape.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::ConfigurationError;
use crate::model::{Assignment, Course, Student, Submission};

// ---------------------------------------------------------------------------
// Timestamps
// ---------------------------------------------------------------------------

/// An instant as stored upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawTimestamp {
    /// Already a temporal value (RFC 3339 on the wire).
    Native(DateTime<Utc>),
    /// Epoch seconds wrapper, e.g. `{"_seconds": 1700000000, "_nanoseconds": 0}`.
    Epoch {
        #[serde(alias = "_seconds")]
        seconds: i64,
        #[serde(default, alias = "_nanoseconds")]
        nanoseconds: u32,
    },
    /// Free-form text date.
    Text(String),
}

impl From<DateTime<Utc>> for RawTimestamp {
    fn from(value: DateTime<Utc>) -> Self {
        RawTimestamp::Native(value)
    }
}

impl std::fmt::Display for RawTimestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RawTimestamp::Native(dt) => write!(f, "{}", dt.to_rfc3339()),
            RawTimestamp::Epoch {
                seconds,
                nanoseconds,
            } => write!(f, "{{seconds: {seconds}, nanoseconds: {nanoseconds}}}"),
            RawTimestamp::Text(s) => write!(f, "{s}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("unrecognised timestamp '{0}'")]
pub struct TimestampError(pub String);

const TEXT_DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

/// Convert any upstream timestamp shape into one comparable instant.
pub fn to_instant(raw: &RawTimestamp) -> Result<DateTime<Utc>, TimestampError> {
    match raw {
        RawTimestamp::Native(dt) => Ok(*dt),
        RawTimestamp::Epoch {
            seconds,
            nanoseconds,
        } => Utc
            .timestamp_opt(*seconds, *nanoseconds)
            .single()
            .ok_or_else(|| TimestampError(raw.to_string())),
        RawTimestamp::Text(text) => {
            parse_text(text.trim()).ok_or_else(|| TimestampError(text.clone()))
        }
    }
}

fn parse_text(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in TEXT_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

// ---------------------------------------------------------------------------
// Filters
// ---------------------------------------------------------------------------

/// Half-open instant range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start && instant < self.end
    }
}

/// Narrowing applied to every record set before aggregation.
///
/// All present criteria are combined with logical AND. An empty set means
/// "no constraint".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportFilters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course_id: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub student_ids: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub assignment_types: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_range: Option<DateRange>,
}

impl ReportFilters {
    pub fn course(mut self, course_id: impl Into<String>) -> Self {
        self.course_id = Some(course_id.into());
        self
    }

    pub fn students<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.student_ids = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn types<I, S>(mut self, kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.assignment_types = kinds.into_iter().map(Into::into).collect();
        self
    }

    pub fn between(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.date_range = Some(DateRange::new(start, end));
        self
    }

    /// Reject filters that cannot describe a meaningful report.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if let Some(range) = &self.date_range {
            if range.start > range.end {
                return Err(ConfigurationError::InvalidDateRange {
                    start: range.start,
                    end: range.end,
                });
            }
        }
        if matches!(&self.course_id, Some(id) if id.trim().is_empty()) {
            return Err(ConfigurationError::BlankValue { field: "course_id" });
        }
        if self.student_ids.iter().any(|id| id.trim().is_empty()) {
            return Err(ConfigurationError::BlankValue {
                field: "student_ids",
            });
        }
        if self.assignment_types.iter().any(|t| t.trim().is_empty()) {
            return Err(ConfigurationError::BlankValue {
                field: "assignment_types",
            });
        }
        Ok(())
    }

    pub fn matches_course_id(&self, course_id: &str) -> bool {
        self.course_id.as_deref().map_or(true, |id| id == course_id)
    }

    pub fn in_range(&self, instant: DateTime<Utc>) -> bool {
        self.date_range.map_or(true, |range| range.contains(instant))
    }

    pub fn matches_type(&self, kind: &str) -> bool {
        self.assignment_types.is_empty()
            || self
                .assignment_types
                .iter()
                .any(|t| t.eq_ignore_ascii_case(kind))
    }

    pub fn matches_student_id(&self, student_id: &str) -> bool {
        self.student_ids.is_empty() || self.student_ids.contains(student_id)
    }

    pub fn filter_courses(&self, courses: Vec<Course>) -> Vec<Course> {
        courses
            .into_iter()
            .filter(|c| self.matches_course_id(&c.id))
            .collect()
    }

    pub fn filter_students(&self, students: Vec<Student>) -> Vec<Student> {
        students
            .into_iter()
            .filter(|s| self.matches_student_id(&s.id))
            .collect()
    }

    /// Assignments are placed in time by their creation instant.
    pub fn filter_assignments(&self, assignments: Vec<Assignment>) -> Vec<Assignment> {
        assignments
            .into_iter()
            .filter(|a| self.matches_course_id(&a.course_id))
            .filter(|a| self.in_range(a.created_at))
            .filter(|a| self.matches_type(&a.kind))
            .collect()
    }

    /// Submissions are placed in time by their submission instant, and follow
    /// their assignment: a submission to an assignment the filter excludes is
    /// dropped too.
    ///
    /// `course_assignments` is the unfiltered assignment list of the course.
    /// A submission whose assignment is unknown survives only when no type
    /// filter is active.
    pub fn filter_submissions(
        &self,
        submissions: Vec<Submission>,
        course_assignments: &[Assignment],
    ) -> Vec<Submission> {
        let admitted: HashMap<&str, bool> = course_assignments
            .iter()
            .map(|a| {
                let keep = self.matches_type(&a.kind) && self.in_range(a.created_at);
                (a.id.as_str(), keep)
            })
            .collect();

        submissions
            .into_iter()
            .filter(|s| self.matches_course_id(&s.course_id))
            .filter(|s| self.in_range(s.submitted_at))
            .filter(|s| match admitted.get(s.assignment_id.as_str()) {
                Some(keep) => *keep,
                None => self.assignment_types.is_empty(),
            })
            .filter(|s| self.matches_student_id(&s.student_id))
            .collect()
    }
}
