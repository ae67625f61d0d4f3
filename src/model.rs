use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;

use crate::error::{CoreError, RecordKind};

/// Course row as it comes out of storage. Required fields are optional here so a
/// damaged row can be reported instead of aborting the whole load.
#[derive(Debug, Clone, Default)]
pub struct CourseRecord {
    pub id: String,
    pub name: Option<String>,
    pub date_created: Option<String>,
    pub assignments: Vec<String>,
    pub manual_grade: bool,
    pub grade: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct AssignmentRecord {
    pub id: String,
    pub course_id: String,
    pub name: Option<String>,
    pub due_date: Option<String>,
    pub date_created: Option<String>,
    pub is_completed: Option<bool>,
    pub weight: Option<f64>,
    pub grade: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub id: String,
    pub name: String,
    pub date_created: Option<DateTime<Utc>>,
    pub assignments: Vec<String>,
    pub manual_grade: bool,
    /// Manually entered grade when `manual_grade` is set, otherwise the derived
    /// grade once one has been computed.
    pub grade: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub id: String,
    pub course_id: String,
    pub name: String,
    pub due_date: DateTime<Utc>,
    pub date_created: Option<DateTime<Utc>>,
    pub is_completed: bool,
    pub weight: Option<f64>,
    pub grade: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct User {
    pub id: String,
    pub username: String,
    pub password_hash: String,
    pub courses: Vec<String>,
}

impl Course {
    pub fn with_grade(mut self, grade: Option<f64>) -> Self {
        self.grade = grade;
        self
    }
}

impl TryFrom<CourseRecord> for Course {
    type Error = CoreError;

    fn try_from(r: CourseRecord) -> Result<Self, Self::Error> {
        let name = required_name(r.name)
            .ok_or_else(|| CoreError::malformed(RecordKind::Course, &r.id, "name"))?;
        Ok(Course {
            date_created: r.date_created.as_deref().and_then(parse_timestamp),
            id: r.id,
            name,
            assignments: r.assignments,
            manual_grade: r.manual_grade,
            grade: r.grade,
        })
    }
}

impl TryFrom<AssignmentRecord> for Assignment {
    type Error = CoreError;

    fn try_from(r: AssignmentRecord) -> Result<Self, Self::Error> {
        let malformed = |field| CoreError::malformed(RecordKind::Assignment, &r.id, field);
        let name = required_name(r.name.clone()).ok_or_else(|| malformed("name"))?;
        let due_date = r
            .due_date
            .as_deref()
            .and_then(parse_timestamp)
            .ok_or_else(|| malformed("dueDate"))?;
        let is_completed = r.is_completed.ok_or_else(|| malformed("isCompleted"))?;
        Ok(Assignment {
            date_created: r.date_created.as_deref().and_then(parse_timestamp),
            id: r.id,
            course_id: r.course_id,
            name,
            due_date,
            is_completed,
            weight: r.weight,
            grade: r.grade,
        })
    }
}

fn required_name(name: Option<String>) -> Option<String> {
    name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty())
}

/// Validates a batch one record at a time. A malformed record lands in the error
/// list; it never stops the records after it.
pub fn partition_valid<R, T>(records: impl IntoIterator<Item = R>) -> (Vec<T>, Vec<CoreError>)
where
    T: TryFrom<R, Error = CoreError>,
{
    let mut valid = Vec::new();
    let mut skipped = Vec::new();
    for r in records {
        match T::try_from(r) {
            Ok(v) => valid.push(v),
            Err(e) => skipped.push(e),
        }
    }
    (valid, skipped)
}

/// Parses a stored date into an absolute instant.
///
/// Accepts RFC 3339 with any offset, naive `T`/space separated date-times (UTC),
/// and bare calendar dates (midnight UTC).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let t = raw.trim();
    if t.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(t) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M",
    ] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(t, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(t, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Request-boundary check for grade/weight values: finite and within 0..=100.
pub fn check_percent(value: Option<f64>, field: &str) -> Result<Option<f64>, String> {
    match value {
        None => Ok(None),
        Some(v) if !v.is_finite() => Err(format!("{} must be a finite number", field)),
        Some(v) if !(0.0..=100.0).contains(&v) => {
            Err(format!("{} must be in 0..=100", field))
        }
        Some(v) => Ok(Some(v)),
    }
}
