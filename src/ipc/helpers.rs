use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde_json::json;
use tracing::warn;

use crate::auth;
use crate::calc;
use crate::db;
use crate::error::CoreError;
use crate::ipc::error::HandlerErr;
use crate::ipc::types::{AppState, Request};
use crate::model::{self, Assignment, AssignmentRecord, Course};

pub fn require_conn(state: &AppState) -> Result<&Connection, HandlerErr> {
    state
        .db
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

pub struct Session<'a> {
    pub conn: &'a Connection,
    pub user_id: String,
}

impl Session<'_> {
    /// Ownership gate for every course-scoped request.
    pub fn require_course(&self, course_id: &str) -> Result<(), HandlerErr> {
        if !db::course_exists(self.conn, course_id)? {
            return Err(HandlerErr::not_found("course"));
        }
        if !db::user_owns_course(self.conn, &self.user_id, course_id)? {
            return Err(HandlerErr::new(
                "forbidden",
                "course belongs to another user",
            ));
        }
        Ok(())
    }

    pub fn require_assignment(&self, course_id: &str, assignment_id: &str) -> Result<(), HandlerErr> {
        self.require_course(course_id)?;
        if !db::course_has_assignment(self.conn, course_id, assignment_id)? {
            return Err(HandlerErr::not_found("assignment")
                .with_details(json!({ "courseId": course_id, "assignmentId": assignment_id })));
        }
        Ok(())
    }
}

pub fn require_session<'a>(state: &'a AppState, req: &Request) -> Result<Session<'a>, HandlerErr> {
    let conn = require_conn(state)?;
    let Some(token) = req.token.as_deref() else {
        return Err(HandlerErr::new("unauthenticated", "not currently logged in"));
    };
    let user_id = auth::resolve_session(conn, token)
        .map_err(|e| HandlerErr::db("db_query_failed", e))?
        .ok_or_else(|| HandlerErr::new("unauthenticated", "session expired or unknown"))?;
    Ok(Session { conn, user_id })
}

pub fn str_param<'a>(req: &'a Request, key: &str) -> Result<&'a str, HandlerErr> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn opt_str_param<'a>(req: &'a Request, key: &str) -> Result<Option<&'a str>, HandlerErr> {
    match req.params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => v
            .as_str()
            .map(Some)
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be a string", key))),
    }
}

pub fn name_param(req: &Request, key: &str) -> Result<String, HandlerErr> {
    let name = str_param(req, key)?.trim().to_string();
    if name.is_empty() {
        return Err(HandlerErr::bad_params(format!("{} must not be empty", key)));
    }
    Ok(name)
}

pub fn opt_bool_param(req: &Request, key: &str) -> Result<Option<bool>, HandlerErr> {
    match req.params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => v
            .as_bool()
            .map(Some)
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be boolean", key))),
    }
}

/// Optional 0..=100 number. Absent and `null` both mean "no value".
pub fn opt_percent_param(req: &Request, key: &str) -> Result<Option<f64>, HandlerErr> {
    let raw = match req.params.get(key) {
        None => None,
        Some(v) if v.is_null() => None,
        Some(v) => Some(
            v.as_f64()
                .ok_or_else(|| HandlerErr::bad_params(format!("{} must be a number or null", key)))?,
        ),
    };
    model::check_percent(raw, key)
        .map_err(|msg| HandlerErr::bad_params(msg).with_details(json!({ "field": key })))
}

pub fn due_date_param(req: &Request) -> Result<DateTime<Utc>, HandlerErr> {
    let raw = str_param(req, "dueDate")?;
    model::parse_timestamp(raw).ok_or_else(|| {
        HandlerErr::bad_params("dueDate is not a recognised date")
            .with_details(json!({ "dueDate": raw }))
    })
}

pub fn skipped_json(skipped: &[CoreError]) -> serde_json::Value {
    serde_json::Value::Array(skipped.iter().map(CoreError::to_json).collect())
}

/// A user's courses with grades recomputed from storage, every valid assignment
/// across them, and whatever could not be validated.
pub struct GradedCourses {
    pub courses: Vec<Course>,
    pub assignments: Vec<Assignment>,
    pub skipped: Vec<CoreError>,
}

pub fn load_course_assignments(
    conn: &Connection,
    course_id: &str,
) -> rusqlite::Result<(Vec<Assignment>, Vec<CoreError>)> {
    let records: Vec<AssignmentRecord> = db::fetch_course_assignments(conn, course_id)?;
    Ok(model::partition_valid(records))
}

pub fn load_graded_courses(conn: &Connection, user_id: &str) -> rusqlite::Result<GradedCourses> {
    let (courses, mut skipped): (Vec<Course>, Vec<CoreError>) =
        model::partition_valid(db::fetch_user_courses(conn, user_id)?);

    let mut graded = Vec::with_capacity(courses.len());
    let mut assignments = Vec::new();
    for course in courses {
        let (valid, bad) = load_course_assignments(conn, &course.id)?;
        // A damaged assignment fails this course's aggregate; other courses are unaffected.
        let grade = if bad.is_empty() || course.manual_grade {
            calc::course_grade(&course, &valid)
        } else {
            None
        };
        graded.push(course.with_grade(grade));
        assignments.extend(valid);
        skipped.extend(bad);
    }

    for e in &skipped {
        warn!(user_id, error = %e, "skipping malformed record");
    }

    Ok(GradedCourses {
        courses: graded,
        assignments,
        skipped,
    })
}
