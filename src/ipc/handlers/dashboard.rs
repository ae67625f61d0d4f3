use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::handlers::setup::dashboard_prefs;
use crate::ipc::helpers::{load_graded_courses, require_session, skipped_json};
use crate::ipc::types::{AppState, Request};
use crate::ordering::{self, AssignmentSort, CourseSort};
use serde_json::json;

fn limit_param(req: &Request, default: usize) -> Result<usize, HandlerErr> {
    match req.params.get("limit") {
        None => Ok(default),
        Some(v) if v.is_null() => Ok(default),
        Some(v) => v
            .as_u64()
            .map(|n| n as usize)
            .ok_or_else(|| HandlerErr::bad_params("limit must be a non-negative integer")),
    }
}

/// Upcoming work and course grades for the summary view. Both lists are cut to
/// the same limit.
fn handle_dashboard_get(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let session = require_session(state, req)?;
    let prefs = dashboard_prefs(session.conn, &state.config, &session.user_id)?;
    let limit = limit_param(req, prefs.summary_limit)?;

    let graded = load_graded_courses(session.conn, &session.user_id)?;
    let upcoming =
        ordering::sort_filter_assignments_by(AssignmentSort::DueDate, false, &graded.assignments);
    let grades = ordering::sort_courses_by(CourseSort::Grade, &graded.courses);

    Ok(json!({
        "upcoming": ordering::truncate_for_summary(&upcoming, limit),
        "grades": ordering::truncate_for_summary(&grades, limit),
        "skipped": skipped_json(&graded.skipped),
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "dashboard.get" => handle_dashboard_get(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
