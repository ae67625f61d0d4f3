use crate::db;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::handlers::setup::dashboard_prefs;
use crate::ipc::helpers::{
    due_date_param, load_course_assignments, load_graded_courses, name_param, opt_bool_param,
    opt_percent_param, opt_str_param, require_session, skipped_json, str_param,
};
use crate::ipc::types::{AppState, Request};
use crate::ordering;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

/// Fields shared by create and update. Update is a full replace, so absent
/// optional fields clear the stored value.
struct AssignmentFields {
    name: String,
    due_date: String,
    is_completed: bool,
    weight: Option<f64>,
    grade: Option<f64>,
}

fn assignment_fields(req: &Request) -> Result<AssignmentFields, HandlerErr> {
    Ok(AssignmentFields {
        name: name_param(req, "name")?,
        due_date: due_date_param(req)?.to_rfc3339(),
        is_completed: opt_bool_param(req, "isCompleted")?.unwrap_or(false),
        weight: opt_percent_param(req, "weight")?,
        grade: opt_percent_param(req, "grade")?,
    })
}

fn list_params<'a>(req: &'a Request, default_sort: &'a str) -> Result<(&'a str, bool), HandlerErr> {
    let criterion = opt_str_param(req, "sort")?.unwrap_or(default_sort);
    let include_completed = opt_bool_param(req, "includeCompleted")?.unwrap_or(false);
    Ok((criterion, include_completed))
}

fn handle_assignments_list(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let session = require_session(state, req)?;
    let course_id = str_param(req, "courseId")?;
    let (criterion, include_completed) = list_params(req, "name")?;
    session.require_course(course_id)?;

    let (assignments, skipped) = load_course_assignments(session.conn, course_id)?;
    let assignments = ordering::sort_filter_assignments(criterion, include_completed, &assignments)?;
    Ok(json!({
        "assignments": assignments,
        "skipped": skipped_json(&skipped),
    }))
}

fn handle_assignments_list_all(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let session = require_session(state, req)?;
    let prefs = dashboard_prefs(session.conn, &state.config, &session.user_id)?;
    let (criterion, include_completed) = list_params(req, &prefs.assignment_sort)?;

    let graded = load_graded_courses(session.conn, &session.user_id)?;
    let assignments =
        ordering::sort_filter_assignments(criterion, include_completed, &graded.assignments)?;
    Ok(json!({
        "assignments": assignments,
        "skipped": skipped_json(&graded.skipped),
    }))
}

fn handle_assignments_create(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let session = require_session(state, req)?;
    let course_id = str_param(req, "courseId")?;
    let fields = assignment_fields(req)?;
    session.require_course(course_id)?;

    let assignment_id = Uuid::new_v4().to_string();
    let tx = session
        .conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::db("db_tx_failed", e))?;
    tx.execute(
        "INSERT INTO assignments(id, name, due_date, date_created, is_completed, weight, grade)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            &assignment_id,
            &fields.name,
            &fields.due_date,
            chrono::Utc::now().to_rfc3339(),
            fields.is_completed as i64,
            fields.weight,
            fields.grade,
        ),
    )
    .map_err(|e| {
        HandlerErr::db("db_insert_failed", e).with_details(json!({ "table": "assignments" }))
    })?;
    let position = db::next_position(&tx, "course_assignments", "course_id", course_id)?;
    tx.execute(
        "INSERT INTO course_assignments(course_id, assignment_id, position) VALUES(?, ?, ?)",
        (course_id, &assignment_id, position),
    )
    .map_err(|e| {
        HandlerErr::db("db_insert_failed", e).with_details(json!({ "table": "course_assignments" }))
    })?;
    tx.commit()
        .map_err(|e| HandlerErr::db("db_commit_failed", e))?;

    Ok(json!({ "assignmentId": assignment_id, "courseId": course_id }))
}

fn handle_assignments_update(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let session = require_session(state, req)?;
    let course_id = str_param(req, "courseId")?;
    let assignment_id = str_param(req, "assignmentId")?;
    let fields = assignment_fields(req)?;
    session.require_assignment(course_id, assignment_id)?;

    session
        .conn
        .execute(
            "UPDATE assignments
             SET name = ?, due_date = ?, is_completed = ?, weight = ?, grade = ?
             WHERE id = ?",
            (
                &fields.name,
                &fields.due_date,
                fields.is_completed as i64,
                fields.weight,
                fields.grade,
                assignment_id,
            ),
        )
        .map_err(|e| HandlerErr::db("db_update_failed", e))?;
    Ok(json!({ "ok": true }))
}

fn handle_assignments_delete(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let session = require_session(state, req)?;
    let course_id = str_param(req, "courseId")?;
    let assignment_id = str_param(req, "assignmentId")?;
    session.require_assignment(course_id, assignment_id)?;

    let tx = session
        .conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::db("db_tx_failed", e))?;
    // Course.assignments first, then the record.
    tx.execute(
        "DELETE FROM course_assignments WHERE course_id = ? AND assignment_id = ?",
        (course_id, assignment_id),
    )
    .map_err(|e| {
        HandlerErr::db("db_delete_failed", e).with_details(json!({ "table": "course_assignments" }))
    })?;
    tx.execute("DELETE FROM assignments WHERE id = ?", [assignment_id])
        .map_err(|e| {
            HandlerErr::db("db_delete_failed", e).with_details(json!({ "table": "assignments" }))
        })?;
    tx.commit()
        .map_err(|e| HandlerErr::db("db_commit_failed", e))?;

    info!(course_id, assignment_id, "assignment deleted");
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "assignments.list" => handle_assignments_list(state, req),
        "assignments.listAll" => handle_assignments_list_all(state, req),
        "assignments.create" => handle_assignments_create(state, req),
        "assignments.update" => handle_assignments_update(state, req),
        "assignments.delete" => handle_assignments_delete(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
