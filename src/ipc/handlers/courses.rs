use crate::calc;
use crate::db;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::handlers::setup::dashboard_prefs;
use crate::ipc::helpers::{
    load_course_assignments, load_graded_courses, name_param, opt_bool_param, opt_percent_param,
    opt_str_param, require_session, skipped_json, str_param,
};
use crate::ipc::types::{AppState, Request};
use crate::model::Course;
use crate::ordering;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

fn handle_courses_list(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let session = require_session(state, req)?;
    let criterion = match opt_str_param(req, "sort")? {
        Some(s) => s.to_string(),
        None => dashboard_prefs(session.conn, &state.config, &session.user_id)?.course_sort,
    };

    // Grades are recomputed from the assignments on every list.
    let graded = load_graded_courses(session.conn, &session.user_id)?;
    let courses = ordering::sort_courses(&criterion, &graded.courses)?;

    Ok(json!({
        "courses": courses,
        "skipped": skipped_json(&graded.skipped),
    }))
}

fn handle_courses_get(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let session = require_session(state, req)?;
    let course_id = str_param(req, "courseId")?;
    session.require_course(course_id)?;

    let Some(record) = db::fetch_course(session.conn, course_id)? else {
        return Err(HandlerErr::not_found("course"));
    };
    let course = Course::try_from(record)?;
    let (assignments, skipped) = load_course_assignments(session.conn, course_id)?;
    let grade = if skipped.is_empty() || course.manual_grade {
        calc::course_grade(&course, &assignments)
    } else {
        None
    };

    Ok(json!({
        "course": course.with_grade(grade),
        "skipped": skipped_json(&skipped),
    }))
}

fn handle_courses_create(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let session = require_session(state, req)?;
    let name = name_param(req, "name")?;
    let course_id = Uuid::new_v4().to_string();

    let tx = session
        .conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::db("db_tx_failed", e))?;
    tx.execute(
        "INSERT INTO courses(id, name, date_created, manual_grade, grade) VALUES(?, ?, ?, 0, NULL)",
        (&course_id, &name, chrono::Utc::now().to_rfc3339()),
    )
    .map_err(|e| HandlerErr::db("db_insert_failed", e).with_details(json!({ "table": "courses" })))?;
    let position = db::next_position(&tx, "user_courses", "user_id", &session.user_id)?;
    tx.execute(
        "INSERT INTO user_courses(user_id, course_id, position) VALUES(?, ?, ?)",
        (&session.user_id, &course_id, position),
    )
    .map_err(|e| {
        HandlerErr::db("db_insert_failed", e).with_details(json!({ "table": "user_courses" }))
    })?;
    tx.commit()
        .map_err(|e| HandlerErr::db("db_commit_failed", e))?;

    Ok(json!({ "courseId": course_id, "name": name }))
}

/// Full-field replace: omitted optional fields are cleared, not kept.
fn handle_courses_update(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let session = require_session(state, req)?;
    let course_id = str_param(req, "courseId")?;
    let name = name_param(req, "name")?;
    let manual_grade = opt_bool_param(req, "manualGrade")?.unwrap_or(false);
    let grade = opt_percent_param(req, "grade")?;
    session.require_course(course_id)?;

    session
        .conn
        .execute(
            "UPDATE courses SET name = ?, manual_grade = ?, grade = ? WHERE id = ?",
            (&name, manual_grade as i64, grade, course_id),
        )
        .map_err(|e| HandlerErr::db("db_update_failed", e))?;
    Ok(json!({ "ok": true }))
}

/// Back-references go first (user -> course, course -> assignment), then the
/// records, all in one transaction.
fn handle_courses_delete(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let session = require_session(state, req)?;
    let course_id = str_param(req, "courseId")?;
    session.require_course(course_id)?;

    let tx = session
        .conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::db("db_tx_failed", e))?;

    let assignment_ids: Vec<String> = {
        let mut stmt =
            tx.prepare("SELECT assignment_id FROM course_assignments WHERE course_id = ?")?;
        let ids = stmt
            .query_map([course_id], |r| r.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        ids
    };

    let delete_failed = |table: &'static str| {
        move |e: rusqlite::Error| {
            HandlerErr::db("db_delete_failed", e).with_details(json!({ "table": table }))
        }
    };

    tx.execute(
        "DELETE FROM user_courses WHERE user_id = ? AND course_id = ?",
        (&session.user_id, course_id),
    )
    .map_err(delete_failed("user_courses"))?;
    tx.execute(
        "DELETE FROM course_assignments WHERE course_id = ?",
        [course_id],
    )
    .map_err(delete_failed("course_assignments"))?;
    for id in &assignment_ids {
        tx.execute("DELETE FROM assignments WHERE id = ?", [id])
            .map_err(delete_failed("assignments"))?;
    }
    tx.execute("DELETE FROM courses WHERE id = ?", [course_id])
        .map_err(delete_failed("courses"))?;

    tx.commit()
        .map_err(|e| HandlerErr::db("db_commit_failed", e))?;

    info!(
        user_id = %session.user_id,
        course_id,
        assignments = assignment_ids.len(),
        "course deleted"
    );
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "courses.list" => handle_courses_list(state, req),
        "courses.get" => handle_courses_get(state, req),
        "courses.create" => handle_courses_create(state, req),
        "courses.update" => handle_courses_update(state, req),
        "courses.delete" => handle_courses_delete(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
