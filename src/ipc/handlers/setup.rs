use crate::config::Config;
use crate::db;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{require_session, str_param};
use crate::ipc::types::{AppState, Request};
use crate::ordering::{AssignmentSort, CourseSort};
use serde_json::{json, Map, Value};
use tracing::warn;

#[derive(Clone, Copy)]
pub enum SetupSection {
    Dashboard,
    Grades,
}

impl SetupSection {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "dashboard" => Some(Self::Dashboard),
            "grades" => Some(Self::Grades),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Dashboard => "dashboard",
            Self::Grades => "grades",
        }
    }

    /// Settings belong to one user; the workspace is shared by many.
    fn key(self, user_id: &str) -> String {
        format!("setup.{}.{}", user_id, self.name())
    }
}

fn default_section(section: SetupSection, config: &Config) -> Value {
    match section {
        SetupSection::Dashboard => json!({
            "summaryLimit": config.summary_limit,
            "courseSort": "grade",
            "assignmentSort": "dueDate"
        }),
        SetupSection::Grades => json!({
            "showUngradedAs": "No grade"
        }),
    }
}

fn parse_i64_range(v: &Value, key: &str, min: i64, max: i64) -> Result<i64, String> {
    let n = v
        .as_i64()
        .ok_or_else(|| format!("{} must be integer", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn parse_string_max(v: &Value, key: &str, max_len: usize) -> Result<String, String> {
    let s = v.as_str().ok_or_else(|| format!("{} must be string", key))?;
    let s = s.trim();
    if s.len() > max_len {
        return Err(format!("{} length must be <= {}", key, max_len));
    }
    Ok(s.to_string())
}

fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = current
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())?;
    for (k, v) in patch {
        match section {
            SetupSection::Dashboard => match k.as_str() {
                "summaryLimit" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 1, 50)?));
                }
                "courseSort" => {
                    let s = parse_string_max(v, k, 40)?;
                    s.parse::<CourseSort>().map_err(|e| e.to_string())?;
                    obj.insert(k.clone(), Value::String(s));
                }
                "assignmentSort" => {
                    let s = parse_string_max(v, k, 40)?;
                    s.parse::<AssignmentSort>().map_err(|e| e.to_string())?;
                    obj.insert(k.clone(), Value::String(s));
                }
                _ => return Err(format!("unknown dashboard field: {}", k)),
            },
            SetupSection::Grades => match k.as_str() {
                "showUngradedAs" => {
                    obj.insert(k.clone(), Value::String(parse_string_max(v, k, 40)?));
                }
                _ => return Err(format!("unknown grades field: {}", k)),
            },
        }
    }
    Ok(())
}

pub fn load_section(
    conn: &rusqlite::Connection,
    config: &Config,
    user_id: &str,
    section: SetupSection,
) -> anyhow::Result<Value> {
    let defaults = default_section(section, config);
    let Some(saved) = db::settings_get_json(conn, &section.key(user_id))? else {
        return Ok(defaults);
    };
    let Some(saved_obj) = saved.as_object() else {
        warn!(user_id, section = section.name(), "saved settings are not an object; using defaults");
        return Ok(defaults);
    };
    // All or nothing: a stale value must not leave a half-applied section.
    let mut merged = defaults.clone();
    match merge_section_patch(section, &mut merged, saved_obj) {
        Ok(()) => Ok(merged),
        Err(e) => {
            warn!(user_id, section = section.name(), "ignoring saved settings: {e}");
            Ok(defaults)
        }
    }
}

/// Dashboard defaults as typed values.
pub struct DashboardPrefs {
    pub summary_limit: usize,
    pub course_sort: String,
    pub assignment_sort: String,
}

pub fn dashboard_prefs(
    conn: &rusqlite::Connection,
    config: &Config,
    user_id: &str,
) -> Result<DashboardPrefs, HandlerErr> {
    let v = load_section(conn, config, user_id, SetupSection::Dashboard)
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    Ok(DashboardPrefs {
        summary_limit: v["summaryLimit"]
            .as_u64()
            .map(|n| n as usize)
            .unwrap_or(config.summary_limit),
        course_sort: v["courseSort"].as_str().unwrap_or("grade").to_string(),
        assignment_sort: v["assignmentSort"].as_str().unwrap_or("dueDate").to_string(),
    })
}

fn handle_setup_get(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let session = require_session(state, req)?;
    let dashboard = load_section(session.conn, &state.config, &session.user_id, SetupSection::Dashboard)
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    let grades = load_section(session.conn, &state.config, &session.user_id, SetupSection::Grades)
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    Ok(json!({
        "dashboard": dashboard,
        "grades": grades
    }))
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> Result<Value, HandlerErr> {
    let session = require_session(state, req)?;
    let section_raw = str_param(req, "section")?;
    let Some(section) = SetupSection::parse(section_raw) else {
        return Err(HandlerErr::bad_params("unknown section"));
    };
    let Some(patch_obj) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return Err(HandlerErr::bad_params("patch must be an object"));
    };

    let mut current = load_section(session.conn, &state.config, &session.user_id, section)
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    merge_section_patch(section, &mut current, patch_obj).map_err(HandlerErr::bad_params)?;
    db::settings_set_json(session.conn, &section.key(&session.user_id), &current)
        .map_err(|e| HandlerErr::db("db_update_failed", e))?;
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "setup.get" => handle_setup_get(state, req),
        "setup.update" => handle_setup_update(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
