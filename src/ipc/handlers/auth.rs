use crate::auth;
use crate::db;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{require_conn, require_session, str_param};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

fn credentials(req: &Request) -> Result<(String, String), HandlerErr> {
    let username = str_param(req, "username").unwrap_or("").trim().to_string();
    let password = str_param(req, "password").unwrap_or("").to_string();
    if username.is_empty() || password.is_empty() {
        return Err(HandlerErr::bad_params("missing username or password"));
    }
    Ok((username, password))
}

fn handle_signup(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_conn(state)?;
    let (username, password) = credentials(req)?;

    if db::find_user_by_name(conn, &username)?.is_some() {
        return Err(HandlerErr::new("conflict", "username already taken"));
    }

    let password_hash =
        auth::hash_password(&password).map_err(|e| HandlerErr::new("internal", format!("{e:#}")))?;
    let user_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO users(id, username, password_hash, date_created) VALUES(?, ?, ?, ?)",
        (
            &user_id,
            &username,
            &password_hash,
            chrono::Utc::now().to_rfc3339(),
        ),
    )
    .map_err(|e| HandlerErr::db("db_insert_failed", e).with_details(json!({ "table": "users" })))?;

    info!(%user_id, %username, "user signed up");
    Ok(json!({ "userId": user_id, "username": username }))
}

fn handle_login(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_conn(state)?;
    let (username, password) = credentials(req)?;

    let Some(user) = db::find_user_by_name(conn, &username)? else {
        return Err(HandlerErr::not_found("username"));
    };
    if !auth::password_matches(&user.password_hash, &password) {
        return Err(HandlerErr::new("unauthorized", "incorrect password"));
    }

    let now = chrono::Utc::now();
    let Some(expires_at) = auth::session_expiry(now, state.config.session_lifetime_secs) else {
        return Err(HandlerErr::new("internal", "session lifetime out of range"));
    };
    let session = auth::issue_session(conn, &user.id, now, expires_at)
        .map_err(|e| HandlerErr::db("db_insert_failed", format!("{e:#}")))?;
    info!(user_id = %user.id, "user logged in");
    Ok(json!({
        "userId": user.id,
        "username": user.username,
        "courses": user.courses,
        "token": session.token,
        "expiresAt": session.expires_at.to_rfc3339(),
    }))
}

/// Idempotent: logging out without a live session is not an error.
fn handle_logout(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_conn(state)?;
    if let Some(token) = req.token.as_deref() {
        auth::revoke_session(conn, token)
            .map_err(|e| HandlerErr::db("db_delete_failed", format!("{e:#}")))?;
    }
    Ok(json!({ "ok": true }))
}

fn handle_me(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let session = match require_session(state, req) {
        Ok(s) => s,
        Err(e) if e.code == "unauthenticated" => return Ok(json!({ "user": null })),
        Err(e) => return Err(e),
    };
    let Some(username) = db::username_for(session.conn, &session.user_id)? else {
        return Ok(json!({ "user": null }));
    };
    Ok(json!({ "userId": session.user_id, "username": username }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "auth.signup" => handle_signup(state, req),
        "auth.login" => handle_login(state, req),
        "auth.logout" => handle_logout(state, req),
        "auth.me" => handle_me(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
