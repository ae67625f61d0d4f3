mod common;

use common::{temp_dir, Sidecar};
use rusqlite::Connection;
use serde_json::json;

#[test]
fn signup_login_and_credential_errors() {
    let workspace = temp_dir("coursetrack-auth");
    let mut sc = Sidecar::spawn();
    sc.select_workspace(&workspace);

    let creds = json!({ "username": "grace", "password": "s3cret" });
    let signed = sc.ok(None, "auth.signup", creds.clone());
    assert_eq!(signed["username"], json!("grace"));
    assert_eq!(sc.err_code(None, "auth.signup", creds.clone()), "conflict");
    assert_eq!(
        sc.err_code(None, "auth.signup", json!({ "username": "", "password": "x" })),
        "bad_params"
    );

    assert_eq!(
        sc.err_code(None, "auth.login", json!({ "username": "nobody", "password": "x" })),
        "not_found"
    );
    assert_eq!(
        sc.err_code(None, "auth.login", json!({ "username": "grace", "password": "wrong" })),
        "unauthorized"
    );

    let login = sc.ok(None, "auth.login", creds);
    let token = login["token"].as_str().expect("token").to_string();
    assert_eq!(login["courses"], json!([]));
    assert!(login["expiresAt"].is_string());

    let me = sc.ok(Some(token.as_str()), "auth.me", json!({}));
    assert_eq!(me["username"], json!("grace"));

    let conn = Connection::open(workspace.join("coursetrack.sqlite3")).expect("open db");
    let (hash, stored_token): (String, String) = conn
        .query_row(
            "SELECT u.password_hash, s.token_hash FROM users u JOIN sessions s ON s.user_id = u.id",
            [],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .expect("stored credentials");
    assert!(hash.starts_with("$argon2"));
    assert_ne!(stored_token, token);
}

#[test]
fn logout_ends_the_session() {
    let workspace = temp_dir("coursetrack-logout");
    let mut sc = Sidecar::spawn();
    sc.select_workspace(&workspace);
    let token = sc.sign_in("grace");

    sc.ok(Some(token.as_str()), "courses.list", json!({}));
    sc.ok(Some(token.as_str()), "auth.logout", json!({}));
    assert_eq!(sc.err_code(Some(token.as_str()), "courses.list", json!({})), "unauthenticated");
    // A second logout is harmless.
    sc.ok(Some(token.as_str()), "auth.logout", json!({}));

    let me = sc.ok(Some(token.as_str()), "auth.me", json!({}));
    assert!(me["user"].is_null());
}

#[test]
fn missing_unknown_and_expired_tokens_are_unauthenticated() {
    let workspace = temp_dir("coursetrack-expiry");
    let mut sc = Sidecar::spawn();
    sc.select_workspace(&workspace);
    let token = sc.sign_in("grace");

    assert_eq!(sc.err_code(None, "courses.list", json!({})), "unauthenticated");
    assert_eq!(sc.err_code(Some("made-up"), "dashboard.get", json!({})), "unauthenticated");

    let conn = Connection::open(workspace.join("coursetrack.sqlite3")).expect("open db");
    conn.execute(
        "UPDATE sessions SET expires_at = '2000-01-01T00:00:00+00:00'",
        [],
    )
    .expect("expire sessions");
    assert_eq!(sc.err_code(Some(token.as_str()), "courses.list", json!({})), "unauthenticated");

    let left: i64 = conn
        .query_row("SELECT COUNT(*) FROM sessions", [], |r| r.get(0))
        .expect("count");
    assert_eq!(left, 0);
}

#[test]
fn oversized_session_lifetime_is_capped_at_a_year() {
    let workspace = temp_dir("coursetrack-lifetime");
    let mut sc = Sidecar::spawn_with_env(&[("COURSETRACK_SESSION_LIFETIME_SECS", "10000000000000")]);
    sc.select_workspace(&workspace);

    let creds = json!({ "username": "grace", "password": "s3cret" });
    sc.ok(None, "auth.signup", creds.clone());
    let login = sc.ok(None, "auth.login", creds);
    let expires_at = chrono::DateTime::parse_from_rfc3339(login["expiresAt"].as_str().expect("expiresAt"))
        .expect("rfc3339 expiry");
    let lifetime = expires_at.with_timezone(&chrono::Utc) - chrono::Utc::now();
    assert!(lifetime <= chrono::TimeDelta::days(365));
    assert!(lifetime > chrono::TimeDelta::days(364));

    // Still serving after the login.
    sc.ok(Some(login["token"].as_str().expect("token")), "courses.list", json!({}));
}
