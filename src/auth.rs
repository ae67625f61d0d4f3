use anyhow::Context;
use chrono::{DateTime, TimeDelta, Utc};
use rusqlite::{Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use uuid::Uuid;

pub fn hash_password(plain: &str) -> anyhow::Result<String> {
    let salt = Uuid::new_v4();
    argon2::hash_encoded(plain.as_bytes(), salt.as_bytes(), &argon2::Config::default())
        .context("password hashing failed")
}

/// A stored hash that cannot be decoded counts as a mismatch.
pub fn password_matches(encoded: &str, plain: &str) -> bool {
    argon2::verify_encoded(encoded, plain.as_bytes()).unwrap_or(false)
}

fn token_digest(token: &str) -> String {
    format!("{:x}", Sha256::digest(token.as_bytes()))
}

#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// `now + lifetime_secs`, or `None` when that instant is not representable.
pub fn session_expiry(now: DateTime<Utc>, lifetime_secs: i64) -> Option<DateTime<Utc>> {
    TimeDelta::try_seconds(lifetime_secs).and_then(|d| now.checked_add_signed(d))
}

/// Creates a session for `user_id` ending at `expires_at`. Only the token's
/// digest is persisted; the plain token is handed back once.
pub fn issue_session(
    conn: &Connection,
    user_id: &str,
    now: DateTime<Utc>,
    expires_at: DateTime<Utc>,
) -> anyhow::Result<IssuedSession> {
    let token = Uuid::new_v4().simple().to_string();
    conn.execute(
        "INSERT INTO sessions(token_hash, user_id, created_at, expires_at) VALUES(?, ?, ?, ?)",
        (
            token_digest(&token),
            user_id,
            now.to_rfc3339(),
            expires_at.to_rfc3339(),
        ),
    )
    .context("failed to store session")?;
    Ok(IssuedSession { token, expires_at })
}

/// User id for a live session token. Expired sessions are removed on sight.
pub fn resolve_session(conn: &Connection, token: &str) -> anyhow::Result<Option<String>> {
    let digest = token_digest(token);
    let row: Option<(String, String)> = conn
        .query_row(
            "SELECT user_id, expires_at FROM sessions WHERE token_hash = ?",
            [&digest],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;
    let Some((user_id, expires_at)) = row else {
        return Ok(None);
    };
    let live = DateTime::parse_from_rfc3339(&expires_at)
        .map(|t| t.with_timezone(&Utc) > Utc::now())
        .unwrap_or(false);
    if !live {
        conn.execute("DELETE FROM sessions WHERE token_hash = ?", [&digest])?;
        return Ok(None);
    }
    Ok(Some(user_id))
}

pub fn revoke_session(conn: &Connection, token: &str) -> anyhow::Result<()> {
    conn.execute(
        "DELETE FROM sessions WHERE token_hash = ?",
        [token_digest(token)],
    )?;
    Ok(())
}
