use std::{env, fmt::Display, path::PathBuf, str::FromStr};

use tracing::{info, warn};

pub const DEFAULT_SESSION_LIFETIME_SECS: i64 = 60 * 60 * 24;
pub const MAX_SESSION_LIFETIME_SECS: i64 = 60 * 60 * 24 * 365;
pub const DEFAULT_SUMMARY_LIMIT: usize = 5;

#[derive(Debug, Clone)]
pub struct Config {
    /// Workspace opened at startup, before any `workspace.select`.
    pub workspace: Option<PathBuf>,
    pub session_lifetime_secs: i64,
    pub summary_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workspace: None,
            session_lifetime_secs: DEFAULT_SESSION_LIFETIME_SECS,
            summary_limit: DEFAULT_SUMMARY_LIMIT,
        }
    }
}

impl Config {
    pub fn load() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let workspace = lookup("COURSETRACK_WORKSPACE")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);
        Self {
            workspace,
            session_lifetime_secs: try_load(
                &lookup,
                "COURSETRACK_SESSION_LIFETIME_SECS",
                DEFAULT_SESSION_LIFETIME_SECS,
            )
            .clamp(1, MAX_SESSION_LIFETIME_SECS),
            summary_limit: try_load(&lookup, "COURSETRACK_SUMMARY_LIMIT", DEFAULT_SUMMARY_LIMIT),
        }
    }
}

fn try_load<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    let Some(raw) = lookup(key) else {
        info!("{key} not set, using default: {default}");
        return default;
    };
    match raw.trim().parse() {
        Ok(v) => v,
        Err(e) => {
            warn!("Invalid {key} value {raw:?}: {e}; using default: {default}");
            default
        }
    }
}
