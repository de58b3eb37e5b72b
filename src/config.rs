use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;

/// Idle window after which a non-administrator token expires, if the
/// environment does not say otherwise.
const DEFAULT_TOKEN_IDLE_TIMEOUT_SECS: i64 = 300;

#[derive(Clone)]
pub struct Config {
    pub port: u16,
    /// Directory for persistent state (SQLite database).
    /// Defaults to current working directory.
    pub state_dir: PathBuf,
    /// Inactivity window for non-administrator tokens, in seconds.
    pub token_idle_timeout_secs: i64,
    /// Optional bootstrap administrator, created at startup if absent.
    /// Both variables must be set together.
    pub bootstrap_admin: Option<(String, String)>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .context("PORT must be a valid number")?;

        let state_dir = env::var("STATE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."));

        let token_idle_timeout_secs = parse_idle_timeout(
            &env::var("TOKEN_IDLE_TIMEOUT_SECS")
                .unwrap_or_else(|_| DEFAULT_TOKEN_IDLE_TIMEOUT_SECS.to_string()),
        )?;

        let bootstrap_admin = parse_bootstrap_admin(
            env::var("ADMIN_USERNAME").ok(),
            env::var("ADMIN_PASSWORD").ok(),
        )?;

        Ok(Config {
            port,
            state_dir,
            token_idle_timeout_secs,
            bootstrap_admin,
        })
    }
}

/// Parse the token inactivity window. A negative window would expire
/// every non-administrator token on first use, so it is rejected.
pub fn parse_idle_timeout(value: &str) -> Result<i64> {
    let secs = value
        .parse::<i64>()
        .context("TOKEN_IDLE_TIMEOUT_SECS must be a valid number")?;
    if secs < 0 {
        anyhow::bail!("TOKEN_IDLE_TIMEOUT_SECS must not be negative");
    }
    Ok(secs)
}

/// Pair up the bootstrap admin variables.
///
/// Requiring both (or neither) catches the half-configured case early
/// instead of silently starting without an administrator.
pub fn parse_bootstrap_admin(
    username: Option<String>,
    password: Option<String>,
) -> Result<Option<(String, String)>> {
    match (username, password) {
        (Some(u), Some(p)) if !u.trim().is_empty() && !p.is_empty() => Ok(Some((u, p))),
        (None, None) => Ok(None),
        _ => anyhow::bail!("ADMIN_USERNAME and ADMIN_PASSWORD must be set together"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_timeout_rejects_negative_and_malformed_values() {
        assert_eq!(parse_idle_timeout("300").unwrap(), 300);
        assert_eq!(parse_idle_timeout("0").unwrap(), 0);
        assert!(parse_idle_timeout("-1").is_err());
        assert!(parse_idle_timeout("soon").is_err());
    }

    #[test]
    fn bootstrap_admin_requires_both_variables() {
        assert!(parse_bootstrap_admin(None, None).unwrap().is_none());
        assert!(parse_bootstrap_admin(Some("root".into()), None).is_err());
        assert!(parse_bootstrap_admin(None, Some("secret".into())).is_err());
    }

    #[test]
    fn bootstrap_admin_rejects_blank_values() {
        assert!(parse_bootstrap_admin(Some("  ".into()), Some("secret".into())).is_err());
        assert!(parse_bootstrap_admin(Some("root".into()), Some("".into())).is_err());
    }

    #[test]
    fn bootstrap_admin_accepts_a_full_pair() {
        let pair = parse_bootstrap_admin(Some("root".into()), Some("secret".into()))
            .unwrap()
            .unwrap();
        assert_eq!(pair, ("root".to_string(), "secret".to_string()));
    }
}
