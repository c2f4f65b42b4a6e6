use std::{env, path::PathBuf, str::FromStr};

use anyhow::{Context, Result, anyhow};

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_UPLOAD_DIR: &str = "uploads";
const DEFAULT_ALLOWED_ORIGIN: &str = "http://localhost:3000";
const DEFAULT_SESSION_TTL_HOURS: i64 = 24;
const MAX_SESSION_TTL_HOURS: i64 = 24 * 365;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 << 20;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionBackend {
    Postgres,
    Memory,
}

impl FromStr for SessionBackend {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "postgres" => Ok(SessionBackend::Postgres),
            "memory" => Ok(SessionBackend::Memory),
            other => Err(anyhow!("unknown session store `{other}`")),
        }
    }
}

/// Credentials for the admin account provisioned at startup.
#[derive(Clone, Debug)]
pub struct SeedAdmin {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Clone, Debug)]
pub struct PortalConfig {
    pub database_url: String,
    pub port: u16,
    pub upload_dir: PathBuf,
    pub allowed_origin: String,
    pub session_ttl_hours: i64,
    pub session_backend: SessionBackend,
    pub allow_admin_signup: bool,
    pub max_upload_bytes: usize,
    pub db_max_connections: u32,
    pub seed_admin: Option<SeedAdmin>,
}

impl PortalConfig {
    pub fn from_env() -> Result<Self> {
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL env var is missing")?;

        let seed_admin = match (
            optional_var("SEED_ADMIN_USERNAME"),
            optional_var("SEED_ADMIN_PASSWORD"),
        ) {
            (Some(username), Some(password)) => Some(SeedAdmin {
                email: optional_var("SEED_ADMIN_EMAIL")
                    .unwrap_or_else(|| format!("{username}@localhost")),
                username,
                password,
            }),
            (None, None) => None,
            _ => {
                return Err(anyhow!(
                    "SEED_ADMIN_USERNAME and SEED_ADMIN_PASSWORD must be set together"
                ));
            }
        };

        Ok(Self {
            database_url,
            port: parse_var("PORT", DEFAULT_PORT)?,
            upload_dir: optional_var("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_UPLOAD_DIR)),
            allowed_origin: optional_var("ALLOWED_ORIGIN")
                .unwrap_or_else(|| DEFAULT_ALLOWED_ORIGIN.to_string()),
            session_ttl_hours: validate_session_ttl(parse_var(
                "SESSION_TTL_HOURS",
                DEFAULT_SESSION_TTL_HOURS,
            )?)?,
            session_backend: parse_var("SESSION_STORE", SessionBackend::Postgres)?,
            allow_admin_signup: parse_var("ALLOW_ADMIN_SIGNUP", false)?,
            max_upload_bytes: parse_var("MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?,
            db_max_connections: parse_var("DB_MAX_CONNECTIONS", DEFAULT_DB_MAX_CONNECTIONS)?,
            seed_admin,
        })
    }

    /// Defaults for everything but the database, used by tests.
    #[cfg(test)]
    pub fn for_tests(upload_dir: PathBuf) -> Self {
        Self {
            database_url: String::new(),
            port: DEFAULT_PORT,
            upload_dir,
            allowed_origin: DEFAULT_ALLOWED_ORIGIN.to_string(),
            session_ttl_hours: DEFAULT_SESSION_TTL_HOURS,
            session_backend: SessionBackend::Memory,
            allow_admin_signup: false,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            db_max_connections: DEFAULT_DB_MAX_CONNECTIONS,
            seed_admin: None,
        }
    }
}

fn optional_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_var<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match optional_var(key) {
        Some(raw) => raw
            .parse()
            .map_err(|err| anyhow!("invalid value for {key} (`{raw}`): {err}")),
        None => Ok(default),
    }
}

/// Session lifetimes must be positive and stay within a year so that both the
/// server-side expiry and the cookie `Max-Age` are representable.
fn validate_session_ttl(hours: i64) -> Result<i64> {
    if (1..=MAX_SESSION_TTL_HOURS).contains(&hours) {
        Ok(hours)
    } else {
        Err(anyhow!(
            "SESSION_TTL_HOURS must be between 1 and {MAX_SESSION_TTL_HOURS}, got {hours}"
        ))
    }
}
