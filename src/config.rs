use anyhow::{Context, Result, anyhow};
use chrono_tz::Tz;

use std::net::SocketAddr;
use std::path::PathBuf;

use crate::datekeys::DEFAULT_TIMEZONE;

pub const DB_PATH_VAR: &str = "GANBARU_DB_PATH";
pub const TIMEZONE_VAR: &str = "GANBARU_TIMEZONE";
pub const ADMIN_SECRET_VAR: &str = "GANBARU_ADMIN_SECRET";
pub const BIND_ADDR_VAR: &str = "GANBARU_BIND_ADDR";

const DEFAULT_DB_PATH: &str = "ganbaru.db";
const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";

#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: PathBuf,
    /// Zone whose calendar decides day and week boundaries.
    pub timezone: Tz,
    /// Shared secret for the admin endpoints. `None` locks them.
    pub admin_secret: Option<String>,
    pub bind_addr: SocketAddr,
}

impl Config {
    /// Reads the configuration from `.env` and the process environment.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from any variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let db_path = lookup(DB_PATH_VAR)
            .unwrap_or_else(|| DEFAULT_DB_PATH.to_string())
            .into();

        let timezone = match lookup(TIMEZONE_VAR) {
            Some(name) => name
                .trim()
                .parse::<Tz>()
                .map_err(|err| anyhow!("${TIMEZONE_VAR} is not a known timezone ({name}): {err}"))?,
            None => DEFAULT_TIMEZONE,
        };

        let admin_secret = lookup(ADMIN_SECRET_VAR)
            .map(|secret| secret.trim().to_string())
            .filter(|secret| !secret.is_empty());
        if admin_secret.is_none() {
            log::warn!("${ADMIN_SECRET_VAR} not defined. Admin endpoints will refuse every request.");
        }

        let bind_addr = lookup(BIND_ADDR_VAR)
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse()
            .with_context(|| format!("${BIND_ADDR_VAR} must look like 127.0.0.1:8080"))?;

        Ok(Self { db_path, timezone, admin_secret, bind_addr })
    }
}
