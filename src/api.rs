use axum::Router;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use chrono_tz::Tz;
use serde_json::Value;

use std::sync::Arc;

use crate::config::Config;
use crate::db::Database;
use crate::trigger::EventTrigger;

pub mod handlers;

/// Largest page any admin endpoint will return.
pub const MAX_PAGE_SIZE: i64 = 500;

#[derive(Debug, Clone)]
pub struct AppState {
    pub database: Database,
    pub trigger: EventTrigger,
    pub timezone: Tz,
    admin_secret: Option<Arc<str>>,
}

impl AppState {
    pub fn new(database: Database, trigger: EventTrigger, config: &Config) -> Self {
        Self {
            database,
            trigger,
            timezone: config.timezone,
            admin_secret: config.admin_secret.as_deref().map(Arc::from),
        }
    }

    /// Checks a caller-supplied secret. Nothing passes when no secret is configured.
    pub fn authorize(&self, presented: Option<&str>) -> Result<(), ApiError> {
        match (self.admin_secret.as_deref(), presented) {
            (Some(expected), Some(presented)) if expected == presented => Ok(()),
            _ => {
                log::warn!("[authorize] Rejected admin request with a missing or wrong secret.");
                Err(ApiError::Forbidden)
            }
        }
    }
}

/// Every admin route answers both GET (query string) and POST (JSON body).
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/seedEvent", get(handlers::seed_event_query).post(handlers::seed_event_body))
        .route("/dumpUserData", get(handlers::dump_user_query).post(handlers::dump_user_body))
        .route(
            "/dumpAllUsersBrief",
            get(handlers::dump_all_users_query).post(handlers::dump_all_users_body),
        )
        .route(
            "/leaderboardStandings",
            get(handlers::standings_query).post(handlers::standings_body),
        )
        .with_state(state)
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("forbidden")]
    Forbidden,
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(err) => {
                log::error!("[api] Request failed: {err:#}");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (status, self.to_string()).into_response()
    }
}

/// Reads a loosely typed integer the way a form or JSON client might send it.
///
/// Accepts JSON numbers and numeric strings; fractional values are truncated.
pub fn coerce_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64().or_else(|| number.as_f64().map(|f| f.trunc() as i64)),
        Value::String(text) => {
            let text = text.trim();
            text.parse::<i64>()
                .ok()
                .or_else(|| text.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
        }
        Value::Bool(flag) => Some(*flag as i64),
        _ => None,
    }
}

/// Resolves an optional page size: `default` when absent, clamped to `[1, MAX_PAGE_SIZE]`.
pub fn page_size(raw: Option<&Value>, default: i64) -> Result<usize, ApiError> {
    let requested = match raw {
        None | Some(Value::Null) => default,
        Some(value) => coerce_integer(value)
            .ok_or_else(|| ApiError::BadRequest(format!("Invalid limit: {value}")))?,
    };

    Ok(requested.clamp(1, MAX_PAGE_SIZE) as usize)
}
