use anyhow::Context;
use axum::Json;
use axum::extract::{Query, State};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::api::{ApiError, AppState, coerce_integer, page_size};
use crate::datekeys::{self, DateKeys};
use crate::db;
use crate::models::{EventType, LeaderboardKind, LearningEvent, ShardView};

const DEFAULT_SEED_TYPE: &str = "daily_checkin";
const DEFAULT_SEED_AMOUNT: i64 = 5;
const DEFAULT_EVENTS_PAGE: i64 = 50;
const DEFAULT_USERS_PAGE: i64 = 100;
const DEFAULT_STANDINGS_PAGE: i64 = 10;

/// Runs blocking database work off the async runtime.
async fn blocking<T, F>(work: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .context("Database task panicked")?
        .map_err(ApiError::Internal)
}

fn require_uid(uid: Option<String>) -> Result<String, ApiError> {
    uid.filter(|uid| !uid.is_empty())
        .ok_or_else(|| ApiError::BadRequest(String::from("Missing uid")))
}

/////*============== SEED EVENT ==============*/
#[derive(Debug, Default, Deserialize)]
pub struct SeedParams {
    secret: Option<String>,
    uid: Option<String>,
    #[serde(rename = "type")]
    event_type: Option<String>,
    amount: Option<Value>,
    meta: Option<Value>,
}

pub async fn seed_event_query(
    State(state): State<AppState>,
    Query(mut params): Query<SeedParams>,
) -> Result<Json<Value>, ApiError> {
    // Only JSON bodies carry structured meta.
    params.meta = None;
    seed_event(state, params).await
}

pub async fn seed_event_body(
    State(state): State<AppState>,
    Json(params): Json<SeedParams>,
) -> Result<Json<Value>, ApiError> {
    seed_event(state, params).await
}

/// Stores a test event for a user and hands it to the trigger.
async fn seed_event(state: AppState, params: SeedParams) -> Result<Json<Value>, ApiError> {
    state.authorize(params.secret.as_deref())?;
    let uid = require_uid(params.uid)?;

    let event_type = EventType::from(params.event_type.as_deref().unwrap_or(DEFAULT_SEED_TYPE));
    let amount = match params.amount {
        None | Some(Value::Null) => DEFAULT_SEED_AMOUNT,
        Some(raw) => coerce_integer(&raw)
            .ok_or_else(|| ApiError::BadRequest(format!("Invalid amount: {raw}")))?,
    };

    let event = LearningEvent {
        event_id: db::generate_event_id(),
        uid,
        event_type,
        amount,
        meta: params.meta.filter(|meta| !meta.is_null()),
        created_at: Utc::now(),
        processed_at: None,
    };

    let database = state.database.clone();
    let stored = event.clone();
    blocking(move || {
        let connection = database.connect()?;
        db::insert_event(&connection, &stored)?;
        Ok(())
    })
    .await?;

    state.trigger.notify(&event.uid, &event.event_id)?;
    log::info!("[seed_event] Seeded {event}");

    Ok(Json(json!({
        "ok": true,
        "path": format!("Usuarios/{}/events/{}", event.uid, event.event_id),
        "type": event.event_type,
        "amount": event.amount,
    })))
}

/////*============== DUMP USER DATA ==============*/
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DumpUserParams {
    secret: Option<String>,
    uid: Option<String>,
    limit: Option<Value>,
    start_after_id: Option<String>,
    week_key: Option<String>,
    daily_key: Option<String>,
}

pub async fn dump_user_query(
    State(state): State<AppState>,
    Query(params): Query<DumpUserParams>,
) -> Result<Json<Value>, ApiError> {
    dump_user(state, params).await
}

pub async fn dump_user_body(
    State(state): State<AppState>,
    Json(params): Json<DumpUserParams>,
) -> Result<Json<Value>, ApiError> {
    dump_user(state, params).await
}

/// One user's profile, stats, a page of events and their leaderboard entries.
async fn dump_user(state: AppState, params: DumpUserParams) -> Result<Json<Value>, ApiError> {
    state.authorize(params.secret.as_deref())?;
    let uid = require_uid(params.uid)?;
    let limit = page_size(params.limit.as_ref(), DEFAULT_EVENTS_PAGE)?;

    if let Some(week_key) = params.week_key.as_deref().filter(|key| !datekeys::is_week_key(key)) {
        return Err(ApiError::BadRequest(format!("Invalid weekKey: {week_key}")));
    }
    if let Some(daily_key) = params.daily_key.as_deref().filter(|key| !datekeys::is_daily_key(key)) {
        return Err(ApiError::BadRequest(format!("Invalid dailyKey: {daily_key}")));
    }

    let keys = DateKeys::at(Utc::now(), state.timezone);
    let week_key = params.week_key.unwrap_or(keys.week_key);
    let daily_key = params.daily_key.unwrap_or(keys.daily_key);
    let start_after = params.start_after_id;

    let database = state.database.clone();
    let dump = blocking(move || {
        let connection = database.connect()?;

        let profile = db::query_profile(&connection, &uid)?;
        let stats = db::query_stats(&connection, &uid)?
            .map(serde_json::to_value)
            .transpose()?
            .map(|mut stats| {
                stats["id"] = json!("general");
                stats
            });
        let events = db::query_events_page(&connection, &uid, limit, start_after.as_deref())?;
        let unlocks = db::query_user_achievements(&connection, &uid)?;

        let country_code = profile
            .as_ref()
            .map(|p| p.country_or_default().to_string())
            .unwrap_or_else(|| crate::models::DEFAULT_COUNTRY_CODE.to_string());

        let entry = |board: LeaderboardKind, partition: &str| -> anyhow::Result<Option<ShardView>> {
            Ok(db::query_entry(&connection, board, partition, &uid)?.map(|entry| entry.view()))
        };
        let local = entry(LeaderboardKind::Local, &country_code)?;
        let weekly = entry(LeaderboardKind::Weekly, &week_key)?;
        let daily = entry(LeaderboardKind::Daily, &daily_key)?;

        let next_start_after_id = events.last().map(|event| event.event_id.clone());

        Ok(json!({
            "user": profile,
            "stats": stats,
            "eventsCount": events.len(),
            "events": events,
            "achievements": unlocks,
            "leaderboards": {
                "local": local,
                "weekly": { "weekKey": week_key, "data": weekly },
                "daily": { "dailyKey": daily_key, "data": daily },
                "countryCode": country_code,
            },
            "page": {
                "limit": limit,
                "nextStartAfterId": next_start_after_id,
            },
        }))
    })
    .await?;

    Ok(Json(dump))
}

/////*============== DUMP ALL USERS BRIEF ==============*/
#[derive(Debug, Default, Deserialize)]
pub struct DumpAllUsersParams {
    secret: Option<String>,
    limit: Option<Value>,
}

pub async fn dump_all_users_query(
    State(state): State<AppState>,
    Query(params): Query<DumpAllUsersParams>,
) -> Result<Json<Value>, ApiError> {
    dump_all_users(state, params).await
}

pub async fn dump_all_users_body(
    State(state): State<AppState>,
    Json(params): Json<DumpAllUsersParams>,
) -> Result<Json<Value>, ApiError> {
    dump_all_users(state, params).await
}

/// A short summary of up to `limit` users.
async fn dump_all_users(state: AppState, params: DumpAllUsersParams) -> Result<Json<Value>, ApiError> {
    state.authorize(params.secret.as_deref())?;
    let limit = page_size(params.limit.as_ref(), DEFAULT_USERS_PAGE)?;

    let database = state.database.clone();
    let users = blocking(move || {
        let connection = database.connect()?;

        db::query_profiles(&connection, limit)?
            .into_iter()
            .map(|profile| {
                let stats = db::query_stats(&connection, &profile.uid)?;
                Ok(json!({
                    "uid": profile.uid,
                    "displayName": profile.display_name,
                    "countryCode": profile.country_or_default(),
                    "lastActiveAt": profile.last_active_at,
                    "stats": stats,
                }))
            })
            .collect::<anyhow::Result<Vec<Value>>>()
    })
    .await?;

    Ok(Json(json!({ "count": users.len(), "users": users })))
}

/////*============== LEADERBOARD STANDINGS ==============*/
#[derive(Debug, Default, Deserialize)]
pub struct StandingsParams {
    secret: Option<String>,
    board: Option<String>,
    partition: Option<String>,
    limit: Option<Value>,
}

pub async fn standings_query(
    State(state): State<AppState>,
    Query(params): Query<StandingsParams>,
) -> Result<Json<Value>, ApiError> {
    standings(state, params).await
}

pub async fn standings_body(
    State(state): State<AppState>,
    Json(params): Json<StandingsParams>,
) -> Result<Json<Value>, ApiError> {
    standings(state, params).await
}

/// The top entries of one leaderboard shard.
///
/// Weekly and daily boards default to the current week or day; the local
/// board needs a country code.
async fn standings(state: AppState, params: StandingsParams) -> Result<Json<Value>, ApiError> {
    state.authorize(params.secret.as_deref())?;
    let limit = page_size(params.limit.as_ref(), DEFAULT_STANDINGS_PAGE)?;

    let board = match params.board.as_deref() {
        Some("local") => LeaderboardKind::Local,
        Some("weekly") => LeaderboardKind::Weekly,
        Some("daily") => LeaderboardKind::Daily,
        Some(other) => return Err(ApiError::BadRequest(format!("Unknown board: {other}"))),
        None => return Err(ApiError::BadRequest(String::from("Missing board"))),
    };

    let keys = DateKeys::at(Utc::now(), state.timezone);
    let partition = match (board, params.partition) {
        (LeaderboardKind::Local, None) => {
            return Err(ApiError::BadRequest(String::from("Missing partition (country code)")));
        }
        (LeaderboardKind::Weekly, Some(key)) if !datekeys::is_week_key(&key) => {
            return Err(ApiError::BadRequest(format!("Invalid weekKey: {key}")));
        }
        (LeaderboardKind::Daily, Some(key)) if !datekeys::is_daily_key(&key) => {
            return Err(ApiError::BadRequest(format!("Invalid dailyKey: {key}")));
        }
        (_, Some(partition)) => partition,
        (LeaderboardKind::Weekly, None) => keys.week_key,
        (LeaderboardKind::Daily, None) => keys.daily_key,
    };

    let database = state.database.clone();
    let lookup_partition = partition.clone();
    let entries = blocking(move || {
        let connection = database.connect()?;
        Ok(db::query_standings(&connection, board, &lookup_partition, limit)?)
    })
    .await?;

    let entries = entries
        .into_iter()
        .enumerate()
        .map(|(rank, entry)| json!({ "rank": rank + 1, "uid": entry.uid, "points": entry.points }))
        .collect::<Vec<_>>();

    Ok(Json(json!({
        "board": board.as_str(),
        "partition": partition,
        "count": entries.len(),
        "entries": entries,
    })))
}
