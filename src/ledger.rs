//! The transactional half of event ingestion: points, streak, and leaderboards.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{Connection, Transaction};

use crate::datekeys::{self, DateKeys};
use crate::db::{self, DBResult};
use crate::models::{LeaderboardKind, UserStats};

/// What a committed ledger update wrote.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerUpdate {
    pub uid: String,
    pub points_delta: i64,
    pub country_code: String,
    pub keys: DateKeys,
    pub stats: UserStats,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LedgerOutcome {
    Applied(LedgerUpdate),
    /// The event was credited by an earlier delivery; nothing was written.
    AlreadyApplied,
    /// No such event; nothing was written.
    MissingEvent,
}

/// The streak after activity on `today`, given the day it was last bumped.
///
/// Only calendar days count: consecutive days extend the streak, a gap
/// restarts it at 1, and a repeat of the same day leaves it alone.
pub fn next_streak(current: i64, last_updated_on: Option<NaiveDate>, today: NaiveDate) -> i64 {
    let Some(last) = last_updated_on else {
        return 1;
    };

    match datekeys::days_between(last, today) {
        1 => current + 1,
        gap if gap > 1 => 1,
        // Same day, or the clock went backwards.
        _ => current,
    }
}

/// Credits `points_delta` for one event of `uid`, exactly once.
///
/// Runs as one immediate transaction: the event's processed marker, the
/// profile and the stats are read first, then the stats, profile activity,
/// three leaderboard shards and the marker are written. Either all of it
/// commits or none of it does.
pub fn apply_event(
    connection: &mut Connection,
    uid: &str,
    event_id: &str,
    points_delta: i64,
    keys: &DateKeys,
    now: DateTime<Utc>,
) -> DBResult<LedgerOutcome> {
    db::with_transaction(connection, |tx| apply_in_transaction(tx, uid, event_id, points_delta, keys, now))
        .inspect(|outcome| match outcome {
            LedgerOutcome::Applied(update) => log::info!(
                "[apply_event] {uid} +{points_delta} from {event_id}: {}",
                update.stats
            ),
            LedgerOutcome::AlreadyApplied => {
                log::warn!("[apply_event] {event_id} for {uid} was already credited, skipping.")
            }
            LedgerOutcome::MissingEvent => {
                log::warn!("[apply_event] {event_id} for {uid} does not exist, skipping.")
            }
        })
        .inspect_err(|err| log::error!("[apply_event] Could not credit {event_id} for {uid}: {err}"))
}

fn apply_in_transaction(
    tx: &Transaction,
    uid: &str,
    event_id: &str,
    points_delta: i64,
    keys: &DateKeys,
    now: DateTime<Utc>,
) -> DBResult<LedgerOutcome> {
    // Reads.
    match db::query_processed_at(tx, uid, event_id)? {
        None => return Ok(LedgerOutcome::MissingEvent),
        Some(Some(_)) => return Ok(LedgerOutcome::AlreadyApplied),
        Some(None) => {}
    }

    let country_code = db::query_profile(tx, uid)?
        .map(|profile| profile.country_or_default().to_string())
        .unwrap_or_else(|| crate::models::DEFAULT_COUNTRY_CODE.to_string());
    let previous = db::query_stats(tx, uid)?.unwrap_or_else(|| UserStats::new(uid));

    // Compute.
    let last_updated_on = datekeys::parse_day_key(&previous.streak_updated_on);
    if last_updated_on.is_none() && !previous.streak_updated_on.is_empty() {
        log::warn!(
            "[apply_event] {uid} has an unreadable streak date '{}', restarting streak.",
            previous.streak_updated_on
        );
    }

    let stats = UserStats {
        uid: uid.to_string(),
        points: previous.points.saturating_add(points_delta),
        weekly_goal: previous.weekly_goal,
        weekly_progress: previous.weekly_progress.saturating_add(points_delta),
        streak_count: next_streak(previous.streak_count, last_updated_on, keys.today),
        streak_updated_on: keys.today_key.clone(),
        updated_at: Some(now),
    };

    // Writes.
    db::upsert_stats(tx, &stats)?;
    db::touch_last_active(tx, uid, now)?;
    db::increment_entry(tx, LeaderboardKind::Local, &country_code, uid, points_delta)?;
    db::increment_entry(tx, LeaderboardKind::Weekly, &keys.week_key, uid, points_delta)?;
    db::increment_entry(tx, LeaderboardKind::Daily, &keys.daily_key, uid, points_delta)?;
    db::mark_processed(tx, uid, event_id, now)?;

    Ok(LedgerOutcome::Applied(LedgerUpdate {
        uid: uid.to_string(),
        points_delta,
        country_code,
        keys: keys.clone(),
        stats,
    }))
}
