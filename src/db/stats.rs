use rusqlite::{Connection, OptionalExtension};

use crate::{db::DBResult, models};

/////*============== STATS QUERIES ==============*/
impl<'a> TryFrom<&'a rusqlite::Row<'a>> for models::UserStats {
    type Error = rusqlite::Error;

    fn try_from(row: &rusqlite::Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            uid: row.get("uid")?,
            points: row.get("points")?,
            weekly_goal: row.get("weekly_goal")?,
            weekly_progress: row.get("weekly_progress")?,
            streak_count: row.get("streak_count")?,
            streak_updated_on: row.get("streak_updated_on")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// Returns the stats row for `uid`, if the user has ever been credited.
pub fn query_stats(connection: &Connection, uid: &str) -> DBResult<Option<models::UserStats>> {
    log::trace!("[query_stats] Querying stats for {uid}...");
    connection
        .prepare("SELECT * FROM UserStats WHERE uid = :uid")?
        .query_row(rusqlite::named_params! { ":uid": uid }, |row| models::UserStats::try_from(row))
        .optional()
}

/// Writes every ledger-owned field of `stats`, creating the row if needed.
pub fn upsert_stats(connection: &Connection, stats: &models::UserStats) -> DBResult<()> {
    log::trace!("[upsert_stats] Writing stats for {}: {stats}", stats.uid);

    let query_params = rusqlite::named_params! {
            ":uid":               stats.uid,
            ":points":            stats.points,
            ":weekly_goal":       stats.weekly_goal,
            ":weekly_progress":   stats.weekly_progress,
            ":streak_count":      stats.streak_count,
            ":streak_updated_on": stats.streak_updated_on,
            ":updated_at":        stats.updated_at,
    };

    connection
        .prepare(
            "INSERT INTO UserStats ( uid,  points,  weekly_goal,  weekly_progress,
                                     streak_count,  streak_updated_on,  updated_at)
             VALUES                (:uid, :points, :weekly_goal, :weekly_progress,
                                    :streak_count, :streak_updated_on, :updated_at)
             ON CONFLICT (uid) DO UPDATE SET
                points            = excluded.points,
                weekly_goal       = excluded.weekly_goal,
                weekly_progress   = excluded.weekly_progress,
                streak_count      = excluded.streak_count,
                streak_updated_on = excluded.streak_updated_on,
                updated_at        = excluded.updated_at",
        )?
        .execute(query_params)?;

    Ok(())
}

/// Adds ``amount`` to ``uid``'s point total without reading it first,
/// saturating at the bounds of `i64`.
///
/// Returns their new total.
pub fn add_points(connection: &Connection, uid: &str, amount: i64) -> DBResult<i64> {
    log::trace!("[add_points] Adding {amount} points to {uid}");

    connection
        .prepare(
            "INSERT INTO UserStats (uid, points) VALUES (:uid, :amount)
             ON CONFLICT (uid) DO UPDATE SET points = CASE
                WHEN excluded.points > 0 AND points > :max - excluded.points THEN :max
                WHEN excluded.points < 0 AND points < :min - excluded.points THEN :min
                ELSE points + excluded.points
             END
             RETURNING points",
        )?
        .query_row(
            rusqlite::named_params! { ":uid": uid, ":amount": amount, ":max": i64::MAX, ":min": i64::MIN },
            |row| row.get("points"),
        )
        .inspect(|points| log::info!("[add_points] {uid}'s new total is {points} (+{amount})"))
}
