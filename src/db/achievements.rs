use chrono::{DateTime, Utc};
use rusqlite::Connection;

use crate::{db::DBResult, models};

/////*============== ACHIEVEMENT QUERIES ==============*/
impl<'a> TryFrom<&'a rusqlite::Row<'a>> for models::UserAchievement {
    type Error = rusqlite::Error;

    fn try_from(row: &rusqlite::Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            uid: row.get("uid")?,
            achievement_id: row.get("achievement_id")?,
            unlocked_at: row.get("unlocked_at")?,
            progress: row.get("progress")?,
        })
    }
}

/// Converts a catalog row, giving `None` when its condition is missing or unknown.
fn achievement_from_row(row: &rusqlite::Row) -> DBResult<Option<models::Achievement>> {
    let achievement_id: String = row.get("achievement_id")?;
    let tag: Option<String> = row.get("condition_type")?;
    let value: Option<i64> = row.get("condition_value")?;

    let Some(condition) = tag
        .zip(value)
        .and_then(|(tag, value)| models::AchievementCondition::from_parts(&tag, value))
    else {
        log::warn!("[query_catalog] Achievement {achievement_id} has no usable condition, skipping.");
        return Ok(None);
    };

    Ok(Some(models::Achievement {
        achievement_id,
        title: row.get("title")?,
        condition,
        points_reward: row.get("points_reward")?,
    }))
}

/// Loads every achievement definition with a condition we know how to evaluate.
pub fn query_catalog(connection: &Connection) -> DBResult<Vec<models::Achievement>> {
    log::trace!("[query_catalog] Loading achievement catalog.");
    let mut stmt = connection.prepare("SELECT * FROM Achievements ORDER BY achievement_id")?;

    let catalog = stmt
        .query_map([], achievement_from_row)?
        .collect::<DBResult<Vec<Option<models::Achievement>>>>()?
        .into_iter()
        .flatten()
        .collect();

    Ok(catalog)
}

/// Inserts or replaces a catalog definition.
pub fn upsert_achievement(connection: &Connection, achievement: &models::Achievement) -> DBResult<()> {
    log::trace!("[upsert_achievement] Writing achievement {}...", achievement.achievement_id);

    let query_params = rusqlite::named_params! {
            ":achievement_id":  achievement.achievement_id,
            ":title":           achievement.title,
            ":condition_type":  achievement.condition.tag(),
            ":condition_value": achievement.condition.threshold(),
            ":points_reward":   achievement.points_reward,
    };

    connection
        .prepare(
            "INSERT INTO Achievements ( achievement_id,  title,  condition_type,
                                        condition_value,  points_reward)
             VALUES                   (:achievement_id, :title, :condition_type,
                                       :condition_value, :points_reward)
             ON CONFLICT (achievement_id) DO UPDATE SET
                title           = excluded.title,
                condition_type  = excluded.condition_type,
                condition_value = excluded.condition_value,
                points_reward   = excluded.points_reward",
        )?
        .execute(query_params)?;

    Ok(())
}

/// Records that ``uid`` unlocked ``achievement``, unless they already had.
///
/// Returns `true` only for the first unlock.
pub fn insert_unlock(
    connection: &Connection,
    uid: &str,
    achievement: &models::Achievement,
    now: DateTime<Utc>,
) -> DBResult<bool> {
    let query_params = rusqlite::named_params! {
            ":uid":            uid,
            ":achievement_id": achievement.achievement_id,
            ":unlocked_at":    now,
            ":progress":       achievement.condition.threshold(),
    };

    connection
        .prepare(
            "INSERT INTO UserAchievements ( uid,  achievement_id,  unlocked_at,  progress)
             VALUES                       (:uid, :achievement_id, :unlocked_at, :progress)",
        )?
        .execute(query_params)
        .map_or_else(crate::db::swallow_constraint_violation, |_| Ok(true))
}

/// Gathers every achievement ``uid`` has unlocked.
pub fn query_user_achievements(connection: &Connection, uid: &str) -> DBResult<Vec<models::UserAchievement>> {
    log::trace!("[query_user_achievements] Querying unlocks for {uid}...");
    let mut stmt = connection.prepare(
        "SELECT * FROM UserAchievements WHERE uid = :uid ORDER BY unlocked_at, achievement_id",
    )?;

    let unlocks = stmt
        .query_map(rusqlite::named_params! { ":uid": uid }, |row| models::UserAchievement::try_from(row))?
        .collect::<DBResult<Vec<models::UserAchievement>>>()?;

    Ok(unlocks)
}
