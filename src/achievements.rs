//! Achievement evaluation, run after the ledger update commits.

use chrono::{DateTime, Utc};
use rusqlite::Connection;

use crate::db::{self, DBResult};
use crate::models::{Achievement, UserStats};

/// What one evaluation pass did for a user.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct AchievementReport {
    /// Achievements unlocked for the first time by this pass.
    pub unlocked: Vec<String>,
    /// Points granted by those first unlocks.
    pub rewarded_points: i64,
    /// Achievements whose grant failed, with the error.
    pub failed: Vec<(String, String)>,
}

impl AchievementReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Unlocks every achievement `uid` now satisfies.
///
/// Conditions are checked against one stats snapshot taken at the start of
/// the pass. Each grant is its own transaction: the unlock record is created
/// only if absent, and the reward is paid only when it was created. A failing
/// grant is recorded in the report and the remaining ones still run.
pub fn evaluate(connection: &mut Connection, uid: &str, now: DateTime<Utc>) -> DBResult<AchievementReport> {
    let catalog = db::query_catalog(connection)?;
    let Some(stats) = db::query_stats(connection, uid)? else {
        log::trace!("[evaluate] {uid} has no stats yet, nothing to evaluate.");
        return Ok(AchievementReport::default());
    };

    let mut report = AchievementReport::default();
    for achievement in catalog.iter().filter(|a| a.condition.is_satisfied(&stats)) {
        match grant(connection, uid, achievement, &stats, now) {
            Ok(Some(reward)) => {
                report.unlocked.push(achievement.achievement_id.clone());
                report.rewarded_points = report.rewarded_points.saturating_add(reward);
            }
            Ok(None) => {}
            Err(err) => {
                log::error!("[evaluate] Could not grant {} to {uid}: {err}", achievement.achievement_id);
                report.failed.push((achievement.achievement_id.clone(), err.to_string()));
            }
        }
    }

    Ok(report)
}

/// Returns the reward paid, or `None` if `uid` already had the achievement.
fn grant(
    connection: &mut Connection,
    uid: &str,
    achievement: &Achievement,
    stats: &UserStats,
    now: DateTime<Utc>,
) -> DBResult<Option<i64>> {
    db::with_transaction(connection, |tx| {
        if !db::insert_unlock(tx, uid, achievement, now)? {
            return Ok(None);
        }

        let reward = achievement.points_reward.unwrap_or(0);
        if reward != 0 {
            db::add_points(tx, uid, reward)?;
        }
        Ok(Some(reward))
    })
    .inspect(|granted| {
        if let Some(reward) = granted {
            log::info!(
                "[grant] {uid} unlocked {} ({} = {}, at {}) +{reward}",
                achievement.achievement_id,
                achievement.condition.tag(),
                achievement.condition.threshold(),
                stats
            );
        }
    })
}
