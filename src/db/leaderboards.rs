use rusqlite::{Connection, OptionalExtension};

use crate::{db::DBResult, models::{LeaderboardEntry, LeaderboardKind}};

/////*============== LEADERBOARD QUERIES ==============*/
impl<'a> TryFrom<&'a rusqlite::Row<'a>> for LeaderboardEntry {
    type Error = rusqlite::Error;

    fn try_from(row: &rusqlite::Row) -> Result<Self, rusqlite::Error> {
        let board = match row.get::<_, String>("board")?.as_str() {
            "local" => LeaderboardKind::Local,
            "weekly" => LeaderboardKind::Weekly,
            "daily" => LeaderboardKind::Daily,
            other => {
                return Err(rusqlite::Error::InvalidColumnType(
                    0,
                    format!("board = {other}"),
                    rusqlite::types::Type::Text,
                ));
            }
        };

        Ok(Self {
            board,
            partition: row.get("partition_key")?,
            uid: row.get("uid")?,
            points: row.get("points")?,
        })
    }
}

/// Adds ``amount`` to ``uid``'s entry in one leaderboard shard, creating it if needed.
///
/// The increment happens in SQL so concurrent writers never lose each other's points.
/// It saturates at the bounds of `i64`.
pub fn increment_entry(
    connection: &Connection,
    board: LeaderboardKind,
    partition: &str,
    uid: &str,
    amount: i64,
) -> DBResult<()> {
    log::trace!("[increment_entry] {}/{partition}/{uid} += {amount}", board.as_str());

    let query_params = rusqlite::named_params! {
            ":board":     board.as_str(),
            ":partition": partition,
            ":uid":       uid,
            ":amount":    amount,
            ":max":       i64::MAX,
            ":min":       i64::MIN,
    };

    connection
        .prepare(
            "INSERT INTO Leaderboards ( board,  partition_key,  uid,  points)
             VALUES                   (:board, :partition,     :uid, :amount)
             ON CONFLICT (board, partition_key, uid) DO UPDATE SET
                points = CASE
                    WHEN excluded.points > 0 AND points > :max - excluded.points THEN :max
                    WHEN excluded.points < 0 AND points < :min - excluded.points THEN :min
                    ELSE points + excluded.points
                END",
        )?
        .execute(query_params)?;

    Ok(())
}

/// Returns ``uid``'s entry in one leaderboard shard, if they have one.
pub fn query_entry(
    connection: &Connection,
    board: LeaderboardKind,
    partition: &str,
    uid: &str,
) -> DBResult<Option<LeaderboardEntry>> {
    log::trace!("[query_entry] Querying {}/{partition}/{uid}", board.as_str());

    let query_params = rusqlite::named_params! {
            ":board":     board.as_str(),
            ":partition": partition,
            ":uid":       uid,
    };

    connection
        .prepare(
            "SELECT * FROM Leaderboards
             WHERE board = :board AND partition_key = :partition AND uid = :uid",
        )?
        .query_row(query_params, |row| LeaderboardEntry::try_from(row))
        .optional()
}

/// Returns the top ``limit`` entries of a shard, highest points first.
pub fn query_standings(
    connection: &Connection,
    board: LeaderboardKind,
    partition: &str,
    limit: usize,
) -> DBResult<Vec<LeaderboardEntry>> {
    let query_params = rusqlite::named_params! {
            ":board":     board.as_str(),
            ":partition": partition,
            ":limit":     limit as i64,
    };

    let mut stmt = connection.prepare(
        "SELECT * FROM Leaderboards
         WHERE board = :board AND partition_key = :partition
         ORDER BY points DESC, uid ASC
         LIMIT :limit",
    )?;

    let entries = stmt
        .query_map(query_params, |row| LeaderboardEntry::try_from(row))?
        .collect::<DBResult<Vec<LeaderboardEntry>>>()?;

    Ok(entries)
}
