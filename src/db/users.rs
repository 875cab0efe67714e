use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};

use crate::{db::DBResult, models};

/////*============== USER QUERIES ==============*/
impl<'a> TryFrom<&'a rusqlite::Row<'a>> for models::UserProfile {
    type Error = rusqlite::Error;

    fn try_from(row: &rusqlite::Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            uid: row.get("uid")?,
            display_name: row.get("display_name")?,
            country_code: row.get("country_code")?,
            last_active_at: row.get("last_active_at")?,
        })
    }
}

/// Returns the profile for `uid`, if one exists.
pub fn query_profile(connection: &Connection, uid: &str) -> DBResult<Option<models::UserProfile>> {
    log::trace!("[query_profile] Querying profile for {uid}...");
    connection
        .prepare("SELECT * FROM Users WHERE uid = :uid")?
        .query_row(rusqlite::named_params! { ":uid": uid }, |row| models::UserProfile::try_from(row))
        .optional()
}

/// Returns up to `limit` profiles, ordered by uid.
pub fn query_profiles(connection: &Connection, limit: usize) -> DBResult<Vec<models::UserProfile>> {
    log::trace!("[query_profiles] Querying up to {limit} profiles.");
    let mut stmt = connection.prepare("SELECT * FROM Users ORDER BY uid LIMIT :limit")?;

    let profiles = stmt
        .query_map(rusqlite::named_params! { ":limit": limit as i64 }, |row| {
            models::UserProfile::try_from(row)
        })?
        .collect::<DBResult<Vec<models::UserProfile>>>()?;

    Ok(profiles)
}

/// Inserts or replaces the descriptive fields of a profile.
///
/// `last_active_at` is left alone: only the ledger moves it.
pub fn upsert_profile(connection: &Connection, profile: &models::UserProfile) -> DBResult<()> {
    log::trace!("[upsert_profile] Upserting profile for {}...", profile.uid);

    let query_params = rusqlite::named_params! {
            ":uid":          profile.uid,
            ":display_name": profile.display_name,
            ":country_code": profile.country_code,
    };

    connection
        .prepare(
            "INSERT INTO Users ( uid,  display_name,  country_code)
             VALUES            (:uid, :display_name, :country_code)
             ON CONFLICT (uid) DO UPDATE SET
                display_name = excluded.display_name,
                country_code = excluded.country_code",
        )?
        .execute(query_params)?;

    Ok(())
}

/// Marks `uid` as active at `now`, creating a bare profile if needed.
pub fn touch_last_active(connection: &Connection, uid: &str, now: DateTime<Utc>) -> DBResult<()> {
    connection
        .prepare(
            "INSERT INTO Users (uid, last_active_at) VALUES (:uid, :now)
             ON CONFLICT (uid) DO UPDATE SET last_active_at = excluded.last_active_at",
        )?
        .execute(rusqlite::named_params! { ":uid": uid, ":now": now })?;

    Ok(())
}
