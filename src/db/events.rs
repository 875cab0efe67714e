use chrono::{DateTime, Utc};
use rand::{Rng, distr::Alphanumeric};
use rusqlite::{Connection, OptionalExtension};

use crate::{db::DBResult, models};

/// Length of generated event ids.
const EVENT_ID_LEN: usize = 20;

/////*============== EVENT QUERIES ==============*/
impl<'a> TryFrom<&'a rusqlite::Row<'a>> for models::LearningEvent {
    type Error = rusqlite::Error;

    fn try_from(row: &rusqlite::Row) -> Result<Self, rusqlite::Error> {
        let meta = row
            .get::<_, Option<String>>("meta")?
            .map(|raw| serde_json::from_str(&raw))
            .transpose()
            .map_err(|err| {
                rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(err))
            })?;

        Ok(Self {
            event_id: row.get("event_id")?,
            uid: row.get("uid")?,
            event_type: models::EventType::from(row.get::<_, String>("type")?.as_str()),
            amount: row.get("amount")?,
            meta,
            created_at: row.get("created_at")?,
            processed_at: row.get("processed_at")?,
        })
    }
}

/// A fresh random event id, 20 alphanumeric characters.
pub fn generate_event_id() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(EVENT_ID_LEN)
        .map(char::from)
        .collect()
}

/// Inserts an event.
/// Returns `true` if it was newly added, false if that id already exists for the user.
pub fn insert_event(connection: &Connection, event: &models::LearningEvent) -> DBResult<bool> {
    log::trace!("[insert_event] Inserting event {event}...");

    let meta = event
        .meta
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|err| rusqlite::Error::ToSqlConversionFailure(Box::new(err)))?;

    let query_params = rusqlite::named_params! {
            ":event_id":   event.event_id,
            ":uid":        event.uid,
            ":type":       event.event_type.as_str(),
            ":amount":     event.amount,
            ":meta":       meta,
            ":created_at": event.created_at,
    };

    connection
        .prepare(
            "INSERT INTO Events ( event_id,  uid,  type,  amount,  meta,  created_at)
             VALUES             (:event_id, :uid, :type, :amount, :meta, :created_at)",
        )?
        .execute(query_params)
        .map_or_else(crate::db::swallow_constraint_violation, |_| Ok(true))
}

/// Returns the event `event_id` owned by `uid`, if it exists.
pub fn query_event(connection: &Connection, uid: &str, event_id: &str) -> DBResult<Option<models::LearningEvent>> {
    log::trace!("[query_event] Querying event {event_id} for {uid}...");
    connection
        .prepare("SELECT * FROM Events WHERE uid = :uid AND event_id = :event_id")?
        .query_row(rusqlite::named_params! { ":uid": uid, ":event_id": event_id }, |row| {
            models::LearningEvent::try_from(row)
        })
        .optional()
}

/// Returns the processed marker of an event: `None` if the event doesn't exist,
/// `Some(None)` if it exists and hasn't been credited yet.
pub fn query_processed_at(
    connection: &Connection,
    uid: &str,
    event_id: &str,
) -> DBResult<Option<Option<DateTime<Utc>>>> {
    connection
        .prepare("SELECT processed_at FROM Events WHERE uid = :uid AND event_id = :event_id")?
        .query_row(rusqlite::named_params! { ":uid": uid, ":event_id": event_id }, |row| {
            row.get("processed_at")
        })
        .optional()
}

/// Stamps an event as credited. Returns `false` if it was already stamped.
pub fn mark_processed(connection: &Connection, uid: &str, event_id: &str, now: DateTime<Utc>) -> DBResult<bool> {
    let changed = connection
        .prepare(
            "UPDATE Events SET processed_at = :now
             WHERE uid = :uid AND event_id = :event_id AND processed_at IS NULL",
        )?
        .execute(rusqlite::named_params! { ":uid": uid, ":event_id": event_id, ":now": now })?;

    Ok(changed == 1)
}

/// Returns a page of `uid`'s events, newest first.
///
/// With a cursor, the page starts right after that event. A cursor that
/// names no event is ignored and the page starts from the newest one.
pub fn query_events_page(
    connection: &Connection,
    uid: &str,
    limit: usize,
    start_after: Option<&str>,
) -> DBResult<Vec<models::LearningEvent>> {
    log::trace!("[query_events_page] Querying {limit} events for {uid} after {start_after:?}");

    let cursor_seq: Option<i64> = match start_after {
        Some(event_id) => connection
            .prepare("SELECT seq FROM Events WHERE uid = :uid AND event_id = :event_id")?
            .query_row(rusqlite::named_params! { ":uid": uid, ":event_id": event_id }, |row| {
                row.get("seq")
            })
            .optional()?,
        None => None,
    };

    let query_params = rusqlite::named_params! {
            ":uid":    uid,
            ":cursor": cursor_seq.unwrap_or(i64::MAX),
            ":limit":  limit as i64,
    };

    let mut stmt = connection.prepare(
        "SELECT * FROM Events
         WHERE uid = :uid AND seq < :cursor
         ORDER BY seq DESC
         LIMIT :limit",
    )?;

    let events = stmt
        .query_map(query_params, |row| models::LearningEvent::try_from(row))?
        .collect::<DBResult<Vec<models::LearningEvent>>>()?;

    Ok(events)
}

/// Gathers every event that has not been credited yet, oldest first.
pub fn query_pending_events(connection: &Connection) -> DBResult<Vec<models::LearningEvent>> {
    log::trace!("[query_pending_events] Querying uncredited events.");
    let mut stmt = connection.prepare(
        "SELECT * FROM Events WHERE processed_at IS NULL ORDER BY seq ASC",
    )?;

    let events = stmt
        .query_map([], |row| {
            models::LearningEvent::try_from(row)
                .inspect_err(|err| log::error!("[query_pending_events] Could not convert row into \
                                                event: {err}"))
        })?
        .collect::<DBResult<Vec<models::LearningEvent>>>()?;

    Ok(events)
}
