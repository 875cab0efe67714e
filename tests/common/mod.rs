#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use ganbaru::db::{self, Database};
use ganbaru::models::{EventType, LearningEvent};
use tempfile::TempDir;

pub const TZ: chrono_tz::Tz = ganbaru::datekeys::DEFAULT_TIMEZONE;

pub fn temp_db() -> (TempDir, Database) {
    let dir = tempfile::tempdir().unwrap();
    let database = Database::new(dir.path().join("ganbaru.db"));
    database.initialize().unwrap();
    (dir, database)
}

/// Midday in Mexico City on the given date.
pub fn local_noon(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 18, 0, 0).unwrap()
}

/// Stores an event and returns its id.
pub fn store_event(
    database: &Database,
    uid: &str,
    event_type: &str,
    amount: i64,
    meta: Option<serde_json::Value>,
) -> String {
    let event = LearningEvent {
        event_id: db::generate_event_id(),
        uid: uid.to_string(),
        event_type: EventType::from(event_type),
        amount,
        meta,
        created_at: Utc::now(),
        processed_at: None,
    };
    let connection = database.connect().unwrap();
    assert!(db::insert_event(&connection, &event).unwrap());
    event.event_id
}
