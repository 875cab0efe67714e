//! Entry point run for every newly created learning event.

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::achievements::{self, AchievementReport};
use crate::datekeys::DateKeys;
use crate::db::{self, Database};
use crate::ledger::{self, LedgerOutcome};
use crate::models::{EventType, FLOOR_POINTS, LearningEvent};

/// Everything one ingestion did.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestOutcome {
    pub uid: String,
    pub event_id: String,
    pub points_delta: i64,
    pub ledger: LedgerOutcome,
    pub achievements: AchievementReport,
}

/// The points an event is worth.
///
/// Lessons and perfect quizzes are worth at least `FLOOR_POINTS`; anything
/// else is worth exactly what the client sent.
pub fn effective_points(event: &LearningEvent) -> i64 {
    match event.event_type {
        EventType::LessonCompleted => event.amount.max(FLOOR_POINTS),
        EventType::QuizPassed if event.score() == Some(100.0) => event.amount.max(FLOOR_POINTS),
        _ => event.amount,
    }
}

/// Credits the event `event_id` of `uid` and evaluates achievements.
///
/// Safe to run more than once for the same event: the ledger only credits
/// it the first time, and achievement evaluation is repeated so that a run
/// interrupted after the ledger commit is completed by the next delivery.
pub fn on_event_created(
    database: &Database,
    uid: &str,
    event_id: &str,
    now: DateTime<Utc>,
    tz: Tz,
) -> Result<Option<IngestOutcome>> {
    let mut connection = database.connect().context("Could not open the ledger database")?;

    let Some(event) = db::query_event(&connection, uid, event_id)
        .with_context(|| format!("Could not load event {event_id} for {uid}"))?
    else {
        log::warn!("[on_event_created] Event {event_id} for {uid} does not exist, ignoring.");
        return Ok(None);
    };

    let points_delta = effective_points(&event);
    if points_delta < 0 {
        log::warn!("[on_event_created] {event} carries a negative amount, crediting it as-is.");
    }

    let keys = DateKeys::at(now, tz);
    log::trace!(
        "[on_event_created] {event} is worth {points_delta} on {} (week {})",
        keys.today_key, keys.week_key
    );

    let ledger = ledger::apply_event(&mut connection, uid, event_id, points_delta, &keys, now)
        .with_context(|| format!("Ledger update failed for event {event_id} of {uid}"))?;

    let achievements = achievements::evaluate(&mut connection, uid, now)
        .with_context(|| format!("Achievement evaluation failed for {uid}"))?;

    if !achievements.is_clean() {
        let failed = achievements.failed.iter().map(|(id, _)| id.as_str()).collect::<Vec<_>>();
        return Err(anyhow!("Could not grant achievements {failed:?} to {uid}"));
    }

    Ok(Some(IngestOutcome {
        uid: uid.to_string(),
        event_id: event_id.to_string(),
        points_delta,
        ledger,
        achievements,
    }))
}
