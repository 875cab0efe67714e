//! In-process delivery of "event created" notifications to the ingestion entry point.

use anyhow::{Context, Result};
use chrono::Utc;
use chrono_tz::Tz;
use tokio::sync::mpsc;
use tokio::time::{Duration, sleep};

use crate::db::{self, Database};
use crate::ingest;

/// Deliveries of one event before it is left for the next startup sweep.
pub const MAX_DELIVERY_ATTEMPTS: u32 = 3;

const RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// Names one stored event that needs ingesting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRef {
    pub uid: String,
    pub event_id: String,
    pub attempt: u32,
}

/// Sending half of the trigger. Cheap to clone.
#[derive(Debug, Clone)]
pub struct EventTrigger {
    sender: mpsc::UnboundedSender<EventRef>,
}

impl EventTrigger {
    /// A trigger and the receiver its notifications arrive on.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<EventRef>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    /// Announces that `event_id` was just written for `uid`.
    pub fn notify(&self, uid: &str, event_id: &str) -> Result<()> {
        self.send(EventRef { uid: uid.to_string(), event_id: event_id.to_string(), attempt: 1 })
    }

    fn send(&self, event: EventRef) -> Result<()> {
        self.sender
            .send(event)
            .context("The event trigger worker has stopped.")
    }
}

/// Starts the worker that ingests every notified event.
///
/// Each delivery runs on its own blocking task, so events for different
/// users never wait on each other. A failed delivery is retried after a
/// backoff until `MAX_DELIVERY_ATTEMPTS`; after that the event stays
/// uncredited until `redeliver_pending` picks it up again.
pub fn spawn_worker(database: Database, tz: Tz) -> (EventTrigger, tokio::task::JoinHandle<()>) {
    let (trigger, mut receiver) = EventTrigger::channel();
    let retry_trigger = trigger.clone();

    let handle = tokio::spawn(async move {
        log::info!("[trigger] Worker started.");
        while let Some(event) = receiver.recv().await {
            let database = database.clone();
            let retry_trigger = retry_trigger.clone();
            tokio::spawn(async move { deliver(database, tz, event, retry_trigger).await });
        }
        log::info!("[trigger] All senders dropped, worker exiting.");
    });

    (trigger, handle)
}

async fn deliver(database: Database, tz: Tz, event: EventRef, trigger: EventTrigger) {
    let EventRef { uid, event_id, attempt } = event.clone();

    let result = tokio::task::spawn_blocking(move || {
        ingest::on_event_created(&database, &uid, &event_id, Utc::now(), tz)
    })
    .await
    .context("Ingestion task panicked")
    .and_then(|result| result);

    let err = match result {
        Ok(Some(outcome)) => {
            log::trace!("[deliver] Delivered {}: {:?}", outcome.event_id, outcome.ledger);
            return;
        }
        Ok(None) => return,
        Err(err) => err,
    };

    if attempt >= MAX_DELIVERY_ATTEMPTS {
        log::error!(
            "[deliver] Giving up on {} for {} after {attempt} attempts: {err:#}",
            event.event_id, event.uid
        );
        return;
    }

    log::warn!(
        "[deliver] Attempt {attempt} for {} failed, retrying: {err:#}",
        event.event_id
    );
    sleep(RETRY_BACKOFF * attempt).await;
    if let Err(err) = trigger.send(EventRef { attempt: attempt + 1, ..event }) {
        log::error!("[deliver] Could not requeue: {err}");
    }
}

/// Re-notifies every event that was stored but never credited.
///
/// Returns how many were queued.
pub fn redeliver_pending(database: &Database, trigger: &EventTrigger) -> Result<usize> {
    let connection = database.connect()?;
    let pending = db::query_pending_events(&connection)?;

    for event in &pending {
        log::info!("[redeliver_pending] Requeueing {event}");
        trigger.notify(&event.uid, &event.event_id)?;
    }

    Ok(pending.len())
}
