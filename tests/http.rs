mod common;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use axum::Router;
use common::{TZ, local_noon, store_event, temp_db};
use ganbaru::api::{self, AppState};
use ganbaru::config::{ADMIN_SECRET_VAR, Config};
use ganbaru::db::{self, Database};
use ganbaru::ingest::on_event_created;
use ganbaru::models::UserProfile;
use ganbaru::trigger::{EventRef, EventTrigger};
use serde_json::{Value, json};
use tokio::sync::mpsc::UnboundedReceiver;
use tower::ServiceExt;

const SECRET: &str = "test-secret";

fn app(database: &Database) -> (Router, UnboundedReceiver<EventRef>) {
    let config = Config::from_lookup(|name| (name == ADMIN_SECRET_VAR).then(|| SECRET.to_string())).unwrap();
    let (trigger, receiver) = EventTrigger::channel();
    (api::router(AppState::new(database.clone(), trigger, &config)), receiver)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, String) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn wrong_or_missing_secret_is_forbidden() {
    let (_dir, database) = temp_db();
    let (app, _receiver) = app(&database);

    for uri in [
        "/seedEvent?uid=u1",
        "/seedEvent?uid=u1&secret=nope",
        "/dumpUserData?uid=u1&secret=nope",
        "/dumpAllUsersBrief",
        "/leaderboardStandings?board=weekly&secret=",
    ] {
        let (status, body) = send(&app, get(uri)).await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{uri}");
        assert_eq!(body, "forbidden");
    }
}

#[tokio::test]
async fn missing_uid_is_a_bad_request() {
    let (_dir, database) = temp_db();
    let (app, _receiver) = app(&database);

    let (status, body) = send(&app, get(&format!("/seedEvent?secret={SECRET}"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, "Missing uid");

    let (status, _) = send(&app, post("/dumpUserData", json!({ "secret": SECRET }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn seeding_stores_and_notifies() {
    let (_dir, database) = temp_db();
    let (app, mut receiver) = app(&database);

    let (status, body) = send(&app, get(&format!("/seedEvent?secret={SECRET}&uid=u1"))).await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(body["ok"], json!(true));
    assert_eq!(body["type"], json!("daily_checkin"));
    assert_eq!(body["amount"], json!(5));

    let notified = receiver.try_recv().unwrap();
    assert_eq!(notified.uid, "u1");
    assert_eq!(body["path"], json!(format!("Usuarios/u1/events/{}", notified.event_id)));

    let stored = db::query_event(&database.connect().unwrap(), "u1", &notified.event_id)
        .unwrap()
        .unwrap();
    assert_eq!(stored.amount, 5);
    assert!(stored.processed_at.is_none());
}

#[tokio::test]
async fn seeding_by_post_keeps_meta_and_coerces_amount() {
    let (_dir, database) = temp_db();
    let (app, mut receiver) = app(&database);

    let request = post("/seedEvent", json!({
        "secret": SECRET,
        "uid": "u1",
        "type": "quiz_passed",
        "amount": "10",
        "meta": { "score": 100 },
    }));
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let notified = receiver.try_recv().unwrap();
    let stored = db::query_event(&database.connect().unwrap(), "u1", &notified.event_id)
        .unwrap()
        .unwrap();
    assert_eq!(stored.amount, 10);
    assert_eq!(stored.score(), Some(100.0));

    let (status, body) = send(&app, get(&format!("/seedEvent?secret={SECRET}&uid=u1&amount=lots"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.starts_with("Invalid amount"));
}

#[tokio::test]
async fn user_dump_reports_ledger_state() {
    let (_dir, database) = temp_db();
    let (app, _receiver) = app(&database);
    db::upsert_profile(&database.connect().unwrap(), &UserProfile {
        uid: String::from("u1"),
        display_name: String::from("Hana"),
        country_code: Some(String::from("MX")),
        last_active_at: None,
    }).unwrap();

    let mut ids = Vec::new();
    for day in 1..=3 {
        let id = store_event(&database, "u1", "daily_checkin", 5, None);
        on_event_created(&database, "u1", &id, local_noon(2024, 1, day), TZ).unwrap();
        ids.push(id);
    }

    let uri = format!("/dumpUserData?secret={SECRET}&uid=u1&limit=2&weekKey=2024_01&dailyKey=20240102");
    let (status, body) = send(&app, get(&uri)).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let dump: Value = serde_json::from_str(&body).unwrap();

    assert_eq!(dump["user"]["displayName"], json!("Hana"));
    assert_eq!(dump["stats"]["id"], json!("general"));
    assert_eq!(dump["stats"]["points"], json!(15));
    assert_eq!(dump["stats"]["streakCount"], json!(3));
    assert_eq!(dump["eventsCount"], json!(2));
    assert_eq!(dump["events"][0]["id"], json!(ids[2]));
    assert_eq!(dump["page"]["nextStartAfterId"], json!(ids[1]));
    assert_eq!(dump["leaderboards"]["countryCode"], json!("MX"));
    assert_eq!(dump["leaderboards"]["local"], json!({ "pointsAllTime": 15 }));
    assert_eq!(dump["leaderboards"]["weekly"]["data"], json!({ "points": 15 }));
    assert_eq!(dump["leaderboards"]["daily"]["data"], json!({ "points": 5 }));

    let next = format!("/dumpUserData?secret={SECRET}&uid=u1&limit=2&startAfterId={}", ids[1]);
    let (_, body) = send(&app, get(&next)).await;
    let page: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(page["eventsCount"], json!(1));
    assert_eq!(page["events"][0]["id"], json!(ids[0]));

    let (status, _) = send(&app, get(&format!("/dumpUserData?secret={SECRET}&uid=u1&weekKey=2024-01"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_users_dump_as_nulls() {
    let (_dir, database) = temp_db();
    let (app, _receiver) = app(&database);

    let (status, body) = send(&app, post("/dumpUserData", json!({ "secret": SECRET, "uid": "ghost" }))).await;
    assert_eq!(status, StatusCode::OK);
    let dump: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(dump["user"], Value::Null);
    assert_eq!(dump["stats"], Value::Null);
    assert_eq!(dump["leaderboards"]["countryCode"], json!("XX"));
    assert_eq!(dump["page"]["limit"], json!(50));
    assert_eq!(dump["page"]["nextStartAfterId"], Value::Null);
}

#[tokio::test]
async fn brief_lists_users_and_standings_rank_them() {
    let (_dir, database) = temp_db();
    let (app, _receiver) = app(&database);

    for (uid, amount) in [("a", 5), ("b", 30), ("c", 12)] {
        let id = store_event(&database, uid, "level_cleared", amount, None);
        on_event_created(&database, uid, &id, local_noon(2024, 1, 1), TZ).unwrap();
    }

    let (status, body) = send(&app, get(&format!("/dumpAllUsersBrief?secret={SECRET}&limit=2"))).await;
    assert_eq!(status, StatusCode::OK);
    let brief: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(brief["count"], json!(2));
    assert_eq!(brief["users"][0]["uid"], json!("a"));
    assert_eq!(brief["users"][0]["countryCode"], json!("XX"));
    assert_eq!(brief["users"][1]["stats"]["points"], json!(30));

    let uri = format!("/leaderboardStandings?secret={SECRET}&board=daily&partition=20240101");
    let (status, body) = send(&app, get(&uri)).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let standings: Value = serde_json::from_str(&body).unwrap();
    let uids = standings["entries"]
        .as_array()
        .unwrap()
        .iter()
        .map(|entry| entry["uid"].as_str().unwrap().to_string())
        .collect::<Vec<_>>();
    assert_eq!(uids, ["b", "c", "a"]);
    assert_eq!(standings["entries"][0]["rank"], json!(1));

    let (status, _) = send(&app, get(&format!("/leaderboardStandings?secret={SECRET}&board=local"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = send(&app, get(&format!("/leaderboardStandings?secret={SECRET}&board=monthly"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
