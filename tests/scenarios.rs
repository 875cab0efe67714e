mod common;

use common::{TZ, local_noon, store_event, temp_db};
use ganbaru::achievements;
use ganbaru::db::{self, Database};
use ganbaru::ingest::on_event_created;
use ganbaru::ledger::LedgerOutcome;
use ganbaru::models::{Achievement, AchievementCondition, LeaderboardKind, UserProfile, UserStats};
use serde_json::json;

fn ingest(database: &Database, uid: &str, event_id: &str, when: chrono::DateTime<chrono::Utc>) -> LedgerOutcome {
    on_event_created(database, uid, event_id, when, TZ)
        .unwrap()
        .expect("event exists")
        .ledger
}

fn stats(database: &Database, uid: &str) -> UserStats {
    db::query_stats(&database.connect().unwrap(), uid).unwrap().unwrap()
}

#[test]
fn first_events_build_a_streak_and_a_gap_resets_it() {
    let (_dir, database) = temp_db();

    let checkin = store_event(&database, "hana", "daily_checkin", 5, None);
    ingest(&database, "hana", &checkin, local_noon(2024, 1, 1));
    let after_first = stats(&database, "hana");
    assert_eq!(after_first.points, 5);
    assert_eq!(after_first.streak_count, 1);
    assert_eq!(after_first.streak_updated_on, "2024-01-01");

    let quiz = store_event(&database, "hana", "quiz_passed", 10, Some(json!({ "score": 100 })));
    ingest(&database, "hana", &quiz, local_noon(2024, 1, 2));
    let after_second = stats(&database, "hana");
    assert_eq!(after_second.points, 55);
    assert_eq!(after_second.streak_count, 2);
    assert_eq!(after_second.streak_updated_on, "2024-01-02");

    let late = store_event(&database, "hana", "video_watched", 3, None);
    ingest(&database, "hana", &late, local_noon(2024, 1, 5));
    let after_gap = stats(&database, "hana");
    assert_eq!(after_gap.streak_count, 1);
    assert_eq!(after_gap.streak_updated_on, "2024-01-05");
    assert_eq!(after_gap.points, 58);
    assert_eq!(after_gap.weekly_progress, 58);
    assert_eq!(after_gap.weekly_goal, 350);
}

#[test]
fn same_day_events_leave_the_streak_alone() {
    let (_dir, database) = temp_db();

    for hour_offset in [0, 3, 5] {
        let id = store_event(&database, "kenji", "daily_checkin", 5, None);
        let when = local_noon(2024, 3, 10) + chrono::Duration::hours(hour_offset);
        ingest(&database, "kenji", &id, when);
    }

    let after = stats(&database, "kenji");
    assert_eq!(after.streak_count, 1);
    assert_eq!(after.points, 15);
}

#[test]
fn achievement_unlocks_after_reaching_the_threshold() {
    let (_dir, database) = temp_db();

    let checkin = store_event(&database, "hana", "daily_checkin", 5, None);
    ingest(&database, "hana", &checkin, local_noon(2024, 1, 1));
    let quiz = store_event(&database, "hana", "quiz_passed", 10, Some(json!({ "score": 100 })));
    ingest(&database, "hana", &quiz, local_noon(2024, 1, 2));

    let mut connection = database.connect().unwrap();
    db::upsert_achievement(&connection, &Achievement {
        achievement_id: String::from("fifty_points"),
        title: String::from("Fifty points"),
        condition: AchievementCondition::PointsTotal(50),
        points_reward: Some(20),
    }).unwrap();

    let report = achievements::evaluate(&mut connection, "hana", local_noon(2024, 1, 2)).unwrap();
    assert_eq!(report.unlocked, ["fifty_points"]);

    let unlocks = db::query_user_achievements(&connection, "hana").unwrap();
    assert_eq!(unlocks.len(), 1);
    assert_eq!(unlocks[0].progress, 50);
    assert_eq!(stats(&database, "hana").points, 75);
}

#[test]
fn satisfied_achievements_are_recorded_and_rewarded_once() {
    let (_dir, database) = temp_db();
    let connection = database.connect().unwrap();
    db::upsert_achievement(&connection, &Achievement {
        achievement_id: String::from("first_lesson"),
        title: String::from("First lesson"),
        condition: AchievementCondition::PointsTotal(50),
        points_reward: Some(10),
    }).unwrap();
    db::upsert_achievement(&connection, &Achievement {
        achievement_id: String::from("two_days"),
        title: String::from("Two days"),
        condition: AchievementCondition::StreakDays(2),
        points_reward: None,
    }).unwrap();

    let lesson = store_event(&database, "mei", "lesson_completed", 0, None);
    ingest(&database, "mei", &lesson, local_noon(2024, 5, 1));
    let another = store_event(&database, "mei", "lesson_completed", 0, None);
    ingest(&database, "mei", &another, local_noon(2024, 5, 2));

    // 50 + 50 from lessons, 10 from the one reward.
    assert_eq!(stats(&database, "mei").points, 110);

    let unlocked = db::query_user_achievements(&connection, "mei")
        .unwrap()
        .into_iter()
        .map(|unlock| unlock.achievement_id)
        .collect::<Vec<_>>();
    assert_eq!(unlocked, ["first_lesson", "two_days"]);
}

#[test]
fn redelivered_events_are_credited_once() {
    let (_dir, database) = temp_db();
    let checkin = store_event(&database, "hana", "daily_checkin", 5, None);

    let first = ingest(&database, "hana", &checkin, local_noon(2024, 1, 1));
    assert!(matches!(first, LedgerOutcome::Applied(_)));

    let second = ingest(&database, "hana", &checkin, local_noon(2024, 1, 2));
    assert_eq!(second, LedgerOutcome::AlreadyApplied);

    let after = stats(&database, "hana");
    assert_eq!(after.points, 5);
    assert_eq!(after.streak_count, 1);
    assert_eq!(after.streak_updated_on, "2024-01-01");

    let connection = database.connect().unwrap();
    let daily = db::query_entry(&connection, LeaderboardKind::Daily, "20240101", "hana").unwrap().unwrap();
    assert_eq!(daily.points, 5);
    assert!(db::query_entry(&connection, LeaderboardKind::Daily, "20240102", "hana").unwrap().is_none());
}

#[test]
fn missing_events_are_ignored() {
    let (_dir, database) = temp_db();
    let outcome = on_event_created(&database, "nobody", "nothing", local_noon(2024, 1, 1), TZ).unwrap();
    assert!(outcome.is_none());
    assert!(db::query_stats(&database.connect().unwrap(), "nobody").unwrap().is_none());
}

#[test]
fn leaderboard_shards_stay_in_their_partition() {
    let (_dir, database) = temp_db();
    db::upsert_profile(&database.connect().unwrap(), &UserProfile {
        uid: String::from("sora"),
        display_name: String::from("Sora"),
        country_code: Some(String::from("MX")),
        last_active_at: None,
    }).unwrap();

    // Sunday Jan 7th closes week 1; Monday Jan 8th opens week 2.
    let sunday = store_event(&database, "sora", "daily_checkin", 5, None);
    ingest(&database, "sora", &sunday, local_noon(2024, 1, 7));
    let monday = store_event(&database, "sora", "level_cleared", 40, None);
    ingest(&database, "sora", &monday, local_noon(2024, 1, 8));

    let connection = database.connect().unwrap();
    let points = |board, partition: &str| {
        db::query_entry(&connection, board, partition, "sora").unwrap().map(|entry| entry.points)
    };

    assert_eq!(points(LeaderboardKind::Weekly, "2024_01"), Some(5));
    assert_eq!(points(LeaderboardKind::Weekly, "2024_02"), Some(40));
    assert_eq!(points(LeaderboardKind::Weekly, "2024_03"), None);
    assert_eq!(points(LeaderboardKind::Daily, "20240107"), Some(5));
    assert_eq!(points(LeaderboardKind::Daily, "20240108"), Some(40));
    assert_eq!(points(LeaderboardKind::Local, "MX"), Some(45));
    assert_eq!(points(LeaderboardKind::Local, "XX"), None);

    // The running weekly progress is not reset by the new week.
    assert_eq!(stats(&database, "sora").weekly_progress, 45);
}

#[test]
fn points_equal_the_sum_of_effective_deltas() {
    let (_dir, database) = temp_db();
    let events = [
        ("daily_checkin", 5, None),
        ("lesson_completed", 20, None),
        ("quiz_passed", 30, Some(json!({ "score": 80 }))),
        ("quiz_passed", 70, Some(json!({ "score": 100 }))),
        ("video_watched", 12, None),
    ];

    let mut expected = 0;
    for (day, (event_type, amount, meta)) in events.into_iter().enumerate() {
        let id = store_event(&database, "ren", event_type, amount, meta);
        let outcome = on_event_created(&database, "ren", &id, local_noon(2024, 2, 1 + day as u32), TZ)
            .unwrap()
            .unwrap();
        expected += outcome.points_delta;
    }

    assert_eq!(expected, 5 + 50 + 30 + 70 + 12);
    let after = stats(&database, "ren");
    assert_eq!(after.points, expected);
    assert_eq!(after.streak_count, 5);
}

#[test]
fn concurrent_events_for_one_user_all_land() {
    let (_dir, database) = temp_db();
    let ids = (0..8)
        .map(|_| store_event(&database, "yuki", "daily_checkin", 5, None))
        .collect::<Vec<_>>();

    std::thread::scope(|scope| {
        for id in &ids {
            let database = database.clone();
            scope.spawn(move || ingest(&database, "yuki", id, local_noon(2024, 6, 1)));
        }
    });

    assert_eq!(stats(&database, "yuki").points, 40);
    let connection = database.connect().unwrap();
    let weekly = db::query_entry(&connection, LeaderboardKind::Weekly, "2024_22", "yuki").unwrap().unwrap();
    assert_eq!(weekly.points, 40);
    assert!(db::query_pending_events(&connection).unwrap().is_empty());
}

#[test]
fn oversized_amounts_saturate_and_later_events_still_land() {
    let (_dir, database) = temp_db();

    let huge = store_event(&database, "kaito", "level_cleared", i64::MAX, None);
    ingest(&database, "kaito", &huge, local_noon(2024, 4, 1));
    let small = store_event(&database, "kaito", "daily_checkin", 5, None);
    let second = ingest(&database, "kaito", &small, local_noon(2024, 4, 2));
    assert!(matches!(second, LedgerOutcome::Applied(_)));

    let after = stats(&database, "kaito");
    assert_eq!(after.points, i64::MAX);
    assert_eq!(after.streak_count, 2);

    let connection = database.connect().unwrap();
    let local = db::query_entry(&connection, LeaderboardKind::Local, "XX", "kaito").unwrap().unwrap();
    assert_eq!(local.points, i64::MAX);
    assert!(db::query_pending_events(&connection).unwrap().is_empty());
}
