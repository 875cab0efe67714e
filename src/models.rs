use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default weekly goal for a freshly created stats row.
pub const DEFAULT_WEEKLY_GOAL: i64 = 350;

/// Country code used for the local leaderboard when a profile has none.
pub const DEFAULT_COUNTRY_CODE: &str = "XX";

/// Floor applied to lessons and perfect quizzes.
pub const FLOOR_POINTS: i64 = 50;

/// The tag carried by a learning event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventType {
    LessonCompleted,
    QuizPassed,
    DailyCheckin,
    VideoWatched,
    LevelCleared,
    Other(String),
}

impl EventType {
    pub fn as_str(&self) -> &str {
        match self {
            EventType::LessonCompleted => "lesson_completed",
            EventType::QuizPassed => "quiz_passed",
            EventType::DailyCheckin => "daily_checkin",
            EventType::VideoWatched => "video_watched",
            EventType::LevelCleared => "level_cleared",
            EventType::Other(tag) => tag,
        }
    }
}

impl From<&str> for EventType {
    fn from(tag: &str) -> Self {
        match tag {
            "lesson_completed" => EventType::LessonCompleted,
            "quiz_passed" => EventType::QuizPassed,
            "daily_checkin" => EventType::DailyCheckin,
            "video_watched" => EventType::VideoWatched,
            "level_cleared" => EventType::LevelCleared,
            other => EventType::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for EventType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        Ok(EventType::from(tag.as_str()))
    }
}

/// One user action, as written by the client or the seed endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningEvent {
    #[serde(rename = "id")]
    pub event_id: String,
    #[serde(skip)]
    pub uid: String,

    #[serde(rename = "type")]
    pub event_type: EventType,
    pub amount: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,

    /// Set by the ledger transaction the first time the event is credited.
    pub processed_at: Option<DateTime<Utc>>,
}

impl LearningEvent {
    /// `meta.score`, when the client sent one.
    pub fn score(&self) -> Option<f64> {
        self.meta.as_ref()?.get("score")?.as_f64()
    }
}

impl std::fmt::Display for LearningEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({} pts) for {} [{}]", self.event_type, self.amount, self.uid, self.event_id)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(rename = "id")]
    pub uid: String,
    pub display_name: String,
    pub country_code: Option<String>,
    pub last_active_at: Option<DateTime<Utc>>,
}

impl UserProfile {
    pub fn country_or_default(&self) -> &str {
        self.country_code.as_deref().unwrap_or(DEFAULT_COUNTRY_CODE)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    #[serde(skip)]
    pub uid: String,

    pub points: i64,
    pub weekly_goal: i64,
    pub weekly_progress: i64,
    pub streak_count: i64,
    /// `YYYY-MM-DD` of the last streak update, empty when never set.
    pub streak_updated_on: String,
    pub updated_at: Option<DateTime<Utc>>,
}

impl UserStats {
    /// Values used when a user's first event arrives.
    pub fn new(uid: &str) -> Self {
        Self {
            uid: uid.to_string(),
            points: 0,
            weekly_goal: DEFAULT_WEEKLY_GOAL,
            weekly_progress: 0,
            streak_count: 0,
            streak_updated_on: String::new(),
            updated_at: None,
        }
    }
}

impl std::fmt::Display for UserStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "points={} weekly={}/{} streak={} (on {})",
            self.points, self.weekly_progress, self.weekly_goal, self.streak_count,
            if self.streak_updated_on.is_empty() { "never" } else { &self.streak_updated_on }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LeaderboardKind {
    /// Partitioned by country code, never reset.
    Local,
    /// Partitioned by ISO week key.
    Weekly,
    /// Partitioned by day key.
    Daily,
}

impl LeaderboardKind {
    pub const ALL: [LeaderboardKind; 3] =
        [LeaderboardKind::Local, LeaderboardKind::Weekly, LeaderboardKind::Daily];

    pub fn as_str(&self) -> &'static str {
        match self {
            LeaderboardKind::Local => "local",
            LeaderboardKind::Weekly => "weekly",
            LeaderboardKind::Daily => "daily",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderboardEntry {
    pub board: LeaderboardKind,
    pub partition: String,
    pub uid: String,
    pub points: i64,
}

impl LeaderboardEntry {
    pub fn view(&self) -> ShardView {
        match self.board {
            LeaderboardKind::Local => ShardView::AllTime { points_all_time: self.points },
            LeaderboardKind::Weekly | LeaderboardKind::Daily => ShardView::Period { points: self.points },
        }
    }
}

/// A user's shard entry as it appears in dumps. Country shards never reset,
/// so their total is named for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ShardView {
    #[serde(rename_all = "camelCase")]
    AllTime { points_all_time: i64 },
    Period { points: i64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AchievementCondition {
    PointsTotal(i64),
    StreakDays(i64),
}

impl AchievementCondition {
    /// Builds a condition from its stored tag, `None` for tags we don't know.
    pub fn from_parts(tag: &str, value: i64) -> Option<Self> {
        match tag {
            "points_total" => Some(AchievementCondition::PointsTotal(value)),
            "streak_days" => Some(AchievementCondition::StreakDays(value)),
            _ => None,
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            AchievementCondition::PointsTotal(_) => "points_total",
            AchievementCondition::StreakDays(_) => "streak_days",
        }
    }

    pub fn threshold(&self) -> i64 {
        match *self {
            AchievementCondition::PointsTotal(value) | AchievementCondition::StreakDays(value) => {
                value
            }
        }
    }

    pub fn is_satisfied(&self, stats: &UserStats) -> bool {
        match *self {
            AchievementCondition::PointsTotal(value) => stats.points >= value,
            AchievementCondition::StreakDays(value) => stats.streak_count >= value,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Achievement {
    pub achievement_id: String,
    pub title: String,
    pub condition: AchievementCondition,
    pub points_reward: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAchievement {
    #[serde(skip)]
    pub uid: String,
    #[serde(rename = "id")]
    pub achievement_id: String,
    pub unlocked_at: DateTime<Utc>,
    pub progress: i64,
}
