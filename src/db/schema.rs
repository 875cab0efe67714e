pub const USERS_SCHEMA: &str =
    "CREATE TABLE IF NOT EXISTS Users (
        uid             TEXT        PRIMARY KEY,
        display_name    TEXT        NOT NULL    DEFAULT '',
        country_code    TEXT,
        last_active_at  TIMESTAMP
    )";

pub const USER_STATS_SCHEMA: &str =
    "CREATE TABLE IF NOT EXISTS UserStats (
        uid                TEXT        PRIMARY KEY,

        points             INTEGER     NOT NULL    DEFAULT 0,
        weekly_goal        INTEGER     NOT NULL    DEFAULT 350,
        weekly_progress    INTEGER     NOT NULL    DEFAULT 0,
        streak_count       INTEGER     NOT NULL    DEFAULT 0,
        streak_updated_on  TEXT        NOT NULL    DEFAULT '',

        updated_at         TIMESTAMP
    )";

pub const EVENTS_SCHEMA: &str =
    "CREATE TABLE IF NOT EXISTS Events (
        seq            INTEGER     PRIMARY KEY AUTOINCREMENT,
        event_id       TEXT        NOT NULL,
        uid            TEXT        NOT NULL,

        type           TEXT        NOT NULL,
        amount         INTEGER     NOT NULL,
        meta           TEXT,
        created_at     TIMESTAMP   NOT NULL,

        processed_at   TIMESTAMP,

        UNIQUE (uid, event_id)
    )";

pub const LEADERBOARDS_SCHEMA: &str =
    "CREATE TABLE IF NOT EXISTS Leaderboards (
        board          TEXT        NOT NULL    CHECK (board IN ('local', 'weekly', 'daily')),
        partition_key  TEXT        NOT NULL,
        uid            TEXT        NOT NULL,
        points         INTEGER     NOT NULL    DEFAULT 0,

        PRIMARY KEY (board, partition_key, uid)
    )";

pub const ACHIEVEMENTS_SCHEMA: &str =
    "CREATE TABLE IF NOT EXISTS Achievements (
        achievement_id   TEXT        PRIMARY KEY,
        title            TEXT        NOT NULL    DEFAULT '',

        condition_type   TEXT,
        condition_value  INTEGER,
        points_reward    INTEGER
    )";

pub const USER_ACHIEVEMENTS_SCHEMA: &str =
    "CREATE TABLE IF NOT EXISTS UserAchievements (
        uid              TEXT        NOT NULL,
        achievement_id   TEXT        NOT NULL    REFERENCES Achievements(achievement_id),

        unlocked_at      TIMESTAMP   NOT NULL,
        progress         INTEGER     NOT NULL,

        PRIMARY KEY (uid, achievement_id)
    )";

pub const ALL_SCHEMAS: [(&str, &str); 6] = [
    ("Users", USERS_SCHEMA),
    ("UserStats", USER_STATS_SCHEMA),
    ("Events", EVENTS_SCHEMA),
    ("Leaderboards", LEADERBOARDS_SCHEMA),
    ("Achievements", ACHIEVEMENTS_SCHEMA),
    ("UserAchievements", USER_ACHIEVEMENTS_SCHEMA),
];

pub const INDEXES: &str =
    "CREATE INDEX IF NOT EXISTS events_pending ON Events (processed_at) WHERE processed_at IS NULL;";
