use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc, Weekday};
use chrono_tz::Tz;
use itertools::Itertools;

/// Zone used when nothing else is configured.
pub const DEFAULT_TIMEZONE: Tz = chrono_tz::America::Mexico_City;

/// The calendar buckets an instant falls into, local to a timezone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateKeys {
    pub today: NaiveDate,
    /// `YYYY-MM-DD`, compared against `streak_updated_on`.
    pub today_key: String,
    /// `YYYYMMDD`, the daily leaderboard partition.
    pub daily_key: String,
    /// `YYYY_WW`, the weekly leaderboard partition.
    pub week_key: String,
}

impl DateKeys {
    pub fn at(instant: DateTime<Utc>, tz: Tz) -> Self {
        let today = local_date(instant, tz);
        Self {
            today,
            today_key: today_key(today),
            daily_key: daily_key(today),
            week_key: iso_week_key(today),
        }
    }
}

/// The calendar date of `instant` as seen in `tz`.
pub fn local_date(instant: DateTime<Utc>, tz: Tz) -> NaiveDate {
    instant.with_timezone(&tz).date_naive()
}

pub fn today_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub fn daily_key(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

/// ISO-8601 week key, `YYYY_WW`.
///
/// Moves to the Thursday of the date's Monday-start week. That Thursday's
/// year is the ISO year, and its position in that year gives the week.
pub fn iso_week_key(date: NaiveDate) -> String {
    let (year, week) = iso_week(date);
    format!("{year}_{week:02}")
}

fn iso_week(date: NaiveDate) -> (i32, u32) {
    let from_monday = date.weekday().num_days_from_monday() as i64;
    let thursday = date + Duration::days(3 - from_monday);
    (thursday.year(), thursday.ordinal0() / 7 + 1)
}

/// Parses a `YYYY-MM-DD` key, `None` for empty or malformed input.
pub fn parse_day_key(key: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(key, "%Y-%m-%d").ok()
}

/// Whole calendar days from `earlier` to `later`.
pub fn days_between(earlier: NaiveDate, later: NaiveDate) -> i64 {
    (later - earlier).num_days()
}

/// Whether `key` is a `YYYY_WW` week key naming a week its ISO year has.
pub fn is_week_key(key: &str) -> bool {
    let week_re = regex::Regex::new(r"^\d{4}_\d{2}$");
    if !week_re.is_ok_and(|re| re.is_match(key)) {
        return false;
    }

    key.split('_')
        .collect_tuple()
        .and_then(|(year, week)| Some((year.parse::<i32>().ok()?, week.parse::<u32>().ok()?)))
        .and_then(|(year, week)| NaiveDate::from_isoywd_opt(year, week, Weekday::Mon))
        .is_some()
}

/// Whether `key` is a real calendar day written as `YYYYMMDD`.
pub fn is_daily_key(key: &str) -> bool {
    if key.len() != 8 || !key.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    parse_day_key(&format!("{}-{}-{}", &key[0..4], &key[4..6], &key[6..8])).is_some()
}
