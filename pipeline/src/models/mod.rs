//! Domain models for the playlog star schema.
//!
//! This module contains the core data structures used throughout the pipeline:
//!
//! - [`RawEvent`] - One logged user action, as extracted from the event store
//! - [`Artist`], [`Song`], [`User`], [`TimeEntry`] - Dimension rows
//! - [`Songplay`] - Fact row, one per `NextSong` event
//! - [`StarSchema`] - The five tables produced by one run
//! - [`TableName`] - Artifact names handed to the load stage

use chrono::{Datelike, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::config::NEXT_SONG_PAGE;

// =============================================================================
// Enumerations
// =============================================================================

/// Gender as recorded in the event log.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Gender {
    #[serde(rename = "M")]
    Male,
    #[serde(rename = "F")]
    Female,
}

impl Gender {
    /// Parse the single-letter code used by the event log.
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "M" => Some(Self::Male),
            "F" => Some(Self::Female),
            _ => None,
        }
    }

    pub fn to_code(&self) -> &'static str {
        match self {
            Self::Male => "M",
            Self::Female => "F",
        }
    }
}

/// Subscription level of a user at the time of an event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Free,
    Paid,
}

impl Level {
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "free" => Some(Self::Free),
            "paid" => Some(Self::Paid),
            _ => None,
        }
    }

    pub fn to_code(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Paid => "paid",
        }
    }
}

// =============================================================================
// Raw Event
// =============================================================================

/// One row of the extracted event log.
///
/// Every attribute is nullable: the log mixes page views, logins and plays,
/// and only plays carry song information.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RawEvent {
    pub artist: Option<String>,
    pub location: Option<String>,
    pub song: Option<String>,
    /// Duration in seconds.
    pub length: Option<f64>,
    pub user_id: Option<i64>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub gender: Option<Gender>,
    pub level: Option<Level>,
    /// Epoch milliseconds.
    pub ts: Option<i64>,
    pub page: Option<String>,
    pub session_id: Option<i64>,
    pub user_agent: Option<String>,
}

impl RawEvent {
    /// True when this event is a song play (`page == "NextSong"`).
    pub fn is_play(&self) -> bool {
        self.page.as_deref() == Some(NEXT_SONG_PAGE)
    }
}

// =============================================================================
// Dimension rows
// =============================================================================

/// Artist dimension row. `artist_id` is a surrogate key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Artist {
    pub artist_id: i64,
    pub name: String,
    pub location: String,
}

/// Song dimension row. `artist_id` always references an [`Artist`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Song {
    pub song_id: i64,
    pub title: String,
    pub artist_id: i64,
    pub duration: f64,
}

/// User dimension row.
///
/// `user_id` is the source id, so a user seen at two levels yields two rows
/// sharing the same `user_id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub user_id: i64,
    pub first_name: String,
    pub last_name: String,
    pub gender: Gender,
    pub level: Level,
}

/// Time dimension row, one per distinct event timestamp.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimeEntry {
    #[serde(with = "timestamp_format")]
    pub start_time: NaiveDateTime,
    pub hour: u32,
    pub day: u32,
    /// ISO week of year.
    pub week: u32,
    pub month: u32,
    pub year: i32,
    /// Monday = 0 ... Sunday = 6.
    pub weekday: u32,
}

impl TimeEntry {
    /// Decompose a timestamp into its calendar parts.
    pub fn from_timestamp(start_time: NaiveDateTime) -> Self {
        Self {
            start_time,
            hour: start_time.hour(),
            day: start_time.day(),
            week: start_time.iso_week().week(),
            month: start_time.month(),
            year: start_time.year(),
            weekday: start_time.weekday().num_days_from_monday(),
        }
    }
}

// =============================================================================
// Fact row
// =============================================================================

/// Songplay fact row. Foreign keys are null when the lookup found nothing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Songplay {
    pub songplay_id: i64,
    #[serde(with = "timestamp_format")]
    pub start_time: NaiveDateTime,
    pub user_id: Option<i64>,
    /// Level carried by the play event itself, not by the Users dimension.
    pub level: Option<Level>,
    pub song_id: Option<i64>,
    pub artist_id: Option<i64>,
    pub session_id: Option<i64>,
    pub location: Option<String>,
    pub user_agent: Option<String>,
}

// =============================================================================
// Star schema
// =============================================================================

/// Names of the five artifacts handed to the load stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableName {
    Artists,
    Songs,
    Users,
    Time,
    Songplays,
}

impl TableName {
    /// All tables, in publication order.
    pub const ALL: [TableName; 5] = [
        TableName::Artists,
        TableName::Songs,
        TableName::Users,
        TableName::Time,
        TableName::Songplays,
    ];

    /// Artifact name, e.g. `artists_table`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Artists => "artists_table",
            Self::Songs => "songs_table",
            Self::Users => "users_table",
            Self::Time => "time_table",
            Self::Songplays => "songplays_table",
        }
    }

    /// Parse either the artifact name or the short form (`songs`).
    pub fn parse(name: &str) -> Option<Self> {
        let short = name.trim().trim_end_matches("_table");
        match short {
            "artists" => Some(Self::Artists),
            "songs" => Some(Self::Songs),
            "users" => Some(Self::Users),
            "time" => Some(Self::Time),
            "songplays" => Some(Self::Songplays),
            _ => None,
        }
    }
}

impl std::fmt::Display for TableName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The five tables produced by one transform run.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct StarSchema {
    pub artists: Vec<Artist>,
    pub songs: Vec<Song>,
    pub users: Vec<User>,
    pub time: Vec<TimeEntry>,
    pub songplays: Vec<Songplay>,
}

impl StarSchema {
    /// Row count of one table.
    pub fn row_count(&self, table: TableName) -> usize {
        match table {
            TableName::Artists => self.artists.len(),
            TableName::Songs => self.songs.len(),
            TableName::Users => self.users.len(),
            TableName::Time => self.time.len(),
            TableName::Songplays => self.songplays.len(),
        }
    }
}

// =============================================================================
// Timestamp serialization
// =============================================================================

/// Text form of timestamps in artifacts: `2018-11-01 21:01:46.796`.
///
/// Millisecond precision is kept so `start_time` joins stay exact after a
/// round trip through the text artifacts.
pub mod timestamp_format {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

    pub fn serialize<S: Serializer>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&value.format(FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
        let text = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&text, FORMAT).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    fn at_millis(ms: i64) -> NaiveDateTime {
        DateTime::from_timestamp_millis(ms).unwrap().naive_utc()
    }

    #[test]
    fn test_time_entry_decomposition() {
        // 2018-11-15 00:30:26.796 UTC, a Thursday in ISO week 46
        let entry = TimeEntry::from_timestamp(at_millis(1_542_241_826_796));
        assert_eq!(entry.hour, 0);
        assert_eq!(entry.day, 15);
        assert_eq!(entry.week, 46);
        assert_eq!(entry.month, 11);
        assert_eq!(entry.year, 2018);
        assert_eq!(entry.weekday, 3);
    }

    #[test]
    fn test_weekday_is_monday_based() {
        // 1970-01-05 was a Monday, 1970-01-04 a Sunday
        assert_eq!(TimeEntry::from_timestamp(at_millis(4 * 86_400_000)).weekday, 0);
        assert_eq!(TimeEntry::from_timestamp(at_millis(3 * 86_400_000)).weekday, 6);
    }

    #[test]
    fn test_iso_week_crosses_year_boundary() {
        // 2021-01-01 belongs to ISO week 53 of 2020; `year` stays calendar year
        let entry = TimeEntry::from_timestamp(at_millis(1_609_459_200_000));
        assert_eq!(entry.week, 53);
        assert_eq!(entry.year, 2021);
    }

    #[test]
    fn test_table_name_parse() {
        assert_eq!(TableName::parse("songs"), Some(TableName::Songs));
        assert_eq!(TableName::parse("time_table"), Some(TableName::Time));
        assert_eq!(TableName::parse("albums"), None);
        assert_eq!(TableName::Songplays.to_string(), "songplays_table");
    }

    #[test]
    fn test_is_play() {
        let mut event = RawEvent {
            page: Some("NextSong".into()),
            ..Default::default()
        };
        assert!(event.is_play());
        event.page = Some("Home".into());
        assert!(!event.is_play());
        event.page = None;
        assert!(!event.is_play());
    }

    #[test]
    fn test_enum_codes() {
        assert_eq!(Gender::from_code("F"), Some(Gender::Female));
        assert_eq!(Gender::from_code("x"), None);
        assert_eq!(Level::from_code("paid"), Some(Level::Paid));
        assert_eq!(Level::Free.to_code(), "free");
        assert_eq!(Gender::Male.to_code(), "M");
    }
}
