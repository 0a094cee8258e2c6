//! Dimension builder: artists, songs, users and time from raw events.
//!
//! Every builder is a pure function over the raw event slice. Rows are
//! visited in input order, so surrogate keys follow first occurrence and a
//! rerun over the same input yields the same keys.

use chrono::{DateTime, NaiveDateTime};
use std::collections::{HashMap, HashSet};

use super::report::{missing_fields, RowIssue};
use crate::error::{TransformError, TransformResult};
use crate::models::{Artist, Gender, Level, RawEvent, Song, TableName, TimeEntry, User};

/// The four dimension tables of one run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dimensions {
    pub artists: Vec<Artist>,
    pub songs: Vec<Song>,
    pub users: Vec<User>,
    pub time: Vec<TimeEntry>,
}

/// Build all four dimensions.
///
/// Fails only on timestamps; every other problem is returned as a [`RowIssue`].
pub fn build_dimensions(events: &[RawEvent]) -> TransformResult<(Dimensions, Vec<RowIssue>)> {
    let (artists, mut issues) = build_artists(events);

    let (songs, song_issues) = build_songs(events, &artists);
    issues.extend(song_issues);

    let (users, user_issues) = build_users(events);
    issues.extend(user_issues);

    let (time, time_issues) = build_time(events)?;
    issues.extend(time_issues);

    Ok((
        Dimensions {
            artists,
            songs,
            users,
            time,
        },
        issues,
    ))
}

/// One row per distinct `(artist, location)` pair; `artist_id` counts from 1.
pub fn build_artists(events: &[RawEvent]) -> (Vec<Artist>, Vec<RowIssue>) {
    let mut seen: HashSet<(&str, &str)> = HashSet::new();
    let mut artists = Vec::new();
    let mut issues = Vec::new();

    for (row, event) in events.iter().enumerate() {
        let (Some(name), Some(location)) = (event.artist.as_deref(), event.location.as_deref())
        else {
            issues.push(RowIssue::MissingField {
                table: TableName::Artists,
                row,
                fields: missing_fields(&[
                    ("artist", event.artist.is_none()),
                    ("location", event.location.is_none()),
                ]),
            });
            continue;
        };

        if seen.insert((name, location)) {
            artists.push(Artist {
                artist_id: next_id(artists.len()),
                name: name.to_string(),
                location: location.to_string(),
            });
        }
    }

    (artists, issues)
}

/// One row per distinct `(song, artist, length)` triple and matching Artist.
///
/// An artist name listed under several locations yields one Song per
/// `artist_id`, in Artist order. Unlike songplays, a song whose artist is
/// unknown is dropped, and `song_id` counts only the rows emitted.
pub fn build_songs(events: &[RawEvent], artists: &[Artist]) -> (Vec<Song>, Vec<RowIssue>) {
    let mut artist_ids: HashMap<&str, Vec<i64>> = HashMap::with_capacity(artists.len());
    for artist in artists {
        artist_ids
            .entry(artist.name.as_str())
            .or_default()
            .push(artist.artist_id);
    }

    let mut seen: HashSet<(&str, &str, u64)> = HashSet::new();
    let mut songs = Vec::new();
    let mut issues = Vec::new();

    for (row, event) in events.iter().enumerate() {
        let (Some(title), Some(artist), Some(length)) =
            (event.song.as_deref(), event.artist.as_deref(), event.length)
        else {
            issues.push(RowIssue::MissingField {
                table: TableName::Songs,
                row,
                fields: missing_fields(&[
                    ("song", event.song.is_none()),
                    ("artist", event.artist.is_none()),
                    ("length", event.length.is_none()),
                ]),
            });
            continue;
        };

        if !seen.insert((title, artist, float_key(length))) {
            continue;
        }

        match artist_ids.get(artist) {
            Some(ids) => {
                for &artist_id in ids {
                    songs.push(Song {
                        song_id: next_id(songs.len()),
                        title: title.to_string(),
                        artist_id,
                        duration: length,
                    });
                }
            }
            None => issues.push(RowIssue::UnresolvedReference {
                table: TableName::Songs,
                row,
                column: "artist",
                value: artist.to_string(),
            }),
        }
    }

    (songs, issues)
}

/// One row per distinct `(userId, firstName, lastName, gender, level)`.
///
/// `user_id` is the source id, so a level change yields a second row with
/// the same `user_id`.
pub fn build_users(events: &[RawEvent]) -> (Vec<User>, Vec<RowIssue>) {
    let mut seen: HashSet<(i64, &str, &str, Gender, Level)> = HashSet::new();
    let mut users = Vec::new();
    let mut issues = Vec::new();

    for (row, event) in events.iter().enumerate() {
        let (Some(user_id), Some(first_name), Some(last_name), Some(gender), Some(level)) = (
            event.user_id,
            event.first_name.as_deref(),
            event.last_name.as_deref(),
            event.gender,
            event.level,
        ) else {
            issues.push(RowIssue::MissingField {
                table: TableName::Users,
                row,
                fields: missing_fields(&[
                    ("userId", event.user_id.is_none()),
                    ("firstName", event.first_name.is_none()),
                    ("lastName", event.last_name.is_none()),
                    ("gender", event.gender.is_none()),
                    ("level", event.level.is_none()),
                ]),
            });
            continue;
        };

        if seen.insert((user_id, first_name, last_name, gender, level)) {
            users.push(User {
                user_id,
                first_name: first_name.to_string(),
                last_name: last_name.to_string(),
                gender,
                level,
            });
        }
    }

    (users, issues)
}

/// One row per distinct timestamp over every event, plays or not.
///
/// A non-play event without `ts` is only left out of this table; a play
/// without `ts` is fatal because its fact row could not join to time.
pub fn build_time(events: &[RawEvent]) -> TransformResult<(Vec<TimeEntry>, Vec<RowIssue>)> {
    let mut seen: HashSet<NaiveDateTime> = HashSet::new();
    let mut time = Vec::new();
    let mut issues = Vec::new();

    for (row, event) in events.iter().enumerate() {
        let Some(ts) = event.ts else {
            if event.is_play() {
                return Err(TransformError::MissingTimestamp { row });
            }
            issues.push(RowIssue::MissingField {
                table: TableName::Time,
                row,
                fields: vec!["ts"],
            });
            continue;
        };

        let start_time = to_timestamp(ts, row)?;
        if seen.insert(start_time) {
            time.push(TimeEntry::from_timestamp(start_time));
        }
    }

    Ok((time, issues))
}

/// Convert epoch milliseconds to a UTC timestamp.
pub fn to_timestamp(ts: i64, row: usize) -> TransformResult<NaiveDateTime> {
    DateTime::from_timestamp_millis(ts)
        .map(|dt| dt.naive_utc())
        .ok_or(TransformError::TimestampOutOfRange { row, ts })
}

/// Artist name -> `artist_id`. A name listed under several locations
/// resolves to its first (lowest) id.
pub(crate) fn artist_index(artists: &[Artist]) -> HashMap<&str, i64> {
    let mut index = HashMap::with_capacity(artists.len());
    for artist in artists {
        index.entry(artist.name.as_str()).or_insert(artist.artist_id);
    }
    index
}

fn next_id(len: usize) -> i64 {
    len as i64 + 1
}

/// Hashable form of a duration; `0.0` and `-0.0` compare equal.
fn float_key(value: f64) -> u64 {
    if value == 0.0 {
        0.0f64.to_bits()
    } else {
        value.to_bits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn play(artist: &str, location: &str, song: &str, length: f64, ts: i64) -> RawEvent {
        RawEvent {
            artist: Some(artist.into()),
            location: Some(location.into()),
            song: Some(song.into()),
            length: Some(length),
            user_id: Some(1),
            first_name: Some("F".into()),
            last_name: Some("G".into()),
            gender: Some(Gender::Female),
            level: Some(Level::Free),
            ts: Some(ts),
            page: Some("NextSong".into()),
            session_id: Some(9),
            user_agent: Some("UA".into()),
        }
    }

    fn page_view(ts: i64) -> RawEvent {
        RawEvent {
            user_id: Some(1),
            first_name: Some("F".into()),
            last_name: Some("G".into()),
            gender: Some(Gender::Female),
            level: Some(Level::Free),
            ts: Some(ts),
            page: Some("Home".into()),
            session_id: Some(9),
            ..Default::default()
        }
    }

    #[test]
    fn test_artist_dedup_keeps_first_occurrence() {
        let events = vec![
            play("A", "L", "S1", 1.0, 1000),
            play("B", "L", "S2", 2.0, 2000),
            play("A", "L", "S3", 3.0, 3000),
            page_view(4000),
        ];
        let (artists, issues) = build_artists(&events);

        assert_eq!(artists.len(), 2);
        assert_eq!(artists[0].artist_id, 1);
        assert_eq!(artists[0].name, "A");
        assert_eq!(artists[1].artist_id, 2);
        assert_eq!(artists[1].name, "B");
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].row(), 3);
    }

    #[test]
    fn test_artist_same_name_other_location_is_new_row() {
        let events = vec![play("A", "L1", "S", 1.0, 1000), play("A", "L2", "S", 1.0, 2000)];
        let (artists, _) = build_artists(&events);

        assert_eq!(artists.len(), 2);
        assert_eq!(artists[1].location, "L2");
        assert_eq!(artists[1].artist_id, 2);
    }

    #[test]
    fn test_artist_requires_location() {
        let mut event = play("A", "L", "S", 1.0, 1000);
        event.location = None;
        let (artists, issues) = build_artists(&[event]);

        assert!(artists.is_empty());
        assert_eq!(
            issues[0],
            RowIssue::MissingField {
                table: TableName::Artists,
                row: 0,
                fields: vec!["location"],
            }
        );
    }

    #[test]
    fn test_songs_drop_unresolved_artist_and_renumber() {
        // The second song's artist has no location, so it never becomes an Artist.
        let mut orphan = play("Ghost", "L", "S2", 2.0, 2000);
        orphan.location = None;
        let events = vec![
            play("A", "L", "S1", 1.0, 1000),
            orphan,
            play("B", "L", "S3", 3.0, 3000),
        ];

        let (artists, _) = build_artists(&events);
        let (songs, issues) = build_songs(&events, &artists);

        assert_eq!(songs.len(), 2);
        assert_eq!(songs[0].song_id, 1);
        assert_eq!(songs[0].title, "S1");
        assert_eq!(songs[1].song_id, 2);
        assert_eq!(songs[1].title, "S3");
        assert_eq!(songs[1].artist_id, 2);
        assert!(issues.contains(&RowIssue::UnresolvedReference {
            table: TableName::Songs,
            row: 1,
            column: "artist",
            value: "Ghost".into(),
        }));
    }

    #[test]
    fn test_songs_dedup_exact_triples() {
        let events = vec![
            play("A", "L", "S1", 1.0, 1000),
            play("A", "L", "S1", 1.0, 2000),
            play("A", "L", "S1", 1.5, 3000),
        ];
        let (artists, _) = build_artists(&events);
        let (songs, _) = build_songs(&events, &artists);

        assert_eq!(songs.len(), 2);
        assert_eq!(songs[1].duration, 1.5);
    }

    #[test]
    fn test_songs_expand_per_artist_location() {
        // "A" is listed under two locations, so the single triple maps to both ids.
        let artists = vec![
            Artist { artist_id: 1, name: "A".into(), location: "L1".into() },
            Artist { artist_id: 2, name: "A".into(), location: "L2".into() },
        ];
        let events = vec![play("A", "L1", "S", 1.0, 1000)];
        let (songs, issues) = build_songs(&events, &artists);

        let keys: Vec<(i64, i64)> = songs.iter().map(|s| (s.song_id, s.artist_id)).collect();
        assert_eq!(keys, vec![(1, 1), (2, 2)]);
        assert!(songs.iter().all(|s| s.title == "S" && s.duration == 1.0));
        assert!(issues.is_empty());
    }

    #[test]
    fn test_songs_numbering_continues_after_expansion() {
        let events = vec![
            play("A", "L1", "S1", 1.0, 1000),
            play("A", "L2", "S2", 2.0, 2000),
            play("B", "L", "S3", 3.0, 3000),
        ];
        let (artists, _) = build_artists(&events);
        let (songs, _) = build_songs(&events, &artists);

        let keys: Vec<(&str, i64, i64)> = songs
            .iter()
            .map(|s| (s.title.as_str(), s.song_id, s.artist_id))
            .collect();
        assert_eq!(
            keys,
            vec![("S1", 1, 1), ("S1", 2, 2), ("S2", 3, 1), ("S2", 4, 2), ("S3", 5, 3)]
        );
    }

    #[test]
    fn test_users_keep_one_row_per_level() {
        let mut upgraded = page_view(2000);
        upgraded.level = Some(Level::Paid);
        let events = vec![page_view(1000), page_view(1500), upgraded];

        let (users, _) = build_users(&events);
        assert_eq!(users.len(), 2);
        assert_eq!(users[0].user_id, 1);
        assert_eq!(users[0].level, Level::Free);
        assert_eq!(users[1].user_id, 1);
        assert_eq!(users[1].level, Level::Paid);
    }

    #[test]
    fn test_users_require_every_field() {
        let mut event = page_view(1000);
        event.gender = None;
        let (users, issues) = build_users(&[event]);

        assert!(users.is_empty());
        assert_eq!(
            issues[0],
            RowIssue::MissingField {
                table: TableName::Users,
                row: 0,
                fields: vec!["gender"],
            }
        );
    }

    #[test]
    fn test_time_covers_all_pages_and_dedups() {
        let events = vec![play("A", "L", "S", 1.0, 1000), page_view(2000), page_view(1000)];
        let (time, issues) = build_time(&events).unwrap();

        assert_eq!(time.len(), 2);
        assert_eq!(time[0].start_time, to_timestamp(1000, 0).unwrap());
        assert_eq!(time[1].start_time, to_timestamp(2000, 0).unwrap());
        assert!(issues.is_empty());
    }

    #[test]
    fn test_time_keeps_millisecond_precision() {
        let events = vec![page_view(1_000), page_view(1_001)];
        let (time, _) = build_time(&events).unwrap();
        assert_eq!(time.len(), 2);
    }

    #[test]
    fn test_time_skips_page_view_without_ts() {
        let mut event = page_view(1000);
        event.ts = None;
        let (time, issues) = build_time(&[event]).unwrap();

        assert!(time.is_empty());
        assert_eq!(issues.len(), 1);
    }

    #[test]
    fn test_time_fails_on_play_without_ts() {
        let mut event = play("A", "L", "S", 1.0, 1000);
        event.ts = None;
        let err = build_time(&[page_view(500), event]).unwrap_err();
        assert!(matches!(err, TransformError::MissingTimestamp { row: 1 }));
    }

    #[test]
    fn test_time_fails_on_out_of_range_ts() {
        let err = build_time(&[page_view(i64::MAX)]).unwrap_err();
        assert!(matches!(err, TransformError::TimestampOutOfRange { row: 0, .. }));
    }

    #[test]
    fn test_float_key_zero() {
        assert_eq!(float_key(0.0), float_key(-0.0));
        assert_ne!(float_key(1.0), float_key(2.0));
    }
}
