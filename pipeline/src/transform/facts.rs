//! Fact assembler: one songplay per `NextSong` event.
//!
//! Lookups against the dimensions never drop a play. A song title, artist
//! name or user id with no match leaves that key null and the row stays.

use chrono::NaiveDateTime;
use std::collections::{HashMap, HashSet};

use super::dimensions::{artist_index, to_timestamp, Dimensions};
use super::report::{missing_fields, RowIssue};
use crate::error::{TransformError, TransformResult};
use crate::models::{RawEvent, Songplay, TableName};

/// Build the songplays fact table.
///
/// `songplay_id` counts plays in input order, independent of join outcomes.
pub fn build_songplays(
    events: &[RawEvent],
    dims: &Dimensions,
) -> TransformResult<(Vec<Songplay>, Vec<RowIssue>)> {
    let song_ids = song_index(dims);
    let artist_ids = artist_index(&dims.artists);
    let user_ids: HashSet<i64> = dims.users.iter().map(|u| u.user_id).collect();
    let start_times: HashSet<NaiveDateTime> = dims.time.iter().map(|t| t.start_time).collect();

    let mut songplays = Vec::new();
    let mut issues = Vec::new();

    for (row, event) in events.iter().enumerate().filter(|(_, e)| e.is_play()) {
        let ts = event.ts.ok_or(TransformError::MissingTimestamp { row })?;
        let start_time = to_timestamp(ts, row)?;
        if !start_times.contains(&start_time) {
            issues.push(RowIssue::UnresolvedReference {
                table: TableName::Songplays,
                row,
                column: "ts",
                value: ts.to_string(),
            });
        }

        let missing = missing_fields(&[
            ("song", event.song.is_none()),
            ("artist", event.artist.is_none()),
            ("userId", event.user_id.is_none()),
        ]);
        if !missing.is_empty() {
            issues.push(RowIssue::MissingField {
                table: TableName::Songplays,
                row,
                fields: missing,
            });
        }

        let song_id = event.song.as_deref().and_then(|title| {
            let found = song_ids.get(title).copied();
            if found.is_none() {
                issues.push(unresolved(row, "song", title));
            }
            found
        });

        let artist_id = event.artist.as_deref().and_then(|name| {
            let found = artist_ids.get(name).copied();
            if found.is_none() {
                issues.push(unresolved(row, "artist", name));
            }
            found
        });

        let user_id = event.user_id.and_then(|id| {
            if user_ids.contains(&id) {
                Some(id)
            } else {
                issues.push(unresolved(row, "userId", &id.to_string()));
                None
            }
        });

        songplays.push(Songplay {
            songplay_id: songplays.len() as i64 + 1,
            start_time,
            user_id,
            level: event.level,
            song_id,
            artist_id,
            session_id: event.session_id,
            location: event.location.clone(),
            user_agent: event.user_agent.clone(),
        });
    }

    Ok((songplays, issues))
}

/// Song title -> `song_id`. Titles are not unique across artists; the
/// first (lowest) id wins.
fn song_index(dims: &Dimensions) -> HashMap<&str, i64> {
    let mut index = HashMap::with_capacity(dims.songs.len());
    for song in &dims.songs {
        index.entry(song.title.as_str()).or_insert(song.song_id);
    }
    index
}

fn unresolved(row: usize, column: &'static str, value: &str) -> RowIssue {
    RowIssue::UnresolvedReference {
        table: TableName::Songplays,
        row,
        column,
        value: value.to_string(),
    }
}
