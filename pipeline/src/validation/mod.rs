//! Integrity checks run on the star schema before it is published.
//!
//! The builders guarantee these by construction; a failure here means a
//! bug, and the run is aborted rather than publishing inconsistent tables.
//!
//! # Checks
//!
//! - `artist_id`, `song_id`, `songplay_id` are unique
//! - `start_time` is unique in the time table
//! - every song references an existing artist
//! - every non-null songplay key references an existing dimension row
//! - every songplay `start_time` exists in the time table

use chrono::NaiveDateTime;
use std::collections::HashSet;
use std::hash::Hash;

use crate::error::ValidationError;
use crate::models::StarSchema;

/// Maximum number of violations kept in the error.
const MAX_REPORTED: usize = 20;

/// Check every star-schema invariant.
///
/// # Returns
/// * `Ok(())` if all invariants hold
/// * `Err(ValidationError)` listing the violations otherwise
pub fn validate_star_schema(schema: &StarSchema) -> Result<(), ValidationError> {
    let errors = collect_violations(schema);
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::IntegrityViolation { errors })
    }
}

/// Quick check without error details.
pub fn is_valid(schema: &StarSchema) -> bool {
    collect_violations(schema).is_empty()
}

fn collect_violations(schema: &StarSchema) -> Vec<String> {
    let mut errors = Vec::new();

    let artist_ids = unique_keys(schema.artists.iter().map(|a| a.artist_id), "artist_id", &mut errors);
    let song_ids = unique_keys(schema.songs.iter().map(|s| s.song_id), "song_id", &mut errors);
    unique_keys(schema.songplays.iter().map(|s| s.songplay_id), "songplay_id", &mut errors);
    let start_times: HashSet<NaiveDateTime> =
        unique_keys(schema.time.iter().map(|t| t.start_time), "start_time", &mut errors);
    let user_ids: HashSet<i64> = schema.users.iter().map(|u| u.user_id).collect();

    for song in &schema.songs {
        if !artist_ids.contains(&song.artist_id) {
            errors.push(format!(
                "song {} references unknown artist_id {}",
                song.song_id, song.artist_id
            ));
        }
    }

    for play in &schema.songplays {
        if let Some(id) = play.song_id.filter(|id| !song_ids.contains(id)) {
            errors.push(format!("songplay {} references unknown song_id {}", play.songplay_id, id));
        }
        if let Some(id) = play.artist_id.filter(|id| !artist_ids.contains(id)) {
            errors.push(format!("songplay {} references unknown artist_id {}", play.songplay_id, id));
        }
        if let Some(id) = play.user_id.filter(|id| !user_ids.contains(id)) {
            errors.push(format!("songplay {} references unknown user_id {}", play.songplay_id, id));
        }
        if !start_times.contains(&play.start_time) {
            errors.push(format!(
                "songplay {} has start_time {} missing from time table",
                play.songplay_id, play.start_time
            ));
        }
    }

    errors.truncate(MAX_REPORTED);
    errors
}

fn unique_keys<K, I>(keys: I, column: &str, errors: &mut Vec<String>) -> HashSet<K>
where
    K: Eq + Hash + std::fmt::Display,
    I: Iterator<Item = K>,
{
    let mut seen = HashSet::new();
    for key in keys {
        let label = key.to_string();
        if !seen.insert(key) {
            errors.push(format!("duplicate {} {}", column, label));
        }
    }
    seen
}
