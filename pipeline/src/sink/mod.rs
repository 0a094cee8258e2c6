//! Sink writer: serializes the star schema into table artifacts.
//!
//! Each table becomes delimited text with a header row. Nulls are empty
//! cells and timestamps keep milliseconds, so [`read_table`] gives back
//! the same typed rows.
//!
//! # Artifacts
//!
//! | Artifact          | Columns                                                    |
//! |-------------------|------------------------------------------------------------|
//! | `artists_table`   | artist_id, name, location                                  |
//! | `songs_table`     | song_id, title, artist_id, duration                        |
//! | `users_table`     | user_id, first_name, last_name, gender, level              |
//! | `time_table`      | start_time, hour, day, week, month, year, weekday          |
//! | `songplays_table` | songplay_id, start_time, user_id, level, song_id, artist_id, session_id, location, user_agent |

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io;
use std::path::PathBuf;

use crate::error::{SinkError, SinkResult};
use crate::models::{Artist, Song, Songplay, StarSchema, TableName, TimeEntry, User};

/// Extension of every artifact file.
pub const ARTIFACT_EXTENSION: &str = "csv";

/// A row type that maps to one artifact.
pub trait TableRow: Serialize + DeserializeOwned {
    const TABLE: TableName;
    /// Header, in serialization order.
    const COLUMNS: &'static [&'static str];
}

impl TableRow for Artist {
    const TABLE: TableName = TableName::Artists;
    const COLUMNS: &'static [&'static str] = &["artist_id", "name", "location"];
}

impl TableRow for Song {
    const TABLE: TableName = TableName::Songs;
    const COLUMNS: &'static [&'static str] = &["song_id", "title", "artist_id", "duration"];
}

impl TableRow for User {
    const TABLE: TableName = TableName::Users;
    const COLUMNS: &'static [&'static str] =
        &["user_id", "first_name", "last_name", "gender", "level"];
}

impl TableRow for TimeEntry {
    const TABLE: TableName = TableName::Time;
    const COLUMNS: &'static [&'static str] =
        &["start_time", "hour", "day", "week", "month", "year", "weekday"];
}

impl TableRow for Songplay {
    const TABLE: TableName = TableName::Songplays;
    const COLUMNS: &'static [&'static str] = &[
        "songplay_id",
        "start_time",
        "user_id",
        "level",
        "song_id",
        "artist_id",
        "session_id",
        "location",
        "user_agent",
    ];
}

/// One serialized table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Artifact {
    pub table: TableName,
    pub rows: usize,
    #[serde(skip)]
    pub content: Vec<u8>,
    /// Final location, for sinks that write files.
    pub path: Option<PathBuf>,
}

impl Artifact {
    /// Artifact file name, e.g. `songs_table.csv`.
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.table.as_str(), ARTIFACT_EXTENSION)
    }
}

/// Receiver of a run's five artifacts.
pub trait TableSink {
    /// Publish every table, or none of them.
    fn publish(&mut self, schema: &StarSchema) -> SinkResult<Vec<Artifact>>;
}

// =============================================================================
// Serialization
// =============================================================================

/// Serialize rows to delimited text, header first (even when empty).
pub fn serialize_table<T: TableRow>(rows: &[T]) -> SinkResult<Vec<u8>> {
    let table = T::TABLE.as_str();
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());

    writer
        .write_record(T::COLUMNS)
        .map_err(|source| SinkError::Serialize { table, source })?;
    for row in rows {
        writer
            .serialize(row)
            .map_err(|source| SinkError::Serialize { table, source })?;
    }

    writer.flush()?;
    writer
        .into_inner()
        .map_err(|e| SinkError::Io(std::io::Error::new(e.error().kind(), e.to_string())))
}

/// Parse an artifact back into typed rows.
pub fn read_table<T: TableRow>(content: &[u8]) -> SinkResult<Vec<T>> {
    let table = T::TABLE.as_str();
    let mut reader = csv::ReaderBuilder::new().from_reader(content);

    reader
        .deserialize()
        .collect::<Result<Vec<T>, csv::Error>>()
        .map_err(|source| SinkError::Deserialize { table, source })
}

/// Serialize all five tables in publication order.
pub fn serialize_schema(schema: &StarSchema) -> SinkResult<Vec<Artifact>> {
    Ok(vec![
        artifact(&schema.artists)?,
        artifact(&schema.songs)?,
        artifact(&schema.users)?,
        artifact(&schema.time)?,
        artifact(&schema.songplays)?,
    ])
}

fn artifact<T: TableRow>(rows: &[T]) -> SinkResult<Artifact> {
    Ok(Artifact {
        table: T::TABLE,
        rows: rows.len(),
        content: serialize_table(rows)?,
        path: None,
    })
}

// =============================================================================
// Sinks
// =============================================================================

/// Writes `<table>.csv` files into a directory.
///
/// Every artifact is first written as `<table>.csv.tmp`. Only once all five
/// are on disk are they moved into place, each previous file being set
/// aside as `<table>.csv.bak`. If any move fails, the tables already moved
/// are taken back out and the previous files restored, so the directory
/// holds either the whole new set or the old one.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

/// Paths used while publishing one artifact.
#[derive(Debug)]
struct Staged {
    tmp: PathBuf,
    target: PathBuf,
    backup: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Refuse to start when a target path is taken by something other than a file.
    fn check_targets(&self, artifacts: &[Artifact]) -> SinkResult<()> {
        for artifact in artifacts {
            let target = self.dir.join(artifact.file_name());
            if target.exists() && !target.is_file() {
                return Err(SinkError::TargetNotFile { path: target });
            }
        }
        Ok(())
    }

    fn stage(&self, artifacts: &[Artifact]) -> SinkResult<Vec<Staged>> {
        let mut staged = Vec::with_capacity(artifacts.len());
        for artifact in artifacts {
            let name = artifact.file_name();
            let tmp = self.dir.join(format!("{}.tmp", name));
            if let Err(e) = fs::write(&tmp, &artifact.content) {
                let _ = fs::remove_file(&tmp);
                remove_staged(&staged);
                return Err(e.into());
            }
            staged.push(Staged {
                tmp,
                target: self.dir.join(&name),
                backup: self.dir.join(format!("{}.bak", name)),
            });
        }
        Ok(staged)
    }
}

impl TableSink for DirectorySink {
    fn publish(&mut self, schema: &StarSchema) -> SinkResult<Vec<Artifact>> {
        let mut artifacts = serialize_schema(schema)?;
        fs::create_dir_all(&self.dir)?;
        self.check_targets(&artifacts)?;

        let staged = self.stage(&artifacts)?;

        // (artifact, had a previous version)
        let mut committed: Vec<(&Staged, bool)> = Vec::with_capacity(staged.len());
        for entry in &staged {
            match commit(entry) {
                Ok(backed_up) => committed.push((entry, backed_up)),
                Err(e) => {
                    roll_back(&committed);
                    remove_staged(&staged);
                    return Err(e.into());
                }
            }
        }

        for (entry, backed_up) in &committed {
            if *backed_up {
                let _ = fs::remove_file(&entry.backup);
            }
        }
        for (artifact, entry) in artifacts.iter_mut().zip(staged.iter()) {
            artifact.path = Some(entry.target.clone());
        }

        Ok(artifacts)
    }
}

/// Move one staged file into place. Returns whether a previous file was set aside.
fn commit(entry: &Staged) -> io::Result<bool> {
    let backed_up = entry.target.is_file();
    if backed_up {
        fs::rename(&entry.target, &entry.backup)?;
    }
    if let Err(e) = fs::rename(&entry.tmp, &entry.target) {
        if backed_up {
            let _ = fs::rename(&entry.backup, &entry.target);
        }
        return Err(e);
    }
    Ok(backed_up)
}

/// Undo committed moves, newest first.
fn roll_back(committed: &[(&Staged, bool)]) {
    for (entry, backed_up) in committed.iter().rev() {
        let _ = fs::remove_file(&entry.target);
        if *backed_up {
            let _ = fs::rename(&entry.backup, &entry.target);
        }
    }
}

fn remove_staged(staged: &[Staged]) {
    for entry in staged {
        let _ = fs::remove_file(&entry.tmp);
    }
}

/// Keeps artifacts in memory; used by the HTTP API and tests.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    pub artifacts: Vec<Artifact>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Content of one published table.
    pub fn get(&self, table: TableName) -> Option<&[u8]> {
        self.artifacts
            .iter()
            .find(|a| a.table == table)
            .map(|a| a.content.as_slice())
    }
}

impl TableSink for MemorySink {
    fn publish(&mut self, schema: &StarSchema) -> SinkResult<Vec<Artifact>> {
        let artifacts = serialize_schema(schema)?;
        self.artifacts = artifacts.clone();
        Ok(artifacts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Gender, Level};
    use chrono::NaiveDateTime;
    use std::path::Path;

    fn ts(text: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.3f").unwrap()
    }

    fn sample_schema() -> StarSchema {
        let start = ts("2018-11-01 21:01:46.796");
        StarSchema {
            artists: vec![Artist {
                artist_id: 1,
                name: "Daft Punk".into(),
                location: "Paris, FR".into(),
            }],
            songs: vec![Song {
                song_id: 1,
                title: "Da Funk".into(),
                artist_id: 1,
                duration: 328.5,
            }],
            users: vec![User {
                user_id: 26,
                first_name: "Ryan".into(),
                last_name: "Smith".into(),
                gender: Gender::Male,
                level: Level::Free,
            }],
            time: vec![TimeEntry::from_timestamp(start)],
            songplays: vec![
                Songplay {
                    songplay_id: 1,
                    start_time: start,
                    user_id: Some(26),
                    level: Some(Level::Free),
                    song_id: Some(1),
                    artist_id: Some(1),
                    session_id: Some(583),
                    location: Some("Paris, FR".into()),
                    user_agent: Some("Mozilla/5.0 (X11; Linux x86_64)".into()),
                },
                Songplay {
                    songplay_id: 2,
                    start_time: start,
                    user_id: None,
                    level: None,
                    song_id: None,
                    artist_id: None,
                    session_id: Some(583),
                    location: None,
                    user_agent: None,
                },
            ],
        }
    }

    #[test]
    fn test_songplays_text_layout() {
        let schema = sample_schema();
        let bytes = serialize_table(&schema.songplays).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(
            lines[0],
            "songplay_id,start_time,user_id,level,song_id,artist_id,session_id,location,user_agent"
        );
        assert_eq!(
            lines[1],
            "1,2018-11-01 21:01:46.796,26,free,1,1,583,\"Paris, FR\",Mozilla/5.0 (X11; Linux x86_64)"
        );
        assert_eq!(lines[2], "2,2018-11-01 21:01:46.796,,,,,583,,");
    }

    #[test]
    fn test_empty_table_has_header() {
        let bytes = serialize_table::<Song>(&[]).unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), "song_id,title,artist_id,duration\n");
    }

    #[test]
    fn test_read_back_preserves_types() {
        let schema = sample_schema();

        let songplays: Vec<Songplay> = read_table(&serialize_table(&schema.songplays).unwrap()).unwrap();
        assert_eq!(songplays, schema.songplays);

        let time: Vec<TimeEntry> = read_table(&serialize_table(&schema.time).unwrap()).unwrap();
        assert_eq!(time[0].start_time, schema.songplays[0].start_time);

        let songs: Vec<Song> = read_table(&serialize_table(&schema.songs).unwrap()).unwrap();
        assert_eq!(songs[0].duration, 328.5);
    }

    #[test]
    fn test_columns_match_serialized_fields() {
        let schema = sample_schema();
        let text = String::from_utf8(serialize_table(&schema.users).unwrap()).unwrap();
        assert_eq!(text.lines().nth(1), Some("26,Ryan,Smith,M,free"));

        let text = String::from_utf8(serialize_table(&schema.time).unwrap()).unwrap();
        assert_eq!(text.lines().nth(1), Some("2018-11-01 21:01:46.796,21,1,44,11,2018,3"));
    }

    #[test]
    fn test_directory_sink_writes_five_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = DirectorySink::new(dir.path().join("out"));

        let artifacts = sink.publish(&sample_schema()).unwrap();
        assert_eq!(artifacts.len(), 5);

        for table in TableName::ALL {
            let path = dir.path().join("out").join(format!("{}.csv", table.as_str()));
            assert!(path.exists(), "missing {}", path.display());
        }
        let leftovers: Vec<_> = fs::read_dir(dir.path().join("out"))
            .unwrap()
            .flatten()
            .filter(|e| e.path().extension().is_some_and(|x| x == "tmp"))
            .collect();
        assert!(leftovers.is_empty());

        let content = fs::read(dir.path().join("out/artists_table.csv")).unwrap();
        let artists: Vec<Artist> = read_table(&content).unwrap();
        assert_eq!(artists[0].name, "Daft Punk");
    }

    #[test]
    fn test_directory_sink_is_byte_stable() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = DirectorySink::new(dir.path());
        let schema = sample_schema();

        sink.publish(&schema).unwrap();
        let first = fs::read(dir.path().join("songplays_table.csv")).unwrap();
        sink.publish(&schema).unwrap();
        let second = fs::read(dir.path().join("songplays_table.csv")).unwrap();
        assert_eq!(first, second);
    }

    fn read_text(path: &Path) -> String {
        fs::read_to_string(path).unwrap()
    }

    fn newer_schema() -> StarSchema {
        let mut schema = sample_schema();
        schema.artists[0].name = "Justice".into();
        schema.songs[0].title = "Genesis".into();
        schema
    }

    #[test]
    fn test_failed_move_restores_previous_set() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = DirectorySink::new(dir.path());
        sink.publish(&sample_schema()).unwrap();
        let old_artists = read_text(&dir.path().join("artists_table.csv"));
        let old_songs = read_text(&dir.path().join("songs_table.csv"));

        // A non-empty directory where the songs backup goes makes that move fail
        // after artists has already been replaced.
        let blocker = dir.path().join("songs_table.csv.bak");
        fs::create_dir(&blocker).unwrap();
        fs::write(blocker.join("keep"), "x").unwrap();

        assert!(sink.publish(&newer_schema()).is_err());

        assert_eq!(read_text(&dir.path().join("artists_table.csv")), old_artists);
        assert_eq!(read_text(&dir.path().join("songs_table.csv")), old_songs);
        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .flatten()
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        assert!(names.iter().all(|n| !n.ends_with(".tmp")), "{:?}", names);
        assert!(!names.contains(&"artists_table.csv.bak".to_string()));
    }

    #[test]
    fn test_blocked_target_publishes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("songs_table.csv")).unwrap();
        let mut sink = DirectorySink::new(dir.path());

        let err = sink.publish(&sample_schema()).unwrap_err();
        assert!(matches!(err, SinkError::TargetNotFile { .. }));
        assert!(!dir.path().join("artists_table.csv").exists());
        assert!(!dir.path().join("artists_table.csv.tmp").exists());
    }

    #[test]
    fn test_successful_publish_drops_backups() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = DirectorySink::new(dir.path());
        sink.publish(&sample_schema()).unwrap();
        sink.publish(&newer_schema()).unwrap();

        assert!(read_text(&dir.path().join("artists_table.csv")).contains("Justice"));
        for table in TableName::ALL {
            let backup = dir.path().join(format!("{}.csv.bak", table.as_str()));
            assert!(!backup.exists(), "{} left behind", backup.display());
        }
    }

    #[test]
    fn test_memory_sink() {
        let mut sink = MemorySink::new();
        sink.publish(&sample_schema()).unwrap();

        let users = sink.get(TableName::Users).unwrap();
        assert!(String::from_utf8_lossy(users).starts_with("user_id,"));
        assert_eq!(sink.artifacts.len(), 5);
    }
}
