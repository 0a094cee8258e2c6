//! High-level pipeline API: load, transform, validate, publish.
//!
//! The stages run strictly in sequence and hand data to each other
//! directly. Any stage error ends the run before the sink is touched, so a
//! failed run never leaves a partial artifact set behind.
//!
//! # Example
//!
//! ```rust,ignore
//! use playlog::config::PipelineConfig;
//! use playlog::transform::pipeline::run_pipeline;
//!
//! let config = PipelineConfig::new("log_data.csv", "output");
//! let summary = run_pipeline(&config)?;
//! println!("{} songplays", summary.row_count(TableName::Songplays));
//! ```

use serde::Serialize;
use std::path::PathBuf;

use super::{transform_events, TransformOutput, TransformReport};
use crate::api::logs::{log_error, log_info, log_info_indent, log_success, log_warning, log_warning_indent};
use crate::config::{InputFormat, PipelineConfig};
use crate::error::{PipelineError, PipelineResult};
use crate::models::TableName;
use crate::parser::{BytesSource, EventSource, FileSource, ParseResult};
use crate::sink::{Artifact, DirectorySink, TableSink};
use crate::validation::validate_star_schema;

/// Number of issue groups printed in the run log.
const MAX_REASONS_LOGGED: usize = 8;

/// Number of sample rows printed per issue group.
const MAX_ROWS_PER_REASON: usize = 5;

/// Input file information
#[derive(Debug, Clone, Serialize)]
pub struct InputInfo {
    pub encoding: String,
    pub delimiter: Option<char>,
    pub headers: Vec<String>,
    pub row_count: usize,
}

impl From<&ParseResult> for InputInfo {
    fn from(parsed: &ParseResult) -> Self {
        Self {
            encoding: parsed.encoding.clone(),
            delimiter: parsed.delimiter,
            headers: parsed.headers.clone(),
            row_count: parsed.events.len(),
        }
    }
}

/// Outcome of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub input: InputInfo,
    /// Row count per table, in publication order
    pub tables: Vec<(TableName, usize)>,
    pub missing_field_issues: usize,
    pub unresolved_references: usize,
    pub artifacts: Vec<Artifact>,
}

impl RunSummary {
    pub fn row_count(&self, table: TableName) -> usize {
        self.tables
            .iter()
            .find(|(t, _)| *t == table)
            .map(|(_, n)| *n)
            .unwrap_or(0)
    }
}

/// Run the full pipeline from a config: file in, artifact directory out.
pub fn run_pipeline(config: &PipelineConfig) -> PipelineResult<RunSummary> {
    log_info(format!("Input: {}", config.input.display()));
    log_info(format!("Output: {}", config.output_dir.display()));

    let source = FileSource::new(&config.input, config.format());
    let mut sink = DirectorySink::new(&config.output_dir);
    run_with(&source, &mut sink)
}

/// Resolve settings (flags, then environment) and run the full pipeline.
pub fn run_from_settings(
    input: Option<PathBuf>,
    output_dir: Option<PathBuf>,
    input_format: Option<String>,
) -> PipelineResult<RunSummary> {
    let config = PipelineConfig::resolve(input, output_dir, input_format)?;
    run_pipeline(&config)
}

/// Run the pipeline against any source and sink.
pub fn run_with<S, K>(source: &S, sink: &mut K) -> PipelineResult<RunSummary>
where
    S: EventSource,
    K: TableSink,
{
    let (input, output) = match load_and_transform(source) {
        Ok(result) => result,
        Err(e) => {
            log_error(format!("Run aborted, nothing published: {}", e));
            return Err(e);
        }
    };

    log_info("📦 Publishing artifacts...");
    let artifacts = sink.publish(&output.schema).map_err(|e| {
        log_error(format!("Publishing failed: {}", e));
        PipelineError::from(e)
    })?;
    for artifact in &artifacts {
        match artifact.path {
            Some(ref path) => log_success(format!("{} → {}", artifact.table, path.display())),
            None => log_success(format!("{} ({} bytes)", artifact.table, artifact.content.len())),
        }
    }

    Ok(RunSummary {
        input,
        tables: TableName::ALL
            .iter()
            .map(|t| (*t, output.schema.row_count(*t)))
            .collect(),
        missing_field_issues: output.report.missing_field_count(),
        unresolved_references: output.report.unresolved_count(),
        artifacts,
    })
}

/// Load, transform and validate uploaded bytes without publishing.
pub fn transform_bytes(
    bytes: &[u8],
    format: InputFormat,
) -> PipelineResult<(InputInfo, TransformOutput)> {
    load_and_transform(&BytesSource { bytes, format })
}

fn load_and_transform<S: EventSource>(
    source: &S,
) -> PipelineResult<(InputInfo, TransformOutput)> {
    // Step 1: Load
    log_info("📖 Loading raw events...");
    let parsed = source.load_events()?;
    let input = InputInfo::from(&parsed);
    log_success(format!("Detected encoding: {}", input.encoding));
    if let Some(d) = input.delimiter {
        log_success(format!("Detected separator: '{}'", format_delimiter(d)));
    }
    log_success(format!("Read {} events", input.row_count));

    // Step 2: Transform
    log_info("⚙️  Building star schema...");
    let output = transform_events(&parsed.events)?;
    for table in TableName::ALL {
        log_info_indent(format!("{}: {} rows", table, output.schema.row_count(table)), 1);
    }
    print_report(&output.report);

    // Step 3: Validate
    log_info("✔️  Checking integrity...");
    validate_star_schema(&output.schema)?;
    log_success("All keys unique and references resolved");

    Ok((input, output))
}

/// Format delimiter for display
fn format_delimiter(d: char) -> String {
    match d {
        '\t' => "TAB".to_string(),
        c => c.to_string(),
    }
}

/// Log non-fatal issues grouped by reason
fn print_report(report: &TransformReport) {
    if report.issues.is_empty() {
        log_success("No rows dropped or nulled");
        return;
    }

    log_warning(format!(
        "{} missing-field exclusions, {} unresolved references",
        report.missing_field_count(),
        report.unresolved_count()
    ));

    let reasons = report.by_reason();
    for (reason, rows) in reasons.iter().take(MAX_REASONS_LOGGED) {
        let sample: Vec<String> = rows.iter().take(MAX_ROWS_PER_REASON).map(|r| r.to_string()).collect();
        let more = if rows.len() > MAX_ROWS_PER_REASON {
            format!("... +{}", rows.len() - MAX_ROWS_PER_REASON)
        } else {
            String::new()
        };
        log_warning_indent(format!("• {} (rows: {}{})", reason, sample.join(", "), more), 1);
    }
    if reasons.len() > MAX_REASONS_LOGGED {
        log_warning_indent(format!("... {} more reasons", reasons.len() - MAX_REASONS_LOGGED), 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ConfigError, LoadError, TransformError};
    use crate::sink::{read_table, MemorySink};
    use crate::models::Songplay;
    use std::fs;

    const EVENTS_CSV: &str = "\
artist,location,song,length,userId,firstName,lastName,gender,level,ts,page,sessionId,userAgent
A,L,S1,3.5,1,F,G,F,free,1000,NextSong,9,UA
,,,,1,F,G,F,free,2000,Home,9,UA
B,L,Unknown Song,,2,H,I,M,paid,3000,NextSong,10,\"Mozilla/5.0 (Windows NT 6.1; WOW64)\"
";

    #[test]
    fn test_run_with_memory_sink() {
        let source = BytesSource {
            bytes: EVENTS_CSV.as_bytes(),
            format: InputFormat::Csv,
        };
        let mut sink = MemorySink::new();

        let summary = run_with(&source, &mut sink).unwrap();
        assert_eq!(summary.input.row_count, 3);
        assert_eq!(summary.row_count(TableName::Artists), 2);
        assert_eq!(summary.row_count(TableName::Songs), 1);
        assert_eq!(summary.row_count(TableName::Users), 2);
        assert_eq!(summary.row_count(TableName::Time), 3);
        assert_eq!(summary.row_count(TableName::Songplays), 2);
        assert!(summary.unresolved_references >= 1);

        let songplays: Vec<Songplay> = read_table(sink.get(TableName::Songplays).unwrap()).unwrap();
        assert_eq!(songplays[1].song_id, None);
        assert_eq!(songplays[1].artist_id, Some(2));
        assert_eq!(songplays[1].user_id, Some(2));
    }

    #[test]
    fn test_run_pipeline_twice_is_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("log_data.csv");
        fs::write(&input, EVENTS_CSV).unwrap();

        let first_config = PipelineConfig::new(&input, dir.path().join("first"));
        let second_config = PipelineConfig::new(&input, dir.path().join("second"));
        run_pipeline(&first_config).unwrap();
        run_pipeline(&second_config).unwrap();

        for table in TableName::ALL {
            let name = format!("{}.csv", table.as_str());
            let a = fs::read(dir.path().join("first").join(&name)).unwrap();
            let b = fs::read(dir.path().join("second").join(&name)).unwrap();
            assert_eq!(a, b, "{} differs between runs", name);
        }
    }

    #[test]
    fn test_fatal_error_publishes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("log_data.csv");
        fs::write(&input, "ts,page\n1000,Home\nsoon,NextSong\n").unwrap();
        let out = dir.path().join("out");

        let err = run_pipeline(&PipelineConfig::new(&input, &out)).unwrap_err();
        assert!(matches!(err, PipelineError::Load(LoadError::MalformedTimestamp { .. })));
        assert!(!out.exists());
    }

    #[test]
    fn test_play_without_ts_aborts() {
        let csv = "ts,page,sessionId\n1000,Home,1\n,NextSong,1\n";
        let err = transform_bytes(csv.as_bytes(), InputFormat::Csv).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Transform(TransformError::MissingTimestamp { row: 1 })
        ));
    }

    #[test]
    fn test_missing_input_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig::new(dir.path().join("absent.csv"), dir.path().join("out"));
        let err = run_pipeline(&config).unwrap_err();
        assert!(matches!(err, PipelineError::Load(LoadError::Io(_))));
    }

    #[test]
    fn test_bad_settings_are_config_errors() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let err = run_from_settings(
            Some(dir.path().join("log_data.csv")),
            Some(out.clone()),
            Some("xml".into()),
        )
        .unwrap_err();

        assert!(matches!(err, PipelineError::Config(ConfigError::Invalid { .. })));
        assert!(!out.exists());
    }

    #[test]
    fn test_transform_bytes_json() {
        let json = r#"[{"artist": "A", "location": "L", "song": "S", "length": 1.0, "ts": 5, "page": "NextSong", "sessionId": 1}]"#;
        let (info, output) = transform_bytes(json.as_bytes(), InputFormat::Json).unwrap();

        assert_eq!(info.row_count, 1);
        assert_eq!(info.delimiter, None);
        assert_eq!(output.schema.songplays[0].song_id, Some(1));
        assert_eq!(output.schema.songplays[0].user_id, None);
    }
}
