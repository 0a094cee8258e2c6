//! Pipeline configuration.
//!
//! Settings come from the environment (optionally seeded from a `.env` file)
//! and can be overridden by CLI flags.

use std::env;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Page value that marks an event as a song play.
pub const NEXT_SONG_PAGE: &str = "NextSong";

/// Where artifacts land when no output directory is configured.
pub const DEFAULT_OUTPUT_DIR: &str = "output";

/// Default HTTP port for `playlog serve`.
pub const DEFAULT_PORT: u16 = 3000;

/// Maximum upload size accepted by the HTTP API (50 MB).
pub const MAX_UPLOAD_SIZE: usize = 50 * 1024 * 1024;

/// Environment variable holding the raw event file path.
pub const ENV_INPUT: &str = "PLAYLOG_INPUT";
/// Environment variable holding the artifact directory.
pub const ENV_OUTPUT_DIR: &str = "PLAYLOG_OUTPUT_DIR";
/// Environment variable forcing the input format (`csv`, `json`, `ndjson`).
pub const ENV_INPUT_FORMAT: &str = "PLAYLOG_INPUT_FORMAT";

/// Format of the extracted raw event file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    /// Delimited text with a header row.
    Csv,
    /// A JSON array of event documents.
    Json,
    /// One JSON document per line.
    Ndjson,
}

impl InputFormat {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "csv" => Some(Self::Csv),
            "json" => Some(Self::Json),
            "ndjson" | "jsonl" => Some(Self::Ndjson),
            _ => None,
        }
    }

    /// Guess the format from a file extension, defaulting to CSV.
    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::parse)
            .unwrap_or(Self::Csv)
    }
}

/// Resolved settings for one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Extracted raw event file.
    pub input: PathBuf,
    /// Directory receiving the five table artifacts.
    pub output_dir: PathBuf,
    /// Input format; guessed from the extension when `None`.
    pub input_format: Option<InputFormat>,
}

impl PipelineConfig {
    pub fn new(input: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output_dir: output_dir.into(),
            input_format: None,
        }
    }

    /// Build a config from the environment, letting explicit values win.
    pub fn resolve(
        input: Option<PathBuf>,
        output_dir: Option<PathBuf>,
        input_format: Option<String>,
    ) -> Result<Self, ConfigError> {
        // Try loading .env file
        let _ = dotenvy::dotenv();

        let input = input
            .or_else(|| env::var_os(ENV_INPUT).map(PathBuf::from))
            .ok_or_else(|| ConfigError::Missing(ENV_INPUT.to_string()))?;

        let output_dir = output_dir
            .or_else(|| env::var_os(ENV_OUTPUT_DIR).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR));

        let input_format = match input_format.or_else(|| env::var(ENV_INPUT_FORMAT).ok()) {
            Some(raw) => Some(InputFormat::parse(&raw).ok_or_else(|| ConfigError::Invalid {
                key: ENV_INPUT_FORMAT.to_string(),
                message: format!("unknown input format '{}'", raw),
            })?),
            None => None,
        };

        Ok(Self {
            input,
            output_dir,
            input_format,
        })
    }

    /// Format to use for the input file.
    pub fn format(&self) -> InputFormat {
        self.input_format
            .unwrap_or_else(|| InputFormat::from_path(&self.input))
    }
}
