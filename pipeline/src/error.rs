//! Error types for the playlog pipeline.
//!
//! Fatal failures are split by stage:
//!
//! - [`LoadError`] - Reading the extracted raw events
//! - [`TransformError`] - Building the star schema
//! - [`ValidationError`] - Star-schema integrity checks
//! - [`SinkError`] - Writing the table artifacts
//! - [`ConfigError`] - Resolving settings
//! - [`PipelineError`] - Top-level orchestration errors
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.
//!
//! Per-row problems (a missing field, an unresolved lookup) are not errors:
//! they are recorded as [`crate::transform::RowIssue`] and the run continues.

use std::path::PathBuf;
use thiserror::Error;

// =============================================================================
// Load Errors
// =============================================================================

/// Errors while reading the extracted raw events.
#[derive(Debug, Error)]
pub enum LoadError {
    /// Failed to read the input.
    #[error("Failed to read input: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed delimited text.
    #[error("Invalid CSV at line {line}: {message}")]
    Csv { line: usize, message: String },

    /// Malformed JSON document.
    #[error("Invalid JSON at line {line}: {message}")]
    Json { line: usize, message: String },

    /// Input has no header row.
    #[error("No headers found in input")]
    NoHeaders,

    /// Input contains no bytes at all.
    #[error("Input is empty")]
    EmptyInput,

    /// A field holds a value of the wrong type.
    #[error("Line {line}, column '{column}' (value '{value}'): {message}")]
    InvalidField {
        line: usize,
        column: String,
        value: String,
        message: String,
    },

    /// `ts` is present but is not an epoch-millisecond integer.
    #[error("Line {line}: malformed timestamp '{value}'")]
    MalformedTimestamp { line: usize, value: String },
}

// =============================================================================
// Transform Errors
// =============================================================================

/// Fatal errors while building the star schema.
///
/// Every table reaches `ts` through a join, so a play without a usable
/// timestamp aborts the whole run instead of being patched.
#[derive(Debug, Error)]
pub enum TransformError {
    /// A play event has no timestamp.
    #[error("Play event at row {row} has no timestamp")]
    MissingTimestamp { row: usize },

    /// A timestamp cannot be represented as a calendar date.
    #[error("Timestamp {ts} at row {row} is out of range")]
    TimestampOutOfRange { row: usize, ts: i64 },
}

// =============================================================================
// Validation Errors
// =============================================================================

/// Star-schema integrity violations found before publishing.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// One or more invariants do not hold.
    #[error("Star schema failed validation: {}", errors.join("; "))]
    IntegrityViolation { errors: Vec<String> },
}

// =============================================================================
// Sink Errors
// =============================================================================

/// Errors while serializing or writing table artifacts.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Filesystem failure.
    #[error("Sink IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Row serialization failure.
    #[error("Failed to serialize {table}: {source}")]
    Serialize {
        table: &'static str,
        #[source]
        source: csv::Error,
    },

    /// An artifact path is taken by a directory or other non-file.
    #[error("Cannot publish to {}: path exists and is not a file", path.display())]
    TargetNotFile { path: PathBuf },

    /// Artifact could not be parsed back.
    #[error("Failed to read {table}: {source}")]
    Deserialize {
        table: &'static str,
        #[source]
        source: csv::Error,
    },
}

// =============================================================================
// Config Errors
// =============================================================================

/// Errors while resolving settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required setting not provided.
    #[error("Missing setting: {0}")]
    Missing(String),

    /// Setting has an unusable value.
    #[error("Invalid value for '{key}': {message}")]
    Invalid { key: String, message: String },
}

// =============================================================================
// Pipeline Errors (top-level)
// =============================================================================

/// Top-level pipeline orchestration errors.
///
/// This is the error type returned by [`crate::transform::pipeline::run_pipeline`].
/// Any variant means no artifact of the run is usable.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Raw event loading failed.
    #[error("Load error: {0}")]
    Load(#[from] LoadError),

    /// Transform failed.
    #[error("Transform error: {0}")]
    Transform(#[from] TransformError),

    /// Integrity check failed.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Artifact writing failed.
    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    /// Settings could not be resolved.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

// =============================================================================
// Server Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Invalid request.
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Failed to bind or serve.
    #[error("Server IO error: {0}")]
    Io(#[from] std::io::Error),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for load operations.
pub type LoadResult<T> = Result<T, LoadError>;

/// Result type for transform operations.
pub type TransformResult<T> = Result<T, TransformError>;

/// Result type for sink operations.
pub type SinkResult<T> = Result<T, SinkError>;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;
