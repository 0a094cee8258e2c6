//! # Playlog - music-streaming event logs to a star schema
//!
//! Playlog turns the flat event log of a streaming service (page views,
//! logins, song plays) into five analytical tables: artists, songs, users,
//! time and songplays.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │ Event file  │────▶│   Loader    │────▶│  Transform  │────▶│  5 × CSV    │
//! │ (CSV/JSON)  │     │  (auto-enc) │     │ (dims+fact) │     │  artifacts  │
//! └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use playlog::{run_pipeline, PipelineConfig};
//!
//! let summary = run_pipeline(&PipelineConfig::new("log_data.csv", "output"))?;
//! println!("Published {} artifacts", summary.artifacts.len());
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Stage error types
//! - [`models`] - Raw events and table rows
//! - [`config`] - Settings and constants
//! - [`parser`] - Raw event loading with auto-detection
//! - [`transform`] - Dimension builder, fact assembler, pipeline
//! - [`validation`] - Star-schema integrity checks
//! - [`sink`] - Artifact serialization and publishing
//! - [`api`] - HTTP API server

// Core modules
pub mod config;
pub mod error;
pub mod models;

// Loading
pub mod parser;

// Transformation
pub mod transform;

// Validation
pub mod validation;

// Publishing
pub mod sink;

// HTTP API
pub mod api;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    ConfigError, LoadError, LoadResult, PipelineError, PipelineResult, ServerError, ServerResult,
    SinkError, SinkResult, TransformError, TransformResult, ValidationError,
};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{
    Artist, Gender, Level, RawEvent, Song, Songplay, StarSchema, TableName, TimeEntry, User,
};

// =============================================================================
// Re-exports - Config
// =============================================================================

pub use config::{InputFormat, PipelineConfig};

// =============================================================================
// Re-exports - Loading
// =============================================================================

pub use parser::{
    detect_delimiter, detect_encoding, parse_bytes_auto, parse_file_auto, BytesSource,
    EventSource, FileSource, ParseResult,
};

// =============================================================================
// Re-exports - Transform
// =============================================================================

pub use transform::{
    build_artists, build_dimensions, build_songplays, build_songs, build_time, build_users,
    transform_events, Dimensions, RowIssue, TransformOutput, TransformReport,
};

// =============================================================================
// Re-exports - Pipeline
// =============================================================================

pub use transform::pipeline::{
    run_from_settings, run_pipeline, run_with, transform_bytes, InputInfo, RunSummary,
};

// =============================================================================
// Re-exports - Validation
// =============================================================================

pub use validation::{is_valid, validate_star_schema};

// =============================================================================
// Re-exports - Sink
// =============================================================================

pub use sink::{
    read_table, serialize_schema, serialize_table, Artifact, DirectorySink, MemorySink,
    TableRow, TableSink,
};

// Server
pub mod server {
    pub use crate::api::server::start_server;
}
