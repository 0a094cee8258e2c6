//! Transformation module.
//!
//! This module turns raw events into the star schema:
//! - Dimensions: artists, songs, users and time with surrogate keys
//! - Facts: songplays joined against the dimensions
//! - Report: non-fatal row issues
//! - Pipeline: load, transform, validate and publish

pub mod dimensions;
pub mod facts;
pub mod pipeline;
pub mod report;

use serde::Serialize;

use crate::error::TransformResult;
use crate::models::{RawEvent, StarSchema};

pub use dimensions::{build_artists, build_dimensions, build_songs, build_time, build_users, Dimensions};
pub use facts::build_songplays;
pub use pipeline::*;
pub use report::{RowIssue, TransformReport};

/// Star schema plus the issues met while building it.
#[derive(Debug, Clone, Serialize)]
pub struct TransformOutput {
    pub schema: StarSchema,
    pub report: TransformReport,
}

/// Build the five tables from one full raw event set.
///
/// Pure: the input is not modified and the same input always yields the
/// same tables and keys.
pub fn transform_events(events: &[RawEvent]) -> TransformResult<TransformOutput> {
    let mut report = TransformReport::new(events.len());

    let (dims, dim_issues) = build_dimensions(events)?;
    report.extend(dim_issues);

    let (songplays, fact_issues) = build_songplays(events, &dims)?;
    report.extend(fact_issues);

    let Dimensions {
        artists,
        songs,
        users,
        time,
    } = dims;

    Ok(TransformOutput {
        schema: StarSchema {
            artists,
            songs,
            users,
            time,
            songplays,
        },
        report,
    })
}
