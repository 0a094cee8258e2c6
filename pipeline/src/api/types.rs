//! REST API types.
//!
//! Tables are returned as JSON arrays using the same column names as the
//! CSV artifacts.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::models::{StarSchema, TableName};
use crate::transform::pipeline::InputInfo;
use crate::transform::TransformOutput;

/// Response sent after an upload has been transformed.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformResponse {
    /// Unique job identifier
    pub job_id: String,

    /// Status: "ready" or "warning" (some rows dropped or nulled)
    pub status: String,

    /// The five tables
    pub tables: StarSchema,

    /// Metadata about the run
    pub metadata: ResponseMetadata,
}

/// Metadata about the transformation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMetadata {
    pub input: InputMetadata,
    pub row_counts: Vec<TableCount>,
    pub issues: IssueStats,
}

/// Uploaded file metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputMetadata {
    pub encoding: String,
    pub delimiter: Option<String>,
    pub row_count: usize,
    pub columns: Vec<String>,
}

/// Row count of one artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableCount {
    pub table: String,
    pub rows: usize,
}

/// Non-fatal issue counts
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueStats {
    pub missing_fields: usize,
    pub unresolved_references: usize,
}

impl TransformResponse {
    pub fn new(input: InputInfo, output: TransformOutput) -> Self {
        let TransformOutput { schema, report } = output;

        let row_counts = TableName::ALL
            .iter()
            .map(|t| TableCount {
                table: t.as_str().to_string(),
                rows: schema.row_count(*t),
            })
            .collect();

        let status = if report.issues.is_empty() { "ready" } else { "warning" };

        TransformResponse {
            job_id: Uuid::new_v4().to_string(),
            status: status.to_string(),
            metadata: ResponseMetadata {
                input: InputMetadata {
                    encoding: input.encoding,
                    delimiter: input.delimiter.map(|d| d.to_string()),
                    row_count: input.row_count,
                    columns: input.headers,
                },
                row_counts,
                issues: IssueStats {
                    missing_fields: report.missing_field_count(),
                    unresolved_references: report.unresolved_count(),
                },
            },
            tables: schema,
        }
    }
}

/// Create an error response
pub fn error_response(error: &str) -> Value {
    json!({
        "jobId": Uuid::new_v4().to_string(),
        "status": "error",
        "error": error,
        "tables": null,
    })
}
