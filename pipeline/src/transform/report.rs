//! Non-fatal row issues collected while building the star schema.
//!
//! A row missing a field is excluded from the table that needs it; a lookup
//! that finds nothing drops the row (songs) or nulls the key (songplays).
//! Neither stops the run; both end up here so the pipeline can log them.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::models::TableName;

/// A per-row problem that did not abort the transform.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RowIssue {
    /// The row lacks fields the table needs.
    MissingField {
        table: TableName,
        row: usize,
        fields: Vec<&'static str>,
    },
    /// A join found no dimension row for `value`.
    UnresolvedReference {
        table: TableName,
        row: usize,
        column: &'static str,
        value: String,
    },
}

impl RowIssue {
    pub fn table(&self) -> TableName {
        match self {
            Self::MissingField { table, .. } | Self::UnresolvedReference { table, .. } => *table,
        }
    }

    /// Index of the raw event the issue refers to.
    pub fn row(&self) -> usize {
        match self {
            Self::MissingField { row, .. } | Self::UnresolvedReference { row, .. } => *row,
        }
    }

    /// Grouping key used when summarizing issues.
    pub fn reason(&self) -> String {
        match self {
            Self::MissingField { table, fields, .. } => {
                format!("{}: missing {}", table, fields.join(", "))
            }
            Self::UnresolvedReference { table, column, .. } => {
                format!("{}: unresolved {}", table, column)
            }
        }
    }
}

/// Names of the fields whose flag is `true`.
pub(crate) fn missing_fields(checks: &[(&'static str, bool)]) -> Vec<&'static str> {
    checks
        .iter()
        .filter(|(_, missing)| *missing)
        .map(|(name, _)| *name)
        .collect()
}

/// Issues from one transform run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TransformReport {
    /// Number of raw events fed to the transform
    pub input_rows: usize,
    /// Every non-fatal issue, in discovery order
    pub issues: Vec<RowIssue>,
}

impl TransformReport {
    pub fn new(input_rows: usize) -> Self {
        Self {
            input_rows,
            issues: Vec::new(),
        }
    }

    pub fn extend(&mut self, issues: Vec<RowIssue>) {
        self.issues.extend(issues);
    }

    /// Issues recorded against one table.
    pub fn count_for(&self, table: TableName) -> usize {
        self.issues.iter().filter(|i| i.table() == table).count()
    }

    pub fn missing_field_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| matches!(i, RowIssue::MissingField { .. }))
            .count()
    }

    pub fn unresolved_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| matches!(i, RowIssue::UnresolvedReference { .. }))
            .count()
    }

    /// Issues grouped by reason, with the rows they affect.
    pub fn by_reason(&self) -> BTreeMap<String, Vec<usize>> {
        let mut reasons: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for issue in &self.issues {
            reasons.entry(issue.reason()).or_default().push(issue.row());
        }
        reasons
    }
}
